// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation, deadlines and progress reporting

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag; clones observe the same flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Receives a non-decreasing completion fraction in [0, 1]
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Cancellation, deadline and progress for one search
#[derive(Default, Clone)]
pub struct SearchControl {
    cancel: CancelToken,
    deadline: Option<Instant>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for SearchControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchControl")
            .field("cancel", &self.cancel)
            .field("deadline", &self.deadline)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// True once cancelled or past the deadline; a passed deadline trips the flag
    pub fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn tracker(&self, total_tokens: usize) -> ProgressTracker<'_> {
        ProgressTracker {
            sink: self.progress.as_deref(),
            total: total_tokens.max(1),
            done: AtomicUsize::new(0),
            reported: Mutex::new(0.0),
        }
    }
}

/// Token counter shared by workers
pub(crate) struct ProgressTracker<'a> {
    sink: Option<&'a dyn ProgressSink>,
    total: usize,
    done: AtomicUsize,
    /// Highest fraction handed to the sink so far
    reported: Mutex<f64>,
}

impl ProgressTracker<'_> {
    /// Record `tokens` more scanned tokens
    pub fn advance(&self, tokens: usize) {
        self.done.fetch_add(tokens, Ordering::Relaxed);
        let Some(sink) = self.sink else {
            return;
        };
        // the sink is called under the lock so reports reach it in order
        let mut reported = self.reported.lock();
        let done = self.done.load(Ordering::Relaxed);
        let fraction = (done as f64 / self.total as f64).min(1.0);
        if fraction >= *reported {
            *reported = fraction;
            sink.report(fraction);
        }
    }
}
