// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gap cost curves for local alignment

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};

/// Cost of a gap as a function of its length.
///
/// Length 0 always costs 0. Values are expected in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GapCost {
    /// Same cost for every gap length
    Constant { cost: f32 },
    /// `start + step * (k - 1)`; `start` defaults to `step`
    Linear {
        step: f32,
        #[serde(default)]
        start: Option<f32>,
    },
    /// `1 - 2^(-k / cutoff)`: half the maximum cost at `k = cutoff`
    Exponential { cutoff: f32 },
    /// Explicit table; lengths past its end use the last entry
    Custom { costs: Vec<f32> },
}

impl Default for GapCost {
    fn default() -> Self {
        Self::Constant { cost: 0.0 }
    }
}

impl GapCost {
    /// Unclamped cost for a gap of `length` tokens
    pub fn cost(&self, length: usize) -> f32 {
        if length == 0 {
            return 0.0;
        }
        let k = length as f32;
        match self {
            Self::Constant { cost } => *cost,
            Self::Linear { step, start } => start.unwrap_or(*step) + step * (k - 1.0),
            Self::Exponential { cutoff } => {
                if *cutoff <= 0.0 {
                    1.0
                } else {
                    1.0 - (-k / cutoff).exp2()
                }
            }
            Self::Custom { costs } => match costs.len() {
                0 => 1.0,
                len => costs[length.min(len - 1)],
            },
        }
    }

    /// Costs for lengths `0..=max_len`.
    ///
    /// With `clamp` set, values are clipped to [0, 1]; otherwise any value
    /// outside that range is an error. NaN is always an error.
    pub fn table(&self, max_len: usize, clamp: bool) -> Result<Vec<f32>> {
        (0..=max_len)
            .map(|length| checked(self.cost(length), length, clamp))
            .collect()
    }

    /// Single checked cost, for region penalties
    pub fn penalty(&self, length: usize, clamp: bool) -> Result<f32> {
        checked(self.cost(length), length, clamp)
    }
}

fn checked(value: f32, length: usize, clamp: bool) -> Result<f32> {
    if value.is_nan() || (!clamp && !(0.0..=1.0).contains(&value)) {
        return Err(SearchError::InvalidGapCost { length, value });
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Look up a precomputed table, saturating at its last entry
#[inline]
pub(crate) fn lookup(table: &[f32], length: usize) -> f32 {
    match table.len() {
        0 => 0.0,
        len => table[length.min(len - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_and_linear() {
        let constant = GapCost::Constant { cost: 0.3 };
        assert_eq!(constant.table(3, true).unwrap(), vec![0.0, 0.3, 0.3, 0.3]);

        let linear = GapCost::Linear {
            step: 0.25,
            start: Some(0.5),
        };
        assert_eq!(linear.table(3, true).unwrap(), vec![0.0, 0.5, 0.75, 1.0]);
        let linear = GapCost::Linear {
            step: 0.2,
            start: None,
        };
        assert!((linear.cost(2) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn exponential_halves_at_cutoff() {
        let gap = GapCost::Exponential { cutoff: 4.0 };
        assert_eq!(gap.cost(0), 0.0);
        assert!((gap.cost(4) - 0.5).abs() < 1e-6);
        assert!(gap.cost(40) < 1.0 && gap.cost(40) > 0.99);
        let flat = GapCost::Exponential { cutoff: 0.0 };
        assert_eq!(flat.table(2, true).unwrap(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn custom_saturates_at_last_entry() {
        let gap = GapCost::Custom {
            costs: vec![0.0, 0.1, 0.4],
        };
        assert_eq!(gap.cost(2), 0.4);
        assert_eq!(gap.cost(9), 0.4);
        assert_eq!(GapCost::Custom { costs: vec![] }.cost(3), 1.0);
    }

    #[test]
    fn out_of_range_clamps_or_fails() {
        let gap = GapCost::Linear {
            step: 0.75,
            start: None,
        };
        assert_eq!(gap.table(2, true).unwrap(), vec![0.0, 0.75, 1.0]);
        let err = gap.table(2, false).unwrap_err();
        assert!(matches!(err, SearchError::InvalidGapCost { length: 2, .. }));

        let negative = GapCost::Constant { cost: -0.5 };
        assert_eq!(negative.penalty(1, true).unwrap(), 0.0);
        assert!(negative.penalty(1, false).is_err());
        assert!(GapCost::Constant { cost: f32::NAN }.penalty(1, true).is_err());
    }

    #[test]
    fn lookup_saturates() {
        let table = [0.0, 0.2, 0.5];
        assert_eq!(lookup(&table, 1), 0.2);
        assert_eq!(lookup(&table, 10), 0.5);
        assert_eq!(lookup(&[], 3), 0.0);
    }
}
