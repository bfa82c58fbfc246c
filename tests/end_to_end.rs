// SPDX-License-Identifier: MIT OR Apache-2.0

use parking_lot::Mutex;
use spanseek::alignment::AlignmentAlgorithm;
use spanseek::document::{DocumentInput, Partition, QueryInput};
use spanseek::embedding::MapResolver;
use spanseek::search::Region;
use spanseek::{
    CancelToken, EmbeddingStore, OovPolicy, QueryOptions, SearchControl, SearchError, SearchOptions, Session,
    TokenMetric, VectorSpaceMetric,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn session(docs: &[&[&str]]) -> Session {
    let mut session = Session::default();
    for (i, sentences) in docs.iter().enumerate() {
        session
            .add_document(&DocumentInput::from_sentences(&format!("doc {}", i), sentences))
            .unwrap();
    }
    session
}

#[test]
fn exact_query_scores_one_with_two_matched_regions() {
    let session = session(&[&["the great star shines"]]);
    let options = QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0));
    let query = session.query(&QueryInput::from_words("great star"), options).unwrap();
    let matches = session
        .find(&query, &SearchOptions::default(), &SearchControl::new())
        .unwrap();

    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert!((m.score - 1.0).abs() < 1e-6);
    assert_eq!(m.matched().count(), 2);
    assert_eq!(m.gaps().count(), 0);
    assert!(m.regions.iter().all(|r| matches!(r, Region::Matched(_))));
    assert_eq!(m.leading, 0..1);
    assert_eq!(m.trailing, 3..4);

    let records = session.records(&query, &matches).unwrap();
    assert_eq!(records[0].text(), "the great star shines");
    assert_eq!(records[0].omitted_before, "the ");
    assert_eq!(records[0].omitted_after, "shines");
}

#[test]
fn cancelling_after_first_document_keeps_its_matches() {
    let session = session(&[&["red fox"], &["red fox"], &["red fox"]]);
    let query = session
        .query(
            &QueryInput::from_words("red fox"),
            QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0)),
        )
        .unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let control = SearchControl::new()
        .with_cancel(cancel)
        .with_progress(move |fraction: f64| {
            seen.lock().push(fraction);
            trigger.cancel();
        });

    let matches = session
        .find(&query, &SearchOptions::default().with_threads(1), &control)
        .unwrap();
    let documents: Vec<_> = matches.iter().map(|m| m.document).collect();
    assert_eq!(documents, vec![0]);
    assert!(control.cancel_token().is_cancelled());

    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert!(reports[0] > 0.0 && reports[0] <= 1.0);
}

#[test]
fn cancelling_mid_document_keeps_scored_spans() {
    let session = session(&[&["red fox", "red fox", "red fox"], &["red fox"]]);
    let query = session
        .query(
            &QueryInput::from_words("red fox"),
            QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0)),
        )
        .unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let control = SearchControl::new()
        .with_cancel(cancel)
        .with_progress(move |fraction: f64| {
            seen.lock().push(fraction);
            trigger.cancel();
        });

    let matches = session
        .find(&query, &SearchOptions::default().with_threads(1), &control)
        .unwrap();
    let keys: Vec<_> = matches.iter().map(|m| (m.document, m.span_index)).collect();
    assert_eq!(keys, vec![(0, 0)]);
    assert!((matches[0].score - 1.0).abs() < 1e-6);
    // two of eight tokens were scanned
    assert_eq!(reports.lock().as_slice(), &[0.25]);
}

#[test]
fn deadline_during_search_returns_partial_results() {
    let session = session(&[&["red fox", "red fox", "red fox"]]);
    let query = session
        .query(
            &QueryInput::from_words("red fox"),
            QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0)),
        )
        .unwrap();
    let control = SearchControl::new()
        .with_deadline(Instant::now() + Duration::from_millis(200))
        .with_progress(|_: f64| std::thread::sleep(Duration::from_millis(400)));

    let matches = session
        .find(&query, &SearchOptions::default().with_threads(1), &control)
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].span_index, 0);
    assert!(control.cancel_token().is_cancelled());
}

#[test]
fn passed_deadline_returns_no_matches_without_error() {
    let session = session(&[&["red fox"]]);
    let query = session
        .query(&QueryInput::from_words("red fox"), QueryOptions::default())
        .unwrap();
    let control = SearchControl::new().with_deadline(Instant::now());
    let matches = session
        .find(&query, &SearchOptions::default(), &control)
        .unwrap();
    assert!(matches.is_empty());
}

#[test]
fn parallel_progress_never_decreases() {
    let docs = [&["red fox"][..]; 8];
    let session = session(&docs);
    let query = session
        .query(&QueryInput::from_words("red fox"), QueryOptions::default())
        .unwrap();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let control = SearchControl::new().with_progress(move |fraction: f64| {
        if fraction < 0.5 {
            std::thread::sleep(Duration::from_millis(50));
        }
        seen.lock().push(fraction);
    });
    let matches = session
        .find(&query, &SearchOptions::default().with_threads(8), &control)
        .unwrap();
    assert_eq!(matches.len(), 8);

    let reports = reports.lock();
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reports.last().copied(), Some(1.0));
}

#[test]
fn progress_reaches_one_and_never_decreases() {
    let session = session(&[&["a b c"], &["d e"], &["f"], &["a f"]]);
    let query = session
        .query(&QueryInput::from_words("a f"), QueryOptions::default())
        .unwrap();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let control = SearchControl::new().with_progress(move |fraction: f64| seen.lock().push(fraction));
    session
        .find(&query, &SearchOptions::default().with_threads(1), &control)
        .unwrap();

    let reports = reports.lock();
    assert_eq!(reports.len(), 4);
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reports.last().copied(), Some(1.0));
}

#[test]
fn span_tables_are_built_once_and_stable() {
    let session = session(&[&["one two three four five"]]);
    let partition = Partition::tokens(2, 2);
    let document = session.index().get(0).unwrap();
    let first = session.index().span_table(0, partition).unwrap();
    let second = session.index().span_table(0, partition).unwrap();
    assert_eq!(first.as_slice(), second.as_slice());
    assert_eq!(first.len(), 3);
    assert_eq!(document.span_builds(), 1);
    assert_eq!(session.index().span_text(0, partition, 2).unwrap(), "five");
}

#[test]
fn results_merge_by_score_then_document_then_span() {
    let session = session(&[&["cold night", "red fox"], &["red fox"], &["red fox", "red hen"]]);
    let query = session
        .query(
            &QueryInput::from_words("red fox"),
            QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0)),
        )
        .unwrap();
    let matches = session
        .find(
            &query,
            &SearchOptions::default().with_min_score(0.1).with_threads(3),
            &SearchControl::new(),
        )
        .unwrap();
    let keys: Vec<_> = matches.iter().map(|m| (m.document, m.span_index)).collect();
    assert_eq!(keys, vec![(0, 1), (1, 0), (2, 0), (2, 1)]);
    assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn corpus_files_skip_malformed_documents() {
    let dir = tempfile::tempdir().unwrap();
    let good = DocumentInput::from_sentences("good", &["the great star"]);
    let mut bad = DocumentInput::from_sentences("bad", &["broken token"]);
    bad.partitions[0].tokens[1].end = 99;
    std::fs::write(dir.path().join("a.json"), serde_json::to_string(&good).unwrap()).unwrap();
    std::fs::write(dir.path().join("b.json"), serde_json::to_string(&bad).unwrap()).unwrap();

    let files = spanseek::utils::find_corpus_files(dir.path());
    let mut session = Session::default();
    let report = session.load_files(&files);
    assert_eq!(report.loaded, vec![0]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].1.contains("bad"));
}

#[test]
fn embedding_similarity_finds_related_words() {
    let resolver = MapResolver::new(
        "toy",
        2,
        vec![
            ("star".to_string(), vec![1.0, 0.0]),
            ("sun".to_string(), vec![0.9, 0.1]),
            ("fish".to_string(), vec![0.0, 1.0]),
        ],
    )
    .unwrap();
    let mut store = EmbeddingStore::exact_match();
    store.add_static("toy", Box::new(resolver), OovPolicy::Zero);
    let mut session = Session::new(store, Default::default());
    for sentences in [["a bright sun"], ["a bright fish"]] {
        session
            .add_document(&DocumentInput::from_sentences("d", &sentences))
            .unwrap();
    }
    let options = QueryOptions::default()
        .with_metric(TokenMetric::embedding("toy", VectorSpaceMetric::Cosine))
        .with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0));
    let query = session.query(&QueryInput::from_words("star"), options).unwrap();
    let matches = session
        .find(&query, &SearchOptions::default().with_min_score(0.5), &SearchControl::new())
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].document, 0);
    assert!(matches[0].score > 0.9);
}

#[test]
fn unknown_embedding_fails_before_searching() {
    let session = session(&[&["a"]]);
    let options = QueryOptions::default().with_metric(TokenMetric::embedding("missing", VectorSpaceMetric::Cosine));
    let query = session.query(&QueryInput::from_words("a"), options).unwrap();
    let result = session.find(&query, &SearchOptions::default(), &SearchControl::new());
    assert!(matches!(result, Err(SearchError::UnknownEmbedding(_))));
}
