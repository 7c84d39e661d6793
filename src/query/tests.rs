//! End-to-end query tests

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::dataset::{ColumnData, IndexSpec};
use crate::expr::QExpr;

fn column_a() -> Vec<i32> {
    vec![1, 2, 2, 3, 4, 5, 5, 5, 6, 7]
}

fn small_dataset(index: Option<IndexSpec>) -> Arc<Dataset> {
    let ds = Dataset::new("small");
    ds.add_column("a", ColumnData::Int(column_a())).unwrap();
    ds.add_column("b", ColumnData::Int(vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5])).unwrap();
    if let Some(spec) = index {
        ds.build_index("a", spec).unwrap();
    }
    Arc::new(ds)
}

/// Deterministic pseudo-random dataset with indexed and plain columns
fn mixed_dataset(n: usize) -> Arc<Dataset> {
    let mut seed = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };
    let x: Vec<f64> = (0..n).map(|_| (next() % 1000) as f64 / 10.0).collect();
    let k: Vec<u16> = (0..n).map(|_| (next() % 12) as u16).collect();
    let y: Vec<i64> = (0..n).map(|_| (next() % 200) as i64 - 100).collect();
    let words = ["red apple", "green pear", "red cherry", "blue plum", "green apple"];
    let s: Vec<String> = (0..n).map(|_| words[(next() % 5) as usize].to_string()).collect();
    let ds = Dataset::new("mixed");
    ds.add_column("x", ColumnData::Double(x)).unwrap();
    ds.add_column("k", ColumnData::UShort(k)).unwrap();
    ds.add_column("y", ColumnData::Long(y)).unwrap();
    ds.add_column("s", ColumnData::Text(s)).unwrap();
    ds.build_index("x", IndexSpec::Binned { bins: 16 }).unwrap();
    ds.build_index("k", IndexSpec::Equality).unwrap();
    ds.build_index("s", IndexSpec::Keywords).unwrap();
    Arc::new(ds)
}

fn query_on(dataset: &Arc<Dataset>, select: &str, predicate: &str) -> Query {
    let q = Query::new("tester", QueryConfig::default());
    q.set_dataset(Arc::clone(dataset));
    q.set_select_clause(select).unwrap();
    q.set_where_clause(predicate).unwrap();
    q
}

fn positions(bits: &Bitvector) -> Vec<u64> {
    bits.positions().collect()
}

fn evaluated_hits(q: &Query) -> Bitvector {
    q.evaluate(false).unwrap();
    q.hits().unwrap()
}

const PREDICATES: &[&str] = &[
    "x < 25",
    "x between 10 and 60 AND k IN (1, 3, 5)",
    "NOT (x >= 40) OR y > 50",
    "k = 7 XOR x > 80",
    "x > 5 MINUS s CONTAINS 'apple'",
    "s CONTAINS 'red' AND y < 0",
    "x * 2 > y + 100 OR k < 2",
    "NOT (k > 3 AND x < 70)",
];

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_equality_predicate() {
    for index in [None, Some(IndexSpec::Equality), Some(IndexSpec::Binned { bins: 3 })] {
        let ds = small_dataset(index);
        let q = query_on(&ds, "a", "a = 5");
        assert_eq!(q.num_hits().unwrap(), 3);
        assert_eq!(positions(&q.hits().unwrap()), vec![5, 6, 7]);
        assert_eq!(q.state(), QueryState::FullEvaluate);
    }
}

#[test]
fn test_large_unsigned_values_compare_exactly() {
    let base = 1u64 << 53;
    for index in [None, Some(IndexSpec::Equality), Some(IndexSpec::Binned { bins: 2 })] {
        let ds = Dataset::new("wide");
        ds.add_column("u", ColumnData::ULong(vec![base, base + 1, 7])).unwrap();
        if let Some(spec) = index {
            ds.build_index("u", spec).unwrap();
        }
        let ds = Arc::new(ds);

        let q = query_on(&ds, "u", "u = 9007199254740993");
        assert_eq!(q.num_hits().unwrap(), 1, "{:?}", index);
        assert_eq!(positions(&q.hits().unwrap()), vec![1]);

        let q = query_on(&ds, "u", "u > 9007199254740992");
        assert_eq!(q.num_hits().unwrap(), 1, "{:?}", index);
        assert_eq!(positions(&q.hits().unwrap()), vec![1]);

        let q = query_on(&ds, "u", "u IN (9007199254740992, 7)");
        assert_eq!(positions(&evaluated_hits(&q)), vec![0, 2]);
    }
}

#[test]
fn test_between_bounds_bracket_hits() {
    let ds = small_dataset(Some(IndexSpec::Binned { bins: 3 }));
    let q = query_on(&ds, "a", "a between 2 and 5");
    q.estimate().unwrap();
    assert_eq!(q.state(), QueryState::QuickEstimate);
    let bounds = q.bounds();
    let exact = Bitvector::from_positions(1..8, 10);
    assert!(bounds.low().unwrap().is_subset_of(&exact));
    assert!(exact.is_subset_of(bounds.high().unwrap()));

    assert_eq!(q.evaluate(false).unwrap(), 7);
    assert_eq!(q.hits().unwrap(), exact);
}

#[test]
fn test_new_where_clause_resets_to_specified() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    let q = query_on(&ds, "a, b", "a = 5");
    q.evaluate(true).unwrap();
    assert_eq!(q.state(), QueryState::FullEvaluate);

    q.set_where_clause("a < 3").unwrap();
    assert_eq!(q.state(), QueryState::Specified);
    assert!(!q.bounds().is_known());
    assert!(q.hits().is_none());
    assert_eq!(q.num_hits().unwrap(), 3);
    assert_eq!(q.state(), QueryState::FullEvaluate);
}

#[test]
fn test_self_join_through_query() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    let q = query_on(&ds, "a", "JOIN(a, a)");
    for alg in JoinAlgorithm::ALL {
        assert_eq!(q.join_count(alg).unwrap(), 18, "{}", alg);
    }
    let data = ds.read();
    let config = QueryConfig::default();
    let hits = q.hits().unwrap();
    let terms = q.predicate().unwrap().join_terms();
    let distinct = JoinEvaluator::new(&data, &config).exclude_self(true);
    assert_eq!(distinct.count(&terms, &hits, JoinAlgorithm::SortMerge).unwrap(), 8);
}

#[test]
fn test_band_join_algorithms_agree() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    ds.build_index("b", IndexSpec::Equality).unwrap();
    let q = query_on(&ds, "a", "JOIN(a, b, 1)");
    let by_loop = q.join_count(JoinAlgorithm::Loop).unwrap();
    assert_eq!(q.join_count(JoinAlgorithm::SortMerge).unwrap(), by_loop);
    assert_eq!(q.cross_check_joins().unwrap(), by_loop);
    assert_eq!(q.join_pairs(JoinAlgorithm::Index).unwrap().cnt(), by_loop);
}

#[test]
fn test_join_respects_other_conjuncts() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    ds.build_index("b", IndexSpec::Equality).unwrap();
    let q = query_on(&ds, "a", "a >= 5 AND JOIN(a, b)");
    assert_eq!(positions(&evaluated_hits(&q)), vec![5, 6, 7, 8, 9]);
    // the three rows with a = 5 pair with rows 8 and 9 where b = 5
    assert_eq!(q.cross_check_joins().unwrap(), 6);
}

#[test]
fn test_join_without_terms_is_rejected() {
    let ds = small_dataset(None);
    let q = query_on(&ds, "a", "a > 1");
    assert!(matches!(q.join_count(JoinAlgorithm::Loop), Err(QueryError::InvalidState(_))));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_bounds_are_sound_and_consistent() {
    let ds = mixed_dataset(600);
    for text in PREDICATES {
        let q = query_on(&ds, "x", text);
        q.estimate().unwrap();
        let bounds = q.bounds();
        let (low_cnt, high_cnt) = q.hit_count_bounds().unwrap();
        let n = q.evaluate(false).unwrap();
        let exact = q.hits().unwrap();
        assert!(bounds.low().unwrap().is_subset_of(&exact), "{}", text);
        assert!(exact.is_subset_of(bounds.high().unwrap()), "{}", text);
        assert!(low_cnt <= n && n <= high_cnt, "{}", text);
    }
}

#[test]
fn test_evaluate_is_idempotent() {
    let ds = mixed_dataset(400);
    for text in PREDICATES {
        let q = query_on(&ds, "x", text);
        q.evaluate(false).unwrap();
        let first = q.hits().unwrap();
        q.evaluate(false).unwrap();
        assert_eq!(q.hits().unwrap(), first, "{}", text);

        // a fresh query without reordering reaches the same answer
        let plain = Query::new("tester", QueryConfig { reorder_predicates: false, ..QueryConfig::default() });
        plain.set_dataset(Arc::clone(&ds));
        plain.set_where_clause(text).unwrap();
        plain.evaluate(false).unwrap();
        assert_eq!(plain.hits().unwrap(), first, "{}", text);
    }
}

fn exact_hits(ds: &Arc<Dataset>, expr: QExpr) -> Bitvector {
    let q = Query::new("tester", QueryConfig::default());
    q.set_dataset(Arc::clone(ds));
    q.set_predicate(expr).unwrap();
    q.evaluate(false).unwrap();
    q.hits().unwrap()
}

#[test]
fn test_not_involution_and_de_morgan() {
    let ds = mixed_dataset(300);
    for text in PREDICATES {
        let p = parse_where(text).unwrap();
        let direct = exact_hits(&ds, p.clone());
        assert_eq!(exact_hits(&ds, QExpr::not(QExpr::not(p))), direct, "{}", text);
    }
    let pairs = [("x < 30", "k = 4"), ("s CONTAINS 'green'", "y >= 10"), ("x * 3 < y", "k IN (2, 9)")];
    for (a, b) in pairs {
        let a = parse_where(a).unwrap();
        let b = parse_where(b).unwrap();
        let left = exact_hits(&ds, QExpr::not(QExpr::and(a.clone(), b.clone())));
        let right = exact_hits(&ds, QExpr::or(QExpr::not(a), QExpr::not(b)));
        assert_eq!(left, right);
    }
}

#[test]
fn test_dataset_change_forces_reevaluation() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    let q = query_on(&ds, "a", "a = 5");
    assert_eq!(q.num_hits().unwrap(), 3);
    ds.append_rows(vec![
        ("a".to_string(), ColumnData::Int(vec![5, 5])),
        ("b".to_string(), ColumnData::Int(vec![0, 0])),
    ])
    .unwrap();
    assert_eq!(q.num_hits().unwrap(), 5);
    assert_eq!(positions(&q.hits().unwrap()), vec![5, 6, 7, 10, 11]);

    ds.delete_rows(&Bitvector::from_positions([0, 1], 12)).unwrap();
    q.estimate().unwrap();
    assert_eq!(q.hit_count_bounds(), Some((5, 5)));
    assert_eq!(q.state(), QueryState::QuickEstimate);
}

// ============================================================================
// Components and results
// ============================================================================

#[test]
fn test_lifecycle_of_components() {
    let ds = small_dataset(None);
    let q = Query::new("tester", QueryConfig::default());
    assert!(matches!(q.set_where_clause("a = 1"), Err(QueryError::NoDataset)));
    q.set_dataset(Arc::clone(&ds));
    assert_eq!(q.state(), QueryState::Uninitialized);
    assert!(matches!(q.estimate(), Err(QueryError::NoPredicate)));
    assert!(q.last_error().is_some());

    q.set_select_clause("a").unwrap();
    assert_eq!(q.state(), QueryState::SetComponents);
    q.set_rids(vec![0, 5, 6]).unwrap();
    assert_eq!(q.state(), QueryState::Specified);

    // a bad clause leaves everything as it was
    assert!(matches!(q.set_where_clause("nope > 1"), Err(QueryError::ColumnNotFound(_))));
    assert!(q.set_where_clause("a >").is_err());
    assert!(matches!(q.set_select_clause("a,, b"), Err(QueryError::InvalidSelect(_))));
    assert_eq!(q.state(), QueryState::Specified);
    assert_eq!(q.select_clause().as_deref(), Some("a"));
    assert!(q.where_clause().is_none());

    // RIDs alone select the rows
    assert_eq!(q.evaluate(false).unwrap(), 3);
    q.set_where_clause("a = 5").unwrap();
    assert_eq!(positions(&evaluated_hits(&q)), vec![5, 6]);
}

#[test]
fn test_where_clause_round_trips_through_display() {
    let ds = mixed_dataset(50);
    let q = query_on(&ds, "x, k", "x between 1 and 2 OR NOT s LIKE 'red%'");
    let text = q.where_clause().unwrap();
    let again = parse_where(&text).unwrap().simplify();
    assert_eq!(Some(again), q.predicate());
}

#[test]
fn test_bundles_and_truncation() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    let q = query_on(&ds, "b", "a >= 2");
    assert_eq!(q.evaluate(true).unwrap(), 9);
    let bundles = q.bundles().unwrap();
    let values: Vec<Value> = bundles.iter().map(|b| b.values[0].clone()).collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]);
    assert_eq!(bundles[0].rows, vec![1]);
    assert_eq!(bundles.iter().map(Bundle::count).sum::<u64>(), 9);

    assert_eq!(q.selected_values("b").unwrap().len(), 9);
    assert!(matches!(q.selected_values("c"), Err(QueryError::InvalidSelect(_))));

    assert_eq!(q.limit_bundles(2).unwrap(), 2);
    assert_eq!(q.state(), QueryState::BundlesTruncated);
    assert_eq!(positions(&q.hits().unwrap()), vec![1, 2, 3]);
    assert_eq!(q.num_hits().unwrap(), 3);
}

#[test]
fn test_limit_hits() {
    let ds = small_dataset(None);
    let q = query_on(&ds, "a", "a > 1");
    assert_eq!(q.limit_hits(4).unwrap(), 4);
    assert_eq!(q.state(), QueryState::HitsTruncated);
    assert_eq!(positions(&q.hits().unwrap()), vec![1, 2, 3, 4]);
    q.clear();
    assert_eq!(q.state(), QueryState::Specified);
    assert_eq!(q.num_hits().unwrap(), 9);
}

#[test]
fn test_hit_rids_follow_dataset_identifiers() {
    let ds = small_dataset(None);
    ds.set_rids((100..110).collect()).unwrap();
    let q = query_on(&ds, "a", "a = 5");
    assert_eq!(q.hit_rids().unwrap(), vec![105, 106, 107]);

    let by_rid = Query::new("tester", QueryConfig::default());
    by_rid.set_dataset(Arc::clone(&ds));
    by_rid.set_rids(vec![101, 109, 4242]).unwrap();
    assert_eq!(by_rid.evaluate(false).unwrap(), 2);
    assert_eq!(by_rid.hit_rids().unwrap(), vec![101, 109]);
}

#[test]
fn test_select_nulls_are_not_hits() {
    let ds = Dataset::new("nulls");
    ds.add_column("a", ColumnData::Int(column_a())).unwrap();
    ds.add_column_with_nulls(
        "c",
        ColumnData::Double(vec![0.0; 10]),
        Bitvector::from_positions([0, 1, 2, 3, 4, 5], 10),
    )
    .unwrap();
    let ds = Arc::new(ds);
    let q = query_on(&ds, "c", "a = 5");
    assert_eq!(positions(&evaluated_hits(&q)), vec![5]);
}

#[test]
fn test_memory_budget_failure_keeps_state() {
    let ds = small_dataset(None);
    let q = Query::new("tester", QueryConfig::default().with_memory_budget(16));
    q.set_dataset(Arc::clone(&ds));
    q.set_select_clause("a, b").unwrap();
    q.set_where_clause("a > 0").unwrap();
    let err = q.evaluate(true).unwrap_err();
    assert!(matches!(err, QueryError::OutOfMemory { .. }));
    assert_eq!(err.code(), -11);
    assert_eq!(q.state(), QueryState::Specified);
    assert!(q.last_error().unwrap().contains("Out of memory"));
    assert_eq!(q.evaluate(false).unwrap(), 10);
}

#[test]
fn test_out_of_memory_retries_after_releasing_caches() {
    let ds = small_dataset(None);
    {
        let data = ds.read();
        data.column_f64("a").unwrap();
        data.column_f64("b").unwrap();
        assert_eq!(data.cache_bytes(), 160);
    }
    // bundles of 10 hits over two terms take 480 bytes, 640 with the cache
    let q = Query::new("tester", QueryConfig::default().with_memory_budget(600));
    q.set_dataset(Arc::clone(&ds));
    q.set_select_clause("a, b").unwrap();
    q.set_where_clause("a > 0").unwrap();
    assert_eq!(q.evaluate(true).unwrap(), 10);
    assert_eq!(q.state(), QueryState::FullEvaluate);
    assert!(q.last_error().is_none());
    assert_eq!(q.bundles().unwrap().iter().map(|b| b.count()).sum::<u64>(), 10);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl QueryObserver for Recorder {
    fn state_changed(&self, _token: &str, from: QueryState, to: QueryState) {
        self.events.lock().push(format!("{}->{}", from, to));
    }

    fn estimated(&self, _token: &str, low: u64, high: u64) {
        self.events.lock().push(format!("estimate {} {}", low, high));
    }

    fn evaluated(&self, _token: &str, hits: u64, _elapsed: Duration) {
        self.events.lock().push(format!("evaluate {}", hits));
    }

    fn failed(&self, _token: &str, error: &QueryError) {
        self.events.lock().push(format!("failed {}", error.code()));
    }
}

#[test]
fn test_observer_sees_lifecycle() {
    let ds = small_dataset(Some(IndexSpec::Equality));
    let recorder = Arc::new(Recorder::default());
    let q = Query::new("tester", QueryConfig::default()).with_observer(recorder.clone());
    assert!(q.estimate().is_err());
    q.set_dataset(Arc::clone(&ds));
    q.set_select_clause("a").unwrap();
    q.set_where_clause("a = 2").unwrap();
    q.estimate().unwrap();
    q.evaluate(false).unwrap();
    let events = recorder.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "failed -1",
            "UNINITIALIZED->SET_COMPONENTS",
            "SET_COMPONENTS->SPECIFIED",
            "SPECIFIED->QUICK_ESTIMATE",
            "estimate 2 2",
            "QUICK_ESTIMATE->FULL_EVALUATE",
            "evaluate 2",
        ]
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_recover_evaluated_query() {
    let root = tempfile::tempdir().unwrap();
    let catalog = Catalog::new();
    let ds = catalog.register(Dataset::new("small"));
    ds.add_column("a", ColumnData::Int(column_a())).unwrap();
    ds.add_column("b", ColumnData::Int(vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5])).unwrap();

    let config = QueryConfig::default().with_persist_dir(root.path());
    let q = Query::new("alice", config.clone());
    q.set_dataset(Arc::clone(&ds));
    q.set_select_clause("b").unwrap();
    q.set_where_clause("a between 2 and 5 AND JOIN(a, b, 1)").unwrap();
    q.evaluate(true).unwrap();
    q.hit_rids().unwrap();
    let dir = q.persist_path().unwrap();

    let back = Query::recover(&dir, &catalog, QueryConfig::default()).unwrap();
    assert_eq!(back.token(), q.token());
    assert_eq!(back.user(), "alice");
    assert_eq!(back.state(), QueryState::FullEvaluate);
    assert_eq!(back.hits(), q.hits());
    assert_eq!(back.predicate(), q.predicate());
    assert_eq!(back.bundles().unwrap(), q.bundles().unwrap());
    assert_eq!(back.join_count(JoinAlgorithm::Loop).unwrap(), q.join_count(JoinAlgorithm::Loop).unwrap());
    assert_eq!(back.persist_path(), Some(dir.clone()));

    q.remove_files().unwrap();
    assert!(!dir.exists());
}

#[test]
fn test_recover_drops_stale_hits() {
    let root = tempfile::tempdir().unwrap();
    let catalog = Catalog::new();
    let ds = catalog.register(Dataset::new("small"));
    ds.add_column("a", ColumnData::Int(column_a())).unwrap();

    let q = Query::new("bob", QueryConfig::default().with_persist_dir(root.path()));
    q.set_dataset(Arc::clone(&ds));
    q.set_select_clause("a").unwrap();
    q.set_where_clause("a = 5").unwrap();
    assert_eq!(q.num_hits().unwrap(), 3);
    let dir = q.persist_path().unwrap();
    assert!(dir.join("hits").exists());

    ds.append_rows(vec![("a".to_string(), ColumnData::Int(vec![5]))]).unwrap();
    let back = Query::recover(&dir, &catalog, QueryConfig::default()).unwrap();
    assert_eq!(back.state(), QueryState::Specified);
    assert!(back.hits().is_none());
    assert!(!dir.join("hits").exists());
    assert_eq!(back.num_hits().unwrap(), 4);
}

#[test]
fn test_recover_rejects_corrupt_file() {
    let root = tempfile::tempdir().unwrap();
    let catalog = Catalog::new();
    let ds = catalog.register(Dataset::new("small"));
    ds.add_column("a", ColumnData::Int(column_a())).unwrap();

    let q = Query::new("carol", QueryConfig::default().with_persist_dir(root.path()));
    q.set_dataset(Arc::clone(&ds));
    q.set_where_clause("a < 4").unwrap();
    let dir = q.persist_path().unwrap();
    let path = dir.join("query");
    let mut bytes = std::fs::read(&path).unwrap();
    // last byte of the final record's checksum
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(Query::recover(&dir, &catalog, QueryConfig::default()), Err(QueryError::ChecksumMismatch)));

    assert!(matches!(
        Query::recover(&root.path().join("missing"), &catalog, QueryConfig::default()),
        Err(QueryError::Io(_))
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_readers_and_appends() {
    const BATCHES: u64 = 20;
    let ds = small_dataset(Some(IndexSpec::Equality));
    let q = Arc::new(query_on(&ds, "a, b", "a = 5"));

    let readers: Vec<_> = (0..4)
        .map(|t| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                let mut last = 0;
                for i in 0..30 {
                    let hits = match (t + i) % 3 {
                        0 => q.num_hits().unwrap(),
                        1 => {
                            q.estimate().unwrap();
                            if let Some((low, high)) = q.hit_count_bounds() {
                                assert!(low <= high);
                            }
                            q.num_hits().unwrap()
                        }
                        _ => q.evaluate(true).unwrap(),
                    };
                    assert!((3..=3 + BATCHES).contains(&hits), "{} hits", hits);
                    assert!(hits >= last, "hit count went from {} to {}", last, hits);
                    last = hits;
                }
            })
        })
        .collect();

    let writer = {
        let ds = Arc::clone(&ds);
        std::thread::spawn(move || {
            for _ in 0..BATCHES {
                ds.append_rows(vec![
                    ("a".to_string(), ColumnData::Int(vec![5, 1])),
                    ("b".to_string(), ColumnData::Int(vec![0, 0])),
                ])
                .unwrap();
            }
        })
    };

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(ds.nrows(), 10 + 2 * BATCHES);
    assert_eq!(q.num_hits().unwrap(), 3 + BATCHES);
    let expected: Vec<u64> = [5, 6, 7].into_iter().chain((0..BATCHES).map(|k| 10 + 2 * k)).collect();
    assert_eq!(positions(&q.hits().unwrap()), expected);
    q.evaluate(true).unwrap();
    assert_eq!(q.bundles().unwrap().iter().map(|b| b.count()).sum::<u64>(), 3 + BATCHES);
}
