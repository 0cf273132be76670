//! Property-based tests using proptest.
//!
//! Invariants covered:
//! - the recalculation pool never holds an id twice
//! - pool order matches first-insertion FIFO under any add/take/remove mix
//! - threshold functions are monotone and respect their floors and caps
//! - the throttle check agrees with a plain duration comparison

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use stats_recalc::Catalog;
use stats_recalc::TableId;
use stats_recalc::clock::is_too_recent;
use stats_recalc::pool::RecalcPool;
use stats_recalc::scheduler::Scheduler;
use stats_recalc::tracker::{TRANSIENT_MIN_THRESHOLD, persistent_threshold, transient_threshold};

#[derive(Debug, Clone)]
enum PoolOp {
    Add(u64),
    Take,
    Remove(u64),
}

fn arb_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        4 => (0u64..24).prop_map(PoolOp::Add),
        2 => Just(PoolOp::Take),
        1 => (0u64..24).prop_map(PoolOp::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    // ── Pool ───────────────────────────────────────────────────────

    #[test]
    fn prop_pool_matches_fifo_set_model(ops in prop::collection::vec(arb_op(), 0..200)) {
        let pool = RecalcPool::new(Arc::new(Scheduler::new()));
        pool.init();
        let catalog = Catalog::new();
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in ops {
            match op {
                PoolOp::Add(raw) => {
                    let appended = pool.add(TableId::new(raw), true).unwrap();
                    let expected = !model.contains(&raw);
                    if expected {
                        model.push_back(raw);
                    }
                    prop_assert_eq!(appended, expected);
                }
                PoolOp::Take => {
                    let taken = pool.take_first().map(TableId::get);
                    prop_assert_eq!(taken, model.pop_front());
                }
                PoolOp::Remove(raw) => {
                    let removed = pool.remove(TableId::new(raw), &catalog.lock());
                    let pos = model.iter().position(|v| *v == raw);
                    if let Some(pos) = pos {
                        model.remove(pos);
                    }
                    prop_assert_eq!(removed, pos.is_some());
                }
            }
            let snapshot: Vec<u64> = pool.snapshot().into_iter().map(TableId::get).collect();
            prop_assert_eq!(&snapshot, &model.iter().copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn prop_pool_never_duplicates(ids in prop::collection::vec(0u64..8, 0..100)) {
        let pool = RecalcPool::new(Arc::new(Scheduler::new()));
        pool.init();
        for raw in &ids {
            pool.add(TableId::new(*raw), false).unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        for id in pool.snapshot() {
            prop_assert!(seen.insert(id));
        }
        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        prop_assert_eq!(seen.len(), distinct.len());
    }

    // ── Thresholds ─────────────────────────────────────────────────

    #[test]
    fn prop_transient_threshold_floor_and_cap(n in 0u64..u64::MAX / 2, cap in 1u64..10_000) {
        let plain = transient_threshold(n, None);
        prop_assert!(plain >= TRANSIENT_MIN_THRESHOLD);
        prop_assert!(plain >= n / 16);
        prop_assert_eq!(transient_threshold(n, Some(cap)), cap.min(plain));
    }

    #[test]
    fn prop_thresholds_monotone(a in 0u64..1_000_000_000, b in 0u64..1_000_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(transient_threshold(lo, None) <= transient_threshold(hi, None));
        prop_assert!(persistent_threshold(lo) <= persistent_threshold(hi));
    }

    // ── Throttle ───────────────────────────────────────────────────

    #[test]
    fn prop_throttle_matches_elapsed(
        last_ms in 0i64..10_000_000,
        delta_ms in -5_000i64..50_000,
        interval_ms in 1u64..40_000,
    ) {
        let last = Utc.timestamp_millis_opt(1_700_000_000_000 + last_ms).unwrap();
        let now = last + chrono::Duration::milliseconds(delta_ms);
        let expected = delta_ms.max(0) < interval_ms as i64;
        prop_assert_eq!(
            is_too_recent(Some(last), now, Duration::from_millis(interval_ms)),
            expected
        );
        prop_assert!(!is_too_recent(None, now, Duration::from_millis(interval_ms)));
    }
}
