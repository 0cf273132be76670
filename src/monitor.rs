//! Monitoring and observability for the background statistics scheduler.
//!
//! # Counters
//!
//! [`SchedulerMetrics`] keeps relaxed atomic counters updated by the write
//! path and the worker. [`SchedulerMetrics::snapshot`] copies them into a
//! serializable [`MonitorSnapshot`] for status endpoints and tests.
//!
//! # Events
//!
//! Operationally interesting transitions are logged through `tracing` with a
//! stable `event` field (see [`StatsEvent::as_str`]) so log pipelines can
//! filter on it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::table::TableId;

/// Event names emitted in the `event` field of scheduler log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    /// A table crossed its persistent threshold and was queued.
    Enqueued,
    /// The replication gate vetoed an enqueue.
    Suppressed,
    /// Transient statistics were recomputed inline.
    TransientRecomputed,
    /// The worker recomputed persistent statistics.
    Recalculated,
    /// The worker put a table back because it was recalculated too recently.
    Throttled,
    /// A queued table was dropped or inaccessible when its turn came.
    Vanished,
    /// The statistics engine reported a failure.
    EngineFailed,
    /// A drop waited for an in-progress recalculation.
    DropWaited,
    /// A throttled table could not be put back into the pool.
    RequeueFailed,
}

impl StatsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsEvent::Enqueued => "enqueued",
            StatsEvent::Suppressed => "suppressed",
            StatsEvent::TransientRecomputed => "transient_recomputed",
            StatsEvent::Recalculated => "recalculated",
            StatsEvent::Throttled => "throttled",
            StatsEvent::Vanished => "vanished",
            StatsEvent::EngineFailed => "engine_failed",
            StatsEvent::DropWaited => "drop_waited",
            StatsEvent::RequeueFailed => "requeue_failed",
        }
    }
}

/// Emit a structured log record for `event` on `table_id`.
pub fn emit_event(event: StatsEvent, table_id: TableId, detail: &str) {
    match event {
        StatsEvent::EngineFailed => warn!(
            event = event.as_str(),
            table_id = table_id.get(),
            detail,
            "stats_recalc: statistics engine failed"
        ),
        StatsEvent::RequeueFailed => warn!(
            event = event.as_str(),
            table_id = table_id.get(),
            detail,
            "stats_recalc: throttled table dropped from the pool"
        ),
        StatsEvent::Recalculated | StatsEvent::DropWaited => info!(
            event = event.as_str(),
            table_id = table_id.get(),
            detail,
            "stats_recalc: {}",
            event.as_str()
        ),
        _ => debug!(
            event = event.as_str(),
            table_id = table_id.get(),
            detail,
            "stats_recalc: {}",
            event.as_str()
        ),
    }
}

/// Live counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    enqueued: AtomicU64,
    duplicates: AtomicU64,
    suppressed: AtomicU64,
    transient_recomputes: AtomicU64,
    recalculated: AtomicU64,
    throttled: AtomicU64,
    vanished: AtomicU64,
    engine_failures: AtomicU64,
    requeue_failures: AtomicU64,
    passes: AtomicU64,
    drops_waited: AtomicU64,
}

macro_rules! counter_fns {
    ($($field:ident => $record:ident),* $(,)?) => {
        impl SchedulerMetrics {
            $(
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter_fns! {
    enqueued => record_enqueued,
    duplicates => record_duplicate,
    suppressed => record_suppressed,
    transient_recomputes => record_transient_recompute,
    recalculated => record_recalculated,
    throttled => record_throttled,
    vanished => record_vanished,
    engine_failures => record_engine_failure,
    requeue_failures => record_requeue_failure,
    passes => record_pass,
    drops_waited => record_drop_waited,
}

impl SchedulerMetrics {
    pub fn snapshot(&self, pending: usize) -> MonitorSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MonitorSnapshot {
            pending,
            enqueued: load(&self.enqueued),
            duplicates: load(&self.duplicates),
            suppressed: load(&self.suppressed),
            transient_recomputes: load(&self.transient_recomputes),
            recalculated: load(&self.recalculated),
            throttled: load(&self.throttled),
            vanished: load(&self.vanished),
            engine_failures: load(&self.engine_failures),
            requeue_failures: load(&self.requeue_failures),
            passes: load(&self.passes),
            drops_waited: load(&self.drops_waited),
        }
    }
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Entries in the recalculation pool when the snapshot was taken.
    pub pending: usize,
    pub enqueued: u64,
    pub duplicates: u64,
    pub suppressed: u64,
    pub transient_recomputes: u64,
    pub recalculated: u64,
    pub throttled: u64,
    pub vanished: u64,
    pub engine_failures: u64,
    /// Throttled tables lost because they could not be put back.
    pub requeue_failures: u64,
    pub passes: u64,
    pub drops_waited: u64,
}

impl MonitorSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_unique() {
        let events = [
            StatsEvent::Enqueued,
            StatsEvent::Suppressed,
            StatsEvent::TransientRecomputed,
            StatsEvent::Recalculated,
            StatsEvent::Throttled,
            StatsEvent::Vanished,
            StatsEvent::EngineFailed,
            StatsEvent::DropWaited,
            StatsEvent::RequeueFailed,
        ];
        let names: std::collections::HashSet<_> = events.iter().map(|e| e.as_str()).collect();
        assert_eq!(names.len(), events.len());
    }

    #[test]
    fn test_snapshot_counts() {
        let metrics = SchedulerMetrics::default();
        metrics.record_enqueued();
        metrics.record_enqueued();
        metrics.record_throttled();
        metrics.record_requeue_failure();
        metrics.record_pass();

        let snap = metrics.snapshot(3);
        assert_eq!(snap.pending, 3);
        assert_eq!(snap.enqueued, 2);
        assert_eq!(snap.throttled, 1);
        assert_eq!(snap.requeue_failures, 1);
        assert_eq!(snap.passes, 1);
        assert_eq!(snap.recalculated, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = SchedulerMetrics::default();
        metrics.record_recalculated();
        let json = metrics.snapshot(0).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["recalculated"], 1);
        assert_eq!(value["pending"], 0);
    }
}
