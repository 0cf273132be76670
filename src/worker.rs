//! The background worker pass.
//!
//! Each timer firing runs [`run_pass`], which takes ids from the pool one at
//! a time:
//!
//! 1. Take the oldest id. Empty pool ends the pass.
//! 2. Under the catalog lock, resolve the id. A dropped or inaccessible table
//!    is discarded silently.
//! 3. Mark the table `IN_PROGRESS` and release the catalog lock. From here a
//!    concurrent drop waits for us instead of destroying the table.
//! 4. If the table was recalculated less than the throttle interval ago, put
//!    it back at the tail and re-arm the timer for one full interval; the
//!    pass ends there, since taking the next id could hand us the same table
//!    again.
//! 5. Otherwise recompute persistent statistics.
//! 6. Under the catalog lock, clear the flag, wake waiting droppers and
//!    release the handle.
//!
//! After the pool is drained the companion pass (if any) runs once.

use std::panic::AssertUnwindSafe;

use tracing::trace;

use crate::clock::is_too_recent;
use crate::engine::RecalcMode;
use crate::error::StatsError;
use crate::lifecycle::Shared;
use crate::monitor::{StatsEvent, emit_event};
use crate::table::{BgActivity, TableId};

/// Result of processing one pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStep {
    /// The pool was empty.
    Drained,
    /// The table no longer exists or is not accessible.
    Vanished(TableId),
    /// The table was recalculated too recently and went back into the pool.
    Throttled(TableId),
    /// Persistent statistics were recomputed.
    Recalculated(TableId),
    /// The statistics engine failed; the entry is consumed.
    Failed(TableId),
}

/// Tally of one worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub recalculated: usize,
    pub throttled: usize,
    pub vanished: usize,
    pub failed: usize,
}

/// Drain the pool, then run the companion pass.
pub(crate) fn run_pass(shared: &Shared) -> PassSummary {
    let mut summary = PassSummary::default();
    loop {
        match process_entry(shared) {
            PassStep::Drained => break,
            PassStep::Vanished(_) => summary.vanished += 1,
            PassStep::Recalculated(_) => summary.recalculated += 1,
            PassStep::Failed(_) => summary.failed += 1,
            PassStep::Throttled(_) => {
                summary.throttled += 1;
                break;
            }
        }
    }
    if let Some(companion) = &shared.companion {
        companion.run();
    }
    shared.metrics.record_pass();
    trace!(?summary, "stats_recalc: worker pass finished");
    summary
}

/// Process the oldest pool entry.
pub(crate) fn process_entry(shared: &Shared) -> PassStep {
    let Some(id) = shared.pool.take_first() else {
        return PassStep::Drained;
    };

    let handle = {
        let guard = shared.catalog.lock();
        let Some(handle) = guard.resolve(id) else {
            shared.metrics.record_vanished();
            emit_event(StatsEvent::Vanished, id, "dropped after enqueue");
            return PassStep::Vanished(id);
        };
        if !handle.is_accessible() {
            guard.release(handle);
            shared.metrics.record_vanished();
            emit_event(StatsEvent::Vanished, id, "not accessible");
            return PassStep::Vanished(id);
        }
        handle.set_bg_activity(BgActivity::InProgress, &guard);
        handle
    };

    let interval = shared.config.min_recalc_interval();
    let step = if is_too_recent(handle.last_recalc(), shared.clock.now(), interval) {
        // No immediate schedule here: the worker would spin on this table.
        record_requeue(shared, id, shared.pool.add(id, false));
        shared.scheduler.schedule(interval);
        shared.metrics.record_throttled();
        emit_event(StatsEvent::Throttled, id, "recalculated too recently");
        PassStep::Throttled(id)
    } else {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            shared.engine.recompute(&handle, RecalcMode::Persistent)
        }))
        .unwrap_or_else(|_| Err(StatsError::Internal("statistics engine panicked".into())));
        match result {
            Ok(()) => {
                shared.metrics.record_recalculated();
                emit_event(StatsEvent::Recalculated, id, RecalcMode::Persistent.as_str());
                PassStep::Recalculated(id)
            }
            Err(e) => {
                shared.metrics.record_engine_failure();
                emit_event(StatsEvent::EngineFailed, id, &e.to_string());
                PassStep::Failed(id)
            }
        }
    };

    let guard = shared.catalog.lock();
    handle.set_bg_activity(BgActivity::None, &guard);
    guard.notify_bg_idle();
    guard.release(handle);
    step
}

/// Account for putting a throttled table back into the pool.
///
/// A failed re-add loses the entry until the table crosses its threshold
/// again, so it is counted as well as logged.
pub(crate) fn record_requeue(shared: &Shared, id: TableId, outcome: Result<bool, StatsError>) {
    if let Err(e) = outcome {
        shared.metrics.record_requeue_failure();
        emit_event(StatsEvent::RequeueFailed, id, &e.to_string());
    }
}
