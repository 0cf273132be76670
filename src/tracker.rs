//! Modification tracking on the row-level write path.
//!
//! Every row write bumps the table's modification counter and decides
//! whether statistics have drifted far enough to need recomputation:
//!
//! - **Persistent statistics** are expensive (index sampling), so once more
//!   than 10% of the rows changed the table is queued for the background
//!   worker and the writer returns immediately.
//! - **Transient statistics** are cheap in-memory estimates; once
//!   `max(16, n_rows / 16)` rows changed they are recomputed inline.

use tracing::warn;

use crate::engine::{RecalcMode, SessionContext};
use crate::error::StatsError;
use crate::lifecycle::Shared;
use crate::monitor::{StatsEvent, emit_event};
use crate::table::StatsTable;

/// Lower bound of the transient threshold, so tiny, hot tables are not
/// recomputed on every write.
pub const TRANSIENT_MIN_THRESHOLD: u64 = 16;

/// What a single write caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Statistics are not loaded yet; nothing was counted.
    Uninitialized,
    /// The write was counted, no threshold was crossed.
    Counted,
    /// The table was appended to the recalculation pool.
    Enqueued,
    /// The threshold was crossed but the table was already pending.
    AlreadyPending,
    /// The replication gate vetoed background recalculation.
    Suppressed,
    /// Transient statistics were recomputed in the caller's thread.
    RecomputedTransient,
}

/// Rows that must change before persistent statistics are refreshed.
pub fn persistent_threshold(n_rows: u64) -> u64 {
    n_rows / 10
}

/// Rows that must change before transient statistics are refreshed.
///
/// `override_counter` caps the threshold when configured.
pub fn transient_threshold(n_rows: u64, override_counter: Option<u64>) -> u64 {
    let threshold = TRANSIENT_MIN_THRESHOLD.max(n_rows / 16);
    match override_counter {
        Some(limit) => limit.min(threshold),
        None => threshold,
    }
}

/// Count one write to `table` and act on the thresholds.
pub(crate) fn update_if_needed(
    shared: &Shared,
    table: &StatsTable,
    session: &SessionContext,
) -> Result<WriteOutcome, StatsError> {
    // The table may have been loaded internally (e.g. for foreign key
    // checks) without statistics; they are computed when it is opened.
    if !table.stats_initialized() {
        return Ok(WriteOutcome::Uninitialized);
    }

    let counter = table.bump_modified();
    let n_rows = table.n_rows();
    let config = &shared.config;

    if table.persistent_option().resolve(config.persistent_by_default) {
        if table.is_temporary() || config.read_only {
            return Ok(WriteOutcome::Counted);
        }
        if counter <= persistent_threshold(n_rows)
            || !table.auto_recalc_option().resolve(config.auto_recalc)
        {
            return Ok(WriteOutcome::Counted);
        }
        if session.clustered
            && let Some(gate) = &shared.gate
            && gate.should_suppress(session)
        {
            shared.metrics.record_suppressed();
            emit_event(StatsEvent::Suppressed, table.id(), "replication gate veto");
            return Ok(WriteOutcome::Suppressed);
        }

        let appended = shared.pool.add(table.id(), true)?;
        table.reset_modified();
        if appended {
            shared.metrics.record_enqueued();
            emit_event(StatsEvent::Enqueued, table.id(), "persistent threshold crossed");
            return Ok(WriteOutcome::Enqueued);
        }
        shared.metrics.record_duplicate();
        return Ok(WriteOutcome::AlreadyPending);
    }

    let threshold = transient_threshold(n_rows, config.modified_counter_override());
    if counter <= threshold {
        return Ok(WriteOutcome::Counted);
    }

    match shared.engine.recompute(table, RecalcMode::Transient) {
        Ok(()) => {
            table.reset_modified();
            shared.metrics.record_transient_recompute();
            emit_event(StatsEvent::TransientRecomputed, table.id(), "");
            Ok(WriteOutcome::RecomputedTransient)
        }
        Err(e) => {
            shared.metrics.record_engine_failure();
            warn!(
                table_id = table.id().get(),
                error = %e,
                "stats_recalc: transient recompute failed"
            );
            Ok(WriteOutcome::Counted)
        }
    }
}
