//! Collaborator interfaces the scheduler drives but does not implement.
//!
//! Computing statistics, suppressing work on replication appliers and
//! companion maintenance passes (such as index defragmentation) all belong to
//! other subsystems. The scheduler reaches them only through these traits.

use crate::error::StatsError;
use crate::table::StatsTable;

/// Which statistics a recomputation should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcMode {
    /// Cheap in-memory estimates, computed inline by the writer.
    Transient,
    /// Sampled statistics destined for persistent storage, computed by the
    /// background worker.
    Persistent,
}

impl RecalcMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecalcMode::Transient => "TRANSIENT",
            RecalcMode::Persistent => "PERSISTENT",
        }
    }
}

/// Computes table statistics.
///
/// A successful recomputation must stamp the table through
/// [`StatsTable::record_recalc`], which also resets its modification counter.
/// Long persistent recomputations should poll [`StatsTable::should_quit`] and
/// return early once a drop is waiting on them.
pub trait StatsEngine: Send + Sync {
    fn recompute(&self, table: &StatsTable, mode: RecalcMode) -> Result<(), StatsError>;
}

/// The session on whose behalf a write is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub session_id: u64,
    /// Whether the session participates in a replicated cluster.
    pub clustered: bool,
}

impl SessionContext {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            clustered: false,
        }
    }

    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }
}

/// Veto for background recalculation requested by replicated sessions.
///
/// Consulted only for clustered sessions, right before a table is enqueued.
pub trait ReplicationGate: Send + Sync {
    fn should_suppress(&self, session: &SessionContext) -> bool;
}

/// A maintenance pass that runs after the recalculation pool is drained.
pub trait CompanionPass: Send + Sync {
    /// Set up the companion's queue; called during `init`.
    fn init(&self) {}

    /// Process the companion's own queue.
    fn run(&self);

    /// Discard everything queued; called during `deinit`.
    fn clear(&self);
}
