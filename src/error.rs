//! Error types for stats_recalc.
//!
//! All recoverable failures are represented by [`StatsError`] and propagated
//! via `Result<T, StatsError>`. Conditions the scheduler expects during normal
//! operation (a table dropped while queued, a recalculation requested too
//! soon) are not errors and never reach this type.
//!
//! # Error Classification
//!
//! - **Resource**: allocation or thread-spawn failure. Propagated to the
//!   caller that triggered the work.
//! - **Config**: invalid or unparsable configuration.
//! - **Collaborator**: the statistics engine failed. Logged by the worker,
//!   never escalated to the writer that originally enqueued the table.
//! - **Internal**: bugs.
//!
//! Lifecycle misuse (enqueueing before `init`, starting after `deinit`) is a
//! contract violation in the owning process and panics instead.

use std::fmt;

/// Primary error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    // ── Resource errors: propagated to the caller ───────────────────────
    /// The recalculation pool could not grow to hold another entry.
    #[error("out of memory while enqueueing table {0} for statistics recalculation")]
    OutOfMemory(u64),

    /// The timer thread could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Configuration errors ─────────────────────────────────────────────
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // ── Collaborator errors: logged, never escalated ────────────────────
    /// The statistics engine failed to recompute a table.
    #[error("statistics engine error: {0}")]
    Engine(String),

    // ── Internal errors: should not happen ──────────────────────────────
    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification of error kind for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsErrorKind {
    Resource,
    Config,
    Collaborator,
    Internal,
}

impl fmt::Display for StatsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsErrorKind::Resource => write!(f, "RESOURCE"),
            StatsErrorKind::Config => write!(f, "CONFIG"),
            StatsErrorKind::Collaborator => write!(f, "COLLABORATOR"),
            StatsErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl StatsError {
    /// Classify the error for monitoring and alerting.
    pub fn kind(&self) -> StatsErrorKind {
        match self {
            StatsError::OutOfMemory(_) | StatsError::Io(_) => StatsErrorKind::Resource,
            StatsError::Config(_) | StatsError::ConfigParse(_) => StatsErrorKind::Config,
            StatsError::Engine(_) => StatsErrorKind::Collaborator,
            StatsError::Internal(_) => StatsErrorKind::Internal,
        }
    }
}
