//! stats_recalc: background statistics recalculation for storage engines.
//!
//! Writers report row modifications; once enough of a table has changed,
//! its statistics are either recomputed inline (transient statistics) or the
//! table is queued for a background worker (persistent statistics). The
//! worker is driven by a single re-armable timer, deduplicates and
//! rate-limits work per table, and coordinates with concurrent `DROP TABLE`
//! so it never touches a table that is being destroyed.
//!
//! # Components
//!
//! - [`tracker`]: per-write threshold decisions.
//! - [`pool`]: the FIFO, duplicate-free recalculation pool.
//! - [`scheduler`]: the timer and its non-blocking reschedule path.
//! - [`worker`]: the background pass.
//! - [`lifecycle`]: [`StatsBackground`], the service object tying it all
//!   together.
//!
//! # Locks
//!
//! Three independent locks: the catalog lock ([`catalog::Catalog`]), the pool
//! lock and the timer lock. The catalog lock may be held while taking the
//! pool lock, never the reverse; the pool lock is released before the timer
//! is touched; reschedules only `try_lock` the timer.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod pool;
pub mod scheduler;
pub mod table;
pub mod tracker;
pub mod worker;

pub use catalog::{Catalog, CatalogGuard, TableHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StatsConfig;
pub use engine::{CompanionPass, RecalcMode, ReplicationGate, SessionContext, StatsEngine};
pub use error::{StatsError, StatsErrorKind};
pub use lifecycle::{LifecycleState, StatsBackground, StatsBackgroundBuilder};
pub use monitor::MonitorSnapshot;
pub use table::{BgActivity, StatsOption, StatsTable, TableId};
pub use tracker::WriteOutcome;
pub use worker::{PassStep, PassSummary};
