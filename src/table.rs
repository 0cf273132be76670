//! Per-table statistics bookkeeping.
//!
//! A [`StatsTable`] is the slice of a storage-engine table object that the
//! scheduler cares about: the modification counter, the cardinality estimate,
//! the last-recalculation timestamp and the background-activity flag. The
//! table object is shared (`Arc`) between the catalog, writers and the
//! background worker; only its [`TableId`] is ever stored in the pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogGuard;

/// Storage-engine level table identifier.
///
/// Stable across rename, invalidated by drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(u64);

impl TableId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TableId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Three-valued per-table option that falls back to a global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsOption {
    #[default]
    Default,
    On,
    Off,
}

impl StatsOption {
    /// Resolve against the server-wide setting.
    pub fn resolve(self, global: bool) -> bool {
        match self {
            StatsOption::Default => global,
            StatsOption::On => true,
            StatsOption::Off => false,
        }
    }
}

/// Background-activity flag.
///
/// A table whose flag is not [`BgActivity::None`] must not be evicted or
/// destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BgActivity {
    /// The background worker is not using the table.
    None = 0,
    /// The background worker is recalculating (or throttle-checking) the table.
    InProgress = 1,
    /// A dropper is waiting for the in-progress recalculation to finish.
    ShouldQuit = 2,
}

impl BgActivity {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BgActivity::InProgress,
            2 => BgActivity::ShouldQuit,
            _ => BgActivity::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BgActivity::None => "NONE",
            BgActivity::InProgress => "IN_PROGRESS",
            BgActivity::ShouldQuit => "SHOULD_QUIT",
        }
    }
}

/// Statistics-related state of one table.
#[derive(Debug)]
pub struct StatsTable {
    id: TableId,
    name: RwLock<String>,
    temporary: bool,
    persistent: StatsOption,
    auto_recalc: StatsOption,
    stat_initialized: AtomicBool,
    n_rows: AtomicU64,
    modified_counter: AtomicU64,
    last_recalc: Mutex<Option<DateTime<Utc>>>,
    bg_activity: AtomicU8,
    accessible: AtomicBool,
    n_ref: AtomicUsize,
}

impl StatsTable {
    /// A regular table with initialized statistics and default options.
    pub fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: RwLock::new(name.into()),
            temporary: false,
            persistent: StatsOption::Default,
            auto_recalc: StatsOption::Default,
            stat_initialized: AtomicBool::new(true),
            n_rows: AtomicU64::new(0),
            modified_counter: AtomicU64::new(0),
            last_recalc: Mutex::new(None),
            bg_activity: AtomicU8::new(BgActivity::None as u8),
            accessible: AtomicBool::new(true),
            n_ref: AtomicUsize::new(0),
        }
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn with_persistent(mut self, option: StatsOption) -> Self {
        self.persistent = option;
        self
    }

    pub fn with_auto_recalc(mut self, option: StatsOption) -> Self {
        self.auto_recalc = option;
        self
    }

    pub fn with_rows(self, n_rows: u64) -> Self {
        self.n_rows.store(n_rows, Ordering::Relaxed);
        self
    }

    pub fn with_last_recalc(self, at: DateTime<Utc>) -> Self {
        *self.last_recalc.lock() = Some(at);
        self
    }

    /// Mark statistics as not yet loaded.
    ///
    /// Writes to such a table are not counted until the statistics engine
    /// initializes it (e.g. the table was loaded only for foreign key checks).
    pub fn uninitialized(self) -> Self {
        self.stat_initialized.store(false, Ordering::Release);
        self
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Renaming keeps the identifier, so a queued entry stays valid.
    pub fn rename(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn persistent_option(&self) -> StatsOption {
        self.persistent
    }

    pub fn auto_recalc_option(&self) -> StatsOption {
        self.auto_recalc
    }

    pub fn stats_initialized(&self) -> bool {
        self.stat_initialized.load(Ordering::Acquire)
    }

    /// Current cardinality estimate.
    pub fn n_rows(&self) -> u64 {
        self.n_rows.load(Ordering::Relaxed)
    }

    pub fn set_n_rows(&self, n_rows: u64) {
        self.n_rows.store(n_rows, Ordering::Relaxed);
    }

    pub fn modified_counter(&self) -> u64 {
        self.modified_counter.load(Ordering::Relaxed)
    }

    pub fn set_modified_counter(&self, value: u64) {
        self.modified_counter.store(value, Ordering::Relaxed);
    }

    /// Count one write and return the value observed before it.
    ///
    /// Load and store are separate: concurrent writers may lose increments.
    /// The counter only steers a heuristic, so that is acceptable.
    pub fn bump_modified(&self) -> u64 {
        let observed = self.modified_counter.load(Ordering::Relaxed);
        self.modified_counter
            .store(observed.saturating_add(1), Ordering::Relaxed);
        observed
    }

    pub fn reset_modified(&self) {
        self.modified_counter.store(0, Ordering::Relaxed);
    }

    pub fn last_recalc(&self) -> Option<DateTime<Utc>> {
        *self.last_recalc.lock()
    }

    /// Record a completed recalculation.
    ///
    /// Statistics engines call this after recomputing; it stamps the
    /// throttle timestamp, resets the modification counter and marks the
    /// statistics as loaded.
    pub fn record_recalc(&self, at: DateTime<Utc>) {
        *self.last_recalc.lock() = Some(at);
        self.reset_modified();
        self.stat_initialized.store(true, Ordering::Release);
    }

    pub fn bg_activity(&self) -> BgActivity {
        BgActivity::from_u8(self.bg_activity.load(Ordering::Acquire))
    }

    /// Whether a dropper asked the background recalculation to stop early.
    pub fn should_quit(&self) -> bool {
        self.bg_activity() == BgActivity::ShouldQuit
    }

    /// Change the activity flag. Requires the catalog lock.
    pub(crate) fn set_bg_activity(&self, state: BgActivity, _catalog: &CatalogGuard<'_>) {
        self.bg_activity.store(state as u8, Ordering::Release);
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible.load(Ordering::Acquire)
    }

    /// Flag the table as (in)accessible, e.g. its tablespace was discarded.
    pub fn set_accessible(&self, accessible: bool) {
        self.accessible.store(accessible, Ordering::Release);
    }

    /// Number of outstanding [`crate::catalog::TableHandle`]s.
    pub fn ref_count(&self) -> usize {
        self.n_ref.load(Ordering::Acquire)
    }

    pub(crate) fn acquire_ref(&self) {
        self.n_ref.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_ref(&self) {
        self.n_ref.fetch_sub(1, Ordering::AcqRel);
    }
}
