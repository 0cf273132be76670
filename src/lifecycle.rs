//! Process-wide lifecycle of the background statistics scheduler.
//!
//! [`StatsBackground`] is the service object the owning server creates once
//! and shares between the write path, DDL and administration. It owns the
//! recalculation pool, the scheduler timer and the collaborators.
//!
//! States move linearly:
//!
//! ```text
//! Uninitialized ─init─▶ Initialized ─start─▶ Started ⇄ Stopped ─deinit─▶ Deinitialized
//! ```
//!
//! `shutdown` stops future firings but leaves queued work in the pool, so a
//! later `start` resumes it. `deinit` discards the pool for good.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::info;

use crate::catalog::{Catalog, CatalogGuard};
use crate::clock::{Clock, SystemClock};
use crate::config::StatsConfig;
use crate::engine::{CompanionPass, ReplicationGate, SessionContext, StatsEngine};
use crate::error::StatsError;
use crate::monitor::{MonitorSnapshot, SchedulerMetrics, StatsEvent, emit_event};
use crate::pool::RecalcPool;
use crate::scheduler::Scheduler;
use crate::table::{BgActivity, StatsTable, TableId};
use crate::tracker::{self, WriteOutcome};
use crate::worker::{self, PassSummary};

/// State shared by the write path and the worker.
pub(crate) struct Shared {
    pub(crate) config: StatsConfig,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) pool: RecalcPool,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) engine: Arc<dyn StatsEngine>,
    pub(crate) gate: Option<Arc<dyn ReplicationGate>>,
    pub(crate) companion: Option<Arc<dyn CompanionPass>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: SchedulerMetrics,
    /// Held for the duration of a worker pass; passes never overlap.
    pass_lock: Mutex<()>,
}

impl Shared {
    fn run_pass(&self) -> PassSummary {
        let _pass = self.pass_lock.lock();
        worker::run_pass(self)
    }
}

/// Lifecycle states of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
    Deinitialized,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "UNINITIALIZED",
            LifecycleState::Initialized => "INITIALIZED",
            LifecycleState::Started => "STARTED",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Deinitialized => "DEINITIALIZED",
        }
    }
}

/// Builder for [`StatsBackground`].
pub struct StatsBackgroundBuilder {
    config: StatsConfig,
    catalog: Arc<Catalog>,
    engine: Arc<dyn StatsEngine>,
    gate: Option<Arc<dyn ReplicationGate>>,
    companion: Option<Arc<dyn CompanionPass>>,
    clock: Arc<dyn Clock>,
}

impl StatsBackgroundBuilder {
    pub fn config(mut self, config: StatsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn replication_gate(mut self, gate: Arc<dyn ReplicationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn companion(mut self, companion: Arc<dyn CompanionPass>) -> Self {
        self.companion = Some(companion);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<StatsBackground, StatsError> {
        self.config.validate()?;
        let scheduler = Arc::new(Scheduler::new());
        let shared = Shared {
            config: self.config,
            catalog: self.catalog,
            pool: RecalcPool::new(Arc::clone(&scheduler)),
            scheduler,
            engine: self.engine,
            gate: self.gate,
            companion: self.companion,
            clock: self.clock,
            metrics: SchedulerMetrics::default(),
            pass_lock: Mutex::new(()),
        };
        Ok(StatsBackground {
            shared: Arc::new(shared),
            state: Mutex::new(LifecycleState::Uninitialized),
        })
    }
}

/// The background statistics recalculation service.
pub struct StatsBackground {
    shared: Arc<Shared>,
    state: Mutex<LifecycleState>,
}

impl StatsBackground {
    pub fn builder(catalog: Arc<Catalog>, engine: Arc<dyn StatsEngine>) -> StatsBackgroundBuilder {
        StatsBackgroundBuilder {
            config: StatsConfig::default(),
            catalog,
            engine,
            gate: None,
            companion: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Allocate the pool. Must precede any enqueue or `start`.
    ///
    /// # Panics
    /// If called more than once.
    pub fn init(&self) {
        let mut state = self.state.lock();
        assert_eq!(
            *state,
            LifecycleState::Uninitialized,
            "stats_recalc: init called in state {}",
            state.as_str()
        );
        self.shared.pool.init();
        if let Some(companion) = &self.shared.companion {
            companion.init();
        }
        *state = LifecycleState::Initialized;
        info!("stats_recalc: initialized");
    }

    /// Create the timer. Idempotent while started.
    ///
    /// Work queued while stopped is scheduled immediately.
    ///
    /// # Panics
    /// Before `init` or after `deinit`.
    pub fn start(&self) -> Result<(), StatsError> {
        let mut state = self.state.lock();
        assert!(
            matches!(
                *state,
                LifecycleState::Initialized | LifecycleState::Started | LifecycleState::Stopped
            ),
            "stats_recalc: start called in state {}",
            state.as_str()
        );
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let created = self.shared.scheduler.start(move || {
            if let Some(shared) = weak.upgrade() {
                shared.run_pass();
            }
        })?;
        *state = LifecycleState::Started;
        if created {
            info!("stats_recalc: background recalculation started");
            if !self.shared.pool.is_empty() {
                self.shared.scheduler.schedule_now();
            }
        }
        Ok(())
    }

    /// Destroy the timer, waiting for a pass in progress. No-op unless
    /// started. Queued work stays in the pool.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if *state != LifecycleState::Started {
            return;
        }
        self.shared.scheduler.shutdown();
        *state = LifecycleState::Stopped;
        info!(
            pending = self.shared.pool.len(),
            "stats_recalc: background recalculation stopped"
        );
    }

    /// Release the pool. No-op unless initialized; the service cannot be
    /// initialized again afterwards.
    pub fn deinit(&self) {
        let mut state = self.state.lock();
        if matches!(
            *state,
            LifecycleState::Uninitialized | LifecycleState::Deinitialized
        ) {
            return;
        }
        self.shared.scheduler.shutdown();
        self.shared.pool.deinit();
        if let Some(companion) = &self.shared.companion {
            companion.clear();
        }
        *state = LifecycleState::Deinitialized;
        info!("stats_recalc: deinitialized");
    }

    /// Administrative toggle: `true` behaves like `shutdown`, `false` like
    /// `start`.
    #[cfg(debug_assertions)]
    pub fn set_disabled_debug(&self, disabled: bool) -> Result<(), StatsError> {
        if disabled {
            self.shutdown();
            Ok(())
        } else {
            self.start()
        }
    }

    /// Force an immediate worker pass. Returns `false` if the scheduler is
    /// not running or the timer lock was busy.
    pub fn schedule_now(&self) -> bool {
        self.shared.scheduler.schedule_now()
    }

    /// Run one worker pass on the calling thread.
    ///
    /// Serialized with timer-driven passes.
    pub fn run_pass_now(&self) -> PassSummary {
        self.shared.run_pass()
    }

    /// Row-level write hook; see [`crate::tracker`].
    pub fn notify_write(
        &self,
        table: &StatsTable,
        session: &SessionContext,
    ) -> Result<WriteOutcome, StatsError> {
        tracker::update_if_needed(&self.shared, table, session)
    }

    /// Queue a table for background recalculation regardless of its
    /// modification counter. Returns `false` if it was already pending.
    pub fn enqueue(&self, id: TableId) -> Result<bool, StatsError> {
        let appended = self.shared.pool.add(id, true)?;
        if appended {
            self.shared.metrics.record_enqueued();
        } else {
            self.shared.metrics.record_duplicate();
        }
        Ok(appended)
    }

    /// Drop hook. Call with the catalog lock held, before the table object
    /// is destroyed.
    ///
    /// Removes any pending entry for the table and, if the worker is already
    /// using it, waits until it is done. The catalog lock is released while
    /// waiting and held again on return. Once this returns, the worker cannot
    /// pick the table up again before the caller releases the catalog lock.
    pub fn on_drop(&self, catalog: &mut CatalogGuard<'_>, table: &StatsTable) {
        self.shared.pool.remove(table.id(), catalog);
        if table.bg_activity() == BgActivity::None {
            return;
        }

        self.shared.metrics.record_drop_waited();
        emit_event(StatsEvent::DropWaited, table.id(), "background recalculation in progress");
        while table.bg_activity() != BgActivity::None {
            table.set_bg_activity(BgActivity::ShouldQuit, catalog);
            catalog.wait_bg_idle();
        }
        // A throttled table is put back into the pool while in progress.
        self.shared.pool.remove(table.id(), catalog);
    }

    /// Drop a table from the catalog, honoring the drop hook.
    pub fn drop_table(&self, id: TableId) -> Option<Arc<StatsTable>> {
        let mut guard = self.shared.catalog.lock();
        let table = guard.get(id)?;
        self.on_drop(&mut guard, &table);
        guard.remove(id)
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.shared.catalog
    }

    pub fn config(&self) -> &StatsConfig {
        &self.shared.config
    }

    /// Pending table ids in processing order.
    pub fn pending(&self) -> Vec<TableId> {
        self.shared.pool.snapshot()
    }

    pub fn is_pending(&self, id: TableId) -> bool {
        self.shared.pool.contains(id)
    }

    pub fn is_running(&self) -> bool {
        self.shared.scheduler.is_running()
    }

    pub fn metrics(&self) -> MonitorSnapshot {
        self.shared.metrics.snapshot(self.shared.pool.len())
    }
}

impl Drop for StatsBackground {
    fn drop(&mut self) {
        self.shared.scheduler.shutdown();
    }
}
