//! Shared helpers for the stats_recalc integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use stats_recalc::{
    Catalog, Clock, RecalcMode, StatsBackground, StatsConfig, StatsEngine, StatsError, StatsTable,
    SystemClock, TableId,
};

/// Engine that records every call and stamps the table's last
/// recalculation time, like a real engine writing its statistics.
pub struct RecordingEngine {
    clock: Arc<dyn Clock>,
    calls: Mutex<Vec<(TableId, RecalcMode)>>,
    dropped: Mutex<HashSet<TableId>>,
    /// Calls made for a table after its drop completed.
    ghost_calls: Mutex<Vec<TableId>>,
    delay: Duration,
}

impl RecordingEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            calls: Mutex::new(Vec::new()),
            dropped: Mutex::new(HashSet::new()),
            ghost_calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(TableId, RecalcMode)> {
        self.calls.lock().clone()
    }

    pub fn persistent_calls(&self, id: TableId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(t, m)| *t == id && *m == RecalcMode::Persistent)
            .count()
    }

    /// Mark `id` as destroyed; any later call for it is a ghost.
    pub fn mark_dropped(&self, id: TableId) {
        self.dropped.lock().insert(id);
    }

    pub fn ghost_calls(&self) -> Vec<TableId> {
        self.ghost_calls.lock().clone()
    }
}

impl StatsEngine for RecordingEngine {
    fn recompute(&self, table: &StatsTable, mode: RecalcMode) -> Result<(), StatsError> {
        if self.dropped.lock().contains(&table.id()) {
            self.ghost_calls.lock().push(table.id());
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.lock().push((table.id(), mode));
        table.record_recalc(self.clock.now());
        Ok(())
    }
}

/// Engine that parks inside `recompute` until released or asked to quit.
pub struct BlockingEngine {
    entered: Mutex<Option<Sender<TableId>>>,
    released: Mutex<bool>,
    wake: Condvar,
    /// Whether the last call observed the quit request.
    saw_quit: Mutex<bool>,
}

impl BlockingEngine {
    pub fn new() -> (Self, Receiver<TableId>) {
        let (tx, rx) = channel();
        let engine = Self {
            entered: Mutex::new(Some(tx)),
            released: Mutex::new(false),
            wake: Condvar::new(),
            saw_quit: Mutex::new(false),
        };
        (engine, rx)
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.wake.notify_all();
    }

    pub fn saw_quit(&self) -> bool {
        *self.saw_quit.lock()
    }
}

impl StatsEngine for BlockingEngine {
    fn recompute(&self, table: &StatsTable, _mode: RecalcMode) -> Result<(), StatsError> {
        if let Some(tx) = self.entered.lock().as_ref() {
            let _ = tx.send(table.id());
        }
        let mut released = self.released.lock();
        while !*released {
            if table.should_quit() {
                *self.saw_quit.lock() = true;
            }
            self.wake.wait_for(&mut released, Duration::from_millis(5));
        }
        Ok(())
    }
}

pub fn id(raw: u64) -> TableId {
    TableId::new(raw)
}

/// Config with a short throttle interval so timer tests finish quickly.
pub fn fast_config(interval_ms: u64) -> StatsConfig {
    StatsConfig {
        min_recalc_interval_ms: interval_ms,
        ..StatsConfig::default()
    }
}

/// Build, init and start a scheduler over a fresh catalog using the
/// system clock.
pub fn started(engine: Arc<dyn StatsEngine>, config: StatsConfig) -> StatsBackground {
    let stats = StatsBackground::builder(Arc::new(Catalog::new()), engine)
        .config(config)
        .clock(Arc::new(SystemClock))
        .build()
        .expect("valid config");
    stats.init();
    stats.start().expect("timer thread");
    stats
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
