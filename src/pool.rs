//! The recalculation pool: tables awaiting background statistics work.
//!
//! Only [`TableId`]s are stored, so a table may be closed (or evicted) after
//! it has been enqueued; the worker reopens it by id when its turn comes. If
//! the table no longer exists by then, the entry is simply discarded.
//!
//! The pool is FIFO and set-like: an id appears at most once, and order of
//! first insertion is preserved. The pool lock covers pool contents only and
//! is never held across catalog access or timer operations.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::CatalogGuard;
use crate::error::StatsError;
use crate::scheduler::Scheduler;
use crate::table::TableId;

/// Shared FIFO of table ids awaiting recalculation.
pub struct RecalcPool {
    /// `None` before `init` and after `deinit`.
    entries: Mutex<Option<VecDeque<TableId>>>,
    scheduler: Arc<Scheduler>,
}

impl RecalcPool {
    /// Create an uninitialized pool bound to `scheduler`.
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            entries: Mutex::new(None),
            scheduler,
        }
    }

    /// Allocate the backing storage. Returns `false` if already initialized.
    pub fn init(&self) -> bool {
        let mut entries = self.entries.lock();
        if entries.is_some() {
            return false;
        }
        *entries = Some(VecDeque::new());
        true
    }

    /// Discard all entries and release the backing storage.
    pub fn deinit(&self) {
        self.entries.lock().take();
    }

    pub fn is_initialized(&self) -> bool {
        self.entries.lock().is_some()
    }

    /// Enqueue `id` unless it is already pending.
    ///
    /// When this insertion makes the pool non-empty and
    /// `allow_immediate_schedule` is set, the worker is scheduled to run now.
    /// Returns `true` if the id was appended.
    ///
    /// # Panics
    /// If the pool has not been initialized.
    pub fn add(&self, id: TableId, allow_immediate_schedule: bool) -> Result<bool, StatsError> {
        let was_empty = {
            let mut guard = self.entries.lock();
            let entries = guard
                .as_mut()
                .unwrap_or_else(|| panic!("stats_recalc: table {id} enqueued before init"));
            if entries.contains(&id) {
                return Ok(false);
            }
            entries
                .try_reserve(1)
                .map_err(|_| StatsError::OutOfMemory(id.get()))?;
            entries.push_back(id);
            entries.len() == 1
        };
        debug!(table_id = id.get(), "stats_recalc: table enqueued");
        if was_empty && allow_immediate_schedule {
            self.scheduler.schedule_now();
        }
        Ok(true)
    }

    /// Remove and return the oldest entry.
    pub fn take_first(&self) -> Option<TableId> {
        self.entries.lock().as_mut()?.pop_front()
    }

    /// Remove `id` if it is pending.
    ///
    /// The catalog guard proves the caller holds the catalog lock, so the
    /// worker cannot be between taking this id and marking the table busy.
    pub fn remove(&self, id: TableId, _catalog: &CatalogGuard<'_>) -> bool {
        let mut guard = self.entries.lock();
        let Some(entries) = guard.as_mut() else {
            return false;
        };
        match entries.iter().position(|pending| *pending == id) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        if let Some(entries) = self.entries.lock().as_mut() {
            entries.clear();
        }
    }

    pub fn contains(&self, id: TableId) -> bool {
        self.entries
            .lock()
            .as_ref()
            .is_some_and(|entries| entries.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending ids in processing order.
    pub fn snapshot(&self) -> Vec<TableId> {
        self.entries
            .lock()
            .as_ref()
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default()
    }
}
