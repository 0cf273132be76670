//! In-memory table dictionary with a catalog-wide lock.
//!
//! The catalog lock serializes table existence and activity-flag changes.
//! Two rules make concurrent drop safe:
//!
//! - the background worker marks a table `IN_PROGRESS` only while holding the
//!   catalog lock, and only after it has taken the id out of the pool;
//! - the drop path removes the id from the pool while holding the catalog
//!   lock.
//!
//! Together these guarantee that once a drop has removed a pending id, the
//! worker can never start on it. Waiting for an already running
//! recalculation uses [`CatalogGuard::wait_bg_idle`], which releases the
//! catalog lock while blocked.
//!
//! Lock order: catalog before pool. The pool lock is never held while
//! acquiring the catalog lock.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::table::{BgActivity, StatsTable, TableId};

#[derive(Debug, Default)]
struct CatalogState {
    tables: BTreeMap<TableId, Arc<StatsTable>>,
}

/// Table dictionary shared by writers, DDL and the background worker.
#[derive(Debug, Default)]
pub struct Catalog {
    state: Mutex<CatalogState>,
    /// Signalled whenever a table's activity flag returns to `NONE`.
    bg_idle: Condvar,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the catalog-wide lock.
    pub fn lock(&self) -> CatalogGuard<'_> {
        CatalogGuard {
            catalog: self,
            state: self.state.lock(),
        }
    }

    /// Register a table and return the shared table object.
    pub fn create_table(&self, table: StatsTable) -> Arc<StatsTable> {
        self.lock().insert(table)
    }

    pub fn len(&self) -> usize {
        self.state.lock().tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped ownership of the catalog-wide lock.
pub struct CatalogGuard<'a> {
    catalog: &'a Catalog,
    state: MutexGuard<'a, CatalogState>,
}

impl CatalogGuard<'_> {
    pub fn insert(&mut self, table: StatsTable) -> Arc<StatsTable> {
        let table = Arc::new(table);
        self.state.tables.insert(table.id(), Arc::clone(&table));
        table
    }

    pub fn get(&self, id: TableId) -> Option<Arc<StatsTable>> {
        self.state.tables.get(&id).cloned()
    }

    pub fn contains(&self, id: TableId) -> bool {
        self.state.tables.contains_key(&id)
    }

    /// Open a table by id, pinning it against eviction until the handle is
    /// released.
    pub fn resolve(&self, id: TableId) -> Option<TableHandle> {
        self.state.tables.get(&id).map(|table| {
            table.acquire_ref();
            TableHandle {
                table: Arc::clone(table),
            }
        })
    }

    /// Release a handle obtained from [`CatalogGuard::resolve`].
    pub fn release(&self, handle: TableHandle) {
        drop(handle);
    }

    /// Remove a table from the dictionary.
    ///
    /// Drop paths must first run
    /// [`crate::lifecycle::StatsBackground::on_drop`] under this same guard.
    pub fn remove(&mut self, id: TableId) -> Option<Arc<StatsTable>> {
        self.state.tables.remove(&id)
    }

    /// Evict an unused table from the dictionary cache.
    ///
    /// Refused while the table is open or the background worker uses it.
    pub fn try_evict(&mut self, id: TableId) -> bool {
        let evictable = match self.state.tables.get(&id) {
            Some(table) => table.ref_count() == 0 && table.bg_activity() == BgActivity::None,
            None => return false,
        };
        if evictable {
            self.state.tables.remove(&id);
        }
        evictable
    }

    /// Block until some table's activity flag returns to `NONE`.
    ///
    /// The catalog lock is released while waiting and re-acquired before
    /// returning; callers re-check their condition in a loop.
    pub fn wait_bg_idle(&mut self) {
        self.catalog.bg_idle.wait(&mut self.state);
    }

    /// Wake every thread blocked in [`CatalogGuard::wait_bg_idle`].
    pub(crate) fn notify_bg_idle(&self) {
        self.catalog.bg_idle.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.tables.is_empty()
    }
}

/// An open reference to a table, obtained under the catalog lock.
///
/// Dropping the handle unpins the table.
#[derive(Debug)]
pub struct TableHandle {
    table: Arc<StatsTable>,
}

impl Deref for TableHandle {
    type Target = StatsTable;

    fn deref(&self) -> &StatsTable {
        &self.table
    }
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        self.table.release_ref();
    }
}
