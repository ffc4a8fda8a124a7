//! Lock catalog for Strata storage objects.
//!
//! This module provides the `LockCatalog` struct which names the lock
//! context of every table, index and temporary table and hands out
//! transaction ids.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{Error, Result, TransactionId};
use strata_lock::{LockContext, LockManager};
use tracing::debug;

/// Catalog of lockable storage objects.
///
/// Tables live under the database context as `table-<name>`, with one child
/// per page. Indices live under it as `index-<name>` with child locks
/// disabled, so they are only ever locked as a whole. Temporary tables are
/// orphan contexts `temp-<name>`, also locked as a whole.
pub struct LockCatalog {
    manager: LockManager,
    /// Table name → table context.
    tables: BTreeMap<String, LockContext>,
    /// Index name → index context.
    indices: BTreeMap<String, LockContext>,
    /// Temporary table name → temporary table context.
    temp_tables: BTreeMap<String, LockContext>,
    next_txn: AtomicU64,
}

impl LockCatalog {
    /// Creates an empty catalog over a new lock manager.
    pub fn new() -> Self {
        Self::with_manager(LockManager::new())
    }

    /// Creates an empty catalog over `manager`.
    pub fn with_manager(manager: LockManager) -> Self {
        Self {
            manager,
            tables: BTreeMap::new(),
            indices: BTreeMap::new(),
            temp_tables: BTreeMap::new(),
            next_txn: AtomicU64::new(1),
        }
    }

    /// Returns the lock manager.
    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    pub(crate) fn allocate_txn(&self) -> TransactionId {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a table with `page_count` pages.
    pub fn create_table(&mut self, name: &str, page_count: usize) -> Result<LockContext> {
        if self.tables.contains_key(name) {
            return Err(Error::already_exists("table", name));
        }
        let ctx = self
            .manager
            .database_context()
            .child_context(format!("table-{}", name));
        ctx.set_capacity(page_count);
        debug!(table = name, page_count, "table created");
        self.tables.insert(name.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Creates an index.
    pub fn create_index(&mut self, name: &str) -> Result<LockContext> {
        if self.indices.contains_key(name) {
            return Err(Error::already_exists("index", name));
        }
        let ctx = self
            .manager
            .database_context()
            .child_context(format!("index-{}", name));
        ctx.disable_child_locks();
        debug!(index = name, "index created");
        self.indices.insert(name.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Creates a temporary table.
    pub fn create_temp_table(&mut self, name: &str) -> Result<LockContext> {
        if self.temp_tables.contains_key(name) {
            return Err(Error::already_exists("temporary table", name));
        }
        let ctx = self.manager.orphan_context(format!("temp-{}", name))?;
        ctx.disable_child_locks();
        debug!(temp_table = name, "temporary table created");
        self.temp_tables.insert(name.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Drops a table. Fails while any transaction holds a lock on it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        Self::drop_from(&self.manager, &mut self.tables, "table", name)
    }

    /// Drops an index. Fails while any transaction holds a lock on it.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        Self::drop_from(&self.manager, &mut self.indices, "index", name)
    }

    /// Drops a temporary table. Fails while any transaction holds a lock on it.
    pub fn drop_temp_table(&mut self, name: &str) -> Result<()> {
        Self::drop_from(&self.manager, &mut self.temp_tables, "temporary table", name)
    }

    fn drop_from(
        manager: &LockManager,
        objects: &mut BTreeMap<String, LockContext>,
        kind: &'static str,
        name: &str,
    ) -> Result<()> {
        let ctx = objects.get(name).ok_or_else(|| Error::not_found(kind, name))?;
        if !manager.locks_on(ctx.name()).is_empty() {
            return Err(Error::invalid_operation(format!("{} {} is locked", kind, name)));
        }
        objects.remove(name);
        debug!(kind, name, "dropped");
        Ok(())
    }

    /// Returns the context of a table.
    pub fn table_context(&self, name: &str) -> Option<&LockContext> {
        self.tables.get(name)
    }

    /// Returns the context of an index.
    pub fn index_context(&self, name: &str) -> Option<&LockContext> {
        self.indices.get(name)
    }

    /// Returns the context of a temporary table.
    pub fn temp_table_context(&self, name: &str) -> Option<&LockContext> {
        self.temp_tables.get(name)
    }

    /// Returns the context of a table or an error naming it.
    pub(crate) fn table(&self, name: &str) -> Result<&LockContext> {
        self.table_context(name)
            .ok_or_else(|| Error::not_found("table", name))
    }

    pub(crate) fn index(&self, name: &str) -> Result<&LockContext> {
        self.index_context(name)
            .ok_or_else(|| Error::not_found("index", name))
    }

    pub(crate) fn temp_table(&self, name: &str) -> Result<&LockContext> {
        self.temp_table_context(name)
            .ok_or_else(|| Error::not_found("temporary table", name))
    }

    /// Returns the declared page count of a table.
    pub fn page_count(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|ctx| ctx.capacity())
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Returns all index names.
    pub fn index_names(&self) -> Vec<&str> {
        self.indices.keys().map(|s| s.as_str()).collect()
    }

    /// Checks if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

impl Default for LockCatalog {
    fn default() -> Self {
        Self::new()
    }
}
