//! Transaction management for Strata storage.
//!
//! This module provides the lock side of a transaction: every read or write
//! of a table, page, index or temporary table first requests the matching
//! lock, and finishing the transaction releases everything it holds.

use crate::catalog::LockCatalog;
use strata_core::{Error, Result, TransactionId};
use strata_lock::{LockContext, LockManager, LockType, LockUtil};
use tracing::{debug, warn};

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// A database transaction.
///
/// A request that conflicts with another transaction leaves this one
/// blocked (see [`Transaction::is_blocked`]); the caller waits until it is
/// unblocked and then repeats the request. A transaction dropped while
/// active is rolled back.
pub struct Transaction {
    /// Unique transaction ID.
    id: TransactionId,
    manager: LockManager,
    /// Current state.
    state: TransactionState,
}

impl Transaction {
    /// Creates a new transaction with an id from `catalog`.
    pub fn begin(catalog: &LockCatalog) -> Self {
        let id = catalog.allocate_txn();
        debug!(txn_id = id, "transaction started");
        Self {
            id,
            manager: catalog.manager().clone(),
            state: TransactionState::Active,
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if the transaction is active.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns true while a lock request of this transaction is queued.
    pub fn is_blocked(&self) -> bool {
        self.manager.is_blocked(self.id)
    }

    /// Checks if the transaction can issue a request, returns error if not.
    fn check_ready(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::invalid_operation("Transaction is not active"));
        }
        if self.is_blocked() {
            return Err(Error::invalid_operation("Transaction is waiting for a lock"));
        }
        Ok(())
    }

    fn request(&self, ctx: &LockContext, lock_type: LockType) -> Result<()> {
        self.check_ready()?;
        LockUtil::request_locks(Some(self.id), ctx, lock_type)
    }

    fn page(&self, catalog: &LockCatalog, table: &str, page: usize) -> Result<(LockContext, LockContext)> {
        let table_ctx = catalog.table(table)?;
        if page >= table_ctx.capacity() {
            return Err(Error::not_found("page", format!("{}/{}", table, page)));
        }
        Ok((table_ctx.clone(), table_ctx.child_context(page)))
    }

    fn request_page(&self, catalog: &LockCatalog, table: &str, page: usize, lock_type: LockType) -> Result<()> {
        let (table_ctx, page_ctx) = self.page(catalog, table, page)?;
        self.request(&page_ctx, lock_type)?;
        if !self.is_blocked() {
            LockUtil::escalate_if_saturated(self.id, &table_ctx)?;
        }
        Ok(())
    }

    /// Locks a whole table for reading.
    pub fn read_table(&self, catalog: &LockCatalog, table: &str) -> Result<()> {
        self.request(catalog.table(table)?, LockType::S)
    }

    /// Locks a whole table for writing.
    pub fn write_table(&self, catalog: &LockCatalog, table: &str) -> Result<()> {
        self.request(catalog.table(table)?, LockType::X)
    }

    /// Locks one page of a table for reading. Escalates to a table lock
    /// once enough pages are locked.
    pub fn read_page(&self, catalog: &LockCatalog, table: &str, page: usize) -> Result<()> {
        self.request_page(catalog, table, page, LockType::S)
    }

    /// Locks one page of a table for writing. Escalates to a table lock
    /// once enough pages are locked.
    pub fn write_page(&self, catalog: &LockCatalog, table: &str, page: usize) -> Result<()> {
        self.request_page(catalog, table, page, LockType::X)
    }

    /// Locks an index for reading.
    pub fn read_index(&self, catalog: &LockCatalog, index: &str) -> Result<()> {
        self.request(catalog.index(index)?, LockType::S)
    }

    /// Locks an index for writing.
    pub fn write_index(&self, catalog: &LockCatalog, index: &str) -> Result<()> {
        self.request(catalog.index(index)?, LockType::X)
    }

    /// Locks a temporary table for writing.
    pub fn write_temp_table(&self, catalog: &LockCatalog, table: &str) -> Result<()> {
        self.request(catalog.temp_table(table)?, LockType::X)
    }

    /// Commits the transaction, releasing its locks.
    pub fn commit(mut self) -> Result<()> {
        self.check_ready()?;
        self.state = TransactionState::Committed;
        debug!(txn_id = self.id, "transaction committed");
        LockUtil::release_all(self.id, &self.manager)
    }

    /// Rolls back the transaction, withdrawing any queued request and
    /// releasing its locks.
    pub fn rollback(mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::invalid_operation("Transaction is not active"));
        }
        self.state = TransactionState::RolledBack;
        debug!(txn_id = self.id, "transaction rolled back");
        LockUtil::release_all(self.id, &self.manager)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.state = TransactionState::RolledBack;
            if let Err(err) = LockUtil::release_all(self.id, &self.manager) {
                warn!(txn_id = self.id, error = %err, "failed to release locks of dropped transaction");
            }
        }
    }
}
