//! Lock and lock request records.

use crate::lock_type::LockType;
use std::fmt;
use strata_core::{ResourceName, TransactionId};

/// A lock of some type on a resource.
///
/// A transaction holds at most one lock per resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Lock {
    /// Locked resource.
    pub name: ResourceName,
    /// Lock mode.
    pub lock_type: LockType,
}

impl Lock {
    /// Creates a lock record.
    pub fn new(name: ResourceName, lock_type: LockType) -> Self {
        Self { name, lock_type }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.lock_type, self.name)
    }
}

/// A queued request: `txn` wants `lock`, and once it is granted every
/// resource in `released` is released before the transaction unblocks.
#[derive(Clone, Debug)]
pub(crate) struct LockRequest {
    pub txn: TransactionId,
    pub lock: Lock,
    pub released: Vec<ResourceName>,
}

impl LockRequest {
    pub fn new(txn: TransactionId, lock: Lock) -> Self {
        Self {
            txn,
            lock,
            released: Vec::new(),
        }
    }

    pub fn with_released(txn: TransactionId, lock: Lock, released: Vec<ResourceName>) -> Self {
        Self { txn, lock, released }
    }

    /// Returns true if granting this request replaces the transaction's
    /// existing lock on the same resource.
    pub fn replaces_held_lock(&self) -> bool {
        self.released.contains(&self.lock.name)
    }
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request for {} by {}", self.lock, self.txn)?;
        if !self.released.is_empty() {
            f.write_str(" (releasing")?;
            for name in &self.released {
                write!(f, " {}", name)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}
