//! Error types for Strata lock operations.

use crate::resource::ResourceName;
use crate::TransactionId;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by the lock manager, lock contexts and the lock catalog.
///
/// None of these are retryable. The lock variants mean the caller broke the
/// locking protocol (or skipped the `LockUtil` entry point).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transaction already holds a lock on the resource.
    #[error("transaction {txn} already holds a lock on {resource}")]
    DuplicateLockRequest {
        txn: TransactionId,
        resource: ResourceName,
    },
    /// The transaction holds no applicable lock on the resource.
    #[error("transaction {txn} holds no lock on {resource}")]
    NoLockHeld {
        txn: TransactionId,
        resource: ResourceName,
    },
    /// The request would break multigranularity locking, or a promotion
    /// target does not substitute for the held lock.
    #[error("invalid lock request on {resource}: {reason}")]
    InvalidLock {
        resource: ResourceName,
        reason: String,
    },
    /// The context sits under a subtree whose child locks were disabled.
    #[error("lock context {resource} is read-only")]
    ReadOnly { resource: ResourceName },
    /// Invalid operation outside the lock protocol itself.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
    /// A catalog object (table, index, temporary table) does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    /// A catalog object with this name already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },
}

impl Error {
    /// Creates a duplicate lock request error.
    pub fn duplicate_lock_request(txn: TransactionId, resource: &ResourceName) -> Self {
        Error::DuplicateLockRequest {
            txn,
            resource: resource.clone(),
        }
    }

    /// Creates a no lock held error.
    pub fn no_lock_held(txn: TransactionId, resource: &ResourceName) -> Self {
        Error::NoLockHeld {
            txn,
            resource: resource.clone(),
        }
    }

    /// Creates an invalid lock error.
    pub fn invalid_lock(resource: &ResourceName, reason: impl Into<String>) -> Self {
        Error::InvalidLock {
            resource: resource.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a read-only context error.
    pub fn read_only(resource: &ResourceName) -> Self {
        Error::ReadOnly {
            resource: resource.clone(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Returns the resource the error refers to, if any.
    pub fn resource(&self) -> Option<&ResourceName> {
        match self {
            Error::DuplicateLockRequest { resource, .. }
            | Error::NoLockHeld { resource, .. }
            | Error::InvalidLock { resource, .. }
            | Error::ReadOnly { resource } => Some(resource),
            Error::InvalidOperation { .. }
            | Error::NotFound { .. }
            | Error::AlreadyExists { .. } => None,
        }
    }
}
