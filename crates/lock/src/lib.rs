//! Strata Lock - multigranularity locking for the Strata database.
//!
//! This crate lets concurrent transactions share a hierarchy of resources
//! (database → table → page) by locking at different granularities:
//!
//! - `LockType`: the S/X/IS/IX/SIX algebra (compatibility, parent locks,
//!   substitutability)
//! - `LockManager`: flat per-resource bookkeeping with a FIFO wait queue
//! - `LockContext`: the resource tree, enforcing intent locks on ancestors
//!   and providing escalation
//! - `LockUtil`: picks the minimal set of acquires/promotions/escalations
//!   for a desired S or X access
//! - `LockStrategy`: `Standard`, `NoOp` or `Logging` behavior for a manager
//!
//! # Example
//!
//! ```rust
//! use strata_lock::{LockManager, LockType, LockUtil};
//!
//! let manager = LockManager::new();
//! let db = manager.database_context();
//! let page = db.child_context("table-users").child_context(3);
//!
//! LockUtil::request_locks(Some(1), &page, LockType::S).unwrap();
//!
//! assert_eq!(db.local_lock_type(1), Some(LockType::IS));
//! assert_eq!(page.local_lock_type(1), Some(LockType::S));
//!
//! LockUtil::release_all(1, &manager).unwrap();
//! assert!(manager.locks_held_by(1).is_empty());
//! ```

mod config;
mod context;
mod lock;
pub mod lock_type;
mod manager;
mod strategy;
mod util;

pub use config::LockConfig;
pub use context::LockContext;
pub use lock::Lock;
pub use lock_type::LockType;
pub use manager::LockManager;
pub use strategy::{LockEvent, LockStrategy, Logging, NoOp, Standard};
pub use util::LockUtil;

pub use strata_core::{Error, ResourceName, Result, TransactionId};
