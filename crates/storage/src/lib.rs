//! Strata Storage - lock-aware access to storage objects.
//!
//! This crate connects storage objects to the Strata lock hierarchy:
//!
//! - `LockCatalog`: names the lock context of every table, index and
//!   temporary table, declares page counts and allocates transaction ids
//! - `Transaction`: requests the right locks before each read or write and
//!   releases them on commit or rollback
//!
//! # Example
//!
//! ```rust
//! use strata_storage::{LockCatalog, Transaction};
//!
//! let mut catalog = LockCatalog::new();
//! catalog.create_table("users", 100).unwrap();
//!
//! let tx = Transaction::begin(&catalog);
//! tx.read_page(&catalog, "users", 7).unwrap();
//! tx.write_page(&catalog, "users", 8).unwrap();
//! assert!(!tx.is_blocked());
//!
//! let id = tx.id();
//! tx.commit().unwrap();
//! assert!(catalog.manager().locks_held_by(id).is_empty());
//! ```

pub mod catalog;
pub mod transaction;

pub use catalog::LockCatalog;
pub use transaction::{Transaction, TransactionState};

pub use strata_core::{Error, Result, TransactionId};
