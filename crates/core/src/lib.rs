//! Strata Core - shared types for the Strata lock manager.
//!
//! This crate provides the vocabulary every other Strata crate speaks:
//!
//! - `ResourceName`: a hierarchical path naming a lockable resource
//!   (database, table, page, ...)
//! - `TransactionId`: the identifier locks are granted to
//! - `Error`: the lock protocol error taxonomy
//!
//! # Example
//!
//! ```rust
//! use strata_core::ResourceName;
//!
//! let db = ResourceName::new("database");
//! let table = db.child("table-users");
//! let page = table.child(3);
//!
//! assert_eq!(page.to_string(), "database/table-users/3");
//! assert_eq!(page.parent(), Some(table.clone()));
//! assert!(page.is_child_of(&db));
//! assert!(!db.is_child_of(&db));
//! ```

mod error;
mod resource;

pub use error::{Error, Result};
pub use resource::ResourceName;

/// Transaction identifier.
pub type TransactionId = u64;
