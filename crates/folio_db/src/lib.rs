//! # FolioDB Db
//!
//! Ordered byte-string key-value store abstraction for FolioDB.
//!
//! This crate provides the lowest-level storage abstraction the rest of the
//! workspace is built on. A [`Db`] is an opaque ordered mapping from byte
//! keys to byte values with one mutation unit: the atomic [`WriteBatch`].
//!
//! ## Design Principles
//!
//! - Backends are opaque byte stores; they do not interpret keys or values
//! - A batch is applied atomically or not at all; a dropped batch is discarded
//! - Must be `Send + Sync` so page storage can share a handle with sync
//! - One `Db` instance per page, opened through a [`DbFactory`]
//!
//! ## Available Backends
//!
//! - [`MemoryDb`] - for tests and ephemeral pages
//! - [`FileDb`] - append-only record log replayed on open
//!
//! ## Example
//!
//! ```rust
//! use folio_db::{Db, MemoryDb, WriteBatch};
//!
//! let db = MemoryDb::new();
//! let mut batch = WriteBatch::new();
//! batch.put(b"key".to_vec(), b"value".to_vec());
//! db.apply(batch).unwrap();
//! assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod db;
mod error;
mod factory;
mod file;
mod memory;

pub use batch::{BatchOp, WriteBatch};
pub use db::Db;
pub use error::{DbError, DbResult};
pub use factory::{DbFactory, DbPath, FileDbFactory, MemoryDbFactory};
pub use file::FileDb;
pub use memory::MemoryDb;
