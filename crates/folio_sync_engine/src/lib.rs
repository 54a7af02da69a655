//! # FolioDB Sync Engine
//!
//! Cloud sync coordinator for FolioDB pages.
//!
//! This crate provides:
//! - `SyncCoordinator`: queues local commits, ships them as encrypted
//!   commit packs, applies remote packs and merges divergent heads
//! - `CloudProvider`: the transport abstraction, with an in-memory
//!   implementation for tests
//! - Retry and batching configuration
//!
//! The provider never sees plaintext: commit bodies and objects are
//! encrypted per namespace before they leave the device.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod provider;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use provider::{CloudProvider, FetchedPacks, MemoryCloudProvider};
