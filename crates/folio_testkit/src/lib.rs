//! # FolioDB Testkit
//!
//! Test utilities for FolioDB.
//!
//! This crate provides:
//! - Page storage fixtures with automatic cleanup
//! - Paired synced devices over an in-memory cloud
//! - Property-based test generators using proptest

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod sync;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::sync::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use sync::*;
