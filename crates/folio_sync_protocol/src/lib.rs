//! # FolioDB Sync Protocol
//!
//! Wire format for shipping commits between devices through a cloud
//! provider.
//!
//! This crate provides:
//! - `CommitPack`: the batched, length-prefixed container for encrypted
//!   commit bodies and their eager objects
//! - `CloudStatus`: the provider-facing status taxonomy
//!
//! This is a pure protocol crate with no I/O operations. Payloads are
//! opaque bytes; encryption happens in the engine before packing, so
//! nothing in this crate ever sees plaintext.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod pack;
mod status;

pub use pack::{CommitPack, CommitPackEntry, PackError, PackObject, PACK_FORMAT_VERSION};
pub use status::CloudStatus;
