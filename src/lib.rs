//! stripefs is the storage core of an in-process burst-buffer filesystem
//! for HPC workloads: POSIX-shaped file and namespace operations served
//! from a set of Redis-compatible key-value shards, with file bytes
//! striped across the shards by consistent hashing and metadata kept as
//! per-path keys.
//!
//! The POSIX interception trampoline that preloads this library is not
//! part of the crate; it drives the [`fs::StripeFs`] facade.

pub mod common;
pub mod config;
pub mod fs;
pub mod inode;
pub mod ring;
pub mod store;

pub use common::{Error, Result};
pub use config::Config;
pub use fs::StripeFs;
