//! # treesync
//!
//! Local directory synchronization with rsync-style delta transfer.
//!
//! treesync brings a destination tree into byte-for-byte agreement with a
//! source tree while moving as little data as possible. Two strategies are
//! available: wholesale copies, and a rolling-checksum delta that rebuilds
//! each changed file from blocks already present in its previous
//! destination copy plus literal bytes from the source.
//!
//! ## Features
//!
//! - **Rolling checksum**: O(1) window sliding for cheap candidate matches
//! - **Strong digest**: BLAKE3 confirmation of every candidate block
//! - **Streaming encoder**: bounded memory for arbitrarily large files
//! - **Atomic updates**: temp file plus rename, never a half-written file
//!
//! ## Example
//!
//! ```rust
//! use std::io::Cursor;
//! use std::path::Path;
//! use treesync::{apply, encode, BlockIndex, Instruction};
//!
//! let basis = b"the quick brown fox jumps over the lazy dog";
//! let source = b"the quick brown fox vaults over the lazy dog";
//!
//! // Index the existing destination content.
//! let index = BlockIndex::build(Cursor::new(basis.as_slice()), 8).unwrap();
//!
//! // Encode the source against it.
//! let mut script: Vec<Instruction> = Vec::new();
//! let stats = encode(
//!     Cursor::new(source.as_slice()),
//!     Path::new("source"),
//!     &index,
//!     &mut script,
//! )
//! .unwrap();
//!
//! // Applying the script to the basis reconstructs the source.
//! let mut rebuilt = Vec::new();
//! apply(
//!     Cursor::new(basis.as_slice()),
//!     basis.len() as u64,
//!     &script,
//!     &mut rebuilt,
//!     Path::new("destination"),
//! )
//! .unwrap();
//!
//! assert_eq!(rebuilt, source);
//! assert_eq!(stats.total_bytes, source.len() as u64);
//! assert!(stats.matched_bytes > 0);
//! ```
//!
//! Whole-tree synchronization goes through [`sync`] with a
//! [`CopyStrategy`] or [`DeltaStrategy`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

mod action;
mod apply;
mod checksum;
mod delta;
mod engine;
mod error;
mod executor;
mod hash;
mod signature;
mod stats;
mod strategy;
mod walk;

pub use action::{ActionKind, SyncAction};
pub use apply::{apply, Applier};
pub use checksum::RollingChecksum;
pub use delta::{Instruction, InstructionSink};
pub use engine::encode;
pub use error::{Result, SyncError};
pub use executor::{sync, SyncOptions};
pub use hash::StrongHash;
pub use signature::{BlockIndex, BlockSignature};
pub use stats::SyncStats;
pub use strategy::{
    CopyStrategy, DeltaStrategy, FileSyncStrategy, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_INDEX_BYTES,
    MAX_BLOCK_SIZE,
};
