#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Content hashing for the working-copy engine: streaming MD5, the Manber
//! rolling-hash block splitter, the `md5s` sidecar that records one line
//! per block, and the compare-file fast path that re-chunks a local file
//! and stops at the first block that no longer matches.
//!
//! # Design
//!
//! The splitter ([`manber::Manber`]) is a plain streaming state machine:
//! callers feed byte slices of any size and receive block records through a
//! callback. Block boundaries depend only on the content, never on how the
//! input was buffered, which is what makes re-chunking deterministic and
//! the stored sidecar comparable across runs.
//!
//! # Invariants
//!
//! - Two chunkings of the same bytes produce identical boundaries, block
//!   MD5s and full-file MD5 regardless of the feeding pattern.
//! - The final, boundary-less block of a file is never written to the
//!   sidecar; the full-file MD5 covers it.
//! - A run of `\0` bytes never pays for hashing: it collapses into a
//!   single block with an all-zero MD5, ended at the first non-zero byte.

pub mod compare;
pub mod manber;
pub mod sidecar;
pub mod strong;

pub use compare::compare_file;
pub use manber::{Block, Manber};
pub use sidecar::BlockHashes;
pub use strong::{Md5, md5_to_hex, parse_md5_hex};
