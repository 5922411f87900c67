#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The partial-tree update: per-entry change detection against the
//! recorded state, and the disk-order walker that drives it over the
//! entry blocks, discovers late-arriving children by enumerating changed
//! directories, and calls the per-action callback in a guaranteed order -
//! children in ascending inode order, every directory only after all of
//! its descendants.
//!
//! # Invariants
//!
//! - A directory's `unfinished` counter equals its currently-open child
//!   directories; it closes exactly when the counter reaches zero and all
//!   recorded children were processed.
//! - A removed parent short-circuits its children: they are reported
//!   removed without touching the filesystem again.
//! - The filter decision is computed at most once per entry and run.

pub mod correlate;
pub mod detect;
pub mod walker;

pub use correlate::correlate;
pub use detect::{detect_entry, resolve_likely};
pub use walker::Walker;
