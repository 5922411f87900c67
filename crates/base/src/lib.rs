#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `base` exposes workspace-wide facilities shared by every trackfs crate:
//! the typed error with its accumulating context chain, the process exit
//! codes, the entry status/flag bit sets, and the prioritized option store
//! that the command layer threads through all engine calls.
//!
//! # Design
//!
//! Every fallible operation in the workspace returns [`Result`]. An
//! [`Error`] carries an [`ErrorKind`] that callers match on to drive control
//! flow (`NotFound` in particular is silenced at a handful of documented
//! points, e.g. first-time administrative-area access), plus a chain of
//! human-readable context frames that the top-level handler renders before
//! mapping the kind to an [`exit_code::ExitCode`].
//!
//! Option values live in a [`options::Context`]. Each value remembers the
//! [`options::Priority`] that set it; a lower-priority store is refused, so
//! precedence (`MustHave` > command line > environment > per-WC config >
//! system config > default) falls out of the setter instead of being
//! re-derived at every read site.
//!
//! # Invariants
//!
//! - [`status::StatusBits`] and [`status::EntryFlags`] only ever persist the
//!   documented subsets; serialization masks everything else.
//! - `Error` formatting never loses the innermost cause: the context chain
//!   renders outermost-first with the root message last.

/// Error type, kinds, and the context-chaining result extension.
pub mod error;
/// Process exit codes derived from [`error::ErrorKind`].
pub mod exit_code;
/// Option storage with priority-guarded setters.
pub mod options;
/// Revision numbers and sentinels.
pub mod revision;
/// Entry status and flag bit sets.
pub mod status;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use revision::{RevNum, SET_REVNUM};
