//! Centralized exit code definitions for the trackfs binary.
//!
//! The top-level action handler renders the error's context chain and then
//! maps its [`ErrorKind`] through [`ExitCode::from_kind`]. Keeping the
//! mapping in one table means scripts can rely on stable codes.

use crate::error::ErrorKind;
use std::fmt;

/// Exit codes returned by trackfs operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful completion.
    Ok = 0,

    /// Syntax or usage error on the command line.
    Syntax = 1,

    /// Generic failure (wrapped I/O error or anything unclassified).
    General = 2,

    /// A requested path or key was absent and no default applied.
    NotFound = 3,

    /// The serialized entry list is structurally damaged.
    TreeDamaged = 4,

    /// An update would have overwritten local modifications under
    /// `conflict=stop`.
    Busy = 5,

    /// A merge finished with textual conflicts.
    Conflict = 6,

    /// Permission denied.
    Permission = 7,

    /// The repository transport failed.
    Protocol = 8,

    /// stdout went away; nothing was printed about it.
    BrokenPipe = 9,

    /// An internal invariant was violated.
    Internal = 50,
}

impl ExitCode {
    /// The numeric process exit code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps an error kind to its exit code.
    #[must_use]
    pub const fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::TreeDamaged => Self::TreeDamaged,
            ErrorKind::Busy => Self::Busy,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::Permission => Self::Permission,
            ErrorKind::Io => Self::General,
            ErrorKind::Protocol => Self::Protocol,
            ErrorKind::BrokenPipe => Self::BrokenPipe,
            ErrorKind::Internal => Self::Internal,
        }
    }

    /// Human-readable description, used in `--help` and diagnostics.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Syntax => "usage error",
            Self::General => "error",
            Self::NotFound => "not found",
            Self::TreeDamaged => "entry list damaged",
            Self::Busy => "local modifications in the way",
            Self::Conflict => "merge conflict",
            Self::Permission => "permission denied",
            Self::Protocol => "repository error",
            Self::BrokenPipe => "broken pipe",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}
