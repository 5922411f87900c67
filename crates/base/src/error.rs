//! crates/base/src/error.rs
//!
//! Workspace error type with an accumulating context chain.

use std::io;
use thiserror::Error as ThisError;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure, used by callers to drive control flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A requested path or key is absent. Often non-fatal: several call
    /// sites convert this into "start fresh" behavior.
    NotFound,
    /// Structural violation in the serialized entry list. Unrecoverable
    /// without re-synchronizing against the repository.
    TreeDamaged,
    /// The operation would overwrite a locally-modified entry (or an
    /// already-committed administrative file) and was refused.
    Busy,
    /// A merge completed with textual conflicts. Non-fatal; flagged on the
    /// entry.
    Conflict,
    /// The file is unreadable or unwritable for permission reasons.
    Permission,
    /// Any other filesystem error, wrapping the OS error.
    Io,
    /// The repository transport reported an error.
    Protocol,
    /// Writing to stdout failed; exit silently with a non-zero status.
    BrokenPipe,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorKind {
    /// Short lower-case description used in rendered diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::TreeDamaged => "entry list damaged",
            Self::Busy => "would overwrite local changes",
            Self::Conflict => "merge conflict",
            Self::Permission => "permission denied",
            Self::Io => "I/O error",
            Self::Protocol => "repository error",
            Self::BrokenPipe => "broken pipe",
            Self::Internal => "internal error",
        }
    }
}

/// Renders the context chain outermost-first, then the root message and
/// the wrapped OS error.
fn full_message(chain: &[String], message: &str, source: &Option<io::Error>) -> String {
    let mut out = String::new();
    for frame in chain.iter().rev() {
        out.push_str(frame);
        out.push_str(": ");
    }
    out.push_str(message);
    if let Some(source) = source {
        out.push_str(": ");
        out.push_str(&source.to_string());
    }
    out
}

/// Error carrying a kind, a root message, and outer context frames.
///
/// Context frames are pushed as the error propagates upward; rendering
/// shows them outermost-first, the way the action handler prints them:
///
/// ```text
/// trackfs: reverting entry "etc/hosts": fetching text base: repository error
/// ```
#[derive(Debug, ThisError)]
#[error("{}", full_message(.chain, .message, .source))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    chain: Vec<String>,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    /// Creates an error of `kind` with a root message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            chain: Vec::new(),
            source: None,
        }
    }

    /// Creates an internal-invariant error. Used where the original code
    /// would have aborted; the top-level handler prints the diagnostic and
    /// exits with the internal-error code.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wraps an I/O error, classifying `NotFound`, `PermissionDenied` and
    /// `BrokenPipe` into their dedicated kinds.
    #[must_use]
    pub fn io(err: io::Error, what: impl Into<String>) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::Permission,
            io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
            _ => ErrorKind::Io,
        };
        Self {
            kind,
            message: what.into(),
            chain: Vec::new(),
            source: Some(err),
        }
    }

    /// The failure classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Pushes an outer context frame.
    #[must_use]
    pub fn context(mut self, frame: impl Into<String>) -> Self {
        self.chain.push(frame.into());
        self
    }

    /// True for the kinds that several call sites silence and convert into
    /// default behavior.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }
}

/// Context-chaining helpers for [`Result`].
pub trait ResultExt<T> {
    /// Adds a context frame to the error, if any.
    fn context(self, frame: impl Into<String>) -> Result<T>;

    /// Adds a lazily-built context frame to the error, if any.
    fn with_context<F, S>(self, frame: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;

    /// Converts a `NotFound` error into `Ok(default)`.
    fn or_not_found(self, default: T) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, frame: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(frame))
    }

    fn with_context<F, S>(self, frame: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(frame()))
    }

    fn or_not_found(self, default: T) -> Result<T> {
        match self {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }
}

impl<T> ResultExt<T> for std::result::Result<T, io::Error> {
    fn context(self, frame: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::io(e, frame))
    }

    fn with_context<F, S>(self, frame: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::io(e, frame()))
    }

    fn or_not_found(self, default: T) -> Result<T> {
        match self {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default),
            Err(e) => Err(Error::io(e, "filesystem operation failed")),
            Ok(v) => Ok(v),
        }
    }
}
