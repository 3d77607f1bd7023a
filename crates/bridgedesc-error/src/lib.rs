//! Unified error type for the bridge descriptor sanitizer.
//!
//! Every fallible operation in the workspace returns [`Result<T>`], an alias
//! over [`Error`]. The [`ErrorKind`] enum on [`Error`] is the taxonomy that
//! callers match on to decide whether a failure is document-local (skip and
//! continue), a single invalid address line (drop the line, keep the
//! document), or fatal for the rest of the run (persistence failures poison
//! hashing for the remaining documents).
//!
//! This crate is deliberately small and mirrors the role `tor-error` plays in
//! the wider Arti workspace: a shared vocabulary so that every other crate
//! doesn't have to invent its own error enum.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use std::fmt;
use std::path::PathBuf;

/// A `Result` alias using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of failure that occurred.
///
/// This is the taxonomy from the error-handling design: it tells a caller
/// what recovery policy applies, without requiring it to match on the full
/// [`Error`] variant.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document was missing a required line, had the wrong field count,
    /// contained non-hex/non-base64 data where required, an unrecognized
    /// line, or a mismatched ed25519 identity/master key.
    ///
    /// Policy: skip that one document, warn, continue the run.
    MalformedDocument,
    /// A single address/port field (an `a` or `or-address` line) had bad
    /// syntax.
    ///
    /// Policy: omit that one line, keep the rest of the document.
    InvalidAddress,
    /// Writing to the monthly-secrets store failed.
    ///
    /// Policy: fatal for the run. The sanitizer that owns the secrets store
    /// latches into `HashingDisabled` and refuses to scrub anything further.
    PersistenceFailure,
    /// An I/O failure unrelated to the secrets store (e.g. while writing an
    /// output file, or reading an archive).
    ///
    /// Policy: warn, continue processing further documents.
    Io,
    /// A tar archive had no recognizable layout (missing entry header, a
    /// file name that doesn't match the `from-<authority>-...` pattern, or
    /// an unknown authority name).
    ///
    /// Policy: skip the file.
    UnknownArchive,
    /// An internal invariant was violated. This indicates a bug in this
    /// crate rather than a problem with the input.
    Bug,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::MalformedDocument => "malformed document",
            ErrorKind::InvalidAddress => "invalid address",
            ErrorKind::PersistenceFailure => "secrets store persistence failure",
            ErrorKind::Io => "I/O failure",
            ErrorKind::UnknownArchive => "unrecognized archive layout",
            ErrorKind::Bug => "internal error",
        };
        f.write_str(s)
    }
}

/// The error type returned by every fallible operation in this workspace.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A document-level or line-level parsing/validation failure.
    #[error("{kind}: {msg}")]
    Invalid {
        /// What kind of failure this is.
        kind: ErrorKind,
        /// A human-readable explanation.
        msg: String,
    },

    /// The secrets store could not be written to durably.
    #[error("could not persist monthly secret to {path}: {source}")]
    SecretsPersistence {
        /// The file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation failed outside of the secrets-store path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory being operated on.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An internal invariant was violated.
    #[error("internal error (this is a bug): {0}")]
    Bug(String),
}

impl Error {
    /// Build a [`Error::Invalid`] of kind [`ErrorKind::MalformedDocument`].
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::Invalid {
            kind: ErrorKind::MalformedDocument,
            msg: msg.into(),
        }
    }

    /// Build a [`Error::Invalid`] of kind [`ErrorKind::InvalidAddress`].
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Error::Invalid {
            kind: ErrorKind::InvalidAddress,
            msg: msg.into(),
        }
    }

    /// Build a [`Error::Invalid`] of kind [`ErrorKind::UnknownArchive`].
    pub fn unknown_archive(msg: impl Into<String>) -> Self {
        Error::Invalid {
            kind: ErrorKind::UnknownArchive,
            msg: msg.into(),
        }
    }

    /// Return the [`ErrorKind`] of this error, for callers that need to pick
    /// a recovery policy without matching on every variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Invalid { kind, .. } => *kind,
            Error::SecretsPersistence { .. } => ErrorKind::PersistenceFailure,
            Error::Io { .. } => ErrorKind::Io,
            Error::Bug(_) => ErrorKind::Bug,
        }
    }
}

/// Construct a [`Error::Bug`], recording the source location.
///
/// Analogous to `tor_error::internal!`: use this for conditions that should
/// be impossible given the rest of the code, not for malformed input.
#[macro_export]
macro_rules! internal {
    ($($args:tt)*) => {
        $crate::Error::Bug(format!("{} ({}:{})", format_args!($($args)*), file!(), line!()))
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        let e = Error::malformed("missing router line");
        assert_eq!(e.kind(), ErrorKind::MalformedDocument);

        let e = Error::invalid_address("bad a-line");
        assert_eq!(e.kind(), ErrorKind::InvalidAddress);

        let e: Error = internal!("should not happen: {}", 42);
        assert_eq!(e.kind(), ErrorKind::Bug);
        assert!(format!("{e}").contains("should not happen: 42"));
    }
}
