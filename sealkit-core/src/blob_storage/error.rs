//! Error types for the blob storage engine.
//!
//! Every operation reports failures through the single [`StorageError`]
//! discriminant; there is no out-of-band signalling and nothing is retried
//! internally.

use std::fmt;

/// Errors that can occur during blob storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Invalid input parameter (empty buffer, oversized payload, ...).
    InvalidInput {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of the issue.
        reason: String,
    },

    /// The named blob does not exist on disk.
    ///
    /// Only the read path reports this; `size` reports an absent blob as
    /// length `0`.
    NotFound {
        /// The blob name that was not found.
        name: String,
    },

    /// An I/O operation failed.
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Frame length fields are inconsistent with the file contents.
    Malformed {
        /// Description of the inconsistency.
        context: String,
    },

    /// HMAC verification failed for an authenticated blob.
    MacMismatch {
        /// The blob whose MAC did not verify.
        name: String,
    },

    /// AES-GCM authentication failed for a sealed blob.
    SealMismatch {
        /// The blob whose tag did not verify.
        name: String,
    },

    /// The platform secret store refused to provide a key.
    KeyUnavailable {
        /// Context describing which key was requested.
        context: String,
    },

    /// The sealed-mode nonce counter has traversed its full cycle.
    ///
    /// Terminal: every further sealed write fails with this error, across
    /// restarts. Sealed reads are unaffected.
    NonceExhausted,

    /// The caller-provided read buffer is shorter than the stored payload.
    BufferTooSmall {
        /// Stored payload length.
        needed: usize,
        /// Caller buffer length.
        available: usize,
    },

    /// An internal invariant was violated.
    Internal {
        /// Description of the error.
        message: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { parameter, reason } => {
                write!(f, "invalid input '{parameter}': {reason}")
            }
            Self::NotFound { name } => write!(f, "blob not found: {name}"),
            Self::Io { context, source } => write!(f, "I/O error during {context}: {source}"),
            Self::Malformed { context } => write!(f, "malformed frame: {context}"),
            Self::MacMismatch { name } => {
                write!(f, "HMAC verification failed for blob: {name}")
            }
            Self::SealMismatch { name } => {
                write!(f, "seal authentication failed for blob: {name}")
            }
            Self::KeyUnavailable { context } => write!(f, "key unavailable: {context}"),
            Self::NonceExhausted => {
                write!(f, "sealed-write nonce counter exhausted; further sealing disabled")
            }
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: payload is {needed} bytes, buffer holds {available}")
            }
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            context: "unspecified".to_string(),
            source: err,
        }
    }
}

impl StorageError {
    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input<P: Into<String>, R: Into<String>>(parameter: P, reason: R) -> Self {
        Self::InvalidInput {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error for a blob name.
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates a malformed-frame error.
    pub fn malformed<S: Into<String>>(context: S) -> Self {
        Self::Malformed {
            context: context.into(),
        }
    }

    /// Creates a MAC mismatch error for a blob name.
    pub fn mac_mismatch<S: Into<String>>(name: S) -> Self {
        Self::MacMismatch { name: name.into() }
    }

    /// Creates a seal mismatch error for a blob name.
    pub fn seal_mismatch<S: Into<String>>(name: S) -> Self {
        Self::SealMismatch { name: name.into() }
    }

    /// Creates a key-unavailable error.
    pub fn key_unavailable<S: Into<String>>(context: S) -> Self {
        Self::KeyUnavailable {
            context: context.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
