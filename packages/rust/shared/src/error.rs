//! Error types for postforge.
//!
//! Library crates use [`PostforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all postforge operations.
///
/// A source that was already processed is not an error; the pipeline reports
/// it as a duplicate outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum PostforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transient network/HTTP failure talking to an external provider.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed provider payload (durations, caption tracks, API envelopes).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The generation provider rejected or failed the request.
    #[error("generation error: {0}")]
    Generation(String),

    /// The provider reported a rate or quota limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The requested source does not exist upstream.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// The source exists but has no usable transcript.
    #[error("transcript not available: {0}")]
    TranscriptUnavailable(String),

    /// A uniqueness constraint or single-writer lease was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Slug allocation gave up after probing its attempt budget.
    #[error("no free slug for '{base}' after {attempts} attempts")]
    SlugExhausted { base: String, attempts: u32 },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PostforgeError>;

impl PostforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the provider signalled a rate or quota limit.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// True for errors that make continuing a batch pointless: the store,
    /// the filesystem, or the configuration is broken.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Io { .. } | Self::Config { .. }
        )
    }

    /// True when the source itself can never yield a post; batches record
    /// these and do not attempt the key again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SourceNotFound(_) | Self::TranscriptUnavailable(_))
    }

    /// True for transient failures worth a single retry at the call site.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PostforgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PostforgeError::SlugExhausted {
            base: "hello".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "no free slug for 'hello' after 3 attempts");
    }

    #[test]
    fn classification() {
        assert!(PostforgeError::RateLimited("429".into()).is_rate_limit());
        assert!(!PostforgeError::Network("reset".into()).is_rate_limit());

        assert!(PostforgeError::Storage("locked".into()).is_fatal());
        assert!(!PostforgeError::TranscriptUnavailable("v1".into()).is_fatal());
        assert!(!PostforgeError::SourceNotFound("v1".into()).is_fatal());

        assert!(PostforgeError::TranscriptUnavailable("v1".into()).is_terminal());
        assert!(PostforgeError::SourceNotFound("v1".into()).is_terminal());
        assert!(!PostforgeError::Network("reset".into()).is_terminal());

        assert!(PostforgeError::Network("timeout".into()).is_transient());
        assert!(!PostforgeError::Generation("bad request".into()).is_transient());
    }
}
