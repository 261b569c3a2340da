//! # Error Types
//!
//! This module defines the error taxonomy for live sessions.
//!
//! Pure engines (classifier, transposer, renderer) never return these: they
//! degrade to an empty or unchanged result instead. Errors surface only at the
//! edges where something outside the crate can fail: the messaging service,
//! the local network link, the data provider and configuration files.
//!
//! ## Error Kinds
//! - `DataNotFound` - a song, section or setlist is absent; render a placeholder
//! - `TransportUnavailable` - messaging or discovery failed; continue degraded
//! - `StaleReference` - the position names a song that is not loaded yet
//! - `AbortedLoad` - a newer navigation superseded this load; discard silently
//! - `TransposeParseFailure` - chord grid payload is malformed; fall back to text
//!
//! ## Usage
//! ```rust
//! use chordflow::LiveError;
//!
//! fn describe(err: &LiveError) -> &'static str {
//!     if err.is_transient() {
//!         "notify the user and keep the session alive"
//!     } else {
//!         "report"
//!     }
//! }
//!
//! let err = LiveError::TransportUnavailable("channel closed".to_string());
//! assert_eq!(describe(&err), "notify the user and keep the session alive");
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    /// A song, section or setlist could not be found.
    ///
    /// # Example
    /// ```
    /// # use chordflow::LiveError;
    /// let err = LiveError::DataNotFound { kind: "song", id: "s-1".to_string() };
    /// assert_eq!(err.to_string(), "song not found: s-1");
    /// ```
    #[error("{kind} not found: {id}")]
    DataNotFound { kind: &'static str, id: String },

    /// The messaging service or the local link could not be reached.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The position names a song that has not finished loading locally.
    #[error("Stale reference to {0}")]
    StaleReference(String),

    /// A load was superseded by a later navigation.
    #[error("Load of {song_id} was superseded")]
    AbortedLoad { song_id: String },

    /// A chord grid payload could not be parsed for transposition.
    #[error("Transpose parse failure: {0}")]
    TransposeParseFailure(String),

    /// A key name could not be parsed.
    ///
    /// # Example
    /// ```
    /// # use chordflow::LiveError;
    /// let err = LiveError::InvalidKey("H".to_string());
    /// assert_eq!(err.to_string(), "Invalid key: H");
    /// ```
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid configuration value.
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LiveError {
    /// Errors that are shown as a passing notice and never end the session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LiveError::TransportUnavailable(_)
                | LiveError::DataNotFound { .. }
                | LiveError::StaleReference(_)
                | LiveError::AbortedLoad { .. }
        )
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LiveError::DataNotFound { kind, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;
