//! Error types for protocol parsing and transport framing.

use thiserror::Error;

/// Errors encountered while parsing a single IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The line was empty after stripping its terminator.
    #[error("empty message")]
    EmptyMessage,

    /// The line had a `:` prefix marker but nothing after it.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// No command token was present.
    #[error("missing command")]
    MissingCommand,

    /// The command token contained characters outside `[A-Za-z0-9]`.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Errors produced by the framed transport.
///
/// IO errors are fatal to the connection epoch; parse errors describe a
/// single discardable line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line that could not be parsed as an IRC message.
    #[error("invalid message: {0}")]
    Parse(#[from] MessageParseError),
}

impl ProtocolError {
    /// Whether this error ends the connection epoch.
    ///
    /// Parse errors are recoverable: the offending line is dropped and the
    /// stream continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
