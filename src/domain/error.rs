use thiserror::Error;

/// Rejection of a malformed event at the `write()` boundary.
///
/// These are the only errors a producer ever sees; everything downstream of
/// admission is handled inside the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Event message must be a string, found {found}")]
    MessageNotString { found: &'static str },
    #[error("Event is missing required field: {0}")]
    MissingField(&'static str),
    #[error("Event must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
    // The rejected input itself is never carried; it has not been sanitized.
    #[error("Invalid log level ({found}, {len} chars)")]
    InvalidLevel { found: &'static str, len: usize },
    #[error("Invalid timestamp ({found}, {len} chars)")]
    InvalidTimestamp { found: &'static str, len: usize },
}
