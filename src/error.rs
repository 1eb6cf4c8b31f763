//! Error types for the PRTG integration.

use thiserror::Error;

/// Failure categories for operations against the PRTG host.
///
/// Expected failures (missing input, incomplete configuration, upstream
/// trouble) are folded into `{success, message}` results close to where
/// they occur; only genuinely unexpected errors reach the request
/// boundary as a 500.
#[derive(Error, Debug)]
pub enum PrtgError {
    /// Missing or empty required input.
    #[error("{0}")]
    Validation(String),
    /// Missing or incomplete active configuration.
    #[error("{0}")]
    Configuration(String),
    /// Network/TLS failure before any HTTP response arrived.
    #[error("{0}")]
    Transport(String),
    /// HTTP status >= 400 or a malformed body from PRTG. `code` is 0 when
    /// no usable status accompanied the failure.
    #[error("{message}")]
    Protocol { code: u16, message: String },
    /// Requested record or sensor row does not exist.
    #[error("{0}")]
    NotFound(String),
}
