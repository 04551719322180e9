// Error taxonomy for relay operations

use thiserror::Error;

/// Failures reported synchronously to the caller of a relay operation
#[derive(Debug, Error)]
pub enum RelayError {
    /// Display name empty or too long
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Unknown or expired session, or a relay source that is not connected
    #[error("not authorized")]
    NotAuthorized,

    /// A stream is already open for this session
    #[error("already connected")]
    AlreadyConnected,

    /// The outbound sink refused an event; terminates the stream loop
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Short machine-readable tag used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidName(_) => "invalid_name",
            RelayError::NotAuthorized => "not_authorized",
            RelayError::AlreadyConnected => "already_connected",
            RelayError::Transport(_) => "transport",
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}
