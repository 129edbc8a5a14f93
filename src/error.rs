//! Client error taxonomy so recoverable and fatal failures stay distinguishable.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the capture, exchange, and API layers.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Microphone access refused or no input device present. Recoverable,
    /// reported once, never retried automatically.
    #[error("microphone access denied")]
    PermissionDenied,

    /// Network unreachable or the server answered outside 2xx. Carries the
    /// server `detail` when one was provided.
    #[error("{0}")]
    Transport(String),

    /// The server answered 401; local auth state is no longer valid.
    #[error("session expired")]
    SessionExpired,

    /// Audio capture failed after the device was acquired.
    #[error("audio capture error: {0}")]
    Capture(String),

    /// Response audio could not be decoded or played.
    #[error("audio playback error: {0}")]
    Playback(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<cpal::DevicesError> for ClientError {
    fn from(err: cpal::DevicesError) -> Self {
        ClientError::Capture(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for ClientError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => ClientError::PermissionDenied,
            other => ClientError::Capture(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for ClientError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => ClientError::PermissionDenied,
            other => ClientError::Capture(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for ClientError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => ClientError::PermissionDenied,
            other => ClientError::Capture(other.to_string()),
        }
    }
}
