//! Core error types for stepsync-core.
//!
//! Each pipeline stage has its own error enum so the orchestrator can turn
//! a failure into a precise summary line. `CoreError` wraps all of them for
//! callers that only need to propagate.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stepsync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP transport or remote status errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Session store errors
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    /// Login handshake errors
    #[error("Login error: {0}")]
    Auth(#[from] AuthError),

    /// Step submission errors
    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    /// Notification errors
    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// An account entry that cannot be used
    #[error("Invalid account '{user}': {message}")]
    InvalidAccount { user: String, message: String },

    /// Nothing to do
    #[error("No usable accounts configured")]
    NoAccounts,
}

/// Transport-level and remote-status errors.
#[derive(Error, Debug)]
pub enum HttpError {
    /// DNS failure, connection refused, TLS failure, timeout
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx status after the retry budget was spent
    #[error("remote returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The proxy URL could not be used
    #[error("invalid proxy '{proxy}': {message}")]
    InvalidProxy { proxy: String, message: String },

    /// The body was not the JSON we asked for
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Session store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Login handshake errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The server kept answering 429
    #[error("rate limited by login endpoint after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Step one answered without an `access` code
    #[error("no access code in token response: {body}")]
    MissingAccessCode { body: String },

    /// Step two answered without `token_info`
    #[error("no token_info in login response: {body}")]
    MissingTokenInfo { body: String },

    /// Session was issued but could not be persisted
    #[error("could not persist session: {0}")]
    Store(#[from] StoreError),
}

/// Step submission errors.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The outgoing payload could not be serialized
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The acknowledgement was not a JSON document
    #[error("malformed acknowledgement: {0}")]
    MalformedAck(String),
}

/// Notification errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("notifier '{0}' is not configured")]
    NotConfigured(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HttpError::Decode(err.to_string())
        } else {
            HttpError::Transport(err)
        }
    }
}

impl HttpError {
    /// HTTP status carried by a remote error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_exposes_status() {
        let err = HttpError::Remote {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn auth_error_wraps_http_transparently() {
        let err: AuthError = HttpError::Decode("bad json".into()).into();
        assert_eq!(err.to_string(), "could not decode response: bad json");
    }

    #[test]
    fn core_error_from_config() {
        let err: CoreError = ConfigError::NoAccounts.into();
        assert!(matches!(err, CoreError::Config(ConfigError::NoAccounts)));
    }

    #[test]
    fn payload_encoding_failure_is_not_an_ack_error() {
        let json_err = serde_json::from_str::<u8>("not json").unwrap_err();
        let err: SubmitError = json_err.into();
        assert!(matches!(err, SubmitError::Encode(_)));
        assert!(err.to_string().starts_with("could not encode payload"));
    }
}
