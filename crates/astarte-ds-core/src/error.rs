//! Error types, one per layer.

use thiserror::Error;

use crate::value::ValueKind;

/// Invalid datasource instance settings. Fatal at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid settings: {message}")]
    Invalid { message: String },

    #[error("cannot set up API client: {message}")]
    Client { message: String },
}

/// Failure reaching or parsing a response from the Astarte API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Connection failed, timed out, or the request could not be sent.
    #[error("network error: {message}")]
    Network { message: String },

    /// A device id, interface or path that cannot form a request URL.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Token rejected (401/403).
    #[error("authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body is not what the endpoint documents.
    #[error("cannot decode response: {message}")]
    Decode { message: String },
}

/// Failure of a single dashboard query. Other queries in the batch are unaffected.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(
        "could not find individual datastream values for device {device} on interface {interface}, path {path}"
    )]
    SchemaMismatch {
        device: String,
        interface: String,
        path: String,
    },

    #[error(
        "device {device} has data of non-numeric type ({kind}) on interface {interface}, path {path}"
    )]
    NonNumeric {
        device: String,
        interface: String,
        path: String,
        kind: ValueKind,
    },
}

/// Failure of a resource call. Always reported to the caller as a client error.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("unexpected request")]
    UnexpectedRequest,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cannot encode response: {message}")]
    Encode { message: String },
}
