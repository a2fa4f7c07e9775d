use dach_core::{DachError, StorageError};
use serde_json::json;
use thiserror::Error;

pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// Why an install or uninstall did not complete.
///
/// Everything before the storage write aborts the handshake with nothing
/// persisted and nothing notified.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("invalid dach configuration: {reason}")]
    Config { reason: String },

    #[error("invalid installation payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("unknown add-on: {app_name}")]
    UnknownAddon { app_name: String },

    #[error("cannot download the capabilities doc: {}", describe_status(.status, .reason))]
    RemoteFetch { status: Option<u16>, reason: String },

    #[error("the capabilities URL {requested} doesn't match the resource self link")]
    CapabilityMismatch {
        requested: String,
        advertised: Option<String>,
    },

    #[error("token exchange failed: {reason}")]
    TokenExchange { reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn describe_status(status: &Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("{code} {reason}"),
        None => reason.to_string(),
    }
}

impl HandshakeError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn token_exchange(reason: impl Into<String>) -> Self {
        Self::TokenExchange {
            reason: reason.into(),
        }
    }

    /// Client-facing error. Storage details stay server-side.
    pub fn to_dach_error(&self) -> DachError {
        match self {
            HandshakeError::Config { .. } => DachError::general_error(self.to_string()),
            HandshakeError::InvalidPayload { .. } => DachError::bad_request(self.to_string()),
            HandshakeError::UnknownAddon { .. } => DachError::not_found(self.to_string()),
            HandshakeError::RemoteFetch { status, .. } => {
                let err = DachError::bad_gateway(self.to_string());
                match status {
                    Some(code) => err.with_data(json!({ "status": code })),
                    None => err,
                }
            }
            HandshakeError::CapabilityMismatch { .. } => DachError::forbidden(self.to_string()),
            HandshakeError::TokenExchange { .. } => DachError::bad_gateway(self.to_string()),
            HandshakeError::Storage(_) => DachError::general_error("tenant storage failed"),
        }
    }
}

impl From<HandshakeError> for DachError {
    fn from(err: HandshakeError) -> Self {
        let dach = err.to_dach_error();
        dach.with_source(err.into())
    }
}
