// Core notification pipeline components
// Typed records, permission state, connection state, and the prompt machine

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub mod connection;
pub mod permission;
pub mod prompt;
pub mod record;

pub use connection::{ConnectionState, StreamSession};
pub use permission::{PermissionGate, PermissionState};
pub use prompt::{PermissionPrompt, PromptState};
pub use record::{
    NotificationRecord, PresentationOverrides, RecordPayload, StreamHandshake, Urgency,
    decode_handshake, decode_record,
};

/// Boxed future used at the platform and sink trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error types for the notification pipeline
#[derive(Debug, Error)]
pub enum NotifyError {
    /// No notification surface exists on this host. The feature is disabled,
    /// not broken.
    #[error("platform notification surface is not available on this host")]
    Unsupported,

    /// The platform surface rejected an operation.
    #[error("surface error: {message}")]
    Surface { message: String },

    /// The configured backend base cannot produce a stream endpoint.
    #[error("invalid backend endpoint: {message}")]
    Endpoint { message: String },

    /// Transport-level failure on the event stream.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A push message payload did not match the expected shape.
    #[error("malformed {channel} payload: {source}")]
    Decode {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl NotifyError {
    pub(crate) fn surface(message: impl Into<String>) -> Self {
        NotifyError::Surface {
            message: message.into(),
        }
    }
}

impl From<url::ParseError> for NotifyError {
    fn from(err: url::ParseError) -> Self {
        NotifyError::Endpoint {
            message: err.to_string(),
        }
    }
}

/// Type alias for pipeline results
pub type NotifyResult<T> = Result<T, NotifyError>;
