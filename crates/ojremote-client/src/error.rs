//! Client error type.

use std::time::Duration;

use ojremote_types::RemoteId;

/// Errors from the remoting layer.
///
/// Unknown capabilities and notifications for pairs nobody listens to are
/// not errors; they are logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The server answered with something the bridge does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The invoke transport reported a non-success status.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The invoke transport returned no body.
    #[error("empty response body")]
    EmptyBody,

    /// The body parsed but is not a `{type, value}` response.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A transportable reference named a remote this session never created.
    #[error("No remote for {0}")]
    NoRemote(RemoteId),

    /// A type identity or wire name was registered twice.
    #[error("Already registered: {name}")]
    DuplicateRegistration { name: String },

    /// Lookup of a type identity or wire name that was never registered.
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// An invocation did not complete before its deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: String, after: Duration },

    /// The owning session was dropped while a handler still held a toolkit.
    #[error("session closed")]
    SessionClosed,

    /// The notification channel can no longer send.
    #[error("notification channel closed")]
    ChannelClosed,

    /// Transport-level failure below the JSON layer.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Protocol-level failures that should surface at the UI boundary.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_)
                | Self::HttpStatus { .. }
                | Self::EmptyBody
                | Self::MalformedResponse(_)
                | Self::NoRemote(_)
        )
    }
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
