//! Tree model error type.

use ojremote_client::RemoteError;
use ojremote_types::RemoteId;

/// Errors from node controllers and the legacy model.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The caller asked for a transition the node's current state forbids,
    /// e.g. expanding a node with no children.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The node was destroyed while the operation was pending.
    #[error("node destroyed")]
    Destroyed,

    /// Expand on an object that has no structural capability.
    #[error("remote {0} is not structural")]
    NotStructural(RemoteId),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl TreeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

pub type Result<T, E = TreeError> = std::result::Result<T, E>;
