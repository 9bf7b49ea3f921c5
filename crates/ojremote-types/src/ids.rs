//! Remote object identifiers.
//!
//! A [`RemoteId`] is assigned by the server and is unique within one session.
//! It is a bare JSON number on the wire and displays as that number in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Server-assigned identifier of one remote object.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(u64);

impl RemoteId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RemoteId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<RemoteId> for u64 {
    fn from(id: RemoteId) -> u64 {
        id.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteId({})", self.0)
    }
}

/// Error from parsing a [`RemoteId`] out of text.
#[derive(Debug, thiserror::Error)]
#[error("invalid remote id '{0}'")]
pub struct ParseRemoteIdError(String);

impl FromStr for RemoteId {
    type Err = ParseRemoteIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('#');
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseRemoteIdError(s.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
