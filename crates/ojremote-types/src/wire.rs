//! Request, response and notification envelopes.
//!
//! Field names follow the bridge's JSON exactly (`remoteId`, `operationType`,
//! `argTypes`, ...). Declared type names are plain strings; the client crate
//! wraps them in registry descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::ids::RemoteId;

// ============================================================================
// Invocation
// ============================================================================

/// A remote method: name, declared return type, declared parameter types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationType {
    pub name: String,
    /// Declared return type name.
    #[serde(rename = "type")]
    pub return_type: String,
    /// Declared parameter type names, in order.
    #[serde(default)]
    pub signature: Vec<String>,
}

impl OperationType {
    pub fn new(
        name: impl Into<String>,
        return_type: impl Into<String>,
        signature: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            signature: signature.into_iter().map(Into::into).collect(),
        }
    }
}

/// One remote method call.
///
/// `arg_types` is only present when at least one argument was re-typed while
/// marshaling (a proxy passed as a transportable reference).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub remote_id: RemoteId,
    pub operation_type: OperationType,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_types: Option<Vec<String>>,
}

/// Typed result of a remote call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Declared type name of `value`.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl InvokeResponse {
    pub fn new(type_name: impl Into<String>, value: Option<Value>) -> Self {
        Self { type_name: type_name.into(), value }
    }

    /// A `void` response carrying no value.
    pub fn void() -> Self {
        Self::new(crate::names::VOID, None)
    }
}

/// Wire form of "this value is a remote object".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportableRef {
    pub remote_id: RemoteId,
}

// ============================================================================
// Notifications
// ============================================================================

/// A subscribable event channel, scoped to one remote id at use sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationType {
    pub name: String,
    /// Type name of the notification's `data`.
    #[serde(rename = "type")]
    pub data_type: String,
}

impl NotificationType {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into() }
    }
}

/// Subscription direction sent over the notification channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SubscriptionAction {
    Add,
    Remove,
}

/// Outbound subscribe/unsubscribe request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMessage {
    pub action: SubscriptionAction,
    pub remote_id: RemoteId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
}

/// Inbound server-pushed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub remote_id: RemoteId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Capability discovery
// ============================================================================

/// Capabilities a remote object advertises, answered by `serverInfo`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub implementations: Vec<Implementation>,
}

/// One advertised capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// Wire type name of the capability.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialisation: Option<Initialisation>,
}

impl Implementation {
    pub fn new(type_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), version: version.into(), initialisation: None }
    }

    pub fn with_initialisation(mut self, initialisation: Initialisation) -> Self {
        self.initialisation = Some(initialisation);
        self
    }
}

/// Optional handler seed data shipped alongside a capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Initialisation {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub data: Value,
}

// ============================================================================
// Tests
// ============================================================================
