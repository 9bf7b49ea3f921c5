//! Payloads carried by capability calls and notifications.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::RemoteId;

/// Icon image bytes as returned by `iconForId`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub mime_type: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), bytes, description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Data of a structural (children changed) notification: the full, ordered
/// child id list at the time of the event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralData {
    #[serde(default)]
    pub children: Vec<RemoteId>,
}

impl StructuralData {
    pub fn new(children: impl IntoIterator<Item = RemoteId>) -> Self {
        Self { children: children.into_iter().collect() }
    }
}

/// Job state as reported by a stateful remote object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum JobState {
    #[default]
    Ready,
    Executing,
    Active,
    Complete,
    Incomplete,
    Exception,
    Destroyed,
    /// Any state name this client does not know yet.
    #[serde(other)]
    #[strum(disabled)]
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Ready => "READY",
            JobState::Executing => "EXECUTING",
            JobState::Active => "ACTIVE",
            JobState::Complete => "COMPLETE",
            JobState::Incomplete => "INCOMPLETE",
            JobState::Exception => "EXCEPTION",
            JobState::Destroyed => "DESTROYED",
            JobState::Unknown => "UNKNOWN",
        }
    }

    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Incomplete | JobState::Exception | JobState::Destroyed
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data of a state-changed notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub state: JobState,
    /// Event time, Unix millis.
    #[serde(default)]
    pub time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structural_data_from_json() {
        let data: StructuralData = serde_json::from_value(json!({"children": [2, 3]})).unwrap();
        assert_eq!(data.children, vec![RemoteId::new(2), RemoteId::new(3)]);
    }

    #[test]
    fn test_unknown_job_state_is_tolerated() {
        let data: StateData =
            serde_json::from_value(json!({"state": "STARTED", "time": 5})).unwrap();
        assert_eq!(data.state, JobState::Unknown);
    }

    #[test]
    fn test_job_state_parse_is_case_insensitive() {
        assert_eq!("complete".parse::<JobState>().unwrap(), JobState::Complete);
        assert!(JobState::Exception.is_terminal());
        assert!(!JobState::Executing.is_terminal());
    }

    #[test]
    fn test_image_data_camel_case() {
        let image = ImageData::new("image/png", vec![1, 2]).with_description("Ready");
        let v = serde_json::to_value(&image).unwrap();
        assert_eq!(v, json!({"mimeType": "image/png", "bytes": [1, 2], "description": "Ready"}));
    }
}
