//! Session configuration.
//!
//! Loaded from RON, e.g.
//!
//! ```ron
//! (
//!     invoke_timeout_ms: Some(5000),
//!     evict_on_destroy: true,
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INVOKE_TIMEOUT_MS, DESCRIBE_OPERATION};
use crate::error::{RemoteError, Result};

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline applied to every toolkit invocation. `None` never times out.
    pub invoke_timeout_ms: Option<u64>,

    /// Drop a proxy from the session maps when it is destroyed, so the next
    /// `get_or_create` describes the object again.
    pub evict_on_destroy: bool,

    /// Name of the capability discovery operation.
    pub describe_operation: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            evict_on_destroy: true,
            describe_operation: DESCRIBE_OPERATION.to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse from RON text. Missing fields take their defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| RemoteError::Config(e.to_string()))
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn invoke_timeout(&self) -> Option<Duration> {
        self.invoke_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_never_time_out() {
        let config = SessionConfig::default();
        assert_eq!(config.invoke_timeout(), None);
        assert!(config.evict_on_destroy);
        assert_eq!(config.describe_operation, "serverInfo");
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = SessionConfig::from_ron("(invoke_timeout_ms: Some(250))").unwrap();
        assert_eq!(config.invoke_timeout(), Some(Duration::from_millis(250)));
        assert!(config.evict_on_destroy);
    }

    #[test]
    fn test_bad_ron_is_config_error() {
        let err = SessionConfig::from_ron("(invoke_timeout_ms: \"soon\")").unwrap_err();
        assert!(matches!(err, RemoteError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(evict_on_destroy: false)").unwrap();
        let config = SessionConfig::load(file.path()).unwrap();
        assert!(!config.evict_on_destroy);
    }
}
