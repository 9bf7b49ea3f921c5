//! Client configuration constants.
//!
//! Centralizes the reserved operation names and defaults used by the session
//! and the capability handlers.

/// Operation every remote object answers with its advertised capabilities.
pub const DESCRIBE_OPERATION: &str = "serverInfo";

/// Operation that returns the most recently fired notification of a type.
///
/// Called once when a handler first subscribes, to cover events that fired
/// before the subscription reached the server.
pub const SYNCHRONIZE_OPERATION: &str = "synchronize";

/// Fetches the image for an icon id.
pub const ICON_FOR_ID_OPERATION: &str = "iconForId";

/// Default invocation deadline. `None` waits forever, which is how the bridge
/// has always behaved; set `SessionConfig::invoke_timeout_ms` to bound calls.
pub const DEFAULT_INVOKE_TIMEOUT_MS: Option<u64> = None;

/// HTTP status the invoke transport must report for a usable body.
pub const HTTP_OK: u16 = 200;
