//! Well-known wire type names.
//!
//! The bridge speaks in the server's class names. Everything that crosses the
//! wire as a type tag (capabilities, declared return types, parameter types,
//! notification data types) is one of these strings or an array form of one.

// ── Primitive and platform types ────────────────────────────────────────────

pub const VOID: &str = "void";
pub const BOOLEAN: &str = "boolean";
pub const INT: &str = "int";
pub const LONG: &str = "long";
pub const STRING: &str = "java.lang.String";
pub const OBJECT: &str = "java.lang.Object";

/// Declared type of an argument or result that is itself a remote object.
pub const TRANSPORTABLE: &str = "org.oddjob.remote.Transportable";

// ── Capabilities ────────────────────────────────────────────────────────────

pub const ICONIC: &str = "org.oddjob.Iconic";
pub const STRUCTURAL: &str = "org.oddjob.Structural";
pub const STATEFUL: &str = "org.oddjob.state.Stateful";
pub const RUNNABLE: &str = "java.lang.Runnable";
pub const RESETTABLE: &str = "org.oddjob.Resettable";
pub const STOPPABLE: &str = "org.oddjob.Stoppable";
pub const CONFIGURATION_OWNER: &str = "org.oddjob.arooa.parsing.ConfigurationOwner";

// ── Payload types ───────────────────────────────────────────────────────────

pub const SERVER_INFO: &str = "org.oddjob.jmx.server.ServerInfo";
pub const IMAGE_DATA: &str = "org.oddjob.images.ImageData";
pub const STRUCTURAL_DATA: &str = "org.oddjob.structural.ChildData";
pub const STATE_DATA: &str = "org.oddjob.state.StateData";
pub const NOTIFICATION: &str = "org.oddjob.remote.Notification";

// ── Notification channels ───────────────────────────────────────────────────

pub const ICON_CHANGED: &str = "org.oddjob.iconic.IconChanged";
pub const CHILDREN_CHANGED: &str = "org.oddjob.structural.ChildrenChanged";
pub const STATE_CHANGED: &str = "org.oddjob.state.StateChanged";
