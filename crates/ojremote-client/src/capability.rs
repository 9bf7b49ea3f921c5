//! Capability tags and handler bindings.
//!
//! A proxy carries a set of tag → handler bindings. Queries go through the
//! tag ([`RemoteProxy::is_a`](crate::RemoteProxy::is_a)) or a zero-sized
//! marker type implementing [`Capability`]
//! ([`RemoteProxy::as_capability`](crate::RemoteProxy::as_capability)), so
//! the caller gets the concrete handler type back without any downcasting.

use std::fmt;
use std::sync::Arc;

use ojremote_types::names;

use crate::handlers::{
    ConfigurationOwnerHandler, IconicHandler, ObjectHandler, ResettableHandler, RunnableHandler,
    StatefulHandler, StoppableHandler, StructuralHandler,
};

/// Every capability this client can bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityTag {
    Object,
    Iconic,
    Structural,
    Stateful,
    Runnable,
    Resettable,
    Stoppable,
    ConfigurationOwner,
}

impl CapabilityTag {
    pub const ALL: [CapabilityTag; 8] = [
        CapabilityTag::Object,
        CapabilityTag::Iconic,
        CapabilityTag::Structural,
        CapabilityTag::Stateful,
        CapabilityTag::Runnable,
        CapabilityTag::Resettable,
        CapabilityTag::Stoppable,
        CapabilityTag::ConfigurationOwner,
    ];

    /// Standard wire name the server advertises for this capability.
    pub fn wire_name(self) -> &'static str {
        match self {
            CapabilityTag::Object => names::OBJECT,
            CapabilityTag::Iconic => names::ICONIC,
            CapabilityTag::Structural => names::STRUCTURAL,
            CapabilityTag::Stateful => names::STATEFUL,
            CapabilityTag::Runnable => names::RUNNABLE,
            CapabilityTag::Resettable => names::RESETTABLE,
            CapabilityTag::Stoppable => names::STOPPABLE,
            CapabilityTag::ConfigurationOwner => names::CONFIGURATION_OWNER,
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.wire_name() == name)
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One bound handler.
#[derive(Clone)]
pub enum Binding {
    Object(Arc<ObjectHandler>),
    Iconic(Arc<IconicHandler>),
    Structural(Arc<StructuralHandler>),
    Stateful(Arc<StatefulHandler>),
    Runnable(Arc<RunnableHandler>),
    Resettable(Arc<ResettableHandler>),
    Stoppable(Arc<StoppableHandler>),
    ConfigurationOwner(Arc<ConfigurationOwnerHandler>),
}

impl Binding {
    pub fn tag(&self) -> CapabilityTag {
        match self {
            Binding::Object(_) => CapabilityTag::Object,
            Binding::Iconic(_) => CapabilityTag::Iconic,
            Binding::Structural(_) => CapabilityTag::Structural,
            Binding::Stateful(_) => CapabilityTag::Stateful,
            Binding::Runnable(_) => CapabilityTag::Runnable,
            Binding::Resettable(_) => CapabilityTag::Resettable,
            Binding::Stoppable(_) => CapabilityTag::Stoppable,
            Binding::ConfigurationOwner(_) => CapabilityTag::ConfigurationOwner,
        }
    }

    /// Release anything the handler holds on the server (subscriptions).
    pub(crate) fn destroy(&self) {
        match self {
            Binding::Iconic(h) => h.destroy(),
            Binding::Structural(h) => h.destroy(),
            Binding::Stateful(h) => h.destroy(),
            Binding::Object(_)
            | Binding::Runnable(_)
            | Binding::Resettable(_)
            | Binding::Stoppable(_)
            | Binding::ConfigurationOwner(_) => {}
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding({})", self.tag())
    }
}

/// Typed view of one capability.
pub trait Capability: 'static {
    const TAG: CapabilityTag;
    type Handler: Send + Sync + 'static;

    fn select(binding: &Binding) -> Option<&Arc<Self::Handler>>;
}

macro_rules! capability_marker {
    ($marker:ident, $handler:ty) => {
        #[doc = concat!("Marker for the `", stringify!($marker), "` capability.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $marker;

        impl Capability for $marker {
            const TAG: CapabilityTag = CapabilityTag::$marker;
            type Handler = $handler;

            fn select(binding: &Binding) -> Option<&Arc<$handler>> {
                match binding {
                    Binding::$marker(handler) => Some(handler),
                    _ => None,
                }
            }
        }
    };
}

capability_marker!(Object, ObjectHandler);
capability_marker!(Iconic, IconicHandler);
capability_marker!(Structural, StructuralHandler);
capability_marker!(Stateful, StatefulHandler);
capability_marker!(Runnable, RunnableHandler);
capability_marker!(Resettable, ResettableHandler);
capability_marker!(Stoppable, StoppableHandler);
capability_marker!(ConfigurationOwner, ConfigurationOwnerHandler);
