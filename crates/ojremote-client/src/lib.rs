//! ojremote client library
//!
//! Typed proxies to server-side job objects over the JSON bridge. A
//! [`RemoteSession`] hands out one [`RemoteProxy`] per remote id; each proxy
//! carries a handler for every capability the server advertised and this
//! client knows (see [`CapabilityRegistry`]). Handlers invoke through a
//! per-proxy [`ClientToolkit`] and listen through the shared [`Notifier`].
//!
//! The HTTP and WebSocket wiring is left to the embedder: implement
//! [`Transport`] and [`Channel`] and hand them to [`RemoteConnection::open`].
//! The [`loopback`] module provides an in-memory server implementing both.

pub mod capability;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod invoker;
pub mod loopback;
pub mod notifier;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod toolkit;

pub use capability::{
    Binding, Capability, CapabilityTag, ConfigurationOwner, Iconic, Object, Resettable, Runnable,
    Stateful, Stoppable, Structural,
};
pub use config::SessionConfig;
pub use connection::RemoteConnection;
pub use error::{RemoteError, Result};
pub use handlers::{
    ConfigurationOwnerHandler, IconEvent, IconListener, IconicHandler, ObjectHandler,
    ResettableHandler, RunnableHandler, StateListener, StatefulHandler, StoppableHandler,
    StructuralHandler, StructuralListener,
};
pub use invoker::{HttpInvoker, Invoker, Transport, TransportResponse};
pub use notifier::{Channel, MpscChannel, NotificationListener, Notifier};
pub use proxy::{HandlerManager, RemoteProxy};
pub use registry::{CapabilityRegistry, HandlerContext, HandlerFactory, TypeDescriptor, TypeRegistry};
pub use session::RemoteSession;
pub use toolkit::{Arg, ClientToolkit, Returned};
