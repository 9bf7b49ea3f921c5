//! ojremote job tree model
//!
//! Turns remote job objects into a navigable tree. Each node is a
//! [`ProxyNodeController`] over one [`RemoteProxy`](ojremote_client::RemoteProxy):
//! it listens to the object's structural notifications, keeps the reported
//! child ids, and while expanded keeps one child node per id, reconciled
//! with [`array_diff`] as the children change.
//!
//! Nodes come from a [`NodeFactory`]; [`SessionNodeFactory`] builds them on a
//! [`RemoteSession`](ojremote_client::RemoteSession). [`SelectionBridge`]
//! keeps one selected node per tree. [`PollingTreeModel`] is the older
//! poll-driven model, kept for servers without structural notifications.

pub mod controller;
pub mod diff;
pub mod error;
pub mod factory;
pub mod legacy;
pub mod selection;

pub use controller::{NodeEvent, NodeListener, NodeStructure, ProxyNodeController};
pub use diff::{DiffKind, DiffOp, apply_diff, array_diff, array_diff_by};
pub use error::{Result, TreeError};
pub use factory::{NodeFactory, SessionNodeFactory};
pub use legacy::{NodeData, NodeInfo, PollRequest, PollResponse, PollingTreeModel, TreeChange};
pub use selection::SelectionBridge;
