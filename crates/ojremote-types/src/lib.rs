//! Wire-level types for the ojremote JSON bridge.
//!
//! This crate is the protocol foundation: remote identifiers, operation and
//! notification descriptors, request/response envelopes, and the payloads
//! that capability handlers exchange with the server. It has **no internal
//! ojremote dependencies**; it is the leaf crate the client and tree crates
//! build on.
//!
//! # Message Overview
//!
//! ```text
//! HTTP POST  ──▶  InvokeRequest { remoteId, operationType, args, argTypes? }
//!            ◀──  InvokeResponse { type, value? }
//!
//! Channel    ──▶  SubscriptionMessage { action: ADD|REMOVE, remoteId, type }
//!            ◀──  NotificationMessage { remoteId, type, sequence, data? }
//! ```
//!
//! # Key Types
//!
//! |-------------------------|-----------------------------------------------|
//! | Type                    | Purpose                                       |
//! |-------------------------|-----------------------------------------------|
//! | [`RemoteId`]            | Server-assigned id of one remote object       |
//! | [`OperationType`]       | Method name + declared return/param types     |
//! | [`NotificationType`]    | Subscribable event channel on a remote object |
//! | [`InvokeRequest`]       | One remote method call                        |
//! | [`InvokeResponse`]      | Typed result of a call                        |
//! | [`NotificationMessage`] | One inbound server-pushed event               |
//! | [`ServerInfo`]          | Capabilities advertised by a remote object    |
//! | [`TransportableRef`]    | "This value is itself a remote object"        |
//! |-------------------------|-----------------------------------------------|

pub mod ids;
pub mod names;
pub mod payload;
pub mod wire;

pub use ids::{ParseRemoteIdError, RemoteId};
pub use payload::{ImageData, JobState, StateData, StructuralData};
pub use wire::{
    Implementation, Initialisation, InvokeRequest, InvokeResponse, NotificationMessage,
    NotificationType, OperationType, ServerInfo, SubscriptionAction, SubscriptionMessage,
    TransportableRef,
};
