//! Capability handlers.
//!
//! One handler type per [`CapabilityTag`](crate::CapabilityTag). Handlers that
//! listen for server notifications share [`Subscription`]: subscribe lazily on
//! the first local listener, fetch the last fired notification once with
//! `synchronize`, and unsubscribe when the last local listener goes.

mod configuration_owner;
mod iconic;
mod object;
mod resettable;
mod runnable;
mod stateful;
mod stoppable;
mod structural;

use std::sync::Arc;

use ojremote_types::{NotificationMessage, NotificationType, OperationType, names};
use parking_lot::Mutex;

use crate::capability::{
    Capability, ConfigurationOwner, Iconic, Object, Resettable, Runnable, Stateful, Stoppable,
    Structural,
};
use crate::constants::SYNCHRONIZE_OPERATION;
use crate::error::Result;
use crate::notifier::NotificationListener;
use crate::registry::CapabilityRegistry;
use crate::toolkit::{Arg, ClientToolkit};

pub use configuration_owner::ConfigurationOwnerHandler;
pub use iconic::{IconEvent, IconListener, IconicHandler};
pub use object::ObjectHandler;
pub use resettable::ResettableHandler;
pub use runnable::RunnableHandler;
pub use stateful::{StateListener, StatefulHandler};
pub use stoppable::StoppableHandler;
pub use structural::{StructuralListener, StructuralHandler};

/// Register every built-in capability under its standard wire name.
pub fn register_defaults(registry: &mut CapabilityRegistry) -> Result<()> {
    registry.register::<Object>(Object::TAG.wire_name(), ObjectHandler::factory())?;
    registry.register::<Iconic>(Iconic::TAG.wire_name(), IconicHandler::factory())?;
    registry.register::<Structural>(Structural::TAG.wire_name(), StructuralHandler::factory())?;
    registry.register::<Stateful>(Stateful::TAG.wire_name(), StatefulHandler::factory())?;
    registry.register::<Runnable>(Runnable::TAG.wire_name(), RunnableHandler::factory())?;
    registry.register::<Resettable>(Resettable::TAG.wire_name(), ResettableHandler::factory())?;
    registry.register::<Stoppable>(Stoppable::TAG.wire_name(), StoppableHandler::factory())?;
    registry.register::<ConfigurationOwner>(
        ConfigurationOwner::TAG.wire_name(),
        ConfigurationOwnerHandler::factory(),
    )?;
    Ok(())
}

// ============================================================================
// Subscription
// ============================================================================

/// The server-side half of a notifying handler: at most one notifier
/// listener for one notification type on one remote object.
pub(crate) struct Subscription {
    toolkit: ClientToolkit,
    notification_type: NotificationType,
    listener: Mutex<Option<NotificationListener>>,
}

impl Subscription {
    pub(crate) fn new(toolkit: ClientToolkit, notification_type: NotificationType) -> Self {
        Self { toolkit, notification_type, listener: Mutex::new(None) }
    }

    pub(crate) fn toolkit(&self) -> &ClientToolkit {
        &self.toolkit
    }

    /// Subscribe with `listener` unless already subscribed.
    pub(crate) fn open(&self, listener: NotificationListener) -> Result<()> {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return Ok(());
        }
        self.toolkit
            .add_notification_listener(&self.notification_type, listener.clone())?;
        *slot = Some(listener);
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<()> {
        let Some(listener) = self.listener.lock().take() else {
            return Ok(());
        };
        self.toolkit
            .remove_notification_listener(&self.notification_type, &listener)
    }

    /// The most recently fired notification of this type, if any fired yet.
    pub(crate) async fn synchronize(&self) -> Result<Option<NotificationMessage>> {
        let op = OperationType::new(SYNCHRONIZE_OPERATION, names::NOTIFICATION, [names::STRING]);
        self.toolkit
            .invoke(&op, vec![Arg::from(self.notification_type.name.as_str())])
            .await
    }
}

/// Shared listener list with identity-based removal.
pub(crate) struct Listeners<L: ?Sized> {
    entries: Vec<Arc<L>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<L: ?Sized> Listeners<L> {
    /// Returns true when this was the first listener.
    pub(crate) fn add(&mut self, listener: Arc<L>) -> bool {
        self.entries.push(listener);
        self.entries.len() == 1
    }

    /// Returns true when the list became empty.
    pub(crate) fn remove(&mut self, listener: &Arc<L>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|l| !Arc::ptr_eq(l, listener));
        before != self.entries.len() && self.entries.is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.clone()
    }

    pub(crate) fn take(&mut self) -> Vec<Arc<L>> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
