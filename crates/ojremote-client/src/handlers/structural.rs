//! Structural: the remote object's child ids.
//!
//! Unlike [`IconicHandler`](super::IconicHandler) nothing is cached: every
//! children-changed event is passed straight through as an id slice. The
//! `synchronize` result fetched when a listener is added goes to that listener
//! only, and is dropped if the listener has meanwhile seen a newer live event.

use std::sync::{Arc, Weak};

use ojremote_types::{
    NotificationMessage, NotificationType, RemoteId, StructuralData, names,
};
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::Subscription;
use crate::capability::Binding;
use crate::error::Result;
use crate::notifier::NotificationListener;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

pub type StructuralListener = Arc<dyn Fn(&[RemoteId]) + Send + Sync>;

struct Entry {
    listener: StructuralListener,
    /// Sequence of the last event this listener received.
    seen: Option<u64>,
}

impl Entry {
    fn accepts(&self, sequence: u64) -> bool {
        self.seen.is_none_or(|seen| sequence > seen)
    }
}

pub struct StructuralHandler {
    me: Weak<StructuralHandler>,
    subscription: Subscription,
    entries: Mutex<Vec<Entry>>,
    // Taken before `entries`.
    delivery: Mutex<()>,
}

impl StructuralHandler {
    pub(crate) fn new(toolkit: ClientToolkit) -> Arc<Self> {
        let notification_type = NotificationType::new(names::CHILDREN_CHANGED, names::STRUCTURAL_DATA);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            subscription: Subscription::new(toolkit, notification_type),
            entries: Mutex::new(Vec::new()),
            delivery: Mutex::new(()),
        })
    }

    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Structural(StructuralHandler::new(ctx.toolkit.clone())))
    }

    pub async fn add_structural_listener(&self, listener: StructuralListener) -> Result<()> {
        let first = {
            let mut entries = self.entries.lock();
            entries.push(Entry { listener: listener.clone(), seen: None });
            entries.len() == 1
        };

        if first {
            let me = self.me.clone();
            let on_message: NotificationListener = Arc::new(move |message| {
                if let Some(handler) = me.upgrade() {
                    handler.on_notification(message);
                }
            });
            if let Err(e) = self.subscription.open(on_message) {
                self.entries.lock().retain(|e| !Arc::ptr_eq(&e.listener, &listener));
                return Err(e);
            }
        }

        let last = match self.subscription.synchronize().await {
            Ok(last) => last,
            Err(e) => {
                if let Err(close) = self.remove_structural_listener(&listener) {
                    warn!(remote_id = %self.subscription.toolkit().remote_id(), "structural unsubscribe failed: {close}");
                }
                return Err(e);
            }
        };
        if let Some(last) = last {
            self.deliver_to(&listener, &last);
        }
        Ok(())
    }

    pub fn remove_structural_listener(&self, listener: &StructuralListener) -> Result<()> {
        let emptied = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|e| !Arc::ptr_eq(&e.listener, listener));
            before != entries.len() && entries.is_empty()
        };
        if emptied {
            self.subscription.close()?;
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn destroy(&self) {
        self.entries.lock().clear();
        if let Err(e) = self.subscription.close() {
            warn!(remote_id = %self.subscription.toolkit().remote_id(), "structural unsubscribe failed: {e}");
        }
    }

    fn on_notification(&self, message: &NotificationMessage) {
        let Some(children) = children_of(message) else {
            return;
        };
        let _delivery = self.delivery.lock();
        let listeners: Vec<StructuralListener> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|e| e.accepts(message.sequence))
                .map(|e| {
                    e.seen = Some(message.sequence);
                    e.listener.clone()
                })
                .collect()
        };
        for listener in listeners {
            listener(&children);
        }
    }

    fn deliver_to(&self, listener: &StructuralListener, message: &NotificationMessage) {
        let Some(children) = children_of(message) else {
            return;
        };
        let _delivery = self.delivery.lock();
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.iter_mut().find(|e| Arc::ptr_eq(&e.listener, listener)) else {
                return;
            };
            if !entry.accepts(message.sequence) {
                trace!(remote_id = %message.remote_id, sequence = message.sequence, "stale synchronize dropped");
                return;
            }
            entry.seen = Some(message.sequence);
        }
        listener(&children);
    }
}

fn children_of(message: &NotificationMessage) -> Option<Vec<RemoteId>> {
    let data = message.data.clone().unwrap_or_default();
    match serde_json::from_value::<StructuralData>(data) {
        Ok(structure) => Some(structure.children),
        Err(e) => {
            warn!(remote_id = %message.remote_id, "bad children notification: {e}");
            None
        }
    }
}
