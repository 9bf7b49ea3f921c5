//! Notification subscription and dispatch.
//!
//! The [`Notifier`] owns the client side of the notification channel. It keeps
//! one listener list per `(remote id, notification type name)` pair and talks
//! to the server only on the edges: the first listener of a pair sends `ADD`,
//! removing the last one sends `REMOVE`. Occupancy of the list is the
//! reference count.
//!
//! Inbound messages are dispatched to every listener of their exact pair.
//! Messages for a pair with no listeners are dropped; they are expected while
//! an unsubscribe is still on its way to the server.

use std::collections::HashMap;
use std::sync::Arc;

use ojremote_types::{
    NotificationMessage, NotificationType, RemoteId, SubscriptionAction, SubscriptionMessage,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{RemoteError, Result};

// ============================================================================
// Channel
// ============================================================================

/// Outbound half of the bidirectional notification transport.
///
/// `send` is synchronous so subscription messages leave in the order the
/// notifier produced them.
pub trait Channel: Send + Sync {
    fn send(&self, text: String) -> Result<()>;
}

/// [`Channel`] feeding an unbounded tokio channel, for transports driven by
/// their own task (a WebSocket writer, the loopback server).
pub struct MpscChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl MpscChannel {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Channel for MpscChannel {
    fn send(&self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| RemoteError::ChannelClosed)
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Callback for one notification pair. Identity (pointer equality) is what
/// [`Notifier::remove_notification_listener`] matches on.
pub type NotificationListener = Arc<dyn Fn(&NotificationMessage) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    by_remote: HashMap<RemoteId, HashMap<String, Vec<NotificationListener>>>,
}

impl ListenerTable {
    /// Returns true when this was the first listener of the pair.
    fn add(&mut self, remote_id: RemoteId, type_name: &str, listener: NotificationListener) -> bool {
        let list = self
            .by_remote
            .entry(remote_id)
            .or_default()
            .entry(type_name.to_string())
            .or_default();
        list.push(listener);
        list.len() == 1
    }

    /// Returns `Some(true)` when the pair is now empty, `None` when the
    /// listener was not registered.
    fn remove(
        &mut self,
        remote_id: RemoteId,
        type_name: &str,
        listener: &NotificationListener,
    ) -> Option<bool> {
        let by_type = self.by_remote.get_mut(&remote_id)?;
        let list = by_type.get_mut(type_name)?;
        let pos = list.iter().position(|l| Arc::ptr_eq(l, listener))?;
        list.remove(pos);
        if !list.is_empty() {
            return Some(false);
        }
        by_type.remove(type_name);
        if by_type.is_empty() {
            self.by_remote.remove(&remote_id);
        }
        Some(true)
    }

    fn listeners(&self, remote_id: RemoteId, type_name: &str) -> Vec<NotificationListener> {
        self.by_remote
            .get(&remote_id)
            .and_then(|by_type| by_type.get(type_name))
            .cloned()
            .unwrap_or_default()
    }

    fn count(&self, remote_id: RemoteId, type_name: &str) -> usize {
        self.by_remote
            .get(&remote_id)
            .and_then(|by_type| by_type.get(type_name))
            .map_or(0, Vec::len)
    }
}

// ============================================================================
// Notifier
// ============================================================================

pub struct Notifier {
    channel: Arc<dyn Channel>,
    table: Mutex<ListenerTable>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel, table: Mutex::new(ListenerTable::default()) }
    }

    /// Register `listener` for `(remote_id, notification_type.name)`.
    ///
    /// Sends `ADD` when the pair goes from zero to one listener. If the send
    /// fails the registration is rolled back.
    pub fn add_notification_listener(
        &self,
        remote_id: RemoteId,
        notification_type: &NotificationType,
        listener: NotificationListener,
    ) -> Result<()> {
        let mut table = self.table.lock();
        if table.add(remote_id, &notification_type.name, listener.clone()) {
            debug!(%remote_id, kind = %notification_type.name, "subscribe");
            let sent = self.send(SubscriptionAction::Add, remote_id, notification_type);
            if sent.is_err() {
                table.remove(remote_id, &notification_type.name, &listener);
            }
            sent?;
        }
        Ok(())
    }

    /// Unregister `listener`. Sends `REMOVE` when the pair's last listener
    /// goes. Removing a listener that is not registered does nothing.
    pub fn remove_notification_listener(
        &self,
        remote_id: RemoteId,
        notification_type: &NotificationType,
        listener: &NotificationListener,
    ) -> Result<()> {
        let mut table = self.table.lock();
        match table.remove(remote_id, &notification_type.name, listener) {
            Some(true) => {
                debug!(%remote_id, kind = %notification_type.name, "unsubscribe");
                self.send(SubscriptionAction::Remove, remote_id, notification_type)
            }
            Some(false) => Ok(()),
            None => {
                trace!(%remote_id, kind = %notification_type.name, "remove of unknown listener");
                Ok(())
            }
        }
    }

    /// Deliver one message to the listeners of its pair, in registration order.
    pub fn dispatch(&self, message: &NotificationMessage) {
        let listeners = self
            .table
            .lock()
            .listeners(message.remote_id, &message.notification_type.name);
        if listeners.is_empty() {
            trace!(
                remote_id = %message.remote_id,
                kind = %message.notification_type.name,
                sequence = message.sequence,
                "no listeners, dropped"
            );
            return;
        }
        for listener in listeners {
            listener(message);
        }
    }

    /// Decode inbound channel text and dispatch it.
    pub fn dispatch_text(&self, text: &str) -> Result<()> {
        let message: NotificationMessage = serde_json::from_str(text)?;
        self.dispatch(&message);
        Ok(())
    }

    pub fn listener_count(&self, remote_id: RemoteId, notification_type: &NotificationType) -> usize {
        self.table.lock().count(remote_id, &notification_type.name)
    }

    fn send(
        &self,
        action: SubscriptionAction,
        remote_id: RemoteId,
        notification_type: &NotificationType,
    ) -> Result<()> {
        trace!(%action, %remote_id, notification = %notification_type.name, "subscription");
        let message = SubscriptionMessage {
            action,
            remote_id,
            notification_type: notification_type.clone(),
        };
        self.channel.send(serde_json::to_string(&message)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn icon_type() -> NotificationType {
        NotificationType::new(ojremote_types::names::ICON_CHANGED, "org.oddjob.iconic.IconData")
    }

    fn counting() -> (NotificationListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: NotificationListener = Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<SubscriptionMessage> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn message(remote_id: u64, sequence: u64) -> NotificationMessage {
        NotificationMessage {
            remote_id: RemoteId::new(remote_id),
            notification_type: icon_type(),
            sequence,
            data: None,
        }
    }

    #[test]
    fn test_add_and_remove_sent_once_per_pair() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let id = RemoteId::new(7);
        let (a, _) = counting();
        let (b, _) = counting();
        let (c, _) = counting();

        notifier.add_notification_listener(id, &icon_type(), a.clone()).unwrap();
        notifier.add_notification_listener(id, &icon_type(), b.clone()).unwrap();
        notifier.add_notification_listener(id, &icon_type(), c.clone()).unwrap();

        let adds = sent(&mut rx);
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].action, SubscriptionAction::Add);
        assert_eq!(adds[0].remote_id, id);
        assert_eq!(notifier.listener_count(id, &icon_type()), 3);

        notifier.remove_notification_listener(id, &icon_type(), &a).unwrap();
        notifier.remove_notification_listener(id, &icon_type(), &b).unwrap();
        assert!(sent(&mut rx).is_empty());

        notifier.remove_notification_listener(id, &icon_type(), &c).unwrap();
        let removes = sent(&mut rx);
        assert_eq!(removes.len(), 1);
        assert_eq!(removes[0].action, SubscriptionAction::Remove);
        assert_eq!(notifier.listener_count(id, &icon_type()), 0);
    }

    #[test]
    fn test_resubscribe_after_drain_sends_add_again() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let id = RemoteId::new(1);
        let (a, _) = counting();

        notifier.add_notification_listener(id, &icon_type(), a.clone()).unwrap();
        notifier.remove_notification_listener(id, &icon_type(), &a).unwrap();
        notifier.add_notification_listener(id, &icon_type(), a.clone()).unwrap();

        let actions: Vec<_> = sent(&mut rx).into_iter().map(|m| m.action).collect();
        assert_eq!(
            actions,
            vec![SubscriptionAction::Add, SubscriptionAction::Remove, SubscriptionAction::Add]
        );
    }

    #[test]
    fn test_removing_unknown_listener_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let (a, _) = counting();
        notifier
            .remove_notification_listener(RemoteId::new(1), &icon_type(), &a)
            .unwrap();
        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn test_dispatch_reaches_exact_pair_only() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let (on_one, one) = counting();
        let (on_two, two) = counting();
        notifier.add_notification_listener(RemoteId::new(1), &icon_type(), on_one).unwrap();
        notifier.add_notification_listener(RemoteId::new(2), &icon_type(), on_two).unwrap();

        notifier.dispatch(&message(1, 10));
        notifier.dispatch(&message(1, 11));
        notifier.dispatch(&message(3, 12));

        let mut other = message(2, 13);
        other.notification_type = NotificationType::new("org.oddjob.Other", "x");
        notifier.dispatch(&other);

        assert_eq!(one.load(Ordering::SeqCst), 2);
        assert_eq!(two.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_text_decodes() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let (listener, count) = counting();
        notifier.add_notification_listener(RemoteId::new(4), &icon_type(), listener).unwrap();

        let text = serde_json::to_string(&message(4, 1)).unwrap();
        notifier.dispatch_text(&text).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(matches!(notifier.dispatch_text("{nope"), Err(RemoteError::Json(_))));
    }

    #[test]
    fn test_closed_channel_rolls_back_add() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = Notifier::new(Arc::new(MpscChannel::new(tx)));
        let (listener, _) = counting();

        let err = notifier
            .add_notification_listener(RemoteId::new(1), &icon_type(), listener)
            .unwrap_err();
        assert!(matches!(err, RemoteError::ChannelClosed));
        assert_eq!(notifier.listener_count(RemoteId::new(1), &icon_type()), 0);
    }
}
