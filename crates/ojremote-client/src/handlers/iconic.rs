//! Iconic: the remote object's current icon.
//!
//! Icon-changed notifications carry an icon id; the image itself is fetched
//! with `iconForId`. Notifications and their fetches can complete in any
//! order, so two rules decide what listeners see:
//!
//! - a notification whose sequence is not newer than the last one accepted is
//!   dropped (this is how a stale `synchronize` result loses to a live event);
//! - a fetched image is applied only if its icon id is still the most recently
//!   *requested* one, so a slow fetch never overwrites a fresher icon.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use ojremote_types::{ImageData, NotificationMessage, NotificationType, OperationType, names};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{Listeners, Subscription};
use crate::capability::Binding;
use crate::constants::ICON_FOR_ID_OPERATION;
use crate::error::Result;
use crate::notifier::NotificationListener;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::{Arg, ClientToolkit};

/// An icon that has been fetched and applied.
#[derive(Clone, Debug, PartialEq)]
pub struct IconEvent {
    pub icon_id: String,
    pub image: Arc<ImageData>,
}

pub type IconListener = Arc<dyn Fn(&IconEvent) + Send + Sync>;

#[derive(Default)]
struct IconState {
    listeners: Listeners<dyn Fn(&IconEvent) + Send + Sync>,
    last_sequence: Option<u64>,
    requested: Option<String>,
    current: Option<IconEvent>,
}

pub struct IconicHandler {
    me: Weak<IconicHandler>,
    subscription: Subscription,
    state: Mutex<IconState>,
    // Held while calling listeners so deliveries never reorder. Taken before `state`.
    delivery: Mutex<()>,
    cache: Mutex<HashMap<String, Arc<ImageData>>>,
}

impl IconicHandler {
    pub(crate) fn new(toolkit: ClientToolkit) -> Arc<Self> {
        let notification_type = NotificationType::new(names::ICON_CHANGED, names::STRING);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            subscription: Subscription::new(toolkit, notification_type),
            state: Mutex::new(IconState::default()),
            delivery: Mutex::new(()),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Iconic(IconicHandler::new(ctx.toolkit.clone())))
    }

    /// Fetch the image for `icon_id`.
    pub async fn icon_for_id(&self, icon_id: &str) -> Result<ImageData> {
        let op = OperationType::new(ICON_FOR_ID_OPERATION, names::IMAGE_DATA, [names::STRING]);
        self.subscription.toolkit().invoke(&op, vec![Arg::from(icon_id)]).await
    }

    /// Listen for icon changes.
    ///
    /// A listener added while an icon is already applied receives it straight
    /// away. The first listener subscribes and synchronizes.
    pub async fn add_icon_listener(&self, listener: IconListener) -> Result<()> {
        let first = {
            let _delivery = self.delivery.lock();
            let (first, current) = {
                let mut state = self.state.lock();
                (state.listeners.add(listener.clone()), state.current.clone())
            };
            if let Some(event) = current {
                listener(&event);
            }
            first
        };
        if !first {
            return Ok(());
        }

        let me = self.me.clone();
        let on_message: NotificationListener = Arc::new(move |message| {
            if let Some(handler) = me.upgrade() {
                handler.on_notification(message);
            }
        });
        if let Err(e) = self.subscription.open(on_message) {
            self.state.lock().listeners.remove(&listener);
            return Err(e);
        }

        let last = match self.subscription.synchronize().await {
            Ok(last) => last,
            Err(e) => {
                // Undone so the next first listener subscribes and synchronizes again.
                if let Err(close) = self.remove_icon_listener(&listener) {
                    warn!(remote_id = %self.remote_id(), "icon unsubscribe failed: {close}");
                }
                return Err(e);
            }
        };
        if let Some(last) = last {
            trace!(remote_id = %self.remote_id(), sequence = last.sequence, "icon synchronized");
            self.on_notification(&last);
        }
        Ok(())
    }

    /// Stop listening. The last listener out unsubscribes and forgets the
    /// applied icon; fetched images stay cached.
    pub fn remove_icon_listener(&self, listener: &IconListener) -> Result<()> {
        let emptied = {
            let mut state = self.state.lock();
            let emptied = state.listeners.remove(listener);
            if emptied {
                state.last_sequence = None;
                state.requested = None;
                state.current = None;
            }
            emptied
        };
        if emptied {
            self.subscription.close()?;
        }
        Ok(())
    }

    pub fn current_icon(&self) -> Option<IconEvent> {
        self.state.lock().current.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub(crate) fn destroy(&self) {
        {
            let mut state = self.state.lock();
            state.listeners.take();
            state.requested = None;
        }
        if let Err(e) = self.subscription.close() {
            warn!(remote_id = %self.remote_id(), "icon unsubscribe failed: {e}");
        }
    }

    fn remote_id(&self) -> ojremote_types::RemoteId {
        self.subscription.toolkit().remote_id()
    }

    fn on_notification(&self, message: &NotificationMessage) {
        let Some(icon_id) = message.data.as_ref().and_then(Value::as_str) else {
            warn!(remote_id = %message.remote_id, "icon notification without an icon id");
            return;
        };
        let icon_id = icon_id.to_string();

        let cached = {
            let mut state = self.state.lock();
            if state.last_sequence.is_some_and(|last| message.sequence <= last) {
                trace!(remote_id = %message.remote_id, sequence = message.sequence, "stale icon notification");
                return;
            }
            state.last_sequence = Some(message.sequence);
            state.requested = Some(icon_id.clone());
            self.cache.lock().get(&icon_id).cloned()
        };

        match cached {
            Some(image) => self.apply(&icon_id, image),
            None => self.fetch(icon_id),
        }
    }

    fn fetch(&self, icon_id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(remote_id = %self.remote_id(), %icon_id, "no runtime to fetch icon on");
            return;
        };
        let me = self.me.clone();
        runtime.spawn(async move {
            let Some(handler) = me.upgrade() else {
                return;
            };
            match handler.icon_for_id(&icon_id).await {
                Ok(image) => {
                    let image = Arc::new(image);
                    handler.cache.lock().insert(icon_id.clone(), image.clone());
                    handler.apply(&icon_id, image);
                }
                Err(e) => warn!(remote_id = %handler.remote_id(), %icon_id, "icon fetch failed: {e}"),
            }
        });
    }

    fn apply(&self, icon_id: &str, image: Arc<ImageData>) {
        let _delivery = self.delivery.lock();
        let (listeners, event) = {
            let mut state = self.state.lock();
            if state.requested.as_deref() != Some(icon_id) {
                debug!(remote_id = %self.remote_id(), %icon_id, "superseded icon discarded");
                return;
            }
            let event = IconEvent { icon_id: icon_id.to_string(), image };
            state.current = Some(event.clone());
            (state.listeners.snapshot(), event)
        };
        for listener in listeners {
            listener(&event);
        }
    }
}
