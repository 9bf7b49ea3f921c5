//! Stateful: the remote job's state.
//!
//! Same subscription shape as [`IconicHandler`](super::IconicHandler) without
//! the second fetch: the notification carries the [`StateData`] itself, so the
//! sequence check alone decides which event wins.

use std::sync::{Arc, Weak};

use ojremote_types::{NotificationMessage, NotificationType, StateData, names};
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{Listeners, Subscription};
use crate::capability::Binding;
use crate::error::Result;
use crate::notifier::NotificationListener;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

pub type StateListener = Arc<dyn Fn(&StateData) + Send + Sync>;

#[derive(Default)]
struct State {
    listeners: Listeners<dyn Fn(&StateData) + Send + Sync>,
    last_sequence: Option<u64>,
    current: Option<StateData>,
}

pub struct StatefulHandler {
    me: Weak<StatefulHandler>,
    subscription: Subscription,
    state: Mutex<State>,
    delivery: Mutex<()>,
}

impl StatefulHandler {
    pub(crate) fn new(toolkit: ClientToolkit) -> Arc<Self> {
        let notification_type = NotificationType::new(names::STATE_CHANGED, names::STATE_DATA);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            subscription: Subscription::new(toolkit, notification_type),
            state: Mutex::new(State::default()),
            delivery: Mutex::new(()),
        })
    }

    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Stateful(StatefulHandler::new(ctx.toolkit.clone())))
    }

    pub async fn add_state_listener(&self, listener: StateListener) -> Result<()> {
        let first = {
            let _delivery = self.delivery.lock();
            let (first, current) = {
                let mut state = self.state.lock();
                (state.listeners.add(listener.clone()), state.current.clone())
            };
            if let Some(current) = current {
                listener(&current);
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
                if let Err(close) = self.remove_state_listener(&listener) {
                    warn!(remote_id = %self.subscription.toolkit().remote_id(), "state unsubscribe failed: {close}");
                }
                return Err(e);
            }
        };
        if let Some(last) = last {
            self.on_notification(&last);
        }
        Ok(())
    }

    pub fn remove_state_listener(&self, listener: &StateListener) -> Result<()> {
        let emptied = {
            let mut state = self.state.lock();
            let emptied = state.listeners.remove(listener);
            if emptied {
                state.last_sequence = None;
                state.current = None;
            }
            emptied
        };
        if emptied {
            self.subscription.close()?;
        }
        Ok(())
    }

    /// Last state applied while someone was listening.
    pub fn current_state(&self) -> Option<StateData> {
        self.state.lock().current.clone()
    }

    pub(crate) fn destroy(&self) {
        self.state.lock().listeners.take();
        if let Err(e) = self.subscription.close() {
            warn!(remote_id = %self.subscription.toolkit().remote_id(), "state unsubscribe failed: {e}");
        }
    }

    fn on_notification(&self, message: &NotificationMessage) {
        let data = message.data.clone().unwrap_or_default();
        let state_data: StateData = match serde_json::from_value(data) {
            Ok(s) => s,
            Err(e) => {
                warn!(remote_id = %message.remote_id, "bad state notification: {e}");
                return;
            }
        };

        let _delivery = self.delivery.lock();
        let listeners = {
            let mut state = self.state.lock();
            if state.last_sequence.is_some_and(|last| message.sequence <= last) {
                trace!(remote_id = %message.remote_id, sequence = message.sequence, "stale state notification");
                return;
            }
            state.last_sequence = Some(message.sequence);
            state.current = Some(state_data.clone());
            state.listeners.snapshot()
        };
        for listener in listeners {
            listener(&state_data);
        }
    }
}
