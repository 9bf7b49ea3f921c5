//! One live connection: session plus notification pump.
//!
//! ```text
//!   Transport (HTTP POST)  ◀──  HttpInvoker  ◀──  ClientToolkit  ◀──  handlers
//!   Channel (send)         ◀──  Notifier     ◀──  subscribe/unsubscribe
//!   inbound (recv)         ──▶  pump task    ──▶  Notifier::dispatch_text
//! ```
//!
//! The pump is a single task reading the inbound channel, so notifications
//! are dispatched in the order they arrived.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::config::SessionConfig;
use crate::invoker::{HttpInvoker, Transport};
use crate::notifier::{Channel, Notifier};
use crate::registry::CapabilityRegistry;
use crate::session::RemoteSession;

pub struct RemoteConnection {
    session: RemoteSession,
    pump: JoinHandle<()>,
}

impl RemoteConnection {
    /// Wire a session to its transports and start the notification pump.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        transport: Arc<dyn Transport>,
        channel: Arc<dyn Channel>,
        inbound: mpsc::UnboundedReceiver<String>,
        registry: CapabilityRegistry,
        config: SessionConfig,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(channel));
        let invoker = Arc::new(HttpInvoker::new(transport));
        let session = RemoteSession::new(invoker, notifier.clone(), Arc::new(registry), config);
        let pump = tokio::spawn(pump(notifier, inbound).instrument(info_span!("notify.pump")));
        Self { session, pump }
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        !self.pump.is_finished()
    }

    /// Stop dispatching notifications. The session stays usable for calls.
    pub fn close(&self) {
        self.pump.abort();
    }
}

impl Drop for RemoteConnection {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump(notifier: Arc<Notifier>, mut inbound: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = inbound.recv().await {
        if let Err(e) = notifier.dispatch_text(&text) {
            warn!("malformed notification dropped: {e}");
        }
    }
    debug!("notification channel closed");
}
