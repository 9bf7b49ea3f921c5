//! Remote session: identity map from remote id to proxy.
//!
//! A session guarantees one [`RemoteProxy`] per remote id for as long as the
//! proxy lives in it. Creation describes the object once (the reserved
//! `serverInfo` operation), binds a handler for every advertised capability
//! the [`CapabilityRegistry`] knows, and publishes the proxy.
//!
//! Concurrent [`RemoteSession::get_or_create`] calls for an id nobody has
//! created yet share a single in-flight creation, so they all resolve to the
//! same `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use ojremote_types::{OperationType, RemoteId, ServerInfo, names};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{Instrument, debug, info_span};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::invoker::Invoker;
use crate::notifier::Notifier;
use crate::proxy::{HandlerManager, RemoteProxy};
use crate::registry::{CapabilityRegistry, HandlerContext};
use crate::toolkit::ClientToolkit;

type Pending = Arc<OnceCell<Arc<RemoteProxy>>>;

pub(crate) struct SessionInner {
    invoker: Arc<dyn Invoker>,
    notifier: Arc<Notifier>,
    registry: Arc<CapabilityRegistry>,
    config: SessionConfig,
    // Lock order: pending before proxies.
    pending: Mutex<HashMap<RemoteId, Pending>>,
    proxies: Mutex<HashMap<RemoteId, Arc<RemoteProxy>>>,
}

impl SessionInner {
    pub(crate) fn proxy(&self, remote_id: RemoteId) -> Option<Arc<RemoteProxy>> {
        self.proxies.lock().get(&remote_id).cloned()
    }
}

/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct RemoteSession {
    inner: Arc<SessionInner>,
}

impl RemoteSession {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        notifier: Arc<Notifier>,
        registry: Arc<CapabilityRegistry>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                invoker,
                notifier,
                registry,
                config,
                pending: Mutex::new(HashMap::new()),
                proxies: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The proxy for `remote_id`, describing the remote object on first use.
    pub async fn get_or_create(&self, remote_id: RemoteId) -> Result<Arc<RemoteProxy>> {
        if let Some(proxy) = self.inner.proxy(remote_id) {
            return Ok(proxy);
        }

        let cell = {
            let mut pending = self.inner.pending.lock();
            if let Some(proxy) = self.inner.proxy(remote_id) {
                return Ok(proxy);
            }
            pending.entry(remote_id).or_default().clone()
        };

        let result = cell.get_or_try_init(|| self.create(remote_id)).await.cloned();

        // Dropped on failure too; a later call starts a fresh creation, and
        // publishing in `create` keeps one proxy per id either way.
        let mut pending = self.inner.pending.lock();
        if pending.get(&remote_id).is_some_and(|p| Arc::ptr_eq(p, &cell)) {
            pending.remove(&remote_id);
        }
        drop(pending);
        result
    }

    /// A toolkit for calling operations on `remote_id` that no capability
    /// handler covers.
    pub fn toolkit_for(&self, remote_id: RemoteId) -> ClientToolkit {
        ClientToolkit::new(
            remote_id,
            Arc::downgrade(&self.inner),
            self.inner.invoker.clone(),
            self.inner.notifier.clone(),
            self.inner.config.invoke_timeout(),
        )
    }

    async fn create(&self, remote_id: RemoteId) -> Result<Arc<RemoteProxy>> {
        let toolkit = self.toolkit_for(remote_id);
        let describe = OperationType::new(
            self.inner.config.describe_operation.as_str(),
            names::SERVER_INFO,
            Vec::<String>::new(),
        );
        let info: ServerInfo = toolkit
            .invoke(&describe, Vec::new())
            .instrument(info_span!("session.describe", %remote_id))
            .await?;

        let registry = &self.inner.registry;
        let mut bindings = Vec::with_capacity(info.implementations.len());
        for implementation in &info.implementations {
            let Some(factory) = registry.factory(&implementation.type_name) else {
                debug!(%remote_id, capability = %implementation.type_name, "unknown capability skipped");
                continue;
            };
            let ctx = HandlerContext { toolkit: &toolkit, types: registry.types(), implementation };
            bindings.push(factory(&ctx)?);
        }

        let proxy = Arc::new(RemoteProxy::new(remote_id, HandlerManager::new(bindings)));
        let published = self.inner.proxies.lock().entry(remote_id).or_insert(proxy.clone()).clone();
        if !Arc::ptr_eq(&published, &proxy) {
            proxy.destroy();
        } else {
            debug!(%remote_id, capabilities = ?proxy.capabilities(), "proxy created");
        }
        Ok(published)
    }

    /// An already created proxy. Never describes.
    pub fn proxy(&self, remote_id: RemoteId) -> Option<Arc<RemoteProxy>> {
        self.inner.proxy(remote_id)
    }

    /// Reverse lookup: the id under which this exact proxy is held.
    pub fn id_for(&self, proxy: &Arc<RemoteProxy>) -> Option<RemoteId> {
        let proxies = self.inner.proxies.lock();
        let held = proxies.get(&proxy.remote_id())?;
        Arc::ptr_eq(held, proxy).then(|| proxy.remote_id())
    }

    /// Destroy the proxy for `remote_id` and, when configured, evict it so the
    /// next `get_or_create` describes the object again.
    ///
    /// Returns false when the session holds no such proxy.
    pub fn destroy(&self, remote_id: RemoteId) -> bool {
        let proxy = if self.inner.config.evict_on_destroy {
            self.inner.proxies.lock().remove(&remote_id)
        } else {
            self.inner.proxy(remote_id)
        };
        match proxy {
            Some(proxy) => {
                proxy.destroy();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.proxies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.proxies.lock().is_empty()
    }

    /// Creations currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.inner.notifier
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}
