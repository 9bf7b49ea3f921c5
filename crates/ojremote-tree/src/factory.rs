//! Where child nodes come from.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ojremote_client::RemoteSession;
use ojremote_types::RemoteId;
use parking_lot::Mutex;
use tracing::debug;

use crate::controller::ProxyNodeController;
use crate::error::Result;

/// Creates attached nodes for remote ids and is told when one goes away.
#[async_trait]
pub trait NodeFactory: Send + Sync {
    async fn create_node(&self, remote_id: RemoteId) -> Result<Arc<ProxyNodeController>>;

    /// Called once per destroyed node.
    fn node_removed(&self, remote_id: RemoteId);
}

/// Factory backed by a [`RemoteSession`].
///
/// The same remote object can sit under more than one parent. Every node
/// counts as one use of the shared proxy, and the proxy is destroyed in the
/// session when the last node using it goes away.
pub struct SessionNodeFactory {
    me: Weak<SessionNodeFactory>,
    session: RemoteSession,
    live: Mutex<HashMap<RemoteId, usize>>,
}

impl SessionNodeFactory {
    pub fn new(session: RemoteSession) -> Arc<Self> {
        Arc::new_cyclic(|me| Self { me: me.clone(), session, live: Mutex::new(HashMap::new()) })
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// Number of live nodes over `remote_id`.
    pub fn live_count(&self, remote_id: RemoteId) -> usize {
        self.live.lock().get(&remote_id).copied().unwrap_or(0)
    }

    /// Create and attach the root node of a tree.
    pub async fn root(&self, remote_id: RemoteId) -> Result<Arc<ProxyNodeController>> {
        self.create_node(remote_id).await
    }
}

#[async_trait]
impl NodeFactory for SessionNodeFactory {
    async fn create_node(&self, remote_id: RemoteId) -> Result<Arc<ProxyNodeController>> {
        let Some(me) = self.me.upgrade() else {
            return Err(crate::error::TreeError::Destroyed);
        };
        let proxy = loop {
            let proxy = self.session.get_or_create(remote_id).await?;
            // `node_removed` destroys under this lock, so a proxy counted here
            // stays live until its count drops again.
            let counted = {
                let mut live = self.live.lock();
                let evicted = proxy.is_destroyed() && self.session.id_for(&proxy).is_none();
                if !evicted {
                    *live.entry(remote_id).or_insert(0) += 1;
                }
                !evicted
            };
            if counted {
                break proxy;
            }
            debug!(%remote_id, "proxy destroyed during lookup, retrying");
        };

        let node = ProxyNodeController::new(proxy, me);
        if let Err(e) = node.attach().await {
            node.destroy();
            return Err(e);
        }
        Ok(node)
    }

    fn node_removed(&self, remote_id: RemoteId) {
        let mut live = self.live.lock();
        match live.get_mut(&remote_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                live.remove(&remote_id);
                debug!(%remote_id, "last node gone, destroying proxy");
                // Under the lock so `create_node` cannot count the proxy in between.
                self.session.destroy(remote_id);
            }
            None => {}
        }
    }
}
