//! Client-side stand-in for one remote object.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ojremote_types::RemoteId;
use tracing::debug;

use crate::capability::{Binding, Capability, CapabilityTag};

/// The handlers bound on one proxy, in the order the server advertised them.
#[derive(Default)]
pub struct HandlerManager {
    bindings: Vec<Binding>,
}

impl HandlerManager {
    /// Later bindings for an already bound tag are ignored.
    pub fn new(bindings: impl IntoIterator<Item = Binding>) -> Self {
        let mut manager = Self::default();
        for binding in bindings {
            if !manager.contains(binding.tag()) {
                manager.bindings.push(binding);
            }
        }
        manager
    }

    pub fn contains(&self, tag: CapabilityTag) -> bool {
        self.bindings.iter().any(|b| b.tag() == tag)
    }

    pub fn get<C: Capability>(&self) -> Option<Arc<C::Handler>> {
        self.bindings.iter().find_map(|b| C::select(b).cloned())
    }

    pub fn tags(&self) -> Vec<CapabilityTag> {
        self.bindings.iter().map(Binding::tag).collect()
    }

    fn destroy_all(&self) {
        for binding in &self.bindings {
            binding.destroy();
        }
    }
}

/// A remote object as seen by this session.
///
/// Sessions hand out one `Arc<RemoteProxy>` per remote id, so `Arc::ptr_eq`
/// is identity of the remote object.
pub struct RemoteProxy {
    remote_id: RemoteId,
    handlers: HandlerManager,
    destroyed: AtomicBool,
}

impl RemoteProxy {
    pub fn new(remote_id: RemoteId, handlers: HandlerManager) -> Self {
        Self { remote_id, handlers, destroyed: AtomicBool::new(false) }
    }

    pub fn remote_id(&self) -> RemoteId {
        self.remote_id
    }

    pub fn is_a(&self, tag: CapabilityTag) -> bool {
        self.handlers.contains(tag)
    }

    /// The handler for capability `C`, if the remote object has it.
    ///
    /// ```ignore
    /// if let Some(iconic) = proxy.as_capability::<Iconic>() {
    ///     iconic.add_icon_listener(listener).await?;
    /// }
    /// ```
    pub fn as_capability<C: Capability>(&self) -> Option<Arc<C::Handler>> {
        self.handlers.get::<C>()
    }

    pub fn capabilities(&self) -> Vec<CapabilityTag> {
        self.handlers.tags()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Release every handler's server-side subscriptions. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(remote_id = %self.remote_id, "destroy proxy");
        self.handlers.destroy_all();
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("remote_id", &self.remote_id)
            .field("capabilities", &self.capabilities())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_proxy_has_no_capabilities() {
        let proxy = RemoteProxy::new(RemoteId::new(9), HandlerManager::default());
        assert!(!proxy.is_a(CapabilityTag::Iconic));
        assert!(proxy.as_capability::<crate::capability::Iconic>().is_none());
        assert!(proxy.capabilities().is_empty());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let proxy = RemoteProxy::new(RemoteId::new(9), HandlerManager::default());
        proxy.destroy();
        proxy.destroy();
        assert!(proxy.is_destroyed());
    }
}
