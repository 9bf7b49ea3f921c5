//! At most one selected node per tree.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::controller::{NodeEvent, NodeListener, ProxyNodeController};

struct Selected {
    node: Arc<ProxyNodeController>,
    listener: NodeListener,
}

/// Routes selection for one tree so that selecting a node unselects the
/// previously selected one.
pub struct SelectionBridge {
    me: Weak<SelectionBridge>,
    current: Mutex<Option<Selected>>,
}

impl SelectionBridge {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self { me: me.clone(), current: Mutex::new(None) })
    }

    pub fn selected(&self) -> Option<Arc<ProxyNodeController>> {
        self.current.lock().as_ref().map(|s| s.node.clone())
    }

    /// Select `node`, unselecting whatever was selected before.
    pub fn select(&self, node: &Arc<ProxyNodeController>) {
        if node.is_destroyed() {
            return;
        }
        let previous = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|s| Arc::ptr_eq(&s.node, node)) {
                return;
            }
            let me = self.me.clone();
            let watched = Arc::downgrade(node);
            let listener: NodeListener = Arc::new(move |event| {
                if matches!(event, NodeEvent::Unselected | NodeEvent::Destroyed) {
                    if let (Some(bridge), Some(node)) = (me.upgrade(), watched.upgrade()) {
                        bridge.forget(&node);
                    }
                }
            });
            node.add_listener(listener.clone());
            current.replace(Selected { node: node.clone(), listener })
        };

        if let Some(previous) = previous {
            previous.node.remove_listener(&previous.listener);
            previous.node.unselect();
        }
        node.select();
    }

    /// Unselect the current node, if any.
    pub fn clear(&self) {
        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            previous.node.remove_listener(&previous.listener);
            previous.node.unselect();
        }
    }

    fn forget(&self, node: &Arc<ProxyNodeController>) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|s| Arc::ptr_eq(&s.node, node)) {
            if let Some(previous) = current.take() {
                drop(current);
                previous.node.remove_listener(&previous.listener);
            }
        }
    }
}
