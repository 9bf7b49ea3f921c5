//! Node model controller: one tree node over one remote proxy.
//!
//! Two independent state axes per node:
//!
//! ```text
//!   structure:  Unknown ──(first children event)──▶ Empty | Collapsed
//!               Collapsed ◀──expand()/collapse()──▶ Expanded
//!               Empty ──(children reported)──▶ Collapsed
//!   selection:  Unselected ◀──select()/unselect()──▶ Selected
//! ```
//!
//! Children events and expansion are applied by a per-node worker task, in
//! the order they were queued. Child creation for one event runs
//! concurrently and all of it completes before any child is spliced in, so
//! the indices the diff assigned stay valid.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::join_all;
use ojremote_client::{
    CapabilityTag, IconEvent, IconListener, Iconic, Object, RemoteProxy, Structural,
    StructuralListener,
};
use ojremote_types::RemoteId;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, debug_span, warn};

use crate::diff::{DiffKind, array_diff};
use crate::error::{Result, TreeError};
use crate::factory::NodeFactory;

// ============================================================================
// Events and state
// ============================================================================

/// What a node tells its listeners.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// The displayed child list changed. Empty means "no children".
    ChildrenChanged(Vec<Arc<ProxyNodeController>>),
    /// The node has children but is not showing them.
    Collapsed,
    IconChanged(IconEvent),
    Selected,
    Unselected,
    Destroyed,
}

pub type NodeListener = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

/// Structural axis of the node state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeStructure {
    /// No children event seen yet.
    #[default]
    Unknown,
    Empty,
    Collapsed,
    Expanded,
}

#[derive(Default)]
struct NodeState {
    child_ids: Option<Vec<RemoteId>>,
    child_nodes: Option<Vec<Arc<ProxyNodeController>>>,
    selected: bool,
    destroyed: bool,
    listeners: Vec<NodeListener>,
}

enum Work {
    Children(Vec<RemoteId>),
    Expand(oneshot::Sender<Result<()>>),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Hooks {
    structural: Option<StructuralListener>,
    icon: Option<IconListener>,
}

// ============================================================================
// ProxyNodeController
// ============================================================================

pub struct ProxyNodeController {
    me: Weak<ProxyNodeController>,
    proxy: Arc<RemoteProxy>,
    factory: Arc<dyn NodeFactory>,
    state: Mutex<NodeState>,
    structure: watch::Sender<NodeStructure>,
    work: Mutex<Option<mpsc::UnboundedSender<Work>>>,
    hooks: Mutex<Hooks>,
}

impl ProxyNodeController {
    /// Build the node and start its worker. Call [`attach`](Self::attach)
    /// to start listening to the remote object.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(proxy: Arc<RemoteProxy>, factory: Arc<dyn NodeFactory>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            proxy,
            factory,
            state: Mutex::new(NodeState::default()),
            structure: watch::Sender::new(NodeStructure::Unknown),
            work: Mutex::new(Some(tx)),
            hooks: Mutex::new(Hooks::default()),
        });
        let span = debug_span!("tree.node", remote_id = %node.remote_id());
        tokio::spawn(run_worker(Arc::downgrade(&node), rx).instrument(span));
        node
    }

    /// Listen to the remote object's children and icon.
    ///
    /// A node without the structural capability is a leaf and goes straight
    /// to [`NodeStructure::Empty`].
    pub async fn attach(&self) -> Result<()> {
        match self.proxy.as_capability::<Structural>() {
            Some(structural) => {
                let me = self.me.clone();
                let listener: StructuralListener = Arc::new(move |ids| {
                    if let Some(node) = me.upgrade() {
                        node.children_updated(ids.to_vec());
                    }
                });
                self.hooks.lock().structural = Some(listener.clone());
                structural.add_structural_listener(listener).await?;
            }
            None => {
                self.state.lock().child_ids = Some(Vec::new());
                self.structure.send_replace(NodeStructure::Empty);
            }
        }

        if let Some(iconic) = self.proxy.as_capability::<Iconic>() {
            let me = self.me.clone();
            let listener: IconListener = Arc::new(move |event| {
                if let Some(node) = me.upgrade() {
                    node.fire(&NodeEvent::IconChanged(event.clone()));
                }
            });
            self.hooks.lock().icon = Some(listener.clone());
            iconic.add_icon_listener(listener).await?;
        }
        Ok(())
    }

    pub fn remote_id(&self) -> RemoteId {
        self.proxy.remote_id()
    }

    pub fn proxy(&self) -> &Arc<RemoteProxy> {
        &self.proxy
    }

    pub fn structure(&self) -> NodeStructure {
        *self.structure.borrow()
    }

    /// Follow structure changes.
    pub fn watch_structure(&self) -> watch::Receiver<NodeStructure> {
        self.structure.subscribe()
    }

    /// Last reported child ids, `None` before the first children event.
    pub fn child_ids(&self) -> Option<Vec<RemoteId>> {
        self.state.lock().child_ids.clone()
    }

    /// Child nodes while expanded.
    pub fn children(&self) -> Option<Vec<Arc<ProxyNodeController>>> {
        self.state.lock().child_nodes.clone()
    }

    pub fn is_selected(&self) -> bool {
        self.state.lock().selected
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    pub fn current_icon(&self) -> Option<IconEvent> {
        self.proxy.as_capability::<Iconic>()?.current_icon()
    }

    /// Display label: the remote `toString`, or `#<id>` when there is none.
    pub async fn label(&self) -> String {
        let fallback = format!("#{}", self.remote_id());
        let Some(object) = self.proxy.as_capability::<Object>() else {
            return fallback;
        };
        match object.to_display_string().await {
            Ok(label) => label,
            Err(e) => {
                debug!(remote_id = %self.remote_id(), "label lookup failed: {e}");
                fallback
            }
        }
    }

    // ── Listeners ────────────────────────────────────────────────────────

    pub fn add_listener(&self, listener: NodeListener) {
        self.state.lock().listeners.push(listener);
    }

    pub fn remove_listener(&self, listener: &NodeListener) {
        self.state.lock().listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn fire(&self, event: &NodeEvent) {
        let listeners = self.state.lock().listeners.clone();
        for listener in listeners {
            listener(event);
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Queue an inbound children event for the worker.
    pub fn children_updated(&self, ids: Vec<RemoteId>) {
        self.submit(Work::Children(ids));
    }

    /// Wait until everything queued so far has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.submit(Work::Flush(tx)) {
            let _ = rx.await;
        }
    }

    /// Create and show the child nodes.
    ///
    /// Fails when no children have been reported, or the last report was
    /// empty. Expanding an expanded node does nothing.
    pub async fn expand(&self) -> Result<()> {
        self.check_expandable()?;
        let (tx, rx) = oneshot::channel();
        if !self.submit(Work::Expand(tx)) {
            return Err(TreeError::Destroyed);
        }
        rx.await.map_err(|_| TreeError::Destroyed)?
    }

    /// Destroy the child nodes and go back to collapsed.
    pub fn collapse(&self) -> Result<()> {
        let children = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(TreeError::Destroyed);
            }
            let Some(children) = state.child_nodes.take() else {
                return Err(TreeError::invalid(format!("collapse of {} while not expanded", self.remote_id())));
            };
            children
        };
        self.structure.send_replace(NodeStructure::Collapsed);
        for child in &children {
            child.destroy();
        }
        self.fire(&NodeEvent::Collapsed);
        Ok(())
    }

    pub fn select(&self) {
        {
            let mut state = self.state.lock();
            if state.selected || state.destroyed {
                return;
            }
            state.selected = true;
        }
        self.fire(&NodeEvent::Selected);
    }

    pub fn unselect(&self) {
        let changed = std::mem::replace(&mut self.state.lock().selected, false);
        if changed {
            self.fire(&NodeEvent::Unselected);
        }
    }

    /// Tear down this node and everything under it.
    ///
    /// Children go first, then selection, then the factory is told; the
    /// proxy itself is destroyed by the factory once no node uses it.
    pub fn destroy(&self) {
        let children = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.child_nodes.take()
        };
        for child in children.iter().flatten() {
            child.destroy();
        }
        self.unselect();

        self.work.lock().take();
        self.detach();
        self.fire(&NodeEvent::Destroyed);
        self.state.lock().listeners.clear();

        debug!(remote_id = %self.remote_id(), "node destroyed");
        self.factory.node_removed(self.remote_id());
    }

    fn detach(&self) {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        if let (Some(listener), Some(structural)) =
            (hooks.structural, self.proxy.as_capability::<Structural>())
        {
            if let Err(e) = structural.remove_structural_listener(&listener) {
                warn!(remote_id = %self.remote_id(), "structural detach failed: {e}");
            }
        }
        if let (Some(listener), Some(iconic)) = (hooks.icon, self.proxy.as_capability::<Iconic>()) {
            if let Err(e) = iconic.remove_icon_listener(&listener) {
                warn!(remote_id = %self.remote_id(), "icon detach failed: {e}");
            }
        }
    }

    fn submit(&self, work: Work) -> bool {
        match self.work.lock().as_ref() {
            Some(tx) => tx.send(work).is_ok(),
            None => false,
        }
    }

    fn check_expandable(&self) -> Result<()> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(TreeError::Destroyed);
        }
        if !self.proxy.is_a(CapabilityTag::Structural) {
            return Err(TreeError::NotStructural(self.remote_id()));
        }
        match &state.child_ids {
            None => Err(TreeError::invalid(format!("expand of {} before any children event", self.remote_id()))),
            Some(ids) if ids.is_empty() => {
                Err(TreeError::invalid(format!("expand of {} with no children", self.remote_id())))
            }
            Some(_) => Ok(()),
        }
    }

    // ── Worker side ──────────────────────────────────────────────────────

    async fn apply_children(&self, ids: Vec<RemoteId>) {
        enum Step {
            Fire(NodeStructure, NodeEvent),
            Silent,
            Clear(Vec<Arc<ProxyNodeController>>),
            Reconcile(Vec<RemoteId>),
        }

        let step = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            let previous = state.child_ids.replace(ids.clone());
            match (previous, state.child_nodes.is_some()) {
                (None, _) if ids.is_empty() => {
                    Step::Fire(NodeStructure::Empty, NodeEvent::ChildrenChanged(Vec::new()))
                }
                (None, _) => Step::Fire(NodeStructure::Collapsed, NodeEvent::Collapsed),
                (Some(old), false) => {
                    if ids.is_empty() && !old.is_empty() {
                        Step::Fire(NodeStructure::Empty, NodeEvent::ChildrenChanged(Vec::new()))
                    } else if old.is_empty() && !ids.is_empty() {
                        Step::Fire(NodeStructure::Collapsed, NodeEvent::Collapsed)
                    } else {
                        Step::Silent
                    }
                }
                (Some(_), true) if ids.is_empty() => {
                    Step::Clear(state.child_nodes.take().unwrap_or_default())
                }
                (Some(old), true) => {
                    // Put the old ids back until the new children exist.
                    state.child_ids = Some(old.clone());
                    Step::Reconcile(old)
                }
            }
        };

        match step {
            Step::Silent => {}
            Step::Fire(structure, event) => {
                self.structure.send_replace(structure);
                self.fire(&event);
            }
            Step::Clear(children) => {
                self.structure.send_replace(NodeStructure::Empty);
                for child in &children {
                    child.destroy();
                }
                self.fire(&NodeEvent::ChildrenChanged(Vec::new()));
            }
            Step::Reconcile(old) => self.reconcile(old, ids).await,
        }
    }

    async fn reconcile(&self, old: Vec<RemoteId>, ids: Vec<RemoteId>) {
        let ops = array_diff(&old, &ids);
        let inserts: Vec<RemoteId> =
            ops.iter().filter(|o| o.op == DiffKind::Insert).map(|o| o.value).collect();
        let (created, failed) = self.create_children(&inserts).await;

        // Children that could not be created are left out; diffing against
        // the reduced target only drops their inserts.
        let (ops, target) = if failed.is_empty() {
            (ops, ids)
        } else {
            let target: Vec<RemoteId> = ids.into_iter().filter(|id| !failed.contains(id)).collect();
            (array_diff(&old, &target), target)
        };

        let mut created = created.into_iter();
        let mut removed = Vec::new();
        let children = {
            let mut state = self.state.lock();
            state.child_ids = Some(target);
            let live = if state.destroyed { None } else { state.child_nodes.take() };
            let Some(mut nodes) = live else {
                // Destroyed or collapsed while children were being created.
                drop(state);
                for node in created {
                    node.destroy();
                }
                return;
            };
            for op in &ops {
                match op.op {
                    DiffKind::Insert => match created.next() {
                        Some(node) => nodes.insert(op.index.min(nodes.len()), node),
                        None => warn!(remote_id = %self.remote_id(), child = %op.value, "missing created child"),
                    },
                    DiffKind::Remove if op.index < nodes.len() => removed.push(nodes.remove(op.index)),
                    DiffKind::Remove => {
                        warn!(remote_id = %self.remote_id(), child = %op.value, "remove out of range")
                    }
                }
            }
            if !nodes.is_empty() {
                state.child_nodes = Some(nodes.clone());
            }
            nodes
        };

        for node in removed {
            node.destroy();
        }
        if children.is_empty() {
            self.structure.send_replace(NodeStructure::Empty);
        }
        self.fire(&NodeEvent::ChildrenChanged(children));
    }

    async fn apply_expand(&self) -> Result<()> {
        let ids = {
            let state = self.state.lock();
            if state.destroyed {
                return Err(TreeError::Destroyed);
            }
            if state.child_nodes.is_some() {
                return Ok(());
            }
            match &state.child_ids {
                Some(ids) if !ids.is_empty() => ids.clone(),
                _ => return Err(TreeError::invalid(format!("expand of {} with no children", self.remote_id()))),
            }
        };

        let (created, failed) = self.create_children(&ids).await;
        let ids: Vec<RemoteId> = ids.into_iter().filter(|id| !failed.contains(id)).collect();

        let children = {
            let mut state = self.state.lock();
            if state.destroyed {
                drop(state);
                for node in created {
                    node.destroy();
                }
                return Err(TreeError::Destroyed);
            }
            state.child_ids = Some(ids);
            if !created.is_empty() {
                state.child_nodes = Some(created.clone());
            }
            created
        };
        self.structure.send_replace(if children.is_empty() {
            NodeStructure::Empty
        } else {
            NodeStructure::Expanded
        });
        self.fire(&NodeEvent::ChildrenChanged(children));
        Ok(())
    }

    /// Create nodes for `ids` concurrently. Returns the created nodes in
    /// order, and the ids that failed.
    async fn create_children(
        &self,
        ids: &[RemoteId],
    ) -> (Vec<Arc<ProxyNodeController>>, Vec<RemoteId>) {
        let results = join_all(ids.iter().map(|id| self.factory.create_node(*id))).await;
        let mut created = Vec::with_capacity(ids.len());
        let mut failed = Vec::new();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(node) => created.push(node),
                Err(e) => {
                    warn!(parent = %self.remote_id(), child = %id, "child creation failed: {e}");
                    failed.push(*id);
                }
            }
        }
        (created, failed)
    }
}

impl fmt::Debug for ProxyNodeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyNodeController")
            .field("remote_id", &self.remote_id())
            .field("structure", &self.structure())
            .finish()
    }
}

async fn run_worker(node: Weak<ProxyNodeController>, mut rx: mpsc::UnboundedReceiver<Work>) {
    while let Some(work) = rx.recv().await {
        let Some(node) = node.upgrade() else {
            break;
        };
        match work {
            Work::Children(ids) => node.apply_children(ids).await,
            Work::Expand(reply) => {
                let _ = reply.send(node.apply_expand().await);
            }
            Work::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}
