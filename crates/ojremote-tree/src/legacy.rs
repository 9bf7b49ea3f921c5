//! Polling tree model.
//!
//! The older console polled the server for tree state instead of listening
//! for structural notifications. The model keeps one [`NodeData`] per known
//! node and reconciles each node's children with [`array_diff`] when a poll
//! response arrives.
//!
//! ```text
//!   poll_request()  ──▶ server ──▶ PollResponse { sequence, nodes }
//!        ▲                                   │
//!        └────────── apply(response) ◀───────┘  ──▶ Vec<TreeChange>
//! ```
//!
//! Children inserted by a response are *pending*: they are left out of poll
//! requests until a response whose sequence reaches the one that introduced
//! them has been applied, by which time the server has their data.

use std::collections::HashMap;

use ojremote_types::RemoteId;
use tracing::{debug, trace};

use crate::diff::{DiffKind, DiffOp, array_diff};
use crate::error::{Result, TreeError};

/// Node state as the server reports it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: RemoteId,
    pub name: String,
    pub icon_id: String,
    pub children: Vec<RemoteId>,
}

impl NodeInfo {
    pub fn new(node_id: RemoteId, name: impl Into<String>) -> Self {
        Self { node_id, name: name.into(), ..Self::default() }
    }

    pub fn with_icon(mut self, icon_id: impl Into<String>) -> Self {
        self.icon_id = icon_id.into();
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = RemoteId>) -> Self {
        self.children = children.into_iter().collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeData {
    pub node: NodeInfo,
    pub expanded: bool,
    pub pending: bool,
    parent: Option<RemoteId>,
    // Sequence of the response that inserted this node.
    introduced: u64,
}

impl NodeData {
    pub fn parent(&self) -> Option<RemoteId> {
        self.parent
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollRequest {
    /// Last applied response sequence.
    pub since: u64,
    pub node_ids: Vec<RemoteId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollResponse {
    pub sequence: u64,
    pub nodes: Vec<NodeInfo>,
}

/// What an applied response changed. Changes to one parent's children come
/// in diff order, so their indices apply in sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    Inserted { parent: RemoteId, child: RemoteId, index: usize },
    Removed { parent: RemoteId, child: RemoteId, index: usize },
    Updated(RemoteId),
}

pub struct PollingTreeModel {
    root: RemoteId,
    nodes: HashMap<RemoteId, NodeData>,
    sequence: u64,
}

impl PollingTreeModel {
    pub fn new(root: RemoteId) -> Self {
        let data = NodeData {
            node: NodeInfo { node_id: root, ..NodeInfo::default() },
            expanded: true,
            pending: false,
            parent: None,
            introduced: 0,
        };
        Self { root, nodes: HashMap::from([(root, data)]), sequence: 0 }
    }

    pub fn root(&self) -> RemoteId {
        self.root
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn get(&self, node_id: RemoteId) -> Option<&NodeData> {
        self.nodes.get(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `node_id` in display order.
    pub fn children(&self, node_id: RemoteId) -> Option<&[RemoteId]> {
        self.nodes.get(&node_id).map(|data| data.node.children.as_slice())
    }

    pub fn set_expanded(&mut self, node_id: RemoteId, expanded: bool) -> Result<()> {
        let data = self
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| TreeError::invalid(format!("unknown node {node_id}")))?;
        if expanded && data.node.children.is_empty() {
            return Err(TreeError::invalid(format!("expand of {node_id} with no children")));
        }
        data.expanded = expanded;
        Ok(())
    }

    /// Nodes to ask about: every visible node that is not pending. A node is
    /// visible when it is the root or every ancestor is expanded.
    pub fn poll_request(&self) -> PollRequest {
        let mut node_ids = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(data) = self.nodes.get(&id) else {
                continue;
            };
            if data.pending {
                continue;
            }
            node_ids.push(id);
            if data.expanded {
                stack.extend(data.node.children.iter().rev().copied());
            }
        }
        PollRequest { since: self.sequence, node_ids }
    }

    /// Apply a poll response. Responses older than the last applied one are
    /// ignored and produce no changes.
    pub fn apply(&mut self, response: PollResponse) -> Vec<TreeChange> {
        if response.sequence < self.sequence {
            debug!(sequence = response.sequence, current = self.sequence, "stale poll response dropped");
            return Vec::new();
        }
        self.sequence = response.sequence;

        for data in self.nodes.values_mut() {
            if data.pending && data.introduced <= response.sequence {
                data.pending = false;
            }
        }

        // Removals run before insertions across the whole response, so a node
        // moved between parents is dropped from the old one and then inserted
        // under the new one.
        let mut planned = Vec::new();
        let mut deferred = Vec::new();
        for info in response.nodes {
            match self.nodes.get(&info.node_id) {
                Some(data) => {
                    let ops = array_diff(&data.node.children, &info.children);
                    planned.push((ops, info));
                }
                None => deferred.push(info),
            }
        }

        for (ops, _) in &planned {
            for op in ops.iter().filter(|op| op.op == DiffKind::Remove) {
                self.remove_subtree(op.value);
            }
        }

        let mut changes = Vec::new();
        for (ops, info) in planned {
            let parent = info.node_id;
            if !self.nodes.contains_key(&parent) {
                trace!(node_id = %parent, "poll data for removed node ignored");
                continue;
            }
            changes.extend(ops.iter().map(|op| match op.op {
                DiffKind::Insert => TreeChange::Inserted { parent, child: op.value, index: op.index },
                DiffKind::Remove => TreeChange::Removed { parent, child: op.value, index: op.index },
            }));
            self.update_node(&ops, info, response.sequence, &mut changes);
        }

        // Data for nodes this same response inserted.
        for info in deferred {
            let Some(data) = self.nodes.get(&info.node_id) else {
                trace!(node_id = %info.node_id, "poll data for unknown node ignored");
                continue;
            };
            let ops = array_diff(&data.node.children, &info.children);
            let parent = info.node_id;
            changes.extend(ops.iter().map(|op| TreeChange::Inserted { parent, child: op.value, index: op.index }));
            self.update_node(&ops, info, response.sequence, &mut changes);
        }
        changes
    }

    /// Insert the children `ops` adds and store `info` on a known node.
    /// Removals must already have been applied. A child that is already known
    /// keeps its data and subtree.
    fn update_node(
        &mut self,
        ops: &[DiffOp<RemoteId>],
        info: NodeInfo,
        sequence: u64,
        changes: &mut Vec<TreeChange>,
    ) {
        let parent = info.node_id;
        for op in ops.iter().filter(|op| op.op == DiffKind::Insert) {
            self.nodes
                .entry(op.value)
                .and_modify(|data| data.parent = Some(parent))
                .or_insert_with(|| NodeData {
                    node: NodeInfo { node_id: op.value, ..NodeInfo::default() },
                    expanded: false,
                    pending: true,
                    parent: Some(parent),
                    introduced: sequence,
                });
        }

        let Some(data) = self.nodes.get_mut(&parent) else {
            return;
        };
        let changed = data.node.name != info.name || data.node.icon_id != info.icon_id;
        if info.children.is_empty() {
            data.expanded = false;
        }
        data.node = info;
        if changed {
            changes.push(TreeChange::Updated(parent));
        }
    }

    fn remove_subtree(&mut self, node_id: RemoteId) {
        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            if let Some(data) = self.nodes.remove(&id) {
                stack.extend(data.node.children);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
