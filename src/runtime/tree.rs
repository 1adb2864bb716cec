//! The collab tree: an arena of named nodes routed by path.
//!
//! Parents own children through indices; children hold a parent index,
//! never a pointer. Children are keyed in a `BTreeMap` so iteration (and
//! therefore save output) is deterministic across replicas.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::warn;

use crate::core::{CollabId, LoadMeta};
use crate::wire::SavedTree;

use super::collab::PrimitiveCollab;
use super::error::{ApplyError, UsageError};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct NodeIdx(usize);

pub(crate) enum NodeKind {
    Composite {
        children: BTreeMap<String, NodeIdx>,
    },
    Primitive(Box<dyn PrimitiveCollab>),
    /// A deleted dynamic child. Terminal: remote ops are silent no-ops,
    /// local ops are usage errors.
    Frozen,
}

pub(crate) struct Node {
    name: String,
    parent: Option<NodeIdx>,
    kind: NodeKind,
}

pub(crate) struct CollabTree {
    nodes: Vec<Node>,
}

impl CollabTree {
    pub(crate) const ROOT: NodeIdx = NodeIdx(0);

    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Composite {
                    children: BTreeMap::new(),
                },
            }],
        }
    }

    pub(crate) fn register_primitive(
        &mut self,
        parent: NodeIdx,
        name: &str,
        state: Box<dyn PrimitiveCollab>,
    ) -> Result<NodeIdx, UsageError> {
        self.register_node(parent, name, NodeKind::Primitive(state))
    }

    pub(crate) fn register_composite(
        &mut self,
        parent: NodeIdx,
        name: &str,
    ) -> Result<NodeIdx, UsageError> {
        self.register_node(
            parent,
            name,
            NodeKind::Composite {
                children: BTreeMap::new(),
            },
        )
    }

    fn register_node(
        &mut self,
        parent: NodeIdx,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeIdx, UsageError> {
        let parent_path = self.path_of(parent);
        let NodeKind::Composite { children } = &self.nodes[parent.0].kind else {
            return Err(UsageError::NotAComposite { path: parent_path });
        };
        if children.contains_key(name) {
            return Err(UsageError::DuplicateChild {
                parent: parent_path,
                name: name.to_string(),
            });
        }

        let idx = NodeIdx(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            kind,
        });
        let NodeKind::Composite { children } = &mut self.nodes[parent.0].kind else {
            unreachable!("parent kind checked above");
        };
        children.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Replace a node (and implicitly its subtree) with a frozen
    /// placeholder. The name stays claimed; deletion is terminal.
    pub(crate) fn freeze(&mut self, idx: NodeIdx) {
        self.nodes[idx.0].kind = NodeKind::Frozen;
    }

    pub(crate) fn resolve(&self, labels: &[String]) -> Option<NodeIdx> {
        let mut idx = Self::ROOT;
        for label in labels {
            match &self.nodes[idx.0].kind {
                NodeKind::Composite { children } => {
                    idx = *children.get(label)?;
                }
                _ => return None,
            }
        }
        Some(idx)
    }

    pub(crate) fn path_of(&self, idx: NodeIdx) -> CollabId {
        let mut labels = Vec::new();
        let mut cursor = idx;
        while let Some(parent) = self.nodes[cursor.0].parent {
            labels.push(self.nodes[cursor.0].name.clone());
            cursor = parent;
        }
        labels.reverse();
        CollabId::from_labels_unchecked(labels)
    }

    pub(crate) fn kind(&self, idx: NodeIdx) -> &NodeKind {
        &self.nodes[idx.0].kind
    }

    pub(crate) fn is_frozen(&self, idx: NodeIdx) -> bool {
        matches!(self.nodes[idx.0].kind, NodeKind::Frozen)
    }

    pub(crate) fn primitive(&self, idx: NodeIdx) -> Option<&dyn PrimitiveCollab> {
        match &self.nodes[idx.0].kind {
            NodeKind::Primitive(state) => Some(state.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn primitive_mut(&mut self, idx: NodeIdx) -> Option<&mut Box<dyn PrimitiveCollab>> {
        match &mut self.nodes[idx.0].kind {
            NodeKind::Primitive(state) => Some(state),
            _ => None,
        }
    }

    /// Recursive save traversal. GC-eligible primitives and frozen
    /// placeholders are omitted; a fresh replica rehydrates them in
    /// initial state.
    pub(crate) fn save_tree(&self) -> SavedTree {
        self.save_node(Self::ROOT)
            .unwrap_or_default()
    }

    fn save_node(&self, idx: NodeIdx) -> Option<SavedTree> {
        match &self.nodes[idx.0].kind {
            NodeKind::Primitive(state) => {
                if state.can_gc() {
                    return None;
                }
                Some(SavedTree {
                    self_bytes: state.save().map(Bytes::from),
                    children: BTreeMap::new(),
                })
            }
            NodeKind::Composite { children } => {
                let mut out = BTreeMap::new();
                for (name, child) in children {
                    if let Some(saved) = self.save_node(*child) {
                        out.insert(name.clone(), saved);
                    }
                }
                Some(SavedTree {
                    self_bytes: None,
                    children: out,
                })
            }
            NodeKind::Frozen => None,
        }
    }

    /// Route saved state into the registered tree. Saved entries with no
    /// registered counterpart are skipped (schema mismatch is tolerated on
    /// load); registered primitives absent from the save are loaded with
    /// `None` so they can resolve "the saver had nothing for you".
    pub(crate) fn load_into(
        &mut self,
        saved: &SavedTree,
        meta: &LoadMeta,
    ) -> Result<(), ApplyError> {
        self.load_node(Self::ROOT, Some(saved), meta)
    }

    fn load_node(
        &mut self,
        idx: NodeIdx,
        saved: Option<&SavedTree>,
        meta: &LoadMeta,
    ) -> Result<(), ApplyError> {
        match &self.nodes[idx.0].kind {
            NodeKind::Primitive(_) => {
                let path = self.path_of(idx);
                let state = self
                    .primitive_mut(idx)
                    .expect("kind checked primitive");
                let self_bytes = saved.and_then(|t| t.self_bytes.as_deref());
                state
                    .load(self_bytes, meta)
                    .map_err(|source| ApplyError::LoadPayload { path, source })
            }
            NodeKind::Composite { children } => {
                let children: Vec<(String, NodeIdx)> = children
                    .iter()
                    .map(|(name, idx)| (name.clone(), *idx))
                    .collect();
                if let Some(tree) = saved {
                    for name in tree.children.keys() {
                        if !children.iter().any(|(n, _)| n == name) {
                            warn!(name = name.as_str(), "saved state names unregistered collab; skipping");
                        }
                    }
                }
                for (name, child) in children {
                    let sub = saved.and_then(|t| t.children.get(&name));
                    self.load_node(child, sub, meta)?;
                }
                Ok(())
            }
            NodeKind::Frozen => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}
