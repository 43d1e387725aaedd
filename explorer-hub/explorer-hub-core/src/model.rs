//! Immutable in-memory snapshot of the whole explorer hierarchy.
//!
//! A [`TreeModel`] is rebuilt from the closure store in full and never
//! changed afterwards. [`ModelCache`] hands out `Arc`s to the current
//! snapshot and swaps in a new one when the store has moved on, so a reader
//! always holds either the old model or the new one, never a mix.

use crate::node::{ExplorerNode, NodeKey};
use crate::storage::closure::ClosureTreeStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct TreeModel {
    nodes: HashMap<NodeKey, ExplorerNode>,
    parent_map: HashMap<NodeKey, NodeKey>,
    child_map: HashMap<NodeKey, Vec<NodeKey>>,
    roots: Vec<NodeKey>,
    generation: u64,
}

impl TreeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk the direct (depth 1) rows of `store` and assemble the parent and
    /// child maps. Nodes that cannot be reached from the root are left out.
    pub fn build(store: &ClosureTreeStore) -> Self {
        let mut adjacency: HashMap<NodeKey, Vec<(u32, &ExplorerNode)>> = HashMap::new();
        for (parent, child, order_index) in store.direct_edges() {
            adjacency
                .entry(parent.key())
                .or_default()
                .push((order_index, child));
        }
        for children in adjacency.values_mut() {
            children.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.key().cmp(&b.1.key())));
        }

        let mut model = Self {
            generation: store.generation(),
            ..Self::default()
        };
        let Some(root) = store.root() else {
            return model;
        };
        model.add(None, root.clone());
        let mut stack = vec![root.key()];
        while let Some(parent) = stack.pop() {
            let Some(children) = adjacency.get(&parent) else {
                continue;
            };
            for (_, child) in children {
                model.add(Some(&parent), (*child).clone());
                stack.push(child.key());
            }
        }
        model
    }

    /// Append `child` after any children `parent` already has, or as a new
    /// root when `parent` is `None`.
    pub fn add(&mut self, parent: Option<&NodeKey>, child: ExplorerNode) {
        let key = child.key();
        match parent {
            Some(p) => {
                self.parent_map.insert(key.clone(), p.clone());
                self.child_map.entry(p.clone()).or_default().push(key.clone());
            }
            None => self.roots.push(key.clone()),
        }
        self.nodes.insert(key, child);
    }

    /// Store generation this snapshot was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExplorerNode> {
        self.nodes.values()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&ExplorerNode> {
        self.nodes.get(key)
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn parent(&self, key: &NodeKey) -> Option<&NodeKey> {
        self.parent_map.get(key)
    }

    pub fn children(&self, key: &NodeKey) -> &[NodeKey] {
        self.child_map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, key: &NodeKey) -> bool {
        !self.children(key).is_empty()
    }

    /// Proper ancestors of `key`, nearest first.
    pub fn ancestors(&self, key: &NodeKey) -> Vec<&NodeKey> {
        let mut out = Vec::new();
        let mut current = self.parent_map.get(key);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_map.get(parent);
        }
        out
    }

    /// Descendants of `key` in depth-first, sibling order.
    pub fn descendants(&self, key: &NodeKey) -> Vec<&ExplorerNode> {
        fn gather<'a>(model: &'a TreeModel, key: &NodeKey, out: &mut Vec<&'a ExplorerNode>) {
            for child in model.children(key) {
                if let Some(node) = model.nodes.get(child) {
                    out.push(node);
                }
                gather(model, child, out);
            }
        }
        let mut out = Vec::new();
        gather(self, key, &mut out);
        out
    }

    /// Depth of `key` below its root, if the node is in the model.
    pub fn depth(&self, key: &NodeKey) -> Option<usize> {
        self.contains(key).then(|| self.ancestors(key).len())
    }
}

/// Holder of the current [`TreeModel`] snapshot.
#[derive(Default)]
pub struct ModelCache {
    current: RwLock<Option<Arc<TreeModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the snapshot for the store's current generation, rebuilding it
    /// first if the cached one is missing or stale.
    pub fn snapshot(&self, store: &ClosureTreeStore) -> Arc<TreeModel> {
        if let Some(model) = self.current.read().as_ref() {
            if model.generation() == store.generation() {
                return Arc::clone(model);
            }
        }
        self.refresh(store)
    }

    /// Unconditionally rebuild from `store` and install the result.
    pub fn refresh(&self, store: &ClosureTreeStore) -> Arc<TreeModel> {
        let started = Instant::now();
        let model = Arc::new(TreeModel::build(store));
        debug!(
            nodes = model.len(),
            generation = model.generation(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "rebuilt tree model"
        );
        *self.current.write() = Some(Arc::clone(&model));
        model
    }

    /// Drop the cached snapshot; the next [`ModelCache::snapshot`] rebuilds.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    pub fn is_cached(&self) -> bool {
        self.current.read().is_some()
    }
}
