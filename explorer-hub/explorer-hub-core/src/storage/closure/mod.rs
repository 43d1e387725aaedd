//! Closure-table index of the explorer hierarchy.
//!
//! Every ancestor/descendant pair is materialised as a row carrying the
//! distance between the two nodes and the sibling position of the descendant.
//! Rows are indexed twice, by ancestor and by descendant, so ancestor and
//! subtree lookups are a single map access with no recursive walk.
//!
//! Nodes are addressed by their `(type, uuid)` key. The numeric ids used as
//! map keys are arena handles private to this module and to the persisted
//! image; they are never reused and never handed out.

use crate::error::{ExplorerError, Result};
use crate::node::{ExplorerNode, NodeKey};
use crate::storage::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

type NodeId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Row {
    depth: u32,
    order_index: u32,
}

/// One closure row expressed with semantic keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathRow {
    pub ancestor: NodeKey,
    pub descendant: NodeKey,
    pub depth: u32,
    pub order_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageNode {
    pub id: u64,
    pub node: ExplorerNode,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageRow {
    pub ancestor: u64,
    pub descendant: u64,
    pub depth: u32,
    pub order_index: u32,
}

/// Serialized form of the store. Nodes and rows are sorted so that two
/// stores holding the same tree produce identical images.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    pub next_id: u64,
    pub root: Option<u64>,
    pub nodes: Vec<ImageNode>,
    pub rows: Vec<ImageRow>,
}

#[derive(Default)]
pub struct ClosureTreeStore {
    nodes: HashMap<NodeId, ExplorerNode>,
    index: HashMap<NodeKey, NodeId>,
    by_ancestor: HashMap<NodeId, HashMap<NodeId, Row>>,
    by_descendant: HashMap<NodeId, HashMap<NodeId, Row>>,
    root: Option<NodeId>,
    next_id: NodeId,
    generation: u64,
}

impl ClosureTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store persisted at `path`, or start empty if nothing has been
    /// written there yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read(path)?;
        let image: StoreImage = serde_json::from_slice(&data)?;
        Self::from_image(image)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), &self.image())
    }

    pub fn from_image(image: StoreImage) -> Result<Self> {
        let mut store = Self {
            next_id: image.next_id,
            root: image.root,
            ..Self::default()
        };
        for ImageNode { id, node } in image.nodes {
            if store.index.insert(node.key(), id).is_some() {
                return Err(ExplorerError::AlreadyExists(node.key()));
            }
            store.next_id = store.next_id.max(id + 1);
            store.nodes.insert(id, node);
        }
        for row in image.rows {
            store.insert_row(
                row.ancestor,
                row.descendant,
                Row {
                    depth: row.depth,
                    order_index: row.order_index,
                },
            );
        }
        Ok(store)
    }

    pub fn image(&self) -> StoreImage {
        let mut nodes: Vec<ImageNode> = self
            .nodes
            .iter()
            .map(|(id, node)| ImageNode {
                id: *id,
                node: node.clone(),
            })
            .collect();
        nodes.sort_by_key(|n| n.id);
        let mut rows: Vec<ImageRow> = self
            .by_ancestor
            .iter()
            .flat_map(|(a, rows)| {
                rows.iter().map(move |(d, row)| ImageRow {
                    ancestor: *a,
                    descendant: *d,
                    depth: row.depth,
                    order_index: row.order_index,
                })
            })
            .collect();
        rows.sort();
        StoreImage {
            next_id: self.next_id,
            root: self.root,
            nodes,
            rows,
        }
    }

    /// Bumped by every mutation; snapshot holders compare against it.
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
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &NodeKey) -> Option<&ExplorerNode> {
        self.index.get(key).and_then(|id| self.nodes.get(id))
    }

    pub fn root(&self) -> Option<&ExplorerNode> {
        self.root.and_then(|id| self.nodes.get(&id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExplorerNode> {
        self.nodes.values()
    }

    /// Insert `node` beneath `parent`, or as the root when `parent` is `None`.
    /// The new node is appended after its existing siblings.
    pub fn create(&mut self, parent: Option<&NodeKey>, node: ExplorerNode) -> Result<()> {
        let key = node.key();
        if self.index.contains_key(&key) {
            return Err(ExplorerError::AlreadyExists(key));
        }
        let parent_id = match parent {
            Some(p) => Some(self.resolve(p)?),
            None => {
                if let Some(root) = self.root() {
                    return Err(ExplorerError::RootExists(root.key()));
                }
                None
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.index.insert(key, id);

        match parent_id {
            Some(pid) => {
                let order_index = self.child_ids(pid).len() as u32;
                self.insert_row(pid, id, Row { depth: 1, order_index });
                let chain: Vec<(NodeId, u32)> = self.ancestor_rows(pid);
                for (ancestor, depth) in chain {
                    self.insert_row(
                        ancestor,
                        id,
                        Row {
                            depth: depth + 1,
                            order_index,
                        },
                    );
                }
            }
            None => self.root = Some(id),
        }
        self.generation += 1;
        Ok(())
    }

    /// Remove `node` from the closure of every ancestor. Any descendants are
    /// cut off along with it: the surviving ancestors lose their rows to
    /// them, while rows among the orphans themselves are kept. Callers remove
    /// leaves only. Removing an absent node succeeds without effect.
    pub fn remove(&mut self, key: &NodeKey) -> Result<()> {
        let Some(id) = self.index.get(key).copied() else {
            debug!(node = %key, "remove of absent node ignored");
            return Ok(());
        };
        let parent = self.parent_id(id);
        let ancestors: Vec<NodeId> = self
            .by_descendant
            .get(&id)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default();
        let orphaned: Vec<NodeId> = self
            .by_ancestor
            .get(&id)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default();
        if !orphaned.is_empty() {
            warn!(node = %key, orphans = orphaned.len(), "removing node with descendants");
        }
        for ancestor in ancestors {
            self.delete_row(ancestor, id);
            for &descendant in &orphaned {
                self.delete_row(ancestor, descendant);
            }
        }
        self.by_descendant.remove(&id);
        self.nodes.remove(&id);
        self.index.remove(key);
        if self.root == Some(id) {
            self.root = None;
        }
        if let Some(pid) = parent {
            self.renumber(pid);
        }
        self.generation += 1;
        Ok(())
    }

    /// Reparent `node` under `new_parent`, carrying its whole subtree along.
    /// Fails with [`ExplorerError::Cycle`] before touching any row when the
    /// target is the node itself or one of its descendants.
    pub fn move_node(&mut self, key: &NodeKey, new_parent: &NodeKey) -> Result<()> {
        let id = self.resolve(key)?;
        let target = self.resolve(new_parent)?;
        // the root is an ancestor of every attached node
        if id == target || self.is_ancestor(id, target) || self.root == Some(id) {
            return Err(ExplorerError::Cycle {
                node: key.clone(),
                target: new_parent.clone(),
            });
        }

        let old_parent = self.parent_id(id);
        let mut subtree: Vec<(NodeId, u32, u32)> = vec![(id, 0, 0)];
        if let Some(rows) = self.by_ancestor.get(&id) {
            for (d, row) in rows {
                subtree.push((*d, row.depth, row.order_index));
            }
        }
        let old_ancestors: Vec<NodeId> = self
            .by_descendant
            .get(&id)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default();

        for ancestor in &old_ancestors {
            for (d, _, _) in &subtree {
                self.delete_row(*ancestor, *d);
            }
        }
        if let Some(pid) = old_parent {
            self.renumber(pid);
        }

        let order_index = self.child_ids(target).len() as u32;
        subtree[0].2 = order_index;
        let mut new_ancestors = vec![(target, 0u32)];
        new_ancestors.extend(self.ancestor_rows(target));
        for (ancestor, above) in new_ancestors {
            for (d, below, order) in &subtree {
                self.insert_row(
                    ancestor,
                    *d,
                    Row {
                        depth: above + 1 + below,
                        order_index: *order,
                    },
                );
            }
        }
        self.generation += 1;
        Ok(())
    }

    pub fn rename(&mut self, key: &NodeKey, name: impl Into<String>) -> Result<()> {
        let id = self.resolve(key)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.doc_ref.name = name.into();
        }
        self.generation += 1;
        Ok(())
    }

    pub fn set_tags(&mut self, key: &NodeKey, tags: BTreeSet<String>) -> Result<()> {
        let id = self.resolve(key)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.tags = tags;
        }
        self.generation += 1;
        Ok(())
    }

    pub fn parent(&self, key: &NodeKey) -> Option<&ExplorerNode> {
        let id = self.index.get(key)?;
        self.parent_id(*id).and_then(|pid| self.nodes.get(&pid))
    }

    /// Direct children of `key` in sibling order.
    pub fn children(&self, key: &NodeKey) -> Vec<&ExplorerNode> {
        let Some(id) = self.index.get(key) else {
            return Vec::new();
        };
        self.child_ids(*id)
            .into_iter()
            .filter_map(|c| self.nodes.get(&c))
            .collect()
    }

    /// Ancestors of `key` with their distance, nearest first.
    pub fn ancestors_of(&self, key: &NodeKey) -> Vec<(&ExplorerNode, u32)> {
        let Some(id) = self.index.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<(&ExplorerNode, u32)> = self
            .ancestor_rows(*id)
            .into_iter()
            .filter_map(|(a, depth)| self.nodes.get(&a).map(|n| (n, depth)))
            .collect();
        out.sort_by_key(|(_, depth)| *depth);
        out
    }

    /// Descendants of `key` with their distance, shallowest first.
    pub fn descendants_of(&self, key: &NodeKey) -> Vec<(&ExplorerNode, u32)> {
        let Some(id) = self.index.get(key) else {
            return Vec::new();
        };
        let Some(rows) = self.by_ancestor.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<(&ExplorerNode, u32, u32)> = rows
            .iter()
            .filter_map(|(d, row)| {
                self.nodes
                    .get(d)
                    .map(|n| (n, row.depth, row.order_index))
            })
            .collect();
        out.sort_by(|a, b| {
            (a.1, a.2)
                .cmp(&(b.1, b.2))
                .then_with(|| a.0.key().cmp(&b.0.key()))
        });
        out.into_iter().map(|(n, depth, _)| (n, depth)).collect()
    }

    /// All live closure rows. Rows that still name a removed node are left
    /// out.
    pub fn path_rows(&self) -> Vec<PathRow> {
        let mut out: Vec<PathRow> = self
            .by_ancestor
            .iter()
            .flat_map(|(a, rows)| rows.iter().map(move |(d, row)| (*a, *d, *row)))
            .filter_map(|(a, d, row)| {
                let ancestor = self.nodes.get(&a)?.key();
                let descendant = self.nodes.get(&d)?.key();
                Some(PathRow {
                    ancestor,
                    descendant,
                    depth: row.depth,
                    order_index: row.order_index,
                })
            })
            .collect();
        out.sort();
        out
    }

    /// Direct parent/child pairs with the child's sibling position. Only
    /// pairs whose parent still exists are reported.
    pub fn direct_edges(&self) -> Vec<(&ExplorerNode, &ExplorerNode, u32)> {
        let mut out = Vec::new();
        for (a, rows) in &self.by_ancestor {
            let Some(parent) = self.nodes.get(a) else {
                continue;
            };
            for (d, row) in rows {
                if row.depth != 1 {
                    continue;
                }
                if let Some(child) = self.nodes.get(d) {
                    out.push((parent, child, row.order_index));
                }
            }
        }
        out
    }

    /// Nodes that cannot be reached from the root.
    pub fn orphans(&self) -> Vec<&ExplorerNode> {
        let mut reachable: HashSet<NodeId> = HashSet::new();
        if let Some(root) = self.root {
            reachable.insert(root);
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                for child in self.child_ids(id) {
                    if reachable.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }
        let mut out: Vec<&ExplorerNode> = self
            .nodes
            .iter()
            .filter(|(id, _)| !reachable.contains(id))
            .map(|(_, n)| n)
            .collect();
        out.sort_by_key(|n| n.key());
        out
    }

    fn resolve(&self, key: &NodeKey) -> Result<NodeId> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| ExplorerError::not_found(key))
    }

    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        self.by_ancestor
            .get(&ancestor)
            .map_or(false, |rows| rows.contains_key(&descendant))
    }

    fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.by_descendant
            .get(&id)?
            .iter()
            .find(|(_, row)| row.depth == 1)
            .map(|(a, _)| *a)
    }

    fn ancestor_rows(&self, id: NodeId) -> Vec<(NodeId, u32)> {
        self.by_descendant
            .get(&id)
            .map(|rows| rows.iter().map(|(a, row)| (*a, row.depth)).collect())
            .unwrap_or_default()
    }

    fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        let Some(rows) = self.by_ancestor.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<(u32, NodeId)> = rows
            .iter()
            .filter(|(_, row)| row.depth == 1)
            .map(|(d, row)| (row.order_index, *d))
            .collect();
        children.sort();
        children.into_iter().map(|(_, d)| d).collect()
    }

    /// Close gaps in the sibling positions under `parent`.
    fn renumber(&mut self, parent: NodeId) {
        for (position, child) in self.child_ids(parent).into_iter().enumerate() {
            self.set_order(child, position as u32);
        }
    }

    fn set_order(&mut self, id: NodeId, order_index: u32) {
        let ancestors: Vec<NodeId> = match self.by_descendant.get_mut(&id) {
            Some(rows) => rows
                .iter_mut()
                .map(|(a, row)| {
                    row.order_index = order_index;
                    *a
                })
                .collect(),
            None => return,
        };
        for a in ancestors {
            if let Some(row) = self.by_ancestor.get_mut(&a).and_then(|r| r.get_mut(&id)) {
                row.order_index = order_index;
            }
        }
    }

    fn insert_row(&mut self, ancestor: NodeId, descendant: NodeId, row: Row) {
        self.by_ancestor
            .entry(ancestor)
            .or_default()
            .insert(descendant, row);
        self.by_descendant
            .entry(descendant)
            .or_default()
            .insert(ancestor, row);
    }

    fn delete_row(&mut self, ancestor: NodeId, descendant: NodeId) {
        if let Some(rows) = self.by_ancestor.get_mut(&ancestor) {
            rows.remove(&descendant);
            if rows.is_empty() {
                self.by_ancestor.remove(&ancestor);
            }
        }
        if let Some(rows) = self.by_descendant.get_mut(&descendant) {
            rows.remove(&ancestor);
            if rows.is_empty() {
                self.by_descendant.remove(&descendant);
            }
        }
    }
}
