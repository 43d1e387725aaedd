//! Construction of the filtered, partially expanded explorer view.
//!
//! A view is derived from one [`TreeModel`] snapshot in two passes:
//!
//! 1. Inclusion, bottom-up. A node is kept if it matches the filter itself or
//!    if any of its descendants was kept, so every match stays connected to a
//!    root through its ancestors.
//! 2. State assignment, top-down from each kept root. Nodes without kept
//!    children are leaves; the rest are open when explicitly opened, forced
//!    open to reveal an `ensure_visible` node or a name-filter hit, or
//!    shallower than `min_depth`, and closed otherwise. Children of a closed
//!    node are not emitted.

use crate::model::TreeModel;
use crate::node::{ExplorerNode, NodeKey};
use crate::permission::PermissionGate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Type of the root folder. Always passes the type filter.
pub const SYSTEM_TYPE: &str = "System";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Every one of these must be held on a node for it to match. An empty
    /// set matches nothing.
    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
    #[serde(default)]
    pub included_types: Option<BTreeSet<String>>,
    /// A node matches if it carries at least one of these.
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    /// Case-insensitive substring of the node name.
    #[serde(default)]
    pub name_filter: Option<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.insert(permission.into());
        self
    }

    pub fn include_type(mut self, doc_type: impl Into<String>) -> Self {
        self.included_types
            .get_or_insert_with(BTreeSet::new)
            .insert(doc_type.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeSet::new).insert(tag.into());
        self
    }

    pub fn name(mut self, name_filter: impl Into<String>) -> Self {
        self.name_filter = Some(name_filter.into());
        self
    }
}

/// Client-held expansion state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub open_items: HashSet<NodeKey>,
    #[serde(default)]
    pub ensure_visible: HashSet<NodeKey>,
    #[serde(default)]
    pub min_depth: usize,
}

impl ViewState {
    pub fn new(min_depth: usize) -> Self {
        Self {
            min_depth,
            ..Self::default()
        }
    }

    pub fn open(mut self, key: NodeKey) -> Self {
        self.open_items.insert(key);
        self
    }

    pub fn ensure_visible(mut self, key: NodeKey) -> Self {
        self.ensure_visible.insert(key);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Leaf,
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewNode {
    pub node: ExplorerNode,
    pub state: NodeState,
    pub depth: usize,
}

/// A node of the view flattened for display, in depth-first order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    pub key: NodeKey,
    pub name: String,
    pub state: NodeState,
    pub depth: usize,
    pub parent: Option<NodeKey>,
}

/// The pruned, annotated tree handed to the UI.
#[derive(Clone, Debug, Default)]
pub struct ViewTree {
    roots: Vec<NodeKey>,
    nodes: HashMap<NodeKey, ViewNode>,
    parent_map: HashMap<NodeKey, NodeKey>,
    child_map: HashMap<NodeKey, Vec<NodeKey>>,
    opened_items: HashSet<NodeKey>,
}

impl ViewTree {
    fn insert(&mut self, parent: Option<&NodeKey>, node: ViewNode) {
        let key = node.node.key();
        match parent {
            Some(p) => {
                self.parent_map.insert(key.clone(), p.clone());
                self.child_map.entry(p.clone()).or_default().push(key.clone());
            }
            None => self.roots.push(key.clone()),
        }
        self.nodes.insert(key, node);
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
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

    pub fn node(&self, key: &NodeKey) -> Option<&ViewNode> {
        self.nodes.get(key)
    }

    pub fn state(&self, key: &NodeKey) -> Option<NodeState> {
        self.nodes.get(key).map(|n| n.state)
    }

    pub fn parent(&self, key: &NodeKey) -> Option<&NodeKey> {
        self.parent_map.get(key)
    }

    pub fn children(&self, key: &NodeKey) -> &[NodeKey] {
        self.child_map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes that were opened to satisfy `ensure_visible` or to reveal the
    /// hits of a name filter.
    pub fn opened_items(&self) -> &HashSet<NodeKey> {
        &self.opened_items
    }

    pub fn rows(&self) -> Vec<ViewRow> {
        fn walk(tree: &ViewTree, key: &NodeKey, out: &mut Vec<ViewRow>) {
            let Some(view_node) = tree.nodes.get(key) else {
                return;
            };
            out.push(ViewRow {
                key: key.clone(),
                name: view_node.node.name().to_string(),
                state: view_node.state,
                depth: view_node.depth,
                parent: tree.parent_map.get(key).cloned(),
            });
            for child in tree.children(key) {
                walk(tree, child, out);
            }
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            walk(self, root, &mut out);
        }
        out
    }
}

/// Derives views from a single model snapshot on behalf of one caller.
pub struct ViewBuilder<'a> {
    model: &'a TreeModel,
    gate: &'a dyn PermissionGate,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(model: &'a TreeModel, gate: &'a dyn PermissionGate) -> Self {
        Self { model, gate }
    }

    /// Inclusion pass: the sub-model of nodes that match `filter` plus the
    /// ancestors needed to reach them.
    pub fn filter(&self, filter: &FilterSpec) -> TreeModel {
        self.include(filter).0
    }

    /// The inclusion pass, also returning the nodes that matched in their own
    /// right rather than as connectors.
    fn include(&self, filter: &FilterSpec) -> (TreeModel, Vec<NodeKey>) {
        let matcher = Matcher::new(self.gate, filter);
        let mut out = TreeModel::new();
        let mut matched = Vec::new();
        for root in self.model.roots() {
            let Some(node) = self.model.node(root) else {
                continue;
            };
            let has_descendants = self.add_descendants(root, &matcher, &mut out, &mut matched);
            let is_match = matcher.matches(node);
            if is_match {
                matched.push(root.clone());
            }
            if has_descendants || is_match {
                out.add(None, node.clone());
            }
        }
        (out, matched)
    }

    fn add_descendants(
        &self,
        parent: &NodeKey,
        matcher: &Matcher<'_>,
        out: &mut TreeModel,
        matched: &mut Vec<NodeKey>,
    ) -> bool {
        let mut added = false;
        for child in self.model.children(parent) {
            let Some(node) = self.model.node(child) else {
                continue;
            };
            let has_descendants = self.add_descendants(child, matcher, out, matched);
            let is_match = matcher.matches(node);
            if is_match {
                matched.push(child.clone());
            }
            if has_descendants || is_match {
                out.add(Some(parent), node.clone());
                added = true;
            }
        }
        added
    }

    pub fn build(&self, filter: &FilterSpec, state: &ViewState) -> ViewTree {
        let (filtered, matched) = self.include(filter);
        let mut forced_open = self.forced_open(&filtered, state);
        if filter.name_filter.is_some() {
            // a name search reveals every hit
            for key in &matched {
                forced_open.extend(filtered.ancestors(key).into_iter().cloned());
            }
        }

        let mut tree = ViewTree::default();
        for root in filtered.roots() {
            self.assign(&filtered, None, root, 0, state, &forced_open, &mut tree);
        }
        debug!(
            included = filtered.len(),
            emitted = tree.len(),
            opened = tree.opened_items.len(),
            "built explorer view"
        );
        tree
    }

    /// Proper ancestors, taken from the unfiltered model, of every
    /// `ensure_visible` node that survived the inclusion pass.
    fn forced_open(&self, filtered: &TreeModel, state: &ViewState) -> HashSet<NodeKey> {
        let mut forced = HashSet::new();
        for key in &state.ensure_visible {
            if !filtered.contains(key) {
                continue;
            }
            forced.extend(self.model.ancestors(key).into_iter().cloned());
        }
        forced
    }

    #[allow(clippy::too_many_arguments)]
    fn assign(
        &self,
        filtered: &TreeModel,
        parent: Option<&NodeKey>,
        key: &NodeKey,
        depth: usize,
        state: &ViewState,
        forced_open: &HashSet<NodeKey>,
        tree: &mut ViewTree,
    ) {
        let Some(node) = filtered.node(key) else {
            return;
        };
        let forced = forced_open.contains(key);
        if forced {
            tree.opened_items.insert(key.clone());
        }
        let node_state = if !filtered.has_children(key) {
            NodeState::Leaf
        } else if forced || state.open_items.contains(key) || depth < state.min_depth {
            NodeState::Open
        } else {
            NodeState::Closed
        };
        tree.insert(
            parent,
            ViewNode {
                node: node.clone(),
                state: node_state,
                depth,
            },
        );
        if node_state == NodeState::Open {
            for child in filtered.children(key) {
                self.assign(filtered, Some(key), child, depth + 1, state, forced_open, tree);
            }
        }
    }
}

/// The per-node predicate of the inclusion pass.
struct Matcher<'a> {
    gate: &'a dyn PermissionGate,
    filter: &'a FilterSpec,
    name_filter: Option<String>,
}

impl<'a> Matcher<'a> {
    fn new(gate: &'a dyn PermissionGate, filter: &'a FilterSpec) -> Self {
        Self {
            gate,
            filter,
            name_filter: filter.name_filter.as_ref().map(|n| n.to_lowercase()),
        }
    }

    fn matches(&self, node: &ExplorerNode) -> bool {
        self.check_security(node)
            && self.check_type(node)
            && self.check_tags(node)
            && self.check_name(node)
    }

    fn check_security(&self, node: &ExplorerNode) -> bool {
        if self.filter.required_permissions.is_empty() {
            return false;
        }
        self.filter
            .required_permissions
            .iter()
            .all(|permission| self.gate.has_permission(node.doc_type(), node.uuid(), permission))
    }

    fn check_type(&self, node: &ExplorerNode) -> bool {
        match &self.filter.included_types {
            None => true,
            Some(types) => node.doc_type() == SYSTEM_TYPE || types.contains(node.doc_type()),
        }
    }

    fn check_tags(&self, node: &ExplorerNode) -> bool {
        match &self.filter.tags {
            None => true,
            Some(tags) => node.tags.iter().any(|t| tags.contains(t)),
        }
    }

    fn check_name(&self, node: &ExplorerNode) -> bool {
        match &self.name_filter {
            None => true,
            Some(filter) => node.name().to_lowercase().contains(filter.as_str()),
        }
    }
}
