use explorer_hub_core::model::TreeModel;
use explorer_hub_core::permission::{PermissionGate, READ};
use explorer_hub_core::storage::closure::ClosureTreeStore;
use explorer_hub_core::view::{FilterSpec, NodeState, ViewBuilder, ViewState};
use explorer_hub_core::{DocRef, ExplorerError, ExplorerNode, NodeKey};
use proptest::prelude::*;

/// Readable unless the uuid is listed.
struct Hidden(Vec<String>);

impl PermissionGate for Hidden {
    fn has_permission(&self, _: &str, uuid: &str, _: &str) -> bool {
        !self.0.iter().any(|h| h == uuid)
    }

    fn create_initial_permissions(&self, _: &str, _: &str, _: Option<&NodeKey>) {}
}

fn key(i: usize) -> NodeKey {
    NodeKey::new("Folder", format!("n{}", i))
}

/// Node `i` is attached beneath some earlier node chosen by `parents[i - 1]`.
fn build(parents: &[usize]) -> ClosureTreeStore {
    let mut store = ClosureTreeStore::new();
    store
        .create(None, ExplorerNode::new(DocRef::new("Folder", "n0", "n0")))
        .unwrap();
    for (i, p) in parents.iter().enumerate() {
        let id = i + 1;
        let name = format!("n{}", id);
        store
            .create(
                Some(&key(p % id)),
                ExplorerNode::new(DocRef::new("Folder", name.clone(), name)),
            )
            .unwrap();
    }
    store
}

fn check_closure(store: &ClosureTreeStore) {
    let model = TreeModel::build(store);
    assert_eq!(model.len(), store.len());
    for node in store.nodes() {
        let k = node.key();
        let rows: Vec<(NodeKey, u32)> = store
            .ancestors_of(&k)
            .into_iter()
            .map(|(a, d)| (a.key(), d))
            .collect();
        let chain: Vec<(NodeKey, u32)> = model
            .ancestors(&k)
            .into_iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i as u32 + 1))
            .collect();
        assert_eq!(rows, chain);
    }
}

proptest! {
    #[test]
    fn moves_keep_closure_complete(
        parents in prop::collection::vec(any::<usize>(), 1..40),
        moves in prop::collection::vec((any::<usize>(), any::<usize>()), 0..20),
    ) {
        let mut store = build(&parents);
        let n = parents.len() + 1;
        for (a, b) in moves {
            let (node, target) = (key(a % n), key(b % n));
            let before = store.image();
            match store.move_node(&node, &target) {
                Ok(()) => {}
                Err(ExplorerError::Cycle { .. }) => prop_assert_eq!(store.image(), before),
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        check_closure(&store);
    }

    #[test]
    fn views_stay_connected(
        parents in prop::collection::vec(any::<usize>(), 1..40),
        hidden in prop::collection::vec(any::<usize>(), 0..20),
        opened in prop::collection::vec(any::<usize>(), 0..10),
        ensure in prop::collection::vec(any::<usize>(), 0..3),
        min_depth in 0usize..4,
    ) {
        let store = build(&parents);
        let n = parents.len() + 1;
        let model = TreeModel::build(&store);
        let gate = Hidden(hidden.iter().map(|h| format!("n{}", h % n)).collect());
        let mut state = ViewState::new(min_depth);
        for o in opened {
            state = state.open(key(o % n));
        }
        for e in ensure {
            state = state.ensure_visible(key(e % n));
        }
        let view = ViewBuilder::new(&model, &gate).build(&FilterSpec::new().require(READ), &state);

        for row in view.rows() {
            if let Some(parent) = &row.parent {
                prop_assert!(view.contains(parent));
                prop_assert_eq!(view.state(parent), Some(NodeState::Open));
            }
            if row.depth < min_depth && !view.children(&row.key).is_empty() {
                prop_assert_eq!(row.state, NodeState::Open);
            }
        }
        for k in &state.ensure_visible {
            if view.contains(k) {
                for a in model.ancestors(k) {
                    prop_assert!(view.opened_items().contains(a));
                }
            }
        }
    }
}
