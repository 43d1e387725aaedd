use crate::node::{DocRef, NodeKey};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// Structural change published after a mutation has been applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ExplorerEvent {
    Created { doc: DocRef, parent: NodeKey },
    Copied { source: DocRef, copy: DocRef, parent: NodeKey },
    Moved { doc: DocRef, new_parent: NodeKey },
    Renamed { doc: DocRef },
    Tagged { doc: DocRef, tags: BTreeSet<String> },
    Deleted { doc: DocRef },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExplorerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: ExplorerEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
