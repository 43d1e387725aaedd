//! Identities of the documents held in the explorer tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Semantic identity of a tree node. Two nodes are the same node exactly when
/// type and uuid match; the name is an attribute and may change.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub doc_type: String,
    pub uuid: String,
}

impl NodeKey {
    pub fn new(doc_type: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            uuid: uuid.into(),
        }
    }

    /// Parse the `type:uuid` form used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (doc_type, uuid) = s.split_once(':')?;
        if doc_type.is_empty() || uuid.is_empty() {
            return None;
        }
        Some(Self::new(doc_type, uuid))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc_type, self.uuid)
    }
}

/// Canonical (type, uuid, name) reference to a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRef {
    pub doc_type: String,
    pub uuid: String,
    pub name: String,
}

impl DocRef {
    pub fn new(
        doc_type: impl Into<String>,
        uuid: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            doc_type: doc_type.into(),
            uuid: uuid.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.doc_type.clone(), self.uuid.clone())
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.doc_type, self.uuid)
    }
}

/// A document as it appears in the explorer: its reference plus tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerNode {
    pub doc_ref: DocRef,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ExplorerNode {
    pub fn new(doc_ref: DocRef) -> Self {
        Self {
            doc_ref,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn key(&self) -> NodeKey {
        self.doc_ref.key()
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_ref.doc_type
    }

    pub fn uuid(&self) -> &str {
        &self.doc_ref.uuid
    }

    pub fn name(&self) -> &str {
        &self.doc_ref.name
    }
}
