//! Document types known to the explorer and which of them the current user
//! can see.

use crate::model::TreeModel;
use crate::permission::{PermissionGate, READ};
use crate::view::{FilterSpec, ViewBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DOC_IMAGE_URL: &str = "document/";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub priority: i32,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub display_type: String,
}

impl DocumentType {
    pub fn new(
        priority: i32,
        doc_type: impl Into<String>,
        display_type: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            doc_type: doc_type.into(),
            display_type: display_type.into(),
        }
    }

    pub fn icon_url(&self) -> String {
        format!("{}{}.png", DOC_IMAGE_URL, self.doc_type)
    }
}

/// Known types ordered by priority, then by type name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentTypeRegistry {
    types: Vec<DocumentType>,
}

impl DocumentTypeRegistry {
    pub fn new(types: impl IntoIterator<Item = DocumentType>) -> Self {
        let mut seen = HashSet::new();
        let mut types: Vec<DocumentType> = types
            .into_iter()
            .filter(|t| seen.insert(t.doc_type.clone()))
            .collect();
        types.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.doc_type.cmp(&b.doc_type))
        });
        Self { types }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_types())
    }

    pub fn all(&self) -> &[DocumentType] {
        &self.types
    }

    pub fn get(&self, doc_type: &str) -> Option<&DocumentType> {
        self.types.iter().find(|t| t.doc_type == doc_type)
    }

    pub fn priority(&self, doc_type: &str) -> Option<i32> {
        self.get(doc_type).map(|t| t.priority)
    }
}

pub fn builtin_types() -> Vec<DocumentType> {
    vec![
        DocumentType::new(1, "Folder", "Folder"),
        DocumentType::new(11, "StatisticStore", "Statistic"),
        DocumentType::new(6, "Pipeline", "Pipeline"),
        DocumentType::new(13, "XMLSchema", "XML Schema"),
        DocumentType::new(10, "Index", "Index"),
        DocumentType::new(99, "Script", "Script"),
        DocumentType::new(9, "Visualisation", "Visualisation"),
        DocumentType::new(3, "Feed", "Feed"),
        DocumentType::new(4, "TextConverter", "Text Converter"),
        DocumentType::new(9, "Dictionary", "Dictionary"),
        DocumentType::new(7, "Dashboard", "Dashboard"),
        DocumentType::new(5, "XSLT", "XSLT"),
    ]
}

/// Registry types that have at least one readable instance, or a readable
/// instance somewhere beneath one, in priority order.
pub fn visible_document_types(
    model: &TreeModel,
    gate: &dyn PermissionGate,
    registry: &DocumentTypeRegistry,
) -> Vec<DocumentType> {
    let readable = ViewBuilder::new(model, gate).filter(&FilterSpec::new().require(READ));
    let present: HashSet<&str> = readable.nodes().map(|n| n.doc_type()).collect();
    registry
        .all()
        .iter()
        .filter(|t| present.contains(t.doc_type.as_str()))
        .cloned()
        .collect()
}
