//! Document-level collaborators of the explorer.
//!
//! The tree only records where documents sit. Creating, copying, moving,
//! renaming and deleting the documents themselves is delegated to one
//! [`DocumentService`] per document type, found through a
//! [`DocumentServiceLocator`].

pub mod catalog;

pub use catalog::{CatalogDocumentService, DocumentCatalog, DocumentRecord};

use crate::error::{ExplorerError, Result};
use crate::node::DocRef;
use crate::types::DocumentTypeRegistry;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

pub trait DocumentService: Send + Sync {
    fn doc_type(&self) -> &str;

    fn create_document(&self, folder: &DocRef, name: &str) -> Result<DocRef>;

    /// Copy `doc` into `folder` under a fresh uuid. Without a `name` the copy
    /// keeps the source name, made unique within the folder.
    fn copy_document(&self, doc: &DocRef, folder: &DocRef, name: Option<&str>) -> Result<DocRef>;

    fn move_document(&self, doc: &DocRef, folder: &DocRef, name: Option<&str>) -> Result<DocRef>;

    fn rename_document(&self, doc: &DocRef, name: &str) -> Result<DocRef>;

    /// Fails with [`ExplorerError::NotFound`] when the document is absent.
    fn delete_document(&self, doc: &DocRef) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct DocumentServiceLocator {
    services: HashMap<String, Arc<dyn DocumentService>>,
}

impl DocumentServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One catalog-backed service for every type in `registry`.
    pub fn for_catalog(
        catalog: Arc<DocumentCatalog>,
        registry: &DocumentTypeRegistry,
        validator: &NameValidator,
    ) -> Self {
        let mut locator = Self::new();
        for doc_type in registry.all() {
            locator.register(Arc::new(CatalogDocumentService::new(
                catalog.clone(),
                doc_type.doc_type.clone(),
                validator.clone(),
            )));
        }
        locator
    }

    /// Replaces any service already registered for the same type.
    pub fn register(&mut self, service: Arc<dyn DocumentService>) {
        self.services.insert(service.doc_type().to_string(), service);
    }

    pub fn locate(&self, doc_type: &str) -> Result<Arc<dyn DocumentService>> {
        self.services
            .get(doc_type)
            .cloned()
            .ok_or_else(|| {
                ExplorerError::NotFound(format!("document service for type {}", doc_type))
            })
    }

    pub fn contains(&self, doc_type: &str) -> bool {
        self.services.contains_key(doc_type)
    }
}

/// Checks document names against the configured pattern.
#[derive(Clone, Debug)]
pub struct NameValidator {
    pattern: Regex,
}

impl NameValidator {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ExplorerError::Config(format!("invalid name pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.pattern.is_match(name) {
            Ok(())
        } else {
            Err(ExplorerError::InvalidName(name.to_string()))
        }
    }
}
