use super::{DocumentService, NameValidator};
use crate::error::{ExplorerError, Result};
use crate::node::{DocRef, NodeKey};
use crate::storage::write_json_atomic;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_ref: DocRef,
    /// uuid of the containing folder
    pub folder: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat record of every document, shared by the per-type
/// [`CatalogDocumentService`]s.
#[derive(Default)]
pub struct DocumentCatalog {
    records: RwLock<HashMap<NodeKey, DocumentRecord>>,
}

impl DocumentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let records: Vec<DocumentRecord> = serde_json::from_str(&data)?;
        Ok(Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.doc_ref.key(), r))
                    .collect(),
            ),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut records: Vec<DocumentRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.doc_ref.key().cmp(&b.doc_ref.key()));
        write_json_atomic(path.as_ref(), &records)
    }

    pub fn get(&self, key: &NodeKey) -> Option<DocumentRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn name_taken(
    records: &HashMap<NodeKey, DocumentRecord>,
    doc_type: &str,
    folder: &str,
    name: &str,
    except: Option<&NodeKey>,
) -> bool {
    records.iter().any(|(key, r)| {
        Some(key) != except
            && r.doc_ref.doc_type == doc_type
            && r.folder == folder
            && r.doc_ref.name == name
    })
}

pub struct CatalogDocumentService {
    catalog: Arc<DocumentCatalog>,
    doc_type: String,
    validator: NameValidator,
}

impl CatalogDocumentService {
    pub fn new(
        catalog: Arc<DocumentCatalog>,
        doc_type: impl Into<String>,
        validator: NameValidator,
    ) -> Self {
        Self {
            catalog,
            doc_type: doc_type.into(),
            validator,
        }
    }

    fn check_name(
        &self,
        records: &HashMap<NodeKey, DocumentRecord>,
        folder: &str,
        name: &str,
        except: Option<&NodeKey>,
    ) -> Result<()> {
        self.validator.validate(name)?;
        if name_taken(records, &self.doc_type, folder, name, except) {
            return Err(ExplorerError::NameConflict {
                doc_type: self.doc_type.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn unique_name(
        &self,
        records: &HashMap<NodeKey, DocumentRecord>,
        folder: &str,
        base: &str,
    ) -> String {
        if !name_taken(records, &self.doc_type, folder, base, None) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !name_taken(records, &self.doc_type, folder, candidate, None))
            .unwrap_or_else(|| base.to_string())
    }

    fn insert_new(
        &self,
        records: &mut HashMap<NodeKey, DocumentRecord>,
        folder: &str,
        name: String,
    ) -> DocRef {
        let now = Utc::now();
        let doc_ref = DocRef::new(self.doc_type.clone(), Uuid::new_v4().to_string(), name);
        records.insert(
            doc_ref.key(),
            DocumentRecord {
                doc_ref: doc_ref.clone(),
                folder: folder.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        doc_ref
    }
}

impl DocumentService for CatalogDocumentService {
    fn doc_type(&self) -> &str {
        &self.doc_type
    }

    fn create_document(&self, folder: &DocRef, name: &str) -> Result<DocRef> {
        let mut records = self.catalog.records.write();
        self.check_name(&records, &folder.uuid, name, None)?;
        Ok(self.insert_new(&mut records, &folder.uuid, name.to_string()))
    }

    fn copy_document(&self, doc: &DocRef, folder: &DocRef, name: Option<&str>) -> Result<DocRef> {
        let mut records = self.catalog.records.write();
        let source = records
            .get(&doc.key())
            .ok_or_else(|| ExplorerError::not_found(&doc.key()))?;
        let name = match name {
            Some(name) => {
                self.check_name(&records, &folder.uuid, name, None)?;
                name.to_string()
            }
            None => self.unique_name(&records, &folder.uuid, &source.doc_ref.name),
        };
        Ok(self.insert_new(&mut records, &folder.uuid, name))
    }

    fn move_document(&self, doc: &DocRef, folder: &DocRef, name: Option<&str>) -> Result<DocRef> {
        let key = doc.key();
        let mut records = self.catalog.records.write();
        let current = records
            .get(&key)
            .ok_or_else(|| ExplorerError::not_found(&key))?;
        let name = name.unwrap_or(current.doc_ref.name.as_str()).to_string();
        self.check_name(&records, &folder.uuid, &name, Some(&key))?;
        let record = records
            .get_mut(&key)
            .ok_or_else(|| ExplorerError::not_found(&key))?;
        record.folder = folder.uuid.clone();
        record.doc_ref.name = name;
        record.updated_at = Utc::now();
        Ok(record.doc_ref.clone())
    }

    fn rename_document(&self, doc: &DocRef, name: &str) -> Result<DocRef> {
        let key = doc.key();
        let mut records = self.catalog.records.write();
        let folder = records
            .get(&key)
            .map(|r| r.folder.clone())
            .ok_or_else(|| ExplorerError::not_found(&key))?;
        self.check_name(&records, &folder, name, Some(&key))?;
        let record = records
            .get_mut(&key)
            .ok_or_else(|| ExplorerError::not_found(&key))?;
        record.doc_ref.name = name.to_string();
        record.updated_at = Utc::now();
        Ok(record.doc_ref.clone())
    }

    fn delete_document(&self, doc: &DocRef) -> Result<()> {
        self.catalog
            .records
            .write()
            .remove(&doc.key())
            .map(|_| ())
            .ok_or_else(|| ExplorerError::not_found(&doc.key()))
    }
}
