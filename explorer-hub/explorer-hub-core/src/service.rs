//! The explorer surface used by the UI: view queries over the current tree
//! snapshot, and the mutations that keep documents and tree in step.
//!
//! Every mutation takes the store's write lock for its whole duration, runs
//! the document step first and the tree step second, and undoes the document
//! step when the tree step fails.

use crate::config::ExplorerConfig;
use crate::document::{DocumentCatalog, DocumentService, DocumentServiceLocator};
use crate::error::{ExplorerError, Result};
use crate::events::{EventBus, ExplorerEvent};
use crate::model::{ModelCache, TreeModel};
use crate::node::{DocRef, ExplorerNode, NodeKey};
use crate::permission::{
    create_permission, AclStore, PermissionGate, UserPermissions, DELETE, READ, UPDATE,
};
use crate::storage::closure::ClosureTreeStore;
use crate::types::{visible_document_types, DocumentType, DocumentTypeRegistry};
use crate::view::{FilterSpec, ViewBuilder, ViewState, ViewTree, SYSTEM_TYPE};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

struct Persistence {
    catalog: Arc<DocumentCatalog>,
    tree_path: PathBuf,
    documents_path: PathBuf,
    acl_path: PathBuf,
}

pub struct ExplorerService {
    config: ExplorerConfig,
    store: RwLock<ClosureTreeStore>,
    models: ModelCache,
    locator: DocumentServiceLocator,
    registry: DocumentTypeRegistry,
    acl: Arc<AclStore>,
    events: EventBus,
    persistence: Option<Persistence>,
}

impl ExplorerService {
    /// Catalog-backed explorer that keeps everything in memory.
    pub fn in_memory(config: ExplorerConfig) -> Result<Self> {
        let catalog = Arc::new(DocumentCatalog::new());
        let validator = config.name_validator()?;
        let locator = DocumentServiceLocator::for_catalog(catalog, &config.registry(), &validator);
        let acl = Arc::new(AclStore::with_administrators(config.administrators.iter().cloned()));
        Ok(Self::with_services(config, ClosureTreeStore::new(), locator, acl))
    }

    /// Catalog-backed explorer persisted under `config.data_dir`.
    pub fn open(config: ExplorerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = ClosureTreeStore::open(config.tree_path())?;
        let catalog = Arc::new(DocumentCatalog::open(config.documents_path())?);
        let acl = Arc::new(AclStore::open(config.acl_path())?);
        for admin in &config.administrators {
            acl.add_administrator(admin.clone());
        }
        let locator = DocumentServiceLocator::for_catalog(
            catalog.clone(),
            &config.registry(),
            &config.name_validator()?,
        );
        info!(
            data_dir = %config.data_dir.display(),
            nodes = store.len(),
            documents = catalog.len(),
            "opened explorer"
        );
        let persistence = Persistence {
            catalog,
            tree_path: config.tree_path(),
            documents_path: config.documents_path(),
            acl_path: config.acl_path(),
        };
        let mut service = Self::with_services(config, store, locator, acl);
        service.persistence = Some(persistence);
        Ok(service)
    }

    /// Explorer over caller-supplied document services. Nothing is persisted.
    pub fn with_services(
        config: ExplorerConfig,
        store: ClosureTreeStore,
        locator: DocumentServiceLocator,
        acl: Arc<AclStore>,
    ) -> Self {
        let events = EventBus::with_capacity(config.event_capacity);
        let registry = config.registry();
        Self {
            config,
            store: RwLock::new(store),
            models: ModelCache::new(),
            locator,
            registry,
            acl,
            events,
            persistence: None,
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn acl(&self) -> &Arc<AclStore> {
        &self.acl
    }

    /// Permission gate acting as `user`.
    pub fn permissions(&self, user: impl Into<String>) -> UserPermissions {
        UserPermissions::new(self.acl.clone(), user)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.events.subscribe()
    }

    /// The root folder, created on first use.
    pub fn ensure_root(&self) -> Result<DocRef> {
        let mut store = self.store.write();
        if let Some(root) = store.root() {
            return Ok(root.doc_ref.clone());
        }
        let root = DocRef::new(
            SYSTEM_TYPE,
            self.config.system_uuid.clone(),
            self.config.system_name.clone(),
        );
        store.create(None, ExplorerNode::new(root.clone()))?;
        info!(root = %root, "created explorer root");
        self.flush(&store)?;
        Ok(root)
    }

    pub fn snapshot(&self) -> Arc<TreeModel> {
        let store = self.store.read();
        self.models.snapshot(&store)
    }

    /// Rebuild the snapshot regardless of whether the store changed.
    pub fn refresh(&self) -> Arc<TreeModel> {
        let store = self.store.read();
        self.models.refresh(&store)
    }

    pub fn get_view(
        &self,
        gate: &dyn PermissionGate,
        filter: &FilterSpec,
        state: &ViewState,
    ) -> ViewTree {
        let model = self.snapshot();
        ViewBuilder::new(&model, gate).build(filter, state)
    }

    pub fn visible_document_types(&self, gate: &dyn PermissionGate) -> Vec<DocumentType> {
        let model = self.snapshot();
        visible_document_types(&model, gate, &self.registry)
    }

    pub fn document_types(&self) -> &[DocumentType] {
        self.registry.all()
    }

    /// Every node beneath `ancestor`, depth first. Empty when it is absent.
    pub fn descendants(&self, ancestor: &NodeKey) -> Vec<DocRef> {
        self.snapshot()
            .descendants(ancestor)
            .into_iter()
            .map(|n| n.doc_ref.clone())
            .collect()
    }

    pub fn children(&self, parent: &NodeKey) -> Vec<DocRef> {
        let model = self.snapshot();
        model
            .children(parent)
            .iter()
            .filter_map(|k| model.node(k))
            .map(|n| n.doc_ref.clone())
            .collect()
    }

    pub fn node(&self, key: &NodeKey) -> Option<ExplorerNode> {
        self.store.read().get(key).cloned()
    }

    pub fn create(
        &self,
        gate: &dyn PermissionGate,
        doc_type: &str,
        folder: &NodeKey,
        name: &str,
    ) -> Result<DocRef> {
        let mut store = self.store.write();
        let folder_ref = lookup(&store, folder)?;
        require(gate, &folder_ref, &create_permission(doc_type))?;
        let service = self.locator.locate(doc_type)?;

        let doc = service.create_document(&folder_ref, name)?;
        if let Err(e) = store.create(Some(folder), ExplorerNode::new(doc.clone())) {
            return Err(compensate("create", e, || service.delete_document(&doc)));
        }
        gate.create_initial_permissions(&doc.doc_type, &doc.uuid, Some(folder));

        info!(doc = %doc, folder = %folder_ref, "created document");
        self.flush(&store)?;
        self.events.send(ExplorerEvent::Created {
            doc: doc.clone(),
            parent: folder.clone(),
        });
        Ok(doc)
    }

    /// Copy a single document into `folder`. The copy gets a new uuid.
    pub fn copy(
        &self,
        gate: &dyn PermissionGate,
        doc: &NodeKey,
        folder: &NodeKey,
        name: Option<&str>,
    ) -> Result<DocRef> {
        let mut store = self.store.write();
        let source = lookup(&store, doc)?;
        let folder_ref = lookup(&store, folder)?;
        require(gate, &source, READ)?;
        require(gate, &folder_ref, &create_permission(&source.doc_type))?;
        let service = self.locator.locate(&source.doc_type)?;

        let tags = store.get(doc).map(|n| n.tags.clone()).unwrap_or_default();
        let copy = service.copy_document(&source, &folder_ref, name)?;
        let node = ExplorerNode::new(copy.clone()).with_tags(tags);
        if let Err(e) = store.create(Some(folder), node) {
            return Err(compensate("copy", e, || service.delete_document(&copy)));
        }
        gate.create_initial_permissions(&copy.doc_type, &copy.uuid, Some(folder));

        info!(source = %source, copy = %copy, folder = %folder_ref, "copied document");
        self.flush(&store)?;
        self.events.send(ExplorerEvent::Copied {
            source,
            copy: copy.clone(),
            parent: folder.clone(),
        });
        Ok(copy)
    }

    /// Reparent `doc` under `folder`, optionally renaming it on the way.
    pub fn move_item(
        &self,
        gate: &dyn PermissionGate,
        doc: &NodeKey,
        folder: &NodeKey,
        name: Option<&str>,
    ) -> Result<DocRef> {
        let mut store = self.store.write();
        let current = lookup(&store, doc)?;
        let folder_ref = lookup(&store, folder)?;
        require(gate, &current, UPDATE)?;
        // rejected up front so the document is never moved for nothing
        let is_root = store.root().map_or(false, |r| r.key() == *doc);
        let into_own_subtree = doc == folder
            || store
                .ancestors_of(folder)
                .iter()
                .any(|(a, _)| a.key() == *doc);
        if is_root || into_own_subtree {
            return Err(ExplorerError::Cycle {
                node: doc.clone(),
                target: folder.clone(),
            });
        }
        let old_folder = store
            .parent(doc)
            .map(|p| p.doc_ref.clone())
            .ok_or_else(|| {
                ExplorerError::StoreInconsistency(format!("{} has no parent", current))
            })?;
        let service = self.locator.locate(&current.doc_type)?;

        let moved = service.move_document(&current, &folder_ref, name)?;
        if moved.key() != *doc {
            error!(before = %current, after = %moved, "document changed identity on move");
            return Err(ExplorerError::StoreInconsistency(format!(
                "move of {} returned {}",
                current, moved
            )));
        }
        if let Err(e) = store.move_node(doc, folder) {
            return Err(compensate("move", e, || {
                service
                    .move_document(&moved, &old_folder, Some(current.name.as_str()))
                    .map(|_| ())
            }));
        }
        if moved.name != current.name {
            store.rename(doc, moved.name.clone())?;
        }

        info!(doc = %moved, from = %old_folder, to = %folder_ref, "moved document");
        self.flush(&store)?;
        self.events.send(ExplorerEvent::Moved {
            doc: moved.clone(),
            new_parent: folder.clone(),
        });
        Ok(moved)
    }

    pub fn rename(&self, gate: &dyn PermissionGate, doc: &NodeKey, name: &str) -> Result<DocRef> {
        let mut store = self.store.write();
        let current = lookup(&store, doc)?;
        require(gate, &current, UPDATE)?;
        let service = self.locator.locate(&current.doc_type)?;

        let renamed = service.rename_document(&current, name)?;
        store.rename(doc, renamed.name.clone())?;

        info!(from = %current, to = %renamed, "renamed document");
        self.flush(&store)?;
        self.events.send(ExplorerEvent::Renamed { doc: renamed.clone() });
        Ok(renamed)
    }

    /// Replace the tags of `doc`. Tags live on the tree node only, so no
    /// document service is involved.
    pub fn set_tags(
        &self,
        gate: &dyn PermissionGate,
        doc: &NodeKey,
        tags: BTreeSet<String>,
    ) -> Result<DocRef> {
        let mut store = self.store.write();
        let current = lookup(&store, doc)?;
        require(gate, &current, UPDATE)?;
        store.set_tags(doc, tags.clone())?;

        info!(doc = %current, tags = tags.len(), "tagged document");
        self.flush(&store)?;
        self.events.send(ExplorerEvent::Tagged {
            doc: current.clone(),
            tags,
        });
        Ok(current)
    }

    /// Delete `doc` and everything beneath it, deepest first. Deleting a node
    /// that is not in the tree succeeds without effect.
    pub fn delete(&self, gate: &dyn PermissionGate, doc: &NodeKey) -> Result<()> {
        let mut store = self.store.write();
        let Some(target) = store.get(doc).map(|n| n.doc_ref.clone()) else {
            debug!(doc = %doc, "delete of absent node ignored");
            return Ok(());
        };
        if store.root().map_or(false, |r| r.key() == *doc) {
            warn!(doc = %target, "refusing to delete the explorer root");
            return Err(ExplorerError::PermissionDenied {
                node: doc.clone(),
                permission: DELETE.to_string(),
            });
        }

        let mut targets: Vec<DocRef> = store
            .descendants_of(doc)
            .into_iter()
            .map(|(n, _)| n.doc_ref.clone())
            .collect();
        targets.reverse();
        targets.push(target);

        let mut plan: Vec<(DocRef, Arc<dyn DocumentService>)> = Vec::with_capacity(targets.len());
        for t in targets {
            require(gate, &t, DELETE)?;
            let service = self.locator.locate(&t.doc_type)?;
            plan.push((t, service));
        }

        let mut deleted = Vec::with_capacity(plan.len());
        let mut outcome = Ok(());
        for (t, service) in plan {
            match service.delete_document(&t) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(doc = %t, "document already gone"),
                Err(e) => {
                    error!(doc = %t, error = %e, "document delete failed");
                    outcome = Err(e);
                    break;
                }
            }
            store.remove(&t.key())?;
            self.acl.clear(&t.key());
            deleted.push(t);
        }

        if !deleted.is_empty() {
            info!(doc = %doc, count = deleted.len(), "deleted documents");
            self.flush(&store)?;
        }
        for t in deleted {
            self.events.send(ExplorerEvent::Deleted { doc: t });
        }
        outcome
    }

    fn flush(&self, store: &ClosureTreeStore) -> Result<()> {
        let Some(p) = &self.persistence else {
            return Ok(());
        };
        let result = store
            .save(&p.tree_path)
            .and_then(|_| p.catalog.save(&p.documents_path))
            .and_then(|_| self.acl.save(&p.acl_path));
        if let Err(e) = &result {
            error!(error = %e, "failed to persist explorer state");
        }
        result
    }
}

fn lookup(store: &ClosureTreeStore, key: &NodeKey) -> Result<DocRef> {
    store
        .get(key)
        .map(|n| n.doc_ref.clone())
        .ok_or_else(|| ExplorerError::not_found(key))
}

fn require(gate: &dyn PermissionGate, doc: &DocRef, permission: &str) -> Result<()> {
    if gate.has_permission(&doc.doc_type, &doc.uuid, permission) {
        return Ok(());
    }
    warn!(doc = %doc, permission, "permission denied");
    Err(ExplorerError::PermissionDenied {
        node: doc.key(),
        permission: permission.to_string(),
    })
}

/// Undo the document half of a mutation whose tree half failed.
fn compensate(
    op: &str,
    failure: ExplorerError,
    undo: impl FnOnce() -> Result<()>,
) -> ExplorerError {
    warn!(op, error = %failure, "tree update failed, undoing document change");
    match undo() {
        Ok(()) => failure,
        Err(undo_error) => {
            error!(
                op,
                error = %failure,
                undo_error = %undo_error,
                "could not undo document change"
            );
            ExplorerError::StoreInconsistency(format!(
                "{} failed ({}) and could not be undone: {}",
                op, failure, undo_error
            ))
        }
    }
}
