use explorer_hub_core::config::ExplorerConfig;
use explorer_hub_core::document::{DocumentService, DocumentServiceLocator};
use explorer_hub_core::events::ExplorerEvent;
use explorer_hub_core::permission::{create_permission, AclStore, DELETE, READ};
use explorer_hub_core::storage::closure::ClosureTreeStore;
use explorer_hub_core::view::{FilterSpec, ViewState};
use explorer_hub_core::{DocRef, ExplorerError, ExplorerService, NodeKey, Result};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn admin_config() -> ExplorerConfig {
    ExplorerConfig {
        administrators: vec!["admin".to_string()],
        ..ExplorerConfig::default()
    }
}

fn root() -> NodeKey {
    NodeKey::new("System", "0")
}

/// System -> {A, B -> {B1, B2}, C -> {C1 -> {C11}}}, all folders.
fn sample() -> (ExplorerService, Vec<(String, NodeKey)>) {
    let service = ExplorerService::in_memory(admin_config()).unwrap();
    service.ensure_root().unwrap();
    let admin = service.permissions("admin");
    let mut keys: Vec<(String, NodeKey)> = vec![("System".to_string(), root())];
    for (parent, child) in [
        ("System", "A"),
        ("System", "B"),
        ("System", "C"),
        ("B", "B1"),
        ("B", "B2"),
        ("C", "C1"),
        ("C1", "C11"),
    ] {
        let parent_key = keys.iter().find(|(n, _)| n == parent).unwrap().1.clone();
        let doc = service.create(&admin, "Folder", &parent_key, child).unwrap();
        keys.push((child.to_string(), doc.key()));
    }
    (service, keys)
}

fn find(keys: &[(String, NodeKey)], name: &str) -> NodeKey {
    keys.iter().find(|(n, _)| n == name).unwrap().1.clone()
}

fn child_names(service: &ExplorerService, parent: &NodeKey) -> Vec<String> {
    service.children(parent).into_iter().map(|d| d.name).collect()
}

#[test]
fn create_then_move_round_trip() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let x = service.create(&admin, "Folder", &root(), "X").unwrap();
    assert!(child_names(&service, &root()).contains(&"X".to_string()));

    let b = find(&keys, "B");
    service.move_item(&admin, &x.key(), &b, None).unwrap();
    assert_eq!(child_names(&service, &b), vec!["B1", "B2", "X"]);
    assert!(!child_names(&service, &root()).contains(&"X".to_string()));
}

#[test]
fn move_can_rename() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let moved = service
        .move_item(&admin, &find(&keys, "A"), &find(&keys, "B"), Some("Renamed"))
        .unwrap();
    assert_eq!(moved.name, "Renamed");
    assert_eq!(child_names(&service, &find(&keys, "B")), vec!["B1", "B2", "Renamed"]);
}

#[test]
fn move_into_descendant_is_rejected_without_effect() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let before = service.descendants(&root());
    let generation = service.snapshot().generation();

    let err = service
        .move_item(&admin, &find(&keys, "C"), &find(&keys, "C11"), None)
        .unwrap_err();
    assert!(matches!(err, ExplorerError::Cycle { .. }));
    assert_eq!(service.descendants(&root()), before);
    assert_eq!(service.snapshot().generation(), generation);
}

#[test]
fn delete_is_idempotent_and_cascades() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let c = find(&keys, "C");
    service.delete(&admin, &c).unwrap();
    assert!(service.descendants(&c).is_empty());
    assert!(service.node(&find(&keys, "C11")).is_none());
    assert_eq!(child_names(&service, &root()), vec!["A", "B"]);

    service.delete(&admin, &c).unwrap();
    assert_eq!(service.snapshot().len(), 5);
}

#[test]
fn delete_needs_permission_on_every_descendant() {
    let (service, keys) = sample();
    let b = find(&keys, "B");
    let acl = service.acl();
    acl.grant(&b, "bob", DELETE);
    acl.grant(&find(&keys, "B1"), "bob", DELETE);
    let bob = service.permissions("bob");

    let err = service.delete(&bob, &b).unwrap_err();
    assert!(matches!(
        err,
        ExplorerError::PermissionDenied { ref permission, .. } if permission == DELETE
    ));
    assert_eq!(child_names(&service, &b), vec!["B1", "B2"]);
}

#[test]
fn duplicate_name_is_rejected_before_any_write() {
    let (service, _) = sample();
    let admin = service.permissions("admin");
    let generation = service.snapshot().generation();
    let err = service.create(&admin, "Folder", &root(), "A").unwrap_err();
    assert!(matches!(err, ExplorerError::NameConflict { .. }));
    let err = service.create(&admin, "Folder", &root(), "no/slashes").unwrap_err();
    assert!(matches!(err, ExplorerError::InvalidName(_)));
    assert_eq!(service.snapshot().generation(), generation);
}

#[test]
fn copy_needs_read_and_create() {
    let (service, keys) = sample();
    let a = find(&keys, "A");
    let b = find(&keys, "B");
    let acl = service.acl();
    acl.grant(&b, "carol", &create_permission("Folder"));
    let carol = service.permissions("carol");

    let err = service.copy(&carol, &a, &b, None).unwrap_err();
    assert!(matches!(
        err,
        ExplorerError::PermissionDenied { ref permission, .. } if permission == READ
    ));

    acl.grant(&a, "carol", READ);
    let copy = service.copy(&carol, &a, &b, None).unwrap();
    assert_ne!(copy.uuid, a.uuid);
    assert_eq!(copy.name, "A");
    assert_eq!(child_names(&service, &b), vec!["B1", "B2", "A"]);
    // the copy inherits B's grants and belongs to carol
    assert!(acl.check("carol", &copy.key(), DELETE));
}

#[test]
fn view_and_types_follow_permissions() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    service.create(&admin, "Feed", &find(&keys, "C1"), "Events").unwrap();

    let types: Vec<String> = service
        .visible_document_types(&admin)
        .into_iter()
        .map(|t| t.doc_type)
        .collect();
    assert_eq!(types, vec!["Folder", "Feed"]);

    // dave can only read B2
    service.acl().grant(&find(&keys, "B2"), "dave", READ);
    let dave = service.permissions("dave");
    let view = service.get_view(
        &dave,
        &FilterSpec::new().require(READ),
        &ViewState::new(0).ensure_visible(find(&keys, "B2")),
    );
    let names: Vec<String> = view.rows().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["System", "B", "B2"]);
    let types: Vec<String> = service
        .visible_document_types(&dave)
        .into_iter()
        .map(|t| t.doc_type)
        .collect();
    assert_eq!(types, vec!["Folder"]);
}

#[test]
fn mutations_publish_events() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let mut events = service.subscribe();

    let doc = service.create(&admin, "Feed", &find(&keys, "A"), "Events").unwrap();
    service.rename(&admin, &doc.key(), "Events2").unwrap();
    service.delete(&admin, &doc.key()).unwrap();

    assert!(matches!(events.try_recv().unwrap(), ExplorerEvent::Created { .. }));
    match events.try_recv().unwrap() {
        ExplorerEvent::Renamed { doc } => assert_eq!(doc.name, "Events2"),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(events.try_recv().unwrap(), ExplorerEvent::Deleted { .. }));
}

#[test]
fn tags_feed_the_tag_filter_and_follow_copies() {
    let (service, keys) = sample();
    let admin = service.permissions("admin");
    let mut events = service.subscribe();
    let b1 = find(&keys, "B1");

    let tags: BTreeSet<String> = ["blue".to_string()].into_iter().collect();
    service.set_tags(&admin, &b1, tags.clone()).unwrap();
    match events.try_recv().unwrap() {
        ExplorerEvent::Tagged { doc, tags: sent } => {
            assert_eq!(doc.key(), b1);
            assert_eq!(sent, tags);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let filter = FilterSpec::new().require(READ).tag("blue");
    let view = service.get_view(&admin, &filter, &ViewState::new(5));
    let names: Vec<String> = view.rows().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["System", "B", "B1"]);

    let copy = service.copy(&admin, &b1, &find(&keys, "A"), None).unwrap();
    assert_eq!(service.node(&copy.key()).unwrap().tags, tags);

    // read access alone cannot retag
    service.acl().grant(&b1, "erin", READ);
    let erin = service.permissions("erin");
    let err = service.set_tags(&erin, &b1, BTreeSet::new()).unwrap_err();
    assert!(matches!(err, ExplorerError::PermissionDenied { .. }));
    assert_eq!(service.node(&b1).unwrap().tags, tags);
}

#[test]
fn state_survives_reopen() {
    let tempdir = tempfile::tempdir().unwrap();
    let config = admin_config().with_data_dir(tempdir.path());
    let feed = {
        let service = ExplorerService::open(config.clone()).unwrap();
        service.ensure_root().unwrap();
        let admin = service.permissions("admin");
        let folder = service.create(&admin, "Folder", &root(), "Top").unwrap();
        service.create(&admin, "Feed", &folder.key(), "Events").unwrap()
    };

    let service = ExplorerService::open(config).unwrap();
    assert_eq!(service.snapshot().len(), 3);
    let node = service.node(&feed.key()).unwrap();
    assert_eq!(node.name(), "Events");
    // the catalog came back too, so the name is still taken
    let top = service.children(&root())[0].key();
    let err = service
        .create(&service.permissions("admin"), "Feed", &top, "Events")
        .unwrap_err();
    assert!(matches!(err, ExplorerError::NameConflict { .. }));
}

/// Hands out the same uuid every time, so a second create collides in the
/// tree after the document step has succeeded.
struct FixedUuid {
    deleted: Mutex<Vec<DocRef>>,
    fail_delete: bool,
}

impl FixedUuid {
    fn new(fail_delete: bool) -> Self {
        Self {
            deleted: Mutex::new(Vec::new()),
            fail_delete,
        }
    }
}

impl DocumentService for FixedUuid {
    fn doc_type(&self) -> &str {
        "Feed"
    }

    fn create_document(&self, _folder: &DocRef, name: &str) -> Result<DocRef> {
        Ok(DocRef::new("Feed", "fixed", name))
    }

    fn copy_document(&self, doc: &DocRef, _folder: &DocRef, name: Option<&str>) -> Result<DocRef> {
        Ok(DocRef::new("Feed", "fixed", name.unwrap_or(doc.name.as_str())))
    }

    fn move_document(&self, doc: &DocRef, _folder: &DocRef, name: Option<&str>) -> Result<DocRef> {
        Ok(DocRef::new("Feed", doc.uuid.clone(), name.unwrap_or(doc.name.as_str())))
    }

    fn rename_document(&self, doc: &DocRef, name: &str) -> Result<DocRef> {
        Ok(DocRef::new("Feed", doc.uuid.clone(), name))
    }

    fn delete_document(&self, doc: &DocRef) -> Result<()> {
        if self.fail_delete {
            return Err(ExplorerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "backing store unavailable",
            )));
        }
        self.deleted.lock().unwrap().push(doc.clone());
        Ok(())
    }
}

fn with_mock(mock: Arc<FixedUuid>) -> ExplorerService {
    let mut locator = DocumentServiceLocator::new();
    locator.register(mock);
    let service = ExplorerService::with_services(
        admin_config(),
        ClosureTreeStore::new(),
        locator,
        Arc::new(AclStore::with_administrators(["admin"])),
    );
    service.ensure_root().unwrap();
    service
}

#[test]
fn failed_tree_step_undoes_document_step() {
    let mock = Arc::new(FixedUuid::new(false));
    let service = with_mock(mock.clone());
    let admin = service.permissions("admin");

    service.create(&admin, "Feed", &root(), "First").unwrap();
    let err = service.create(&admin, "Feed", &root(), "Second").unwrap_err();
    assert!(matches!(err, ExplorerError::AlreadyExists(_)));
    let deleted = mock.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].name, "Second");
    assert_eq!(service.snapshot().len(), 2);
}

#[test]
fn failed_undo_is_an_inconsistency() {
    let service = with_mock(Arc::new(FixedUuid::new(true)));
    let admin = service.permissions("admin");

    service.create(&admin, "Feed", &root(), "First").unwrap();
    let err = service.create(&admin, "Feed", &root(), "Second").unwrap_err();
    assert!(matches!(err, ExplorerError::StoreInconsistency(_)));
}
