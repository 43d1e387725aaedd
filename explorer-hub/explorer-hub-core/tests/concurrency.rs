use explorer_hub_core::config::ExplorerConfig;
use explorer_hub_core::permission::READ;
use explorer_hub_core::view::{FilterSpec, ViewState};
use explorer_hub_core::{ExplorerService, NodeKey};
use std::sync::Arc;

fn service() -> Arc<ExplorerService> {
    let config = ExplorerConfig {
        administrators: vec!["admin".to_string()],
        ..ExplorerConfig::default()
    };
    let service = ExplorerService::in_memory(config).unwrap();
    service.ensure_root().unwrap();
    Arc::new(service)
}

fn root() -> NodeKey {
    NodeKey::new("System", "0")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_all_land() {
    let service = service();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let s = service.clone();
        tasks.push(tokio::spawn(async move {
            let admin = s.permissions("admin");
            let name = format!("folder{}", i);
            let folder = s.create(&admin, "Folder", &root(), &name).unwrap();
            for j in 0..5 {
                s.create(&admin, "Feed", &folder.key(), &format!("feed{}", j)).unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let model = service.snapshot();
    assert_eq!(model.len(), 1 + 8 * 6);
    assert_eq!(model.children(&root()).len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_whole_snapshots() {
    let service = service();
    let admin = service.permissions("admin");
    let folder = service.create(&admin, "Folder", &root(), "Moving").unwrap();
    let left = service.create(&admin, "Folder", &root(), "Left").unwrap();
    let right = service.create(&admin, "Folder", &root(), "Right").unwrap();

    let writer = {
        let s = service.clone();
        let (folder, left, right) = (folder.key(), left.key(), right.key());
        tokio::spawn(async move {
            let admin = s.permissions("admin");
            for i in 0..50 {
                let target = if i % 2 == 0 { &left } else { &right };
                s.move_item(&admin, &folder, target, None).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let reader = {
        let s = service.clone();
        let key = folder.key();
        tokio::spawn(async move {
            let admin = s.permissions("admin");
            for _ in 0..50 {
                let view = s.get_view(
                    &admin,
                    &FilterSpec::new().require(READ),
                    &ViewState::new(0).ensure_visible(key.clone()),
                );
                // the moving folder always hangs under exactly one parent
                let parent = view.parent(&key).cloned().unwrap();
                assert!(view.children(&parent).contains(&key));
                tokio::task::yield_now().await;
            }
        })
    };

    let (w, r) = tokio::join!(writer, reader);
    w.unwrap();
    r.unwrap();
    assert_eq!(service.children(&right.key())[0].key(), folder.key());
}
