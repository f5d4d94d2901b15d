mod common;

use common::{test_config, FakeRunner, Harness, Script};
use relay_foundation::RelayConfig;
use relay_task::{
    Category, NewTask, Priority, TaskManager, TaskStatus, TaskStore, TracingNotifier,
};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = TaskStore::open(dir.path(), 5).unwrap();
        store
            .create(
                NewTask::new("persist me")
                    .with_priority(Priority::Urgent)
                    .with_attachment("https://example.com/spec.pdf"),
            )
            .unwrap()
            .id
    };

    let store = TaskStore::open(dir.path(), 5).unwrap();
    let task = store.get(&id).unwrap();
    assert_eq!(task.requirement, "persist me");
    assert_eq!(task.priority, Priority::Urgent);
    assert_eq!(task.attachments, vec!["https://example.com/spec.pdf"]);
    assert_eq!(task.max_retries, 5);
}

#[test]
fn test_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(dir.path(), 3).unwrap();
    let task = store.create(NewTask::new("look at me")).unwrap();
    store.complete(&task.id, "done").unwrap();

    let record = dir.path().join("completed").join(format!("{}.json", task.id));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["output"], "done");

    let index: Vec<String> = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("completed.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(index, vec![task.id.to_string()]);

    let ready: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("ready.json")).unwrap())
            .unwrap();
    assert!(ready.is_empty());
}

#[test]
fn test_partial_temp_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(dir.path(), 3).unwrap();
    let task = store.create(NewTask::new("atomic")).unwrap();

    // A writer died between writing the temp file and renaming it
    let temp = dir
        .path()
        .join("ready")
        .join(format!(".{}.json.a1b2c3.tmp", task.id));
    std::fs::write(temp, "{\"id\": \"trunc").unwrap();

    assert_eq!(store.get(&task.id).unwrap().requirement, "atomic");
    assert!(store.reconcile().unwrap().is_clean());
    assert_eq!(store.list_ready().len(), 1);
}

#[test]
fn test_two_stores_share_one_directory() {
    const N: usize = 50;
    let dir = tempfile::tempdir().unwrap();

    // The daemon and a CLI invocation each open their own store
    let daemon = TaskStore::open(dir.path(), 3).unwrap();
    let cli = TaskStore::open(dir.path(), 3).unwrap();

    let seeded: Vec<_> = (0..N)
        .map(|n| daemon.create(NewTask::new(format!("seed {}", n))).unwrap().id)
        .collect();
    for id in &seeded {
        daemon.start(id).unwrap();
    }

    let added = std::thread::scope(|scope| {
        scope.spawn(|| {
            for id in &seeded {
                daemon.complete(id, "done").unwrap();
            }
        });
        let adder = scope.spawn(|| {
            (0..N)
                .map(|n| cli.create(NewTask::new(format!("new {}", n))).unwrap().id)
                .collect::<Vec<_>>()
        });
        adder.join().unwrap()
    });

    let ready: HashSet<_> = daemon.read_index(Category::Ready).into_iter().collect();
    assert_eq!(ready, added.into_iter().collect::<HashSet<_>>());
    assert_eq!(daemon.read_index(Category::Completed).len(), N);
    assert!(daemon.reconcile().unwrap().is_clean());
}

#[tokio::test]
async fn test_restart_recovers_orphans() {
    let h = Harness::new(
        FakeRunner::with_fallback(vec![Script::fail(1, &["Error: x"])], Script::hang(&[])),
        test_config(false, 1),
    );
    let task = h.store.create(NewTask::new("crashy")).unwrap();

    // One failed attempt, then a second attempt left running
    for run in h.executor.tick().await {
        run.join().await.unwrap();
    }
    let _running = h.executor.tick().await;
    assert_eq!(h.store.get(&task.id).unwrap().status, TaskStatus::InProgress);

    // A new process opens the same directory; the old executor is gone
    let store = TaskStore::open(h.dir.path(), 15).unwrap();
    assert_eq!(store.recover_orphans().unwrap(), 1);
    let recovered = store.get(&task.id).unwrap();
    assert_eq!(recovered.status, TaskStatus::Ready);
    assert_eq!(recovered.current_retry, 1);

    h.executor.stop().await;
}

#[tokio::test]
async fn test_manager_surface() {
    let dir = tempfile::tempdir().unwrap();
    let config = RelayConfig::with_defaults();
    let manager = TaskManager::open(
        dir.path(),
        &config,
        Arc::new(FakeRunner::new(vec![])),
        Arc::new(TracingNotifier),
    )
    .unwrap();

    let task = manager
        .create_task(NewTask::new("through the facade"))
        .unwrap();
    assert_eq!(manager.list_ready().len(), 1);
    assert_eq!(manager.get_by_id(task.id.as_str()).unwrap().id, task.id);
    assert!(manager.get_by_id("20000101-000000-ZZZ").is_none());
    assert!(manager.get_by_id("../config").is_none());
    assert!(manager.cancel("../ready").await.is_err());

    let stats = manager.stats().await;
    assert_eq!(stats.store.ready, 1);
    assert_eq!(stats.running, 0);
    assert!(!stats.executor_running);

    assert!(manager.cancel(task.id.as_str()).await.unwrap());
    assert!(!manager.cancel(task.id.as_str()).await.unwrap());
    assert!(manager.list_ready().is_empty());

    manager.create_task(NewTask::new("one")).unwrap();
    manager.create_task(NewTask::new("two")).unwrap();
    manager.reset().await.unwrap();
    assert_eq!(manager.stats().await.store.total(), 0);
    assert!(manager.store().read_index(Category::Ready).is_empty());
}
