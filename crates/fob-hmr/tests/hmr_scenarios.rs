//! End-to-end update scenarios through `HmrService`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fob_hmr::testing::{InMemoryResolver, ManualChangeSource, RecordingSink};
use fob_hmr::{ChangeEvent, ConnectionId, ErrorKind, HmrConfig, HmrError, HmrService, ModuleId};

const TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    resolver: Arc<InMemoryResolver>,
    source: Arc<ManualChangeSource>,
    service: Arc<HmrService>,
}

impl Harness {
    /// main -> a -> b
    fn new() -> Self {
        let resolver = Arc::new(InMemoryResolver::new());
        resolver.add_source("/app/main.js", &["/app/a.js"]);
        resolver.add_source("/app/a.js", &["/app/b.js"]);
        resolver.add_source("/app/b.js", &[]);
        let source = Arc::new(ManualChangeSource::new());
        let service = HmrService::new(resolver.clone(), source.clone(), HmrConfig::default());
        Self {
            resolver,
            source,
            service,
        }
    }

    async fn connect(&self, entry: &str) -> (ConnectionId, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let id = self
            .service
            .connect("ios", entry, sink.clone())
            .await
            .expect("session should seed");
        (id, sink)
    }

    fn modify(&self, path: &str) {
        self.source.emit(ChangeEvent::modified(path));
    }

    fn delete(&self, path: &str) {
        self.source.emit(ChangeEvent::deleted(path));
    }

    fn id(&self, path: &str) -> ModuleId {
        self.resolver.id_of(path).expect("known module")
    }
}

async fn wait_for(sink: &RecordingSink, count: usize) {
    tokio::time::timeout(TIMEOUT, sink.wait_for(count))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} messages, got {:?}", sink.kinds()));
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_connect_and_disconnect_lifecycle() {
    let h = Harness::new();
    assert!(!h.service.is_listening());

    let (first, _) = h.connect("/app/main.js").await;
    let (second, _) = h.connect("/app/main.js").await;
    assert_eq!(h.service.session_count(), 2);
    assert_eq!(h.source.attach_count(), 1);

    assert!(h.service.disconnect(first));
    assert!(!h.service.disconnect(first));
    assert!(h.service.is_listening());

    assert!(h.service.disconnect(second));
    assert!(!h.service.is_listening());
    assert_eq!(h.source.detach_count(), 1);
    assert_eq!(h.service.session_count(), 0);
}

#[tokio::test]
async fn test_missing_entry_is_refused() {
    let h = Harness::new();
    let err = h
        .service
        .connect("ios", "/app/missing.js", Arc::new(RecordingSink::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, HmrError::NotFound { .. }));
    assert_eq!(h.service.session_count(), 0);
    assert!(!h.service.is_listening());
}

#[tokio::test]
async fn test_irrelevant_change_sends_nothing() {
    let h = Harness::new();
    let (_, sink) = h.connect("/app/main.js").await;

    h.modify("/app/unrelated.js");
    h.modify("/app/b.js");
    wait_for(&sink, 3).await;

    // Only the relevant change produced a cycle.
    assert_eq!(sink.kinds(), vec!["update-start", "update", "update-done"]);
}

#[tokio::test]
async fn test_body_edit_pushes_only_that_module() {
    let h = Harness::new();
    let (id, sink) = h.connect("/app/main.js").await;

    h.resolver.set_code("/app/a.js", "module.exports = 42;");
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;

    let updates = sink.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].module_ids(), vec![h.id("/app/a.js")]);
    assert!(updates[0].modules[0].code.contains("module.exports = 42;"));
    assert_eq!(
        updates[0]
            .inverse_dependencies
            .dependents_of(h.id("/app/a.js"))
            .collect::<Vec<_>>(),
        vec![h.id("/app/main.js")]
    );
    assert_eq!(h.resolver.shallow_calls(Path::new("/app/a.js")), 2);

    let session = h.service.session(id).unwrap();
    assert_eq!(session.lock().await.graph().len(), 3);
}

#[tokio::test]
async fn test_new_dependency_is_pushed_before_importer() {
    let h = Harness::new();
    let (id, sink) = h.connect("/app/main.js").await;

    h.resolver.add_source("/app/c.js", &[]);
    h.resolver.set_dependencies("/app/a.js", &["/app/b.js", "/app/c.js"]);
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;

    let updates = sink.updates();
    assert_eq!(
        updates[0].module_ids(),
        vec![h.id("/app/c.js"), h.id("/app/a.js")]
    );
    assert_eq!(updates[0].source_urls.len(), 2);
    assert!(
        updates[0]
            .inverse_dependencies
            .dependents_of(h.id("/app/c.js"))
            .any(|dependent| dependent == h.id("/app/a.js"))
    );

    let session = h.service.session(id).unwrap();
    let session = session.lock().await;
    assert!(session.graph().contains_path(Path::new("/app/c.js")));
}

#[tokio::test]
async fn test_new_subtree_is_pushed_leaf_first() {
    let h = Harness::new();
    let (_, sink) = h.connect("/app/main.js").await;

    h.resolver.add_source("/app/e.js", &[]);
    h.resolver.add_source("/app/d.js", &["/app/e.js"]);
    h.resolver.set_dependencies("/app/a.js", &["/app/b.js", "/app/d.js"]);
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;

    assert_eq!(
        sink.updates()[0].module_ids(),
        vec![h.id("/app/e.js"), h.id("/app/d.js"), h.id("/app/a.js")]
    );
}

#[tokio::test]
async fn test_unreachable_change_is_a_no_op() {
    let h = Harness::new();
    let (id, sink) = h.connect("/app/main.js").await;

    // a stops importing b, so b leaves the graph.
    h.resolver.set_dependencies("/app/a.js", &[]);
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;
    h.modify("/app/b.js");

    // b is irrelevant now; the next cycle comes from a.
    h.modify("/app/a.js");
    wait_for(&sink, 6).await;
    assert_eq!(
        sink.kinds(),
        vec![
            "update-start",
            "update",
            "update-done",
            "update-start",
            "update",
            "update-done"
        ]
    );

    // main drops a in the same save: a is gone by the time it is rebuilt.
    h.resolver.set_dependencies("/app/main.js", &[]);
    h.resolver.set_dependencies("/app/a.js", &["/app/b.js"]);
    sink.clear();
    h.modify("/app/a.js");
    wait_for(&sink, 2).await;
    assert_eq!(sink.kinds(), vec!["update-start", "update-done"]);

    let session = h.service.session(id).unwrap();
    assert_eq!(session.lock().await.graph().len(), 1);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let h = Harness::new();
    h.resolver.add_source("/app/other.js", &["/app/b.js"]);
    let (main_id, main_sink) = h.connect("/app/main.js").await;
    let (other_id, other_sink) = h.connect("/app/other.js").await;

    h.resolver.add_source("/app/c.js", &[]);
    h.resolver.set_dependencies("/app/a.js", &["/app/b.js", "/app/c.js"]);
    h.modify("/app/a.js");
    wait_for(&main_sink, 3).await;

    // Give the other worker a chance to (wrongly) react.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(other_sink.messages().is_empty());

    let other = h.service.session(other_id).unwrap();
    assert!(!other.lock().await.graph().contains_path(Path::new("/app/c.js")));
    let main = h.service.session(main_id).unwrap();
    assert!(main.lock().await.graph().contains_path(Path::new("/app/c.js")));

    // A shared file updates both.
    h.modify("/app/b.js");
    wait_for(&main_sink, 6).await;
    wait_for(&other_sink, 3).await;
}

#[tokio::test]
async fn test_failed_build_keeps_session_usable() {
    let h = Harness::new();
    let (id, sink) = h.connect("/app/main.js").await;

    h.resolver.fail_transform("/app/a.js", "Unexpected token", Some(3));
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;

    assert_eq!(sink.kinds(), vec!["update-start", "error", "update-done"]);
    let error = &sink.errors()[0];
    assert_eq!(error.kind, ErrorKind::TransformError);
    assert_eq!(error.filename.as_deref(), Some("/app/a.js"));
    assert_eq!(error.line_number, Some(3));

    h.resolver.clear_failure("/app/a.js");
    h.modify("/app/a.js");
    wait_for(&sink, 6).await;

    assert_eq!(sink.updates()[0].module_ids(), vec![h.id("/app/a.js")]);
    assert_eq!(h.service.session_count(), 1);
    let session = h.service.session(id).unwrap();
    assert!(session.lock().await.is_active());
}

#[tokio::test]
async fn test_unresolvable_import_reports_error() {
    let h = Harness::new();
    let (_, sink) = h.connect("/app/main.js").await;

    h.resolver.set_dependencies("/app/a.js", &["/app/b.js", "/app/missing.js"]);
    h.modify("/app/a.js");
    wait_for(&sink, 3).await;

    assert_eq!(sink.errors()[0].kind, ErrorKind::NotFoundError);
    assert_eq!(h.service.session_count(), 1);
}

#[tokio::test]
async fn test_internal_errors_are_redacted() {
    let h = Harness::new();
    let (_, sink) = h.connect("/app/main.js").await;

    h.resolver.fail_internal("/app/b.js", "worker crashed at 0xdeadbeef");
    h.modify("/app/b.js");
    wait_for(&sink, 3).await;

    let error = &sink.errors()[0];
    assert_eq!(error.kind, ErrorKind::InternalError);
    assert!(!error.description.contains("0xdeadbeef"));
}

#[tokio::test]
async fn test_deleted_module_is_announced() {
    let h = Harness::new();
    let (_, sink) = h.connect("/app/main.js").await;

    let b = h.id("/app/b.js");
    h.resolver.remove("/app/b.js");
    h.delete("/app/b.js");
    wait_for(&sink, 3).await;

    let update = &sink.updates()[0];
    assert!(update.modules.is_empty());
    assert_eq!(update.deleted_modules, vec![b]);
}

#[tokio::test]
async fn test_deleted_entry_ends_session() {
    let h = Harness::new();
    let (id, sink) = h.connect("/app/main.js").await;

    h.resolver.remove("/app/main.js");
    h.delete("/app/main.js");
    wait_for(&sink, 3).await;

    assert_eq!(sink.kinds(), vec!["update-start", "error", "update-done"]);
    assert_eq!(sink.errors()[0].kind, ErrorKind::NotFoundError);

    eventually(|| h.service.session(id).is_none()).await;
    assert!(!h.service.is_listening());
}

#[tokio::test]
async fn test_changes_are_handled_one_at_a_time() {
    let h = Harness::new();
    h.resolver.set_latency(Duration::from_millis(15));
    let (_, sink) = h.connect("/app/main.js").await;

    h.modify("/app/a.js");
    h.modify("/app/b.js");
    h.modify("/app/main.js");
    wait_for(&sink, 9).await;

    let kinds = sink.kinds();
    for cycle in kinds.chunks(3) {
        assert_eq!(cycle, ["update-start", "update", "update-done"]);
    }
    let order: Vec<_> = sink.updates().iter().map(|u| u.module_ids()[0]).collect();
    assert_eq!(
        order,
        vec![h.id("/app/a.js"), h.id("/app/b.js"), h.id("/app/main.js")]
    );
}

#[tokio::test]
async fn test_disconnect_mid_build_discards_result() {
    let h = Harness::new();
    h.resolver.set_latency(Duration::from_millis(50));
    let (id, sink) = h.connect("/app/main.js").await;

    h.modify("/app/a.js");
    wait_for(&sink, 1).await;
    assert!(h.service.disconnect(id));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.kinds(), vec!["update-start"]);
    assert!(!h.service.is_listening());
}
