use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use dockhand_core::{Action, Admission, COMPOSE_FILE};
use dockhand_daemon::{build_router, DaemonState};
use dockhand_reconcile::{ContainerRuntime, Controller, ReconcileError, VersionControl};

type Journal = Arc<Mutex<Vec<String>>>;

struct FakeRepo(Journal);

impl VersionControl for FakeRepo {
    fn is_healthy(&self, working_copy: &Path) -> Result<bool, ReconcileError> {
        Ok(working_copy.is_dir())
    }
    fn clone_into(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().push("clone".into());
        Ok(())
    }
    fn fetch(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().push("fetch".into());
        Ok(())
    }
    fn pending_changes(&self, _working_copy: &Path) -> Result<String, ReconcileError> {
        Ok("M\tweb/docker-compose.yml\n".to_string())
    }
    fn advance(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().push("advance".into());
        Ok(())
    }
}

/// Records calls; when `hold` is set, every call waits for a release signal.
struct Runtime {
    journal: Journal,
    hold: Option<Mutex<mpsc::Receiver<()>>>,
}

impl Runtime {
    fn record(&self, action: Action, dir: &Path) -> Result<(), ReconcileError> {
        if let Some(hold) = &self.hold {
            let _ = hold.lock().unwrap().recv_timeout(Duration::from_secs(10));
        }
        let service = dir.file_name().unwrap().to_string_lossy();
        self.journal.lock().unwrap().push(format!("{action} {service}"));
        Ok(())
    }
}

impl ContainerRuntime for Runtime {
    fn up(&self, dir: &Path) -> Result<(), ReconcileError> {
        self.record(Action::Up, dir)
    }
    fn down(&self, dir: &Path) -> Result<(), ReconcileError> {
        self.record(Action::Down, dir)
    }
    fn restart(&self, dir: &Path) -> Result<(), ReconcileError> {
        self.record(Action::Restart, dir)
    }
}

struct Harness {
    _workspace: TempDir,
    journal: Journal,
    state: Arc<DaemonState>,
    router: Router,
}

fn harness(admission: Admission, hold: Option<mpsc::Receiver<()>>) -> Harness {
    let workspace = TempDir::new().unwrap();
    let copy: PathBuf = workspace.path().join("stack");
    fs::create_dir_all(copy.join("web")).unwrap();
    fs::write(copy.join("web").join(COMPOSE_FILE), "services: {}\n").unwrap();

    let journal = Journal::default();
    let controller = Controller::new(
        &copy,
        None,
        Box::new(FakeRepo(journal.clone())),
        Box::new(Runtime {
            journal: journal.clone(),
            hold: hold.map(Mutex::new),
        }),
    );
    let state = DaemonState::new(controller, admission);
    let router = build_router(state.clone(), Some("s3cret".to_string()));
    Harness {
        _workspace: workspace,
        journal,
        state,
        router,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn wait_for(journal: &Journal, entry: &str) {
    for _ in 0..200 {
        if journal.lock().unwrap().iter().any(|e| e == entry) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("journal never recorded {entry:?}: {:?}", journal.lock().unwrap());
}

async fn wait_until_busy(state: &DaemonState, socket: &Path) {
    for _ in 0..200 {
        if state.status_payload(socket).await["busy"] == serde_json::Value::Bool(true) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("controller never became busy");
}

async fn wait_for_passes(state: &DaemonState, passes: u64) {
    for _ in 0..200 {
        if state.status_payload(Path::new("unused.sock")).await["passes_completed"] == passes {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon never completed {passes} pass(es)");
}

fn count(journal: &Journal, entry: &str) -> usize {
    journal.lock().unwrap().iter().filter(|e| *e == entry).count()
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_or_missing_token_is_unauthorized() {
    let h = harness(Admission::Queue, None);

    let (status, _) = get(&h.router, "/update").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get(&h.router, "/update?token=nope").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get(&h.router, "/start?token=nope&service=web").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.journal.lock().unwrap().is_empty(), "no side effects");
}

#[tokio::test(flavor = "multi_thread")]
async fn router_without_token_refuses_everything() {
    let h = harness(Admission::Queue, None);
    let router = build_router(h.state.clone(), None);

    let (status, _) = get(&router, "/update?token=").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_action_requires_service() {
    let h = harness(Admission::Queue, None);

    let (status, body) = get(&h.router, "/restart?token=s3cret").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("missing service"));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_is_accepted_and_runs_in_background() {
    let h = harness(Admission::Queue, None);

    let (status, _) = get(&h.router, "/update?token=s3cret").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_for(&h.journal, "up web").await;
    assert_eq!(
        *h.journal.lock().unwrap(),
        vec!["fetch", "advance", "up web"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn post_stop_runs_direct_down() {
    let h = harness(Admission::Queue, None);

    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stop?token=s3cret&service=web")
                .header("x-real-ip", "203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_for(&h.journal, "down web").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_controller_conflicts_under_reject() {
    let (release, hold) = mpsc::channel();
    let h = harness(Admission::Reject, Some(hold));

    let (status, _) = get(&h.router, "/start?token=s3cret&service=web").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_until_busy(&h.state, Path::new("unused.sock")).await;

    let (status, _) = get(&h.router, "/update?token=s3cret").await;
    assert_eq!(status, StatusCode::CONFLICT);

    release.send(()).unwrap();
    wait_for(&h.journal, "up web").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn back_to_back_triggers_conflict_under_reject() {
    let (release, hold) = mpsc::channel();
    let h = harness(Admission::Reject, Some(hold));

    let (first, _) = get(&h.router, "/start?token=s3cret&service=web").await;
    let (second, _) = get(&h.router, "/update?token=s3cret").await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);

    release.send(()).unwrap();
    wait_for(&h.journal, "up web").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*h.journal.lock().unwrap(), vec!["up web"]);
    let status = h.state.status_payload(Path::new("unused.sock")).await;
    assert_eq!(status["last_error"], serde_json::Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_pass_triggers_are_folded_together() {
    let (release, hold) = mpsc::channel();
    let h = harness(Admission::Queue, Some(hold));

    let (status, _) = get(&h.router, "/start?token=s3cret&service=web").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_until_busy(&h.state, Path::new("unused.sock")).await;

    for _ in 0..3 {
        let (status, _) = get(&h.router, "/update?token=s3cret").await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    assert!(h.state.pass_pending());

    release.send(()).unwrap();
    release.send(()).unwrap();
    wait_for_passes(&h.state, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!h.state.pass_pending());
    assert_eq!(count(&h.journal, "fetch"), 1);
    assert_eq!(
        *h.journal.lock().unwrap(),
        vec!["up web", "fetch", "advance", "up web"]
    );
}
