use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dockhand_core::{Action, Admission, ServiceName, COMPOSE_FILE, SETTINGS_FILE};
use dockhand_reconcile::{
    pipeline, Controller, ContainerRuntime, Job, JobOutcome, PassKind, PlanPreview,
    ReconcileError, StepPhase, StepResult, VersionControl,
};
use tempfile::TempDir;

type Journal = Arc<Mutex<Vec<String>>>;
type Mutation = Box<dyn Fn(&Path) + Send + Sync>;

/// Working copy is "healthy" when it has a `.git` directory. `advance`
/// applies the upstream mutation so tests can observe pre/post-pull state.
struct FakeRepo {
    journal: Journal,
    seed: Mutation,
    upstream: Mutation,
    changes: String,
}

impl FakeRepo {
    fn new(journal: &Journal, changes: &str) -> Self {
        Self {
            journal: journal.clone(),
            seed: Box::new(|_: &Path| {}),
            upstream: Box::new(|_: &Path| {}),
            changes: changes.to_string(),
        }
    }

    fn log(&self, entry: &str) {
        self.journal.lock().unwrap().push(entry.to_string());
    }
}

impl VersionControl for FakeRepo {
    fn is_healthy(&self, working_copy: &Path) -> Result<bool, ReconcileError> {
        Ok(working_copy.join(".git").is_dir())
    }

    fn clone_into(&self, working_copy: &Path) -> Result<(), ReconcileError> {
        self.log("clone");
        fs::create_dir_all(working_copy.join(".git")).unwrap();
        (self.seed)(working_copy);
        Ok(())
    }

    fn fetch(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.log("fetch");
        Ok(())
    }

    fn pending_changes(&self, _working_copy: &Path) -> Result<String, ReconcileError> {
        Ok(self.changes.clone())
    }

    fn advance(&self, working_copy: &Path) -> Result<(), ReconcileError> {
        self.log("advance");
        (self.upstream)(working_copy);
        Ok(())
    }
}

/// Records `action service`; services in `failing` return an error.
struct Recorder {
    journal: Journal,
    failing: Vec<String>,
}

impl Recorder {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            failing: Vec::new(),
        }
    }

    fn record(&self, action: Action, dir: &Path) -> Result<(), ReconcileError> {
        let service = dir.file_name().unwrap().to_string_lossy().into_owned();
        self.journal.lock().unwrap().push(format!("{action} {service}"));
        if self.failing.contains(&service) {
            return Err(ReconcileError::CommandFailed {
                command: format!("compose {action}"),
                status: "exit status: 1".to_string(),
                stderr: "container exploded".to_string(),
            });
        }
        Ok(())
    }
}

impl ContainerRuntime for Recorder {
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

fn write_service(root: &Path, service: &str) {
    let dir = root.join(service);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(COMPOSE_FILE), "services: {}\n").unwrap();
}

fn existing_copy(workspace: &TempDir, services: &[&str]) -> PathBuf {
    let copy = workspace.path().join("stack");
    fs::create_dir_all(copy.join(".git")).unwrap();
    for service in services {
        write_service(&copy, service);
    }
    copy
}

fn controller(copy: &Path, repo: FakeRepo, runtime: Recorder) -> Controller {
    Controller::new(copy, None, Box::new(repo), Box::new(runtime))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn svc(name: &str) -> ServiceName {
    ServiceName::from(name)
}

// ---------------------------------------------------------------------------
// Two-phase ordering
// ---------------------------------------------------------------------------

#[test]
fn down_runs_before_advance_and_up_after() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["old"]);
    let journal = Journal::default();

    let mut repo = FakeRepo::new(
        &journal,
        "D\told/docker-compose.yml\nA\tnew/docker-compose.yml\n",
    );
    repo.upstream = Box::new(|root: &Path| {
        fs::remove_dir_all(root.join("old")).unwrap();
        write_service(root, "new");
    });

    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.kind, PassKind::Incremental);
    assert_eq!(
        entries(&journal),
        vec!["fetch", "down old", "advance", "up new"]
    );
    assert_eq!(report.applied(), 2);
    assert_eq!(report.steps[0].phase, StepPhase::Down);
    assert_eq!(report.steps[1].phase, StepPhase::UpRestart);
}

#[test]
fn both_passes_follow_settings_order() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["a", "b", "c"]);
    fs::write(copy.join(SETTINGS_FILE), "start:\n  - c\n  - a\n").unwrap();
    let journal = Journal::default();

    let repo = FakeRepo::new(
        &journal,
        "M\ta/docker-compose.yml\nM\tb/app.env\nM\tc/docker-compose.yml\n",
    );
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.plan.order(), &[svc("c"), svc("a"), svc("b")]);
    assert_eq!(
        entries(&journal),
        vec!["fetch", "advance", "up c", "up a", "restart b"]
    );
}

// ---------------------------------------------------------------------------
// Failure semantics
// ---------------------------------------------------------------------------

#[test]
fn unknown_status_aborts_before_any_runtime_call() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web", "db"]);
    let journal = Journal::default();

    let repo = FakeRepo::new(&journal, "D\tdb/docker-compose.yml\nX\tweb/docker-compose.yml\n");
    let err = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::UnknownOperation { .. }), "got: {err}");
    assert_eq!(entries(&journal), vec!["fetch"]);
}

#[test]
fn malformed_settings_abort_before_fetch() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    fs::write(copy.join(SETTINGS_FILE), "start: [unterminated\n").unwrap();
    let journal = Journal::default();

    let repo = FakeRepo::new(&journal, "M\tweb/docker-compose.yml\n");
    let err = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Core(_)), "got: {err}");
    assert!(entries(&journal).is_empty());
}

#[test]
fn one_failing_service_does_not_block_others() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["api", "web"]);
    let journal = Journal::default();

    let repo = FakeRepo::new(
        &journal,
        "M\tapi/docker-compose.yml\nM\tweb/docker-compose.yml\n",
    );
    let mut runtime = Recorder::new(&journal);
    runtime.failing.push("api".to_string());

    let report = controller(&copy, repo, runtime)
        .run_pass(Admission::Queue)
        .expect("pass still completes");

    assert_eq!(entries(&journal), vec!["fetch", "advance", "up api", "up web"]);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.applied(), 1);
    assert!(matches!(
        &report.steps[0].result,
        StepResult::Failed { error } if error.contains("container exploded")
    ));
}

#[test]
fn service_without_compose_definition_is_skipped() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &[]);
    fs::create_dir_all(copy.join("docs")).unwrap();
    let journal = Journal::default();

    let repo = FakeRepo::new(&journal, "M\tdocs/README.md\n");
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.skipped(), 1);
    assert_eq!(entries(&journal), vec!["fetch", "advance"]);
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn repeated_compose_edits_bring_service_up_once() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["svc1"]);
    let journal = Journal::default();

    let repo = FakeRepo::new(
        &journal,
        "M\tsvc1/docker-compose.yml\n\nM\tsvc1/docker-compose.yml\n",
    );
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.plan.queue(&svc("svc1")).unwrap().as_slice(), &[Action::Up]);
    assert_eq!(entries(&journal), vec!["fetch", "advance", "up svc1"]);
}

#[test]
fn deletion_dominates_later_edits() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["svc2"]);
    let journal = Journal::default();

    let repo = FakeRepo::new(&journal, "D\tsvc2/docker-compose.yml\nM\tsvc2/app.env\n");
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.plan.queue(&svc("svc2")).unwrap().as_slice(), &[Action::Down]);
    assert_eq!(entries(&journal), vec!["fetch", "down svc2", "advance"]);
}

#[test]
fn compose_rename_moves_service() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["svcA"]);
    let journal = Journal::default();

    let mut repo = FakeRepo::new(
        &journal,
        "R100\tsvcA/docker-compose.yml\tsvcB/docker-compose.yml\n",
    );
    repo.upstream = Box::new(|root: &Path| {
        fs::rename(root.join("svcA"), root.join("svcB")).unwrap();
    });
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.plan.queue(&svc("svcA")).unwrap().as_slice(), &[Action::Down]);
    assert_eq!(report.plan.queue(&svc("svcB")).unwrap().as_slice(), &[Action::Up]);
    assert_eq!(
        entries(&journal),
        vec!["fetch", "down svcA", "advance", "up svcB"]
    );
}

#[test]
fn fresh_clone_brings_every_service_up_in_lexical_order() {
    let workspace = TempDir::new().unwrap();
    let copy = workspace.path().join("stack");
    let journal = Journal::default();

    let mut repo = FakeRepo::new(&journal, "");
    repo.seed = Box::new(|root: &Path| {
        write_service(root, "y");
        write_service(root, "x");
    });
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.kind, PassKind::Initial);
    assert_eq!(report.plan.order(), &[svc("x"), svc("y")]);
    assert_eq!(entries(&journal), vec!["clone", "up x", "up y"]);
}

#[test]
fn unhealthy_working_copy_is_discarded_and_recloned() {
    let workspace = TempDir::new().unwrap();
    let copy = workspace.path().join("stack");
    fs::create_dir_all(copy.join("leftover")).unwrap();
    let journal = Journal::default();

    let mut repo = FakeRepo::new(&journal, "");
    repo.seed = Box::new(|root: &Path| write_service(root, "web"));
    let report = controller(&copy, repo, Recorder::new(&journal))
        .run_pass(Admission::Queue)
        .expect("pass");

    assert_eq!(report.kind, PassKind::Initial);
    assert!(!copy.join("leftover").exists());
    assert_eq!(entries(&journal), vec!["clone", "up web"]);
}

/// Version-control client whose program cannot be started.
struct MissingClient(Journal);

impl MissingClient {
    fn spawn_error() -> ReconcileError {
        ReconcileError::Spawn {
            command: "git status --porcelain".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
    }
}

impl VersionControl for MissingClient {
    fn is_healthy(&self, _working_copy: &Path) -> Result<bool, ReconcileError> {
        Err(Self::spawn_error())
    }
    fn clone_into(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().push("clone".to_string());
        Err(Self::spawn_error())
    }
    fn fetch(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        self.0.lock().unwrap().push("fetch".to_string());
        Ok(())
    }
    fn pending_changes(&self, _working_copy: &Path) -> Result<String, ReconcileError> {
        Ok(String::new())
    }
    fn advance(&self, _working_copy: &Path) -> Result<(), ReconcileError> {
        Ok(())
    }
}

#[test]
fn unstartable_client_keeps_working_copy() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    let journal = Journal::default();

    let controller = Controller::new(
        &copy,
        None,
        Box::new(MissingClient(journal.clone())),
        Box::new(Recorder::new(&journal)),
    );
    let err = controller.run_pass(Admission::Queue).unwrap_err();

    assert!(matches!(err, ReconcileError::Spawn { .. }), "got: {err}");
    assert!(copy.join("web").join(COMPOSE_FILE).exists());
    assert!(entries(&journal).is_empty());
    assert!(!controller.is_busy());
}

#[test]
fn admitted_pass_runs_under_taken_permit() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    let journal = Journal::default();
    let controller = controller(
        &copy,
        FakeRepo::new(&journal, "M\tweb/app.env\n"),
        Recorder::new(&journal),
    );

    let permit = controller.admit(Admission::Reject).expect("free");
    assert!(controller.is_busy());
    let err = controller.run_pass(Admission::Reject).unwrap_err();
    assert!(matches!(err, ReconcileError::PassInProgress));

    let outcome = pipeline::run_admitted(&controller, Job::Pass, permit).expect("pass");
    assert!(matches!(outcome, JobOutcome::Pass(_)));
    assert!(!controller.is_busy());
    assert_eq!(entries(&journal), vec!["fetch", "advance", "restart web"]);
}

// ---------------------------------------------------------------------------
// Preview & direct actions
// ---------------------------------------------------------------------------

#[test]
fn preview_does_not_execute_or_advance() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    let journal = Journal::default();

    let repo = FakeRepo::new(&journal, "D\tweb/docker-compose.yml\n");
    let ctl = controller(&copy, repo, Recorder::new(&journal));
    let outcome = pipeline::run(&ctl, Job::Preview, Admission::Queue).expect("preview");

    let JobOutcome::Preview(PlanPreview::Incremental { plan }) = outcome else {
        panic!("expected incremental preview, got {outcome:?}");
    };
    assert_eq!(plan.queue(&svc("web")).unwrap().as_slice(), &[Action::Down]);
    assert_eq!(entries(&journal), vec!["fetch"]);
}

#[test]
fn preview_without_working_copy_needs_clone() {
    let workspace = TempDir::new().unwrap();
    let journal = Journal::default();
    let ctl = controller(
        &workspace.path().join("absent"),
        FakeRepo::new(&journal, ""),
        Recorder::new(&journal),
    );

    let preview = ctl.preview().expect("preview");
    assert!(matches!(preview, PlanPreview::NeedsClone));
    assert!(entries(&journal).is_empty());
}

#[test]
fn direct_action_bypasses_the_plan() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    let journal = Journal::default();
    let ctl = controller(&copy, FakeRepo::new(&journal, ""), Recorder::new(&journal));

    let outcome = pipeline::run(&ctl, Job::direct(Action::Restart, "web"), Admission::Reject)
        .expect("direct");
    assert!(matches!(outcome, JobOutcome::Direct(_)));
    assert_eq!(entries(&journal), vec!["restart web"]);
}

#[test]
fn direct_action_failure_is_surfaced() {
    let workspace = TempDir::new().unwrap();
    let copy = existing_copy(&workspace, &["web"]);
    let journal = Journal::default();
    let mut runtime = Recorder::new(&journal);
    runtime.failing.push("web".to_string());
    let ctl = controller(&copy, FakeRepo::new(&journal, ""), runtime);

    let err = ctl
        .direct(Action::Up, &svc("web"), Admission::Queue)
        .unwrap_err();
    assert!(matches!(err, ReconcileError::CommandFailed { .. }));
}
