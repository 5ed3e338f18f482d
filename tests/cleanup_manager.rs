#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stardoc::errors::Result;
use stardoc::{
    CleanupManager, ManagedChild, Registration, ServerHandle, SharedCache, StardocError, Workspace,
};

/// Records every stop and whether the workspace still existed at that moment.
struct RecordingServer {
    log: Arc<Mutex<Vec<String>>>,
    workspace: PathBuf,
    stops: AtomicUsize,
    fail: bool,
    delay: Duration,
}

impl ServerHandle for RecordingServer {
    fn name(&self) -> &str {
        "recording server"
    }

    fn url(&self) -> String {
        "http://localhost:4321".to_string()
    }

    fn stop(&self) -> Result<()> {
        thread::sleep(self.delay);
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().expect("log").push(format!(
            "stop(workspace_exists={})",
            self.workspace.exists()
        ));
        if self.fail {
            return Err(StardocError::CleanupFailure {
                resource: "server".into(),
                message: "refused to stop".into(),
            });
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stops.load(Ordering::SeqCst) == 0
    }
}

fn workspace(td: &tempfile::TempDir) -> Workspace {
    let sc = SharedCache::new(td.path());
    sc.ensure_directories().expect("dirs");
    fs::create_dir_all(sc.shared_dir().join("node_modules")).expect("node_modules");
    fs::write(sc.shared_dir().join("package.json"), "{}").expect("package.json");
    let ws = Workspace::create(sc.run_dir("run"), sc.shared_dir()).expect("create");
    ws.setup().expect("setup");
    fs::write(ws.docs_dir().join("index.md"), "# hi").expect("doc");
    ws
}

fn server(ws: &Workspace, fail: bool, delay: Duration) -> (Arc<RecordingServer>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::new(RecordingServer {
        log: log.clone(),
        workspace: ws.path().to_path_buf(),
        stops: AtomicUsize::new(0),
        fail,
        delay,
    });
    (s, log)
}

#[test]
fn test_server_stopped_before_workspace_removed() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let path = ws.path().to_path_buf();
    let (srv, log) = server(&ws, false, Duration::ZERO);
    let cm = CleanupManager::new(ws);
    assert_eq!(cm.register_server(srv.clone()), Registration::Registered);

    let report = cm.cleanup();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(*log.lock().expect("log"), vec!["stop(workspace_exists=true)"]);
    assert!(!path.exists());
    assert!(td.path().join("shared/node_modules").is_dir());
}

#[test]
fn test_concurrent_triggers_run_cleanup_once() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let (srv, _log) = server(&ws, false, Duration::from_millis(200));
    let cm = Arc::new(CleanupManager::new(ws));
    cm.register_server(srv.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cm = cm.clone();
            thread::spawn(move || cm.cleanup())
        })
        .collect();
    let reports: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .collect();

    assert_eq!(srv.stops.load(Ordering::SeqCst), 1);
    assert!(reports.iter().all(|r| r == &reports[0]));
    assert!(cm.is_done());
}

#[test]
fn test_server_stop_failure_still_removes_workspace() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let path = ws.path().to_path_buf();
    let (srv, _log) = server(&ws, true, Duration::ZERO);
    let cm = CleanupManager::new(ws);
    cm.register_server(srv);

    let report = cm.cleanup();
    assert_eq!(report.server_error.as_deref(), Some("refused to stop"));
    assert!(report.workspace_error.is_none());
    assert!(!path.exists());
}

#[test]
fn test_read_only_workspace_reports_warning() {
    if common::is_root() {
        eprintln!("skipping: permission checks do not apply to root");
        return;
    }
    use std::os::unix::fs::PermissionsExt;

    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let path = ws.path().to_path_buf();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o555)).expect("chmod ro");

    let cm = CleanupManager::new(ws);
    let report = cm.cleanup();
    let err = report.workspace_error.clone();

    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod rw");
    assert!(err.is_some(), "removal of a read-only workspace should fail");
    assert!(path.exists());
    // Cached: the failing step is not retried by later triggers.
    assert_eq!(cm.cleanup(), report);
}

#[test]
fn test_cleanup_without_server_only_removes_workspace() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let path = ws.path().to_path_buf();
    let cm = CleanupManager::new(ws);
    assert!(!cm.has_server());
    assert!(cm.cleanup().is_clean());
    assert!(!path.exists());
}

fn sleeper(dir: &std::path::Path) -> Arc<ManagedChild> {
    let args = vec!["-c".to_string(), "sleep 30".to_string()];
    Arc::new(ManagedChild::start("sh", &args, dir).expect("spawn sleeper"))
}

#[test]
fn test_running_job_stopped_before_server_and_workspace() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let path = ws.path().to_path_buf();
    let job = sleeper(td.path());
    let (srv, log) = server(&ws, false, Duration::ZERO);
    let cm = CleanupManager::new(ws);
    assert_eq!(cm.register_job(job.clone()), Registration::Registered);
    let extra = sleeper(td.path());
    assert_eq!(cm.register_job(extra.clone()), Registration::AlreadyRegistered);
    extra.terminate(Duration::from_secs(2)).expect("terminate extra");
    cm.register_server(srv);
    assert!(cm.has_job());

    let report = cm.cleanup();
    assert!(report.is_clean(), "{report:?}");
    assert!(!job.is_running());
    assert!(!cm.has_job());
    assert_eq!(*log.lock().expect("log"), vec!["stop(workspace_exists=true)"]);
    assert!(!path.exists());
}

#[test]
fn test_job_registered_after_cleanup_is_stopped_at_once() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let cm = CleanupManager::new(ws);
    assert!(!cm.is_started());
    cm.cleanup();
    assert!(cm.is_started());

    let job = sleeper(td.path());
    assert_eq!(cm.register_job(job.clone()), Registration::StoppedLate);
    assert!(!job.is_running());
    assert!(!cm.has_job());
}

#[test]
fn test_finished_job_is_left_alone() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ws = workspace(&td);
    let cm = CleanupManager::new(ws);
    let args = vec!["-c".to_string(), "exit 0".to_string()];
    let job = Arc::new(ManagedChild::start("sh", &args, td.path()).expect("spawn"));
    cm.register_job(job.clone());
    job.wait(Duration::from_millis(10)).expect("wait");
    cm.finish_job();
    assert!(!cm.has_job());
    assert!(cm.cleanup().is_clean());
}
