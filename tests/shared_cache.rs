use std::fs;
use std::time::Duration;

use stardoc::SharedCache;

#[test]
fn test_is_current_requires_marker_and_matching_hash() {
    let td = tempfile::tempdir().expect("tmpdir");
    let sc = SharedCache::new(td.path().join(".stardoc"));
    sc.ensure_directories().expect("ensure dirs");
    assert!(sc.shared_dir().is_dir());
    assert!(sc.runs_dir().is_dir());

    // First run: nothing installed, no version file.
    assert!(!sc.is_current("").expect("is_current"));
    assert!(!sc.is_current("abc").expect("is_current"));

    // Hash saved but dependency tree missing.
    sc.save_version("abc").expect("save");
    assert!(!sc.is_current("abc").expect("is_current"));

    fs::create_dir_all(sc.shared_dir().join("node_modules")).expect("node_modules");
    assert!(sc.is_current("abc").expect("is_current"));
    assert!(!sc.is_current("def").expect("is_current"));

    // Dependency tree present but version file gone.
    fs::remove_file(sc.version_file()).expect("rm version");
    assert!(!sc.is_current("abc").expect("is_current"));
}

#[test]
fn test_lock_is_exclusive_and_released_on_all_paths() {
    let td = tempfile::tempdir().expect("tmpdir");
    let sc = SharedCache::new(td.path());
    sc.ensure_directories().expect("ensure dirs");

    let held = sc.acquire_lock().expect("first lock");
    assert!(sc.lock_file().exists());
    let err = sc.acquire_lock().expect_err("second lock must fail");
    assert!(err.is_lock_contention(), "unexpected: {err}");
    assert!(err.to_string().contains("another installation is in progress"));
    drop(held);
    assert!(!sc.lock_file().exists());

    // Guard released while unwinding out of a failed critical section.
    let res: Result<(), String> = (|| {
        let _g = sc.acquire_lock().map_err(|e| e.to_string())?;
        Err("install failed".to_string())
    })();
    assert!(res.is_err());
    assert!(!sc.lock_file().exists(), "lock leaked after failure");
    sc.acquire_lock().expect("lock after failure").release().expect("release");
}

#[test]
fn test_cleanup_old_runs_removes_only_expired() {
    let td = tempfile::tempdir().expect("tmpdir");
    let sc = SharedCache::new(td.path());
    sc.ensure_directories().expect("ensure dirs");
    let old = sc.run_dir("old");
    fs::create_dir_all(old.join("src")).expect("old run");
    std::thread::sleep(Duration::from_millis(50));

    // Everything older than 10ms goes; a run created now stays under a long retention.
    let sweep = sc.cleanup_old_runs(Duration::from_millis(10)).expect("sweep");
    assert_eq!(sweep.removed, vec![old.clone()]);
    assert!(!old.exists());

    let fresh = sc.run_dir(&sc.generate_run_id());
    fs::create_dir_all(&fresh).expect("fresh run");
    let sweep = sc
        .cleanup_old_runs(Duration::from_secs(24 * 3600))
        .expect("sweep");
    assert!(sweep.removed.is_empty());
    assert!(fresh.exists());
    assert!(sc.shared_dir().is_dir(), "shared dir must never be swept");
}

#[test]
fn test_cleanup_old_runs_without_runs_dir_is_noop() {
    let td = tempfile::tempdir().expect("tmpdir");
    let sc = SharedCache::new(td.path().join("never-created"));
    let sweep = sc.cleanup_old_runs(Duration::ZERO).expect("sweep");
    assert!(sweep.removed.is_empty() && sweep.failed.is_empty());
}
