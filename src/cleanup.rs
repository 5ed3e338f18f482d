//! Single teardown path shared by normal exit, error exit and the signal handler.
//!
//! Teardown order: a running build step, then the server, then the workspace.
//! Nothing that may still touch the workspace survives its removal.
//!
//! `cleanup()` runs its side effects at most once. A caller arriving while
//! another caller is mid-cleanup blocks until that run finishes and gets the
//! same report back.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::color::{color_enabled_stderr, log_info_stderr};
use crate::config::TERMINATE_WAIT;
use crate::errors::StardocError;
use crate::process::ManagedChild;
use crate::server::ServerHandle;
use crate::workspace::Workspace;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Outcome of the one cleanup run. Failures are informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub job_error: Option<String>,
    pub server_error: Option<String>,
    pub workspace_error: Option<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.job_error.is_none() && self.server_error.is_none() && self.workspace_error.is_none()
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    InProgress,
    Done(CleanupReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// The slot was taken; the new one was not registered.
    AlreadyRegistered,
    /// Cleanup already started; the server or job was stopped right away.
    StoppedLate,
}

pub struct CleanupManager {
    workspace: Option<Workspace>,
    server: Mutex<Option<Arc<dyn ServerHandle>>>,
    job: Mutex<Option<Arc<ManagedChild>>>,
    job_grace: Duration,
    phase: Mutex<Phase>,
    done: Condvar,
}

impl CleanupManager {
    pub fn new(workspace: Workspace) -> Self {
        Self::with_workspace(Some(workspace))
    }

    pub fn with_workspace(workspace: Option<Workspace>) -> Self {
        Self {
            workspace,
            server: Mutex::new(None),
            job: Mutex::new(None),
            job_grace: TERMINATE_WAIT,
            phase: Mutex::new(Phase::Idle),
            done: Condvar::new(),
        }
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.path().to_path_buf())
    }

    /// Register the server to stop during cleanup. Only the first registration
    /// counts. A server registered after cleanup began is stopped immediately so
    /// it cannot outlive the workspace.
    pub fn register_server(&self, server: Arc<dyn ServerHandle>) -> Registration {
        let phase = lock(&self.phase);
        if !matches!(*phase, Phase::Idle) {
            drop(phase);
            tracing::debug!(server = server.name(), "late registration, stopping now");
            let _ = server.stop();
            return Registration::StoppedLate;
        }
        let mut slot = lock(&self.server);
        if slot.is_some() {
            return Registration::AlreadyRegistered;
        }
        tracing::debug!(server = server.name(), url = %server.url(), "server registered");
        *slot = Some(server);
        Registration::Registered
    }

    /// Register a finite step (the site build) running in the workspace. Same
    /// rules as `register_server`; call `finish_job` once it has exited.
    pub fn register_job(&self, job: Arc<ManagedChild>) -> Registration {
        let phase = lock(&self.phase);
        if !matches!(*phase, Phase::Idle) {
            drop(phase);
            tracing::debug!(pid = job.pid(), "late job registration, terminating now");
            let _ = job.terminate(self.job_grace);
            return Registration::StoppedLate;
        }
        let mut slot = lock(&self.job);
        if slot.is_some() {
            return Registration::AlreadyRegistered;
        }
        tracing::debug!(pid = job.pid(), program = job.program(), "job registered");
        *slot = Some(job);
        Registration::Registered
    }

    pub fn finish_job(&self) {
        lock(&self.job).take();
    }

    pub fn has_job(&self) -> bool {
        lock(&self.job).is_some()
    }

    /// True once a cleanup has begun, whoever triggered it.
    pub fn is_started(&self) -> bool {
        !matches!(*lock(&self.phase), Phase::Idle)
    }

    pub fn has_server(&self) -> bool {
        lock(&self.server).is_some()
    }

    pub fn is_done(&self) -> bool {
        matches!(*lock(&self.phase), Phase::Done(_))
    }

    /// Stop the running job and the server, then remove the workspace. Never fails; problems are
    /// printed as warnings and returned in the report.
    pub fn cleanup(&self) -> CleanupReport {
        {
            let mut phase = lock(&self.phase);
            loop {
                if let Phase::Done(report) = &*phase {
                    return report.clone();
                }
                if matches!(*phase, Phase::Idle) {
                    *phase = Phase::InProgress;
                    break;
                }
                phase = self.done.wait(phase).unwrap_or_else(|p| p.into_inner());
            }
        }
        tracing::debug!("cleanup started");

        let report = self.run();

        *lock(&self.phase) = Phase::Done(report.clone());
        self.done.notify_all();
        tracing::debug!(clean = report.is_clean(), "cleanup finished");
        report
    }

    fn run(&self) -> CleanupReport {
        let use_err = color_enabled_stderr();
        let mut report = CleanupReport::default();

        let job = lock(&self.job).take();
        if let Some(job) = job.filter(|j| j.is_running()) {
            let name = job_name(&job);
            log_info_stderr(use_err, &format!("Stopping {name}..."));
            if let Err(e) = job.terminate(self.job_grace) {
                let msg = failure_message(&e);
                crate::ui::warn_print(&format!("failed to stop {name}: {msg}"));
                report.job_error = Some(msg);
            }
        }

        // The server may still be reading files under the workspace.
        let server = lock(&self.server).take();
        if let Some(server) = server {
            log_info_stderr(use_err, "Stopping server...");
            if let Err(e) = server.stop() {
                let msg = failure_message(&e);
                crate::ui::warn_print(&format!("failed to stop {}: {msg}", server.name()));
                report.server_error = Some(msg);
            }
        }

        if let Some(ws) = &self.workspace {
            log_info_stderr(use_err, "Cleaning up workspace...");
            if let Err(e) = ws.cleanup() {
                let msg = failure_message(&e);
                crate::ui::warn_print(&format!(
                    "failed to remove workspace {}: {msg}",
                    ws.path().display()
                ));
                eprintln!("You may need to manually remove this directory");
                report.workspace_error = Some(msg);
            }
        }

        if report.is_clean() {
            log_info_stderr(use_err, "Cleanup complete");
        }
        report
    }
}

fn job_name(job: &ManagedChild) -> String {
    std::path::Path::new(job.program())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.program().to_string())
}

fn failure_message(e: &StardocError) -> String {
    match e {
        StardocError::CleanupFailure { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
