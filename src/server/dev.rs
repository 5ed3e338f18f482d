use std::path::Path;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{local_url, ServerHandle};
use crate::errors::Result;
use crate::pkgmanager::PackageManager;
use crate::process::{ManagedChild, Readiness};

/// The site generator's own dev server, run under `ManagedChild`.
#[derive(Debug)]
pub struct DevServer {
    child: ManagedChild,
    requested_port: u16,
    port: std::sync::Mutex<u16>,
    grace: Duration,
    stopped: AtomicBool,
}

impl DevServer {
    pub fn start(pm: PackageManager, workdir: &Path, port: u16, grace: Duration) -> Result<Self> {
        let (program, args) = pm.dev_command(port);
        let child = ManagedChild::start(&program, &args, workdir)?;
        Ok(Self::from_child(child, port, grace))
    }

    pub fn from_child(child: ManagedChild, port: u16, grace: Duration) -> Self {
        Self {
            child,
            requested_port: port,
            port: std::sync::Mutex::new(port),
            grace,
            stopped: AtomicBool::new(false),
        }
    }

    /// Wait for the ready line; on timeout assume the requested port.
    pub fn wait_ready(&self, timeout: Duration) -> Readiness {
        let r = self.child.wait_ready(timeout, self.requested_port);
        *self.port.lock().unwrap_or_else(|p| p.into_inner()) = r.port();
        r
    }

    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// Block until the process exits on its own or is stopped.
    pub fn wait_exit(&self) -> Option<ExitStatus> {
        self.child.wait_exit(Duration::from_millis(100))
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl ServerHandle for DevServer {
    fn name(&self) -> &str {
        "dev server"
    }

    fn url(&self) -> String {
        local_url(*self.port.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        let outcome = self.child.terminate(self.grace)?;
        tracing::debug!(pid = self.child.pid(), ?outcome, "dev server stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_running()
    }
}
