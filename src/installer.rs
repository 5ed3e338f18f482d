//! Dependency install into the shared cache directory.

use std::path::Path;

use crate::errors::{Result, StardocError};
use crate::pkgmanager::PackageManager;
use crate::process::{run_to_completion, Completed};
use crate::progress::{pick, Spinner, INSTALL_MESSAGES};

/// Run `<pm> install` in `dir`. Output is hidden behind a spinner unless `verbose`.
pub fn install(dir: &Path, pm: PackageManager, verbose: bool) -> Result<()> {
    let (program, args) = pm.install_command();
    tracing::info!(pm = %pm, dir = %dir.display(), "installing shared dependencies");
    let spinner = (!verbose).then(|| Spinner::start(pick(INSTALL_MESSAGES)));
    let res = run_to_completion(&program, &args, dir, verbose);
    match res {
        Ok(Completed { status, .. }) if status.success() => {
            if let Some(sp) = spinner {
                sp.success("Dependencies installed");
            }
            Ok(())
        }
        Ok(Completed { status, tail }) => {
            if let Some(sp) = spinner {
                sp.error("Dependencies installation failed");
            }
            Err(StardocError::InstallFailure(describe_failure(
                pm.name(),
                "install",
                status,
                &tail,
            )))
        }
        Err(e) => {
            if let Some(sp) = spinner {
                sp.error("Dependencies installation failed");
            }
            Err(StardocError::InstallFailure(e.to_string()))
        }
    }
}

/// `<pm> <what> exited with <status>` followed by the captured output tail.
pub(crate) fn describe_failure(
    pm: &str,
    what: &str,
    status: std::process::ExitStatus,
    tail: &[String],
) -> String {
    let mut msg = match status.code() {
        Some(c) => format!("{pm} {what} exited with status {c}"),
        None => format!("{pm} {what} was terminated by a signal"),
    };
    let lines: Vec<&str> = tail
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect();
    if !lines.is_empty() {
        msg.push_str(":\n  ");
        msg.push_str(&lines.join("\n  "));
    }
    msg
}
