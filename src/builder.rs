//! Static site build inside a workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cleanup::{CleanupManager, Registration};
use crate::errors::{Result, StardocError};
use crate::installer::describe_failure;
use crate::pkgmanager::PackageManager;
use crate::process::{run_supervised, Completed, ProcessGroup};
use crate::progress::{pick, Spinner, BUILD_MESSAGES};

/// Run `<pm> run build` in `workdir` and return the `dist/` path.
///
/// The build runs in its own process group and is registered with `cleanup`,
/// so a shutdown stops it before the workspace goes away.
pub fn build(
    workdir: &Path,
    pm: PackageManager,
    verbose: bool,
    cleanup: &CleanupManager,
) -> Result<PathBuf> {
    let (program, args) = pm.build_command();
    tracing::info!(pm = %pm, workdir = %workdir.display(), "building site");
    let spinner = (!verbose).then(|| Spinner::start(pick(BUILD_MESSAGES)));
    let fail = |spinner: Option<Spinner>, msg: &str| {
        if let Some(sp) = spinner {
            let msg = if cleanup.is_started() { "Build interrupted" } else { msg };
            sp.error(msg);
        }
    };

    let res = run_supervised(&program, &args, workdir, verbose, ProcessGroup::Own, |child| {
        if cleanup.register_job(Arc::clone(child)) == Registration::StoppedLate {
            tracing::debug!(pid = child.pid(), "build started during shutdown");
        }
    });
    cleanup.finish_job();
    match res {
        Ok(Completed { status, .. }) if status.success() => {}
        Ok(Completed { status, tail }) => {
            fail(spinner, "Build failed");
            return Err(StardocError::BuildFailure(describe_failure(
                pm.name(),
                "run build",
                status,
                &tail,
            )));
        }
        Err(e) => {
            fail(spinner, "Build failed");
            return Err(StardocError::BuildFailure(e.to_string()));
        }
    }

    let dist = workdir.join("dist");
    if !dist.is_dir() {
        fail(spinner, "Build completed but dist directory not found");
        return Err(StardocError::BuildFailure(
            "dist directory not found".to_string(),
        ));
    }
    if let Some(sp) = spinner {
        sp.success("Documentation site ready");
    }
    Ok(dist)
}
