//! Per-run project directory linked to the shared dependency cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{Result, StardocError};

/// Entries of the shared directory that every run links to.
pub const LINKED_ENTRIES: [&str; 2] = ["node_modules", "package.json"];

#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    shared_dir: PathBuf,
}

impl Workspace {
    /// Create the run directory. `shared_dir` is only read, never modified or removed.
    pub fn create(run_dir: impl Into<PathBuf>, shared_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = run_dir.into();
        fs::create_dir_all(&path)
            .map_err(|e| StardocError::fs("failed to create workspace", &path, e))?;
        tracing::debug!(path = %path.display(), "workspace created");
        Ok(Self {
            path,
            shared_dir: shared_dir.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.path.join("src").join("content").join("docs")
    }

    pub fn public_dir(&self) -> PathBuf {
        self.path.join("public")
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.path.join("dist")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Build the directory skeleton and link the shared install into it.
    pub fn setup(&self) -> Result<()> {
        for dir in [self.docs_dir(), self.public_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| StardocError::fs("failed to create directory", &dir, e))?;
        }
        for name in LINKED_ENTRIES {
            let target = self.shared_dir.join(name);
            if fs::symlink_metadata(&target).is_err() {
                return Err(StardocError::SymlinkFailure(format!(
                    "shared {name} missing at {}; the shared cache is not installed",
                    target.display()
                )));
            }
            let link = self.path.join(name);
            link_entry(&target, &link).map_err(|e| {
                StardocError::SymlinkFailure(format!(
                    "failed to link {} -> {}: {e}",
                    link.display(),
                    target.display()
                ))
            })?;
            tracing::debug!(link = %link.display(), target = %target.display(), "symlink created");
        }
        Ok(())
    }

    /// Remove the run directory. A path that is already gone counts as success.
    pub fn cleanup(&self) -> Result<()> {
        if self.guards_shared_dir() {
            return Err(StardocError::CleanupFailure {
                resource: format!("workspace {}", self.path.display()),
                message: "refusing to remove a directory that contains the shared cache"
                    .to_string(),
            });
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StardocError::CleanupFailure {
                resource: format!("workspace {}", self.path.display()),
                message: e.to_string(),
            }),
        }
    }

    // remove_dir_all does not follow symlinks, so only a shared dir at or below our path is at risk.
    fn guards_shared_dir(&self) -> bool {
        let ws = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let shared = fs::canonicalize(&self.shared_dir).unwrap_or_else(|_| self.shared_dir.clone());
        shared.starts_with(&ws)
    }
}

#[cfg(unix)]
fn link_entry(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn link_entry(target: &Path, link: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};
    if target.is_dir() {
        match symlink_dir(target, link) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "directory symlink denied, trying plain symlink");
                symlink_file(target, link)
            }
        }
    } else {
        symlink_file(target, link)
    }
}
