//! Shared dependency cache under the user-scoped root.
//!
//! Layout:
//! ```text
//! <root>/shared/{node_modules, package.json, .stardoc-version, .lock}
//! <root>/runs/<run-id>/
//! ```
//! The installed tree in `shared/` is valid only while `.stardoc-version` holds
//! the hash of the template bundled in the running binary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::errors::{Result, StardocError};
use crate::lock::{acquire_lock_at, InstallLock};
use crate::pkgmanager::PackageManager;

pub const SHARED_DIR: &str = "shared";
pub const RUNS_DIR: &str = "runs";
pub const VERSION_FILE: &str = ".stardoc-version";
pub const LOCK_FILE: &str = ".lock";
pub const DEPENDENCY_MARKER: &str = "node_modules";

#[derive(Debug, Clone)]
pub struct SharedCache {
    root: PathBuf,
}

/// Outcome of a best-effort run-directory sweep.
#[derive(Debug, Default, Clone)]
pub struct RunSweep {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl SharedCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root.join(SHARED_DIR)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub fn version_file(&self) -> PathBuf {
        self.shared_dir().join(VERSION_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.shared_dir().join(LOCK_FILE)
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    /// Create root, shared and runs directories. Fatal on failure.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.shared_dir(), self.runs_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| StardocError::fs("failed to create directory", &dir, e))?;
        }
        Ok(())
    }

    /// True only when the dependency tree exists and the persisted hash equals `expected_hash`.
    /// A missing version file is the normal first-run case, not an error.
    pub fn is_current(&self, expected_hash: &str) -> Result<bool> {
        if !self.shared_dir().join(DEPENDENCY_MARKER).is_dir() {
            return Ok(false);
        }
        let vf = self.version_file();
        match fs::read_to_string(&vf) {
            Ok(stored) => Ok(stored.trim() == expected_hash),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StardocError::fs("failed to read version file", &vf, e)),
        }
    }

    pub fn acquire_lock(&self) -> Result<InstallLock> {
        acquire_lock_at(&self.lock_file())
    }

    /// Install dependencies in the shared directory. Hold the lock while calling.
    pub fn install(&self, pm: PackageManager, verbose: bool) -> Result<()> {
        crate::installer::install(&self.shared_dir(), pm, verbose)
    }

    /// Persist the hash. Call only after a successful install.
    pub fn save_version(&self, hash: &str) -> Result<()> {
        let vf = self.version_file();
        fs::write(&vf, hash).map_err(|e| StardocError::fs("failed to write version file", &vf, e))
    }

    /// Opaque, random run identifier.
    pub fn generate_run_id(&self) -> String {
        generate_run_id()
    }

    /// Delete run directories older than `max_age`. Never fails past listing the runs
    /// directory; individual removal errors are logged and collected.
    pub fn cleanup_old_runs(&self, max_age: Duration) -> Result<RunSweep> {
        let runs = self.runs_dir();
        let entries = match fs::read_dir(&runs) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunSweep::default()),
            Err(e) => return Err(StardocError::fs("failed to read runs directory", &runs, e)),
        };

        let now = SystemTime::now();
        let mut sweep = RunSweep::default();
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_dir() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), ?age, "removed old run directory");
                    sweep.removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove old run directory");
                    sweep.failed.push((path, e.to_string()));
                }
            }
        }
        Ok(sweep)
    }
}

/// 128 random bits as lowercase hex; falls back to time and pid if the OS RNG is unavailable.
pub fn generate_run_id() -> String {
    let mut buf = [0u8; 16];
    if getrandom::getrandom(&mut buf).is_err() {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mix = nanos ^ ((std::process::id() as u128) << 64);
        buf = mix.to_le_bytes();
    }
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let sc = SharedCache::new("/home/u/.stardoc");
        assert_eq!(sc.shared_dir(), PathBuf::from("/home/u/.stardoc/shared"));
        assert_eq!(sc.runs_dir(), PathBuf::from("/home/u/.stardoc/runs"));
        assert_eq!(
            sc.version_file(),
            PathBuf::from("/home/u/.stardoc/shared/.stardoc-version")
        );
        assert_eq!(sc.lock_file(), PathBuf::from("/home/u/.stardoc/shared/.lock"));
        assert_eq!(sc.run_dir("abc"), PathBuf::from("/home/u/.stardoc/runs/abc"));
    }

    #[test]
    fn test_run_ids_are_unique_hex() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
