//! Exclusive install lock for the shared dependency cache.
//!
//! The lock is a marker file created with `create_new`; its existence means an
//! install is in progress. The holder also keeps an fs2 exclusive lock on the
//! open file so a marker left behind by a process that died mid-install can be
//! told apart from a live holder and reclaimed.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Result, StardocError};

/// Lock guard that removes the marker on release or drop.
#[derive(Debug)]
pub struct InstallLock {
    file: Option<File>,
    path: PathBuf,
}

impl InstallLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly, surfacing removal errors. Drop does the same best-effort.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        // Remove the marker before unlocking so nobody can lock the old inode and
        // then lose it to our unlink.
        let removed = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StardocError::fs(
                "failed to remove lock file",
                &self.path,
                e,
            )),
        };
        let _ = file.unlock();
        tracing::debug!(path = %self.path.display(), "install lock released");
        removed
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || (e.raw_os_error().is_some()
            && e.raw_os_error() == fs2::lock_contended_error().raw_os_error())
}

#[cfg(unix)]
fn still_at_path(file: &File, p: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(p)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_at_path(_file: &File, p: &Path) -> bool {
    p.exists()
}

fn stamp_owner(file: &mut File) {
    let _ = file.set_len(0);
    let _ = writeln!(file, "{}", std::process::id());
    let _ = file.flush();
}

/// Acquire the lock at `p` without blocking.
///
/// Returns `LockContention` when a live process holds it; any other OS failure
/// is reported as a filesystem error.
pub fn acquire_lock_at(p: &Path) -> Result<InstallLock> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StardocError::fs("failed to create directory", parent, e))?;
    }
    let contention = || StardocError::LockContention {
        path: p.to_path_buf(),
    };

    // Two rounds cover a holder releasing between our create_new and reopen.
    for _ in 0..2 {
        match OpenOptions::new().read(true).write(true).create_new(true).open(p) {
            Ok(mut f) => {
                return match f.try_lock_exclusive() {
                    Ok(()) => {
                        stamp_owner(&mut f);
                        tracing::debug!(path = %p.display(), "install lock acquired");
                        Ok(InstallLock {
                            file: Some(f),
                            path: p.to_path_buf(),
                        })
                    }
                    // Somebody reclaimed our fresh marker before we locked it; it is theirs now.
                    Err(e) if is_contended(&e) => Err(contention()),
                    Err(e) => {
                        let _ = fs::remove_file(p);
                        Err(StardocError::fs("failed to lock", p, e))
                    }
                };
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let mut f = match OpenOptions::new().read(true).write(true).open(p) {
                    Ok(f) => f,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(StardocError::fs("failed to open lock file", p, e)),
                };
                match f.try_lock_exclusive() {
                    Ok(()) => {
                        if !still_at_path(&f, p) {
                            let _ = f.unlock();
                            continue;
                        }
                        tracing::warn!(path = %p.display(), "reclaiming stale install lock");
                        stamp_owner(&mut f);
                        return Ok(InstallLock {
                            file: Some(f),
                            path: p.to_path_buf(),
                        });
                    }
                    Err(e) if is_contended(&e) => return Err(contention()),
                    Err(e) => return Err(StardocError::fs("failed to lock", p, e)),
                }
            }
            Err(e) => return Err(StardocError::fs("failed to create lock file", p, e)),
        }
    }
    Err(contention())
}
