//! Error mapping guide:
//! - Every fatal setup/run error is a `StardocError` and maps to exit code 1.
//! - `CleanupFailure` is only ever reported as a warning; it never decides the exit code.
//! - Display strings are user-facing and printed after an `Error: ` prefix; keep them stable.
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T, E = StardocError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum StardocError {
    /// Directory/file creation, removal or permission failure.
    #[error("{action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process holds the shared-cache install lock.
    #[error("another installation is in progress (lock held at {}); please try again later", path.display())]
    LockContention { path: PathBuf },

    #[error("dependency installation failed: {0}")]
    InstallFailure(String),

    #[error("build failed: {0}")]
    BuildFailure(String),

    #[error("failed to start {program}: {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    SymlinkFailure(String),

    #[error("port {0} is already in use; pass --port to choose another port")]
    PortConflict(u16),

    #[error("failed to clean up {resource}: {message}")]
    CleanupFailure { resource: String, message: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("no package manager found (tried: pnpm, bun, npm)")]
    NoPackageManager,

    #[error("no markdown files found in {}", .0.display())]
    NoMarkdownFiles(PathBuf),

    #[error("export failed: {0}")]
    ExportFailure(String),

    #[error("failed to process frontmatter: {0}")]
    Frontmatter(String),

    #[error("failed to install signal handler: {0}")]
    SignalSetup(String),
}

impl StardocError {
    pub fn fs(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        StardocError::Filesystem {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Process exit code for a fatal error. Cleanup failures are never fatal, so they map to 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            StardocError::CleanupFailure { .. } => 0,
            _ => 1,
        }
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, StardocError::LockContention { .. })
    }
}

/// Map an io::Error from launching a program to a SpawnFailure, preserving the cause.
pub fn spawn_failure(program: &str, source: io::Error) -> StardocError {
    StardocError::SpawnFailure {
        program: program.to_string(),
        source,
    }
}
