//! Run configuration resolved from CLI flags and `STARDOC_*` environment variables.
//!
//! CLI flags always win; environment variables fill in the rest; invalid numeric
//! values fall back to the default with a warning.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, StardocError};
use crate::pkgmanager::PackageManager;

pub const HOME_ENV: &str = "STARDOC_HOME";
pub const PACKAGE_MANAGER_ENV: &str = "STARDOC_PACKAGE_MANAGER";
pub const READY_TIMEOUT_ENV: &str = "STARDOC_READY_TIMEOUT_SECS";
pub const RETENTION_ENV: &str = "STARDOC_RUN_RETENTION_HOURS";

pub const DEFAULT_PORT: u16 = 4321;
pub const DEFAULT_EXPORT_DIR: &str = "./export-doc";
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RUN_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Bound on signal-driven cleanup before giving up and exiting non-zero.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);
/// Window in which a second interrupt forces exit.
pub const FORCE_EXIT_GRACE: Duration = Duration::from_secs(1);
/// Wait between graceful terminate and kill.
pub const TERMINATE_WAIT: Duration = Duration::from_secs(5);
pub const STATIC_READY_TIMEOUT: Duration = Duration::from_secs(5);
pub const BROWSER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Dev,
    Export(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source_dir: PathBuf,
    pub title: Option<String>,
    pub port: u16,
    pub open_browser: bool,
    pub mode: Mode,
    pub force_reinstall: bool,
    pub verbose: bool,
    pub home: PathBuf,
    pub package_manager: Option<PackageManager>,
    pub ready_timeout: Duration,
    pub run_retention: Duration,
}

impl Settings {
    /// Resolve from parsed CLI flags plus the process environment.
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let source_dir = validate_source_dir(&cli.dir)?;
        let mode = match (&cli.export, cli.dev) {
            (Some(_), true) => {
                return Err(StardocError::InvalidArgument(
                    "--export and --dev cannot be used together".to_string(),
                ))
            }
            (Some(p), false) => Mode::Export(p.clone()),
            (None, true) => Mode::Dev,
            (None, false) => Mode::Serve,
        };
        Ok(Self {
            source_dir,
            title: cli
                .title
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            port: cli.port,
            open_browser: !cli.no_open,
            mode,
            force_reinstall: cli.force_reinstall,
            verbose: cli.verbose,
            home: resolve_home()?,
            package_manager: package_manager_override()?,
            ready_timeout: env_secs(READY_TIMEOUT_ENV).unwrap_or(DEFAULT_READY_TIMEOUT),
            run_retention: env_hours(RETENTION_ENV).unwrap_or(DEFAULT_RUN_RETENTION),
        })
    }
}

/// `STARDOC_HOME` when set, else `~/.stardoc`.
pub fn resolve_home() -> Result<PathBuf> {
    if let Ok(v) = env::var(HOME_ENV) {
        let v = v.trim();
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    home::home_dir()
        .map(|h| h.join(".stardoc"))
        .ok_or_else(|| {
            StardocError::InvalidArgument(format!(
                "cannot determine home directory; set {HOME_ENV}"
            ))
        })
}

fn package_manager_override() -> Result<Option<PackageManager>> {
    match env::var(PACKAGE_MANAGER_ENV) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse().map(Some),
        _ => Ok(None),
    }
}

/// Missing directory and non-directory produce distinct messages.
pub fn validate_source_dir(dir: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(dir).map_err(|_| {
        StardocError::InvalidArgument(format!("directory not found: {}", dir.display()))
    })?;
    if !meta.is_dir() {
        return Err(StardocError::InvalidArgument(format!(
            "path is not a directory: {}",
            dir.display()
        )));
    }
    Ok(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()))
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            crate::ui::warn_print(&format!("ignoring invalid {name}={raw}"));
            None
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env_u64(name).map(Duration::from_secs)
}

fn env_hours(name: &str) -> Option<Duration> {
    env_u64(name).map(|h| Duration::from_secs(h.saturating_mul(3600)))
}
