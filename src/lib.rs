#![allow(clippy::module_name_repetitions)]
//! stardoc: turn a directory of markdown files into a Starlight documentation site.
//!
//! Every run gets a disposable workspace under `<root>/runs/<run-id>` that links
//! to one shared, hash-versioned dependency install in `<root>/shared`. The
//! workspace and any server started for it are torn down exactly once, whether
//! the run ends normally, fails, or is interrupted.

pub mod browser;
pub mod builder;
pub mod cleanup;
pub mod cli;
pub mod color;
pub mod config;
pub mod errors;
pub mod exporter;
pub mod frontmatter;
pub mod installer;
pub mod lock;
pub mod logging;
pub mod pkgmanager;
pub mod process;
pub mod processor;
pub mod progress;
pub mod scanner;
pub mod server;
pub mod shared;
pub mod signal;
pub mod template;
pub mod ui;
pub mod workspace;

pub use cleanup::{CleanupManager, CleanupReport, Registration};
pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr, paint,
    set_color_mode, ColorMode, Tone,
};
pub use config::{Mode, Settings};
pub use errors::{Result, StardocError};
pub use lock::{acquire_lock_at, InstallLock};
pub use pkgmanager::PackageManager;
pub use process::{ManagedChild, ProcessGroup, Readiness, Termination};
pub use server::{DevServer, ServerHandle, StaticServer};
pub use shared::SharedCache;
pub use signal::{InterruptAction, InterruptTracker, SignalHandler, WaitOutcome};
pub use workspace::Workspace;
