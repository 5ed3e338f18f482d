//! Best-effort launch of the system browser.

use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::errors::{spawn_failure, Result, StardocError};

/// Platform opener command for `url`.
pub fn opener(url: &str) -> Option<(&'static str, Vec<String>)> {
    if cfg!(target_os = "macos") {
        Some(("open", vec![url.to_string()]))
    } else if cfg!(windows) {
        Some((
            "cmd",
            vec!["/c".to_string(), "start".to_string(), String::new(), url.to_string()],
        ))
    } else if cfg!(unix) {
        Some(("xdg-open", vec![url.to_string()]))
    } else {
        None
    }
}

/// Open `url`. A launcher that is still running after `timeout` is left alone
/// and counted as success; the browser usually came up anyway.
pub fn open(url: &str, timeout: Duration) -> Result<()> {
    println!("Opening browser at {url}...");
    let (program, args) = opener(url).ok_or_else(|| {
        StardocError::InvalidArgument("unsupported operating system for browser launch".into())
    })?;
    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_failure(program, e))?;
    match child.wait_timeout(timeout) {
        Ok(Some(status)) if status.success() => Ok(()),
        Ok(Some(status)) => Err(StardocError::InvalidArgument(format!(
            "{program} exited with {status}"
        ))),
        Ok(None) => {
            crate::ui::warn_print("browser open command timed out");
            Ok(())
        }
        Err(e) => Err(spawn_failure(program, e)),
    }
}

/// Open and turn any failure into a warning plus a manual hint.
pub fn open_or_warn(url: &str, timeout: Duration) {
    if let Err(e) = open(url, timeout) {
        crate::ui::warn_print(&format!("failed to open browser: {e}"));
        println!("Please open {url} manually");
    }
}
