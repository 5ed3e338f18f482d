use crate::color::{color_enabled_stderr, log_error_stderr, log_warn_stderr};

/// Print a standardized `Warning: <msg>` line to stderr (color-aware).
pub fn warn_print(msg: &str) {
    let use_err = color_enabled_stderr();
    log_warn_stderr(use_err, &format!("Warning: {msg}"));
}

/// Print the single `Error: <msg>` line used by every fatal exit path.
pub fn error_print(msg: &str) {
    let use_err = color_enabled_stderr();
    log_error_stderr(use_err, &format!("Error: {msg}"));
}
