//! Standardized user-facing stderr lines.

pub mod warn;

pub use warn::{error_print, warn_print};
