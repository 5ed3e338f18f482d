//! Servers the cleanup manager can stop: the built-in static file server and
//! the external dev server.

pub mod dev;
pub mod static_files;

pub use dev::DevServer;
pub use static_files::StaticServer;

use crate::errors::Result;

/// A running server registered for teardown.
pub trait ServerHandle: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> String;

    /// Stop serving. Must be idempotent.
    fn stop(&self) -> Result<()>;

    fn is_running(&self) -> bool;
}

pub fn local_url(port: u16) -> String {
    format!("http://localhost:{port}")
}
