//! Node.js package managers the site generator can be driven through.

use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, StardocError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Pnpm,
    Bun,
    Npm,
}

/// Detection order: fastest first, npm as the near-universal fallback.
pub const PRIORITY: [PackageManager; 3] =
    [PackageManager::Pnpm, PackageManager::Bun, PackageManager::Npm];

impl PackageManager {
    pub fn name(self) -> &'static str {
        match self {
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
            PackageManager::Npm => "npm",
        }
    }

    /// Executable to launch; the PATH-resolved location when available so
    /// `.cmd` shims work on Windows.
    pub fn program(self) -> String {
        which::which(self.name())
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| self.name().to_string())
    }

    pub fn is_available(self) -> bool {
        which::which(self.name()).is_ok()
    }

    pub fn install_command(self) -> (String, Vec<String>) {
        (self.program(), vec!["install".to_string()])
    }

    pub fn build_command(self) -> (String, Vec<String>) {
        (self.program(), args(&["run", "build"]))
    }

    /// bun forwards script flags directly; npm and pnpm need `--`.
    pub fn dev_command(self, port: u16) -> (String, Vec<String>) {
        let port = port.to_string();
        let a = match self {
            PackageManager::Bun => args(&["run", "dev", "--port", &port]),
            PackageManager::Pnpm | PackageManager::Npm => {
                args(&["run", "dev", "--", "--port", &port])
            }
        };
        (self.program(), a)
    }

    /// First available manager in priority order.
    pub fn detect() -> Result<Self> {
        Self::detect_with(|pm| pm.is_available())
    }

    pub fn detect_with(available: impl Fn(PackageManager) -> bool) -> Result<Self> {
        PRIORITY
            .into_iter()
            .find(|pm| available(*pm))
            .ok_or(StardocError::NoPackageManager)
    }
}

fn args(a: &[&str]) -> Vec<String> {
    a.iter().map(|s| s.to_string()).collect()
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageManager {
    type Err = StardocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pnpm" => Ok(PackageManager::Pnpm),
            "bun" => Ok(PackageManager::Bun),
            "npm" => Ok(PackageManager::Npm),
            other => Err(StardocError::InvalidArgument(format!(
                "unsupported package manager: {other} (expected pnpm, bun or npm)"
            ))),
        }
    }
}
