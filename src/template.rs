//! Starlight project template compiled into the binary.
//!
//! The hash of the embedded `package.json` versions the shared install: a new
//! binary with different dependencies invalidates the cache automatically.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{Result, StardocError};

pub const TITLE_PLACEHOLDER: &str = "{{SITE_TITLE}}";
pub const DEFAULT_TITLE: &str = "Documentation";

pub const PACKAGE_JSON: &str = include_str!("../templates/starlight/package.json");
pub const ASTRO_CONFIG: &str = include_str!("../templates/starlight/astro.config.mjs");
pub const TSCONFIG: &str = include_str!("../templates/starlight/tsconfig.json");
pub const CONTENT_CONFIG: &str = include_str!("../templates/starlight/src/content.config.ts");

/// Files written to the shared directory next to `node_modules`.
const SHARED_FILES: &[(&str, &str)] = &[
    ("package.json", PACKAGE_JSON),
    ("astro.config.mjs", ASTRO_CONFIG),
    ("tsconfig.json", TSCONFIG),
];

/// Per-run files; `package.json` comes in through the workspace symlink.
const RUN_FILES: &[(&str, &str)] = &[
    ("astro.config.mjs", ASTRO_CONFIG),
    ("tsconfig.json", TSCONFIG),
    ("src/content.config.ts", CONTENT_CONFIG),
];

/// SHA-256 hex of the embedded `package.json`.
pub fn package_hash() -> String {
    hex::encode(Sha256::digest(PACKAGE_JSON.as_bytes()))
}

pub fn extract_to_shared(shared_dir: &Path) -> Result<()> {
    write_files(shared_dir, SHARED_FILES)
}

pub fn extract_config_only(workspace: &Path) -> Result<()> {
    write_files(workspace, RUN_FILES)
}

fn write_files(base: &Path, files: &[(&str, &str)]) -> Result<()> {
    for (rel, content) in files {
        let target = base.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StardocError::fs("failed to create directory", parent, e))?;
        }
        fs::write(&target, content)
            .map_err(|e| StardocError::fs("failed to write template file", &target, e))?;
    }
    Ok(())
}

/// Substitute the site title into the workspace's `astro.config.mjs`.
pub fn generate_config(workspace: &Path, title: &str) -> Result<()> {
    let path = workspace.join("astro.config.mjs");
    let content = fs::read_to_string(&path)
        .map_err(|e| StardocError::fs("failed to read config", &path, e))?;
    let rendered = content.replace(TITLE_PLACEHOLDER, &escape_js_single(title));
    fs::write(&path, rendered).map_err(|e| StardocError::fs("failed to write config", &path, e))
}

/// Escape for embedding inside a single-quoted JS string literal.
pub fn escape_js_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

/// Site title from a directory name: separators become spaces, words are capitalised.
pub fn generate_title(dir: &Path) -> String {
    let base = dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let title = capitalize_words(&base.replace(['-', '_'], " "));
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Uppercase the first character of each whitespace-separated word.
pub fn capitalize_words(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(f) => f.to_uppercase().chain(cs).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_generate_title() {
        assert_eq!(generate_title(Path::new("/a/my-cool_docs")), "My Cool Docs");
        assert_eq!(generate_title(Path::new("/")), "Documentation");
        assert_eq!(generate_title(&PathBuf::from("notes")), "Notes");
    }

    #[test]
    fn test_package_hash_is_stable_hex() {
        let h = package_hash();
        assert_eq!(h.len(), 64);
        assert_eq!(h, package_hash());
    }

    #[test]
    fn test_generate_config_escapes_title() {
        let td = tempfile::tempdir().expect("tmpdir");
        extract_config_only(td.path()).expect("extract");
        assert!(td.path().join("src/content.config.ts").is_file());
        generate_config(td.path(), "Bob's Docs").expect("config");
        let cfg = fs::read_to_string(td.path().join("astro.config.mjs")).expect("read");
        assert!(cfg.contains("Bob\\'s Docs"), "{cfg}");
        assert!(!cfg.contains(TITLE_PLACEHOLDER));
    }
}
