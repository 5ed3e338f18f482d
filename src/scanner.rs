//! Markdown discovery under a source directory.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkd"];
pub const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build", "vendor"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownFile {
    /// Relative to the source directory.
    pub rel_path: PathBuf,
    pub full_path: PathBuf,
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|m| e.eq_ignore_ascii_case(m))
        })
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && SKIPPED_DIRS
            .iter()
            .any(|d| entry.file_name().to_string_lossy() == *d)
}

/// All markdown files below `source`, sorted by relative path. Hidden entries
/// and tool/output directories are skipped; unreadable entries are warned about.
pub fn scan(source: &Path) -> Vec<MarkdownFile> {
    let mut files = Vec::new();
    let walker = WalkDir::new(source)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(is_hidden(e) || is_skipped_dir(e)));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let p = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| source.display().to_string());
                crate::ui::warn_print(&format!("cannot access {p}: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        files.push(MarkdownFile {
            rel_path: rel.to_path_buf(),
            full_path: entry.path().to_path_buf(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}
