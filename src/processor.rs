//! Copy markdown from the source tree into the workspace docs directory,
//! guaranteeing every page a title.

use std::fs;
use std::path::Path;

use crate::errors::{Result, StardocError};
use crate::frontmatter;
use crate::scanner::{scan, MarkdownFile};

/// Process every markdown file under `source` into `target`. Returns the count.
pub fn process(source: &Path, target: &Path) -> Result<usize> {
    let files = scan(source);
    if files.is_empty() {
        return Err(StardocError::NoMarkdownFiles(source.to_path_buf()));
    }
    println!("Found {} markdown files", files.len());
    for file in &files {
        process_file(file, target)?;
    }
    tracing::debug!(count = files.len(), target = %target.display(), "markdown processed");
    Ok(files.len())
}

fn process_file(file: &MarkdownFile, target: &Path) -> Result<()> {
    let content = fs::read(&file.full_path)
        .map_err(|e| StardocError::fs("failed to read", &file.full_path, e))?;
    let content = String::from_utf8_lossy(&content);

    let file_name = file
        .rel_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parent = file.rel_path.parent().unwrap_or_else(|| Path::new(""));
    let parent_str = parent.to_string_lossy().replace('\\', "/");

    let processed = frontmatter::inject(&content, &file_name, &parent_str).map_err(|e| {
        StardocError::Frontmatter(format!("{}: {e}", file.rel_path.display()))
    })?;

    let out_name = if file_name.eq_ignore_ascii_case("readme.md") {
        "index.md".to_string()
    } else {
        file_name
    };
    let out_dir = target.join(parent);
    fs::create_dir_all(&out_dir)
        .map_err(|e| StardocError::fs("failed to create directory", &out_dir, e))?;
    let out = out_dir.join(out_name);
    fs::write(&out, processed).map_err(|e| StardocError::fs("failed to write", &out, e))
}
