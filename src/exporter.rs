//! Copy a built site out of the workspace before it is removed.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{Result, StardocError};

#[derive(Debug)]
pub struct ExportReport {
    pub destination: PathBuf,
    pub files: usize,
    pub overwrote: bool,
}

/// Copy every file under `dist` into `dest`, creating it as needed. Existing
/// files in `dest` are overwritten, others are left alone.
pub fn export(dist: &Path, dest: &Path) -> Result<ExportReport> {
    let destination = absolutize(dest)?;
    if !dist.is_dir() {
        return Err(StardocError::ExportFailure(format!(
            "build output not found at {}",
            dist.display()
        )));
    }
    let overwrote = destination.exists();
    if overwrote {
        crate::ui::warn_print("export directory already exists, overwriting...");
    }
    fs::create_dir_all(&destination)
        .map_err(|e| StardocError::fs("failed to create export directory", &destination, e))?;
    println!("Copying files to {}...", dest.display());

    let mut files = 0usize;
    for entry in WalkDir::new(dist).follow_links(false) {
        let entry = entry.map_err(|e| StardocError::ExportFailure(e.to_string()))?;
        let rel = match entry.path().strip_prefix(dist) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let target = destination.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StardocError::fs("failed to create directory", &target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StardocError::fs("failed to create directory", parent, e))?;
        }
        fs::copy(entry.path(), &target).map_err(|e| {
            StardocError::ExportFailure(format!("failed to copy {}: {e}", rel.display()))
        })?;
        files += 1;
    }

    println!("Exported {files} files");
    println!("✅ Exported to {}", dest.display());
    Ok(ExportReport {
        destination,
        files,
        overwrote,
    })
}

fn absolutize(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| StardocError::ExportFailure(format!("failed to resolve export path: {e}")))?;
    Ok(cwd.join(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_copies_nested_tree() {
        let td = tempfile::tempdir().expect("tmpdir");
        let dist = td.path().join("dist");
        fs::create_dir_all(dist.join("_astro")).expect("mkdir");
        fs::write(dist.join("index.html"), "<h1>hi</h1>").expect("write");
        fs::write(dist.join("_astro/app.css"), "body{}").expect("write");

        let out = td.path().join("out");
        let rep = export(&dist, &out).expect("export");
        assert_eq!(rep.files, 2);
        assert!(!rep.overwrote);
        assert!(out.join("index.html").is_file());
        assert!(out.join("_astro/app.css").is_file());

        let again = export(&dist, &out).expect("re-export");
        assert!(again.overwrote);
    }

    #[test]
    fn test_export_without_dist_fails() {
        let td = tempfile::tempdir().expect("tmpdir");
        let err = export(&td.path().join("dist"), &td.path().join("out")).expect_err("no dist");
        assert!(matches!(err, StardocError::ExportFailure(_)));
    }
}
