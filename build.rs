use std::path::Path;

use time::macros::format_description;
use time::OffsetDateTime;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    watch(Path::new("templates/starlight"));

    println!("cargo:rustc-env=STARDOC_BUILD_DATE={}", build_date());
    for (var, key) in [("TARGET", "STARDOC_BUILD_TARGET"), ("PROFILE", "STARDOC_BUILD_PROFILE")] {
        let val = std::env::var(var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={key}={val}");
    }
}

// The template is embedded with include_str!; any edit must rebuild.
fn watch(dir: &Path) {
    println!("cargo:rerun-if-changed={}", dir.display());
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in rd.flatten() {
        let p = entry.path();
        if p.is_dir() {
            watch(&p);
        } else {
            println!("cargo:rerun-if-changed={}", p.display());
        }
    }
}

/// UTC date as YYYY-MM-DD. Honors SOURCE_DATE_EPOCH for reproducible builds.
fn build_date() -> String {
    let when = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    when.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "unknown".to_string())
}
