use std::path::PathBuf;

use clap::Parser;

use crate::color::ColorMode;
use crate::config::{DEFAULT_EXPORT_DIR, DEFAULT_PORT};

pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ntarget: ",
    env!("STARDOC_BUILD_TARGET"),
    "\nprofile: ",
    env!("STARDOC_BUILD_PROFILE"),
    "\nbuilt: ",
    env!("STARDOC_BUILD_DATE"),
);

#[derive(Parser, Debug, Clone)]
#[command(
    name = "stardoc",
    version,
    long_version = LONG_VERSION,
    about = "Turn a directory of markdown files into a Starlight documentation site.",
    after_long_help = "Examples:\n  stardoc ./docs\n  stardoc ./docs --title \"My Project\" --port 8080\n  stardoc ./docs --export ./site\n  stardoc ./docs --dev --no-open\n\n"
)]
pub struct Cli {
    /// Directory containing the markdown files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Site title (default: derived from the directory name)
    #[arg(long)]
    pub title: Option<String>,

    /// Port for the local server
    #[arg(
        long,
        default_value_t = DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1024..=65535)
    )]
    pub port: u16,

    /// Do not open the browser
    #[arg(long = "no-open")]
    pub no_open: bool,

    /// Build a static export instead of serving (default path: ./export-doc)
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = DEFAULT_EXPORT_DIR
    )]
    pub export: Option<PathBuf>,

    /// Reinstall shared dependencies even if they look current
    #[arg(long = "force-reinstall")]
    pub force_reinstall: bool,

    /// Run the site generator's dev server with live reload instead of a static build
    #[arg(long)]
    pub dev: bool,

    /// Show package manager output instead of a spinner
    #[arg(long)]
    pub verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum)]
    pub color: Option<ColorMode>,
}
