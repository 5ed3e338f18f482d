//! Color handling for the stderr one-liners.
//!
//! Resolution order: `NO_COLOR` (always wins), `--color`, `STARDOC_COLOR`,
//! then TTY detection. Helpers only wrap text in ANSI codes; the plain text
//! never changes, so tests can match on it with `NO_COLOR=1`.

use clap::ValueEnum;
use once_cell::sync::OnceCell;

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = ();

    /// Lenient parse for the environment variable; accepts on/off style aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" | "on" | "true" | "yes" | "1" => Ok(ColorMode::Always),
            "never" | "off" | "false" | "no" | "0" => Ok(ColorMode::Never),
            _ => Err(()),
        }
    }
}

/// What a line means, mapped to one ANSI style.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Tone {
    Info,
    Warn,
    Error,
    Success,
    Dim,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Info => "\x1b[36;1m",
            Tone::Warn => "\x1b[33m",
            Tone::Error => "\x1b[31;1m",
            Tone::Success => "\x1b[32;1m",
            Tone::Dim => "\x1b[90m",
        }
    }
}

static CLI_MODE: OnceCell<ColorMode> = OnceCell::new();

/// Record the `--color` choice. First call wins.
pub fn set_color_mode(mode: ColorMode) {
    let _ = CLI_MODE.set(mode);
}

fn effective_mode() -> ColorMode {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorMode::Never;
    }
    if let Some(m) = CLI_MODE.get() {
        return *m;
    }
    std::env::var("STARDOC_COLOR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(ColorMode::Auto)
}

pub fn color_enabled_stderr() -> bool {
    match effective_mode() {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => atty::is(atty::Stream::Stderr),
    }
}

pub fn paint(enabled: bool, tone: Tone, s: &str) -> String {
    if !enabled {
        return s.to_string();
    }
    format!("{}{s}\x1b[0m", tone.code())
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, Tone::Info, msg));
}

pub fn log_warn_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, Tone::Warn, msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, Tone::Error, msg));
}
