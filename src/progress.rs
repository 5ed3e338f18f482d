//! Stderr spinner shown while install/build output is discarded.
//!
//! Animates only when stderr is a TTY; otherwise it prints nothing until the
//! final success/error line so logs and test output stay clean.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::color::{color_enabled_stderr, paint, Tone};

pub const INSTALL_MESSAGES: &[&str] = &[
    "Summoning the npm spirits...",
    "Bribing the package manager...",
    "Convincing dependencies to cooperate...",
    "Downloading the internet, one package at a time...",
    "Teaching packages to play nicely together...",
];

pub const BUILD_MESSAGES: &[&str] = &[
    "Weaving markdown into HTML magic...",
    "Teaching Astro some new tricks...",
    "Transforming your docs into pixel perfection...",
    "Compiling dreams into reality...",
    "Building something beautiful...",
    "Converting markdown to awesome...",
];

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(100);

/// Pick one message at random; the first one if the OS RNG is unavailable.
pub fn pick(messages: &[&'static str]) -> &'static str {
    let mut b = [0u8; 2];
    let idx = match getrandom::getrandom(&mut b) {
        Ok(()) => u16::from_le_bytes(b) as usize % messages.len().max(1),
        Err(_) => 0,
    };
    messages.get(idx).copied().unwrap_or("Working...")
}

pub struct Spinner {
    started: Instant,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    animated: bool,
    use_color: bool,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let animated = atty::is(atty::Stream::Stderr);
        let use_color = color_enabled_stderr();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = if animated {
            let stop_cl = stop.clone();
            let text = paint(use_color, Tone::Info, message);
            Some(thread::spawn(move || {
                let mut i = 0usize;
                while !stop_cl.load(Ordering::SeqCst) {
                    let mut err = std::io::stderr().lock();
                    let _ = write!(err, "\r{} {}", FRAMES[i % FRAMES.len()], text);
                    let _ = err.flush();
                    drop(err);
                    i = i.wrapping_add(1);
                    thread::sleep(TICK);
                }
                let mut err = std::io::stderr().lock();
                let _ = write!(err, "\r\x1b[2K");
                let _ = err.flush();
            }))
        } else {
            None
        };
        Self {
            started: Instant::now(),
            stop,
            handle,
            animated,
            use_color,
        }
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    pub fn success(mut self, message: &str) {
        self.halt();
        let elapsed = format_elapsed(self.started.elapsed());
        eprintln!(
            "{} {} {}",
            paint(self.use_color, Tone::Success, "✓"),
            message,
            paint(self.use_color, Tone::Dim, &format!("({elapsed})"))
        );
    }

    pub fn error(mut self, message: &str) {
        self.halt();
        eprintln!("{} {}", paint(self.use_color, Tone::Error, "✗"), message);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

pub fn format_elapsed(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn test_pick_returns_listed_message() {
        let m = pick(BUILD_MESSAGES);
        assert!(BUILD_MESSAGES.contains(&m));
    }
}
