//! Interrupt handling: first Ctrl+C/SIGTERM cleans up within a bound, a second
//! one inside the grace window exits immediately.
//!
//! All mutable shutdown state lives in one `SignalHandler` shared through an
//! `Arc`; the ctrlc thread and the main flow only talk to it through methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::cleanup::CleanupManager;
use crate::config::{CLEANUP_TIMEOUT, FORCE_EXIT_GRACE};
use crate::errors::{Result, StardocError};

pub const SHUTDOWN_NOTICE: &str = "\nShutting down gracefully...";
pub const FORCE_HINT: &str = "Press Ctrl+C again to force exit";
pub const FORCE_NOTICE: &str = "Force stopping...";
pub const TIMEOUT_NOTICE: &str =
    "Cleanup timeout - some resources may not have been cleaned up properly";

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Start (or restart) a graceful shutdown.
    Graceful,
    /// Abandon cleanup and exit now.
    ForceExit,
}

/// Interrupt counter with a force-exit window.
#[derive(Debug)]
pub struct InterruptTracker {
    grace: Duration,
    count: u32,
    first_at: Option<Instant>,
    forcing: bool,
}

impl InterruptTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            count: 0,
            first_at: None,
            forcing: false,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_forcing(&self) -> bool {
        self.forcing
    }

    /// A repeat inside the window forces exit; a repeat after it counts as a new first interrupt.
    pub fn on_interrupt(&mut self, now: Instant) -> InterruptAction {
        if self.forcing {
            return InterruptAction::ForceExit;
        }
        match self.first_at {
            Some(first) if now.saturating_duration_since(first) <= self.grace => {
                self.count += 1;
                self.forcing = true;
                InterruptAction::ForceExit
            }
            _ => {
                self.count = 1;
                self.first_at = Some(now);
                InterruptAction::Graceful
            }
        }
    }
}

/// Process exit hook; `std::process::exit` outside of tests.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

pub fn process_exit() -> ExitFn {
    Arc::new(|code| std::process::exit(code))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A shutdown was triggered.
    Shutdown,
    /// The watched condition stopped holding (e.g. the dev server exited).
    ConditionEnded,
}

pub struct SignalHandler {
    cleanup: Arc<CleanupManager>,
    tracker: Mutex<InterruptTracker>,
    cleanup_timeout: Duration,
    exit: ExitFn,
    cleanup_started: AtomicBool,
    shutdown: Mutex<bool>,
    shutdown_cv: Condvar,
}

impl SignalHandler {
    pub fn new(cleanup: Arc<CleanupManager>) -> Self {
        Self::with_options(cleanup, FORCE_EXIT_GRACE, CLEANUP_TIMEOUT, process_exit())
    }

    pub fn with_options(
        cleanup: Arc<CleanupManager>,
        grace: Duration,
        cleanup_timeout: Duration,
        exit: ExitFn,
    ) -> Self {
        Self {
            cleanup,
            tracker: Mutex::new(InterruptTracker::new(grace)),
            cleanup_timeout,
            exit,
            cleanup_started: AtomicBool::new(false),
            shutdown: Mutex::new(false),
            shutdown_cv: Condvar::new(),
        }
    }

    /// Route SIGINT/SIGTERM to this handler. Callable once per process.
    pub fn install(self: &Arc<Self>) -> Result<()> {
        let me = Arc::clone(self);
        ctrlc::set_handler(move || {
            me.handle_interrupt();
        })
        .map_err(|e| StardocError::SignalSetup(e.to_string()))?;
        tracing::debug!("signal handler installed");
        Ok(())
    }

    pub fn handle_interrupt(self: &Arc<Self>) -> InterruptAction {
        self.handle_interrupt_at(Instant::now())
    }

    pub fn handle_interrupt_at(self: &Arc<Self>, now: Instant) -> InterruptAction {
        let action = lock(&self.tracker).on_interrupt(now);
        tracing::debug!(?action, "interrupt received");
        match action {
            InterruptAction::Graceful => {
                eprintln!("{SHUTDOWN_NOTICE}");
                eprintln!("{FORCE_HINT}");
                self.start_cleanup();
            }
            InterruptAction::ForceExit => {
                eprintln!("{FORCE_NOTICE}");
                self.finish(EXIT_FAILURE);
            }
        }
        action
    }

    pub fn interrupt_count(&self) -> u32 {
        lock(&self.tracker).count()
    }

    /// True once an interrupt started the graceful shutdown. From then on the
    /// supervisor decides the exit code, not the main flow.
    pub fn shutdown_requested(&self) -> bool {
        self.cleanup_started.load(Ordering::SeqCst)
    }

    // One supervisor per process; a restarted graceful shutdown joins the running one.
    fn start_cleanup(self: &Arc<Self>) {
        if self.cleanup_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let me = Arc::clone(self);
        thread::spawn(move || me.supervise_cleanup());
    }

    fn supervise_cleanup(&self) {
        let (tx, rx) = mpsc::channel();
        let cm = Arc::clone(&self.cleanup);
        thread::spawn(move || {
            let _ = tx.send(cm.cleanup());
        });
        match rx.recv_timeout(self.cleanup_timeout) {
            // The user asked to stop and we stopped; cleanup warnings were already printed.
            Ok(report) => {
                tracing::debug!(clean = report.is_clean(), "signal-driven cleanup finished");
                if lock(&self.tracker).is_forcing() {
                    return;
                }
                self.finish(EXIT_OK);
            }
            Err(_) => {
                eprintln!("{TIMEOUT_NOTICE}");
                self.finish(EXIT_FAILURE);
            }
        }
    }

    // Exit first: waiters released by the trigger must not get to pick an exit code.
    fn finish(&self, code: i32) {
        (self.exit)(code);
        self.trigger_shutdown();
    }

    /// Release everything blocked in `wait`/`wait_while`.
    pub fn trigger_shutdown(&self) {
        *lock(&self.shutdown) = true;
        self.shutdown_cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        *lock(&self.shutdown)
    }

    /// Block until a shutdown is triggered.
    pub fn wait(&self) {
        let g = lock(&self.shutdown);
        let _g = self
            .shutdown_cv
            .wait_while(g, |done| !*done)
            .unwrap_or_else(|p| p.into_inner());
    }

    /// Block until shutdown or until `alive` returns false, checking every `poll`.
    pub fn wait_while(&self, alive: impl Fn() -> bool, poll: Duration) -> WaitOutcome {
        let mut g = lock(&self.shutdown);
        loop {
            if *g {
                return WaitOutcome::Shutdown;
            }
            if !alive() {
                return WaitOutcome::ConditionEnded;
            }
            g = self
                .shutdown_cv
                .wait_timeout(g, poll)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
    }
}
