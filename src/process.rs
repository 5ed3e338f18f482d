//! Supervised child process: live output forwarding, readiness detection and
//! TERM-then-KILL shutdown.
//!
//! On unix a supervised child is normally placed in its own process group.
//! Terminal Ctrl+C then reaches only us, and `terminate` signals the whole
//! group so workers spawned by the child (node, esbuild) go down with it.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{spawn_failure, Result};

static READY_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Local\s+http://localhost:(\d+)").ok());
static ANSI_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok());

const POLL: Duration = Duration::from_millis(25);

/// Extract the port from a dev-server "ready" line, ignoring ANSI styling.
pub fn parse_ready_port(line: &str) -> Option<u16> {
    let plain = match ANSI_RE.as_ref() {
        Some(re) => re.replace_all(line, "").into_owned(),
        None => line.to_string(),
    };
    let caps = READY_RE.as_ref()?.captures(&plain)?;
    caps.get(1)?.as_str().parse().ok()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// One-shot notification carrying the detected port.
#[derive(Debug, Default)]
pub struct ReadySignal {
    port: Mutex<Option<u16>>,
    cv: Condvar,
}

impl ReadySignal {
    /// Record the port. Returns false if the signal had already fired.
    pub fn fire(&self, port: u16) -> bool {
        let mut g = lock(&self.port);
        if g.is_some() {
            return false;
        }
        *g = Some(port);
        self.cv.notify_all();
        true
    }

    pub fn get(&self) -> Option<u16> {
        *lock(&self.port)
    }

    pub fn wait(&self, timeout: Duration) -> Option<u16> {
        let g = lock(&self.port);
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |p| p.is_none())
            .unwrap_or_else(|p| p.into_inner());
        *g
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The child printed its ready line.
    Ready(u16),
    /// Nothing seen before the timeout; continuing with the default port.
    Assumed(u16),
}

impl Readiness {
    pub fn port(self) -> u16 {
        match self {
            Readiness::Ready(p) | Readiness::Assumed(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Graceful,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives every output line of the child.
pub type LineSink = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

/// Forward to our own stdout/stderr unchanged.
pub fn forward_sink() -> LineSink {
    Arc::new(|kind, line| match kind {
        StreamKind::Stdout => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{line}");
        }
    })
}

/// Which process group a supervised child is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessGroup {
    /// A new group led by the child. Terminal Ctrl+C does not reach it, and
    /// `terminate` takes down everything the child started.
    Own,
    /// Our own group; terminal signals hit the child together with us.
    Inherit,
}

#[derive(Debug)]
pub struct ManagedChild {
    program: String,
    pid: u32,
    group: ProcessGroup,
    child: Mutex<Child>,
    ready: Arc<ReadySignal>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl ManagedChild {
    pub fn start(program: &str, args: &[String], cwd: &Path) -> Result<Self> {
        Self::start_with_sink(program, args, cwd, forward_sink())
    }

    pub fn start_with_sink(
        program: &str,
        args: &[String],
        cwd: &Path,
        sink: LineSink,
    ) -> Result<Self> {
        Self::spawn(program, args, cwd, sink, ProcessGroup::Own)
    }

    pub fn spawn(
        program: &str,
        args: &[String],
        cwd: &Path,
        sink: LineSink,
        group: ProcessGroup,
    ) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if group == ProcessGroup::Own {
                cmd.process_group(0);
            }
        }
        let mut child = cmd.spawn().map_err(|e| spawn_failure(program, e))?;
        let pid = child.id();
        tracing::debug!(program, pid, ?args, ?group, cwd = %cwd.display(), "child spawned");

        let ready = Arc::new(ReadySignal::default());
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, StreamKind::Stdout, sink.clone(), ready.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, StreamKind::Stderr, sink, ready.clone()));
        }

        Ok(Self {
            program: program.to_string(),
            pid,
            group,
            child: Mutex::new(child),
            ready,
            readers: Mutex::new(readers),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn ready_signal(&self) -> &ReadySignal {
        &self.ready
    }

    /// Block until the ready line appears or `timeout` elapses.
    ///
    /// A timeout is not an error: the server may well be up even if its banner
    /// changed, so the caller proceeds with `default_port`.
    pub fn wait_ready(&self, timeout: Duration, default_port: u16) -> Readiness {
        match self.ready.wait(timeout) {
            Some(port) => Readiness::Ready(port),
            None => {
                tracing::debug!(pid = self.pid, ?timeout, "ready line not seen, assuming ready");
                Readiness::Assumed(default_port)
            }
        }
    }

    pub fn try_status(&self) -> Option<ExitStatus> {
        lock(&self.child).try_wait().ok().flatten()
    }

    pub fn is_running(&self) -> bool {
        self.try_status().is_none()
    }

    /// Poll until the child exits. The lock is only held per poll, so another
    /// thread can `terminate` meanwhile.
    pub fn wait(&self, interval: Duration) -> io::Result<ExitStatus> {
        loop {
            if let Some(st) = lock(&self.child).try_wait()? {
                return Ok(st);
            }
            thread::sleep(interval);
        }
    }

    /// Like `wait`, for callers that only care whether an exit was observed.
    pub fn wait_exit(&self, interval: Duration) -> Option<ExitStatus> {
        self.wait(interval).ok()
    }

    /// Block until both output streams reached end of file.
    pub fn join_output(&self) {
        let readers: Vec<_> = lock(&self.readers).drain(..).collect();
        for r in readers {
            let _ = r.join();
        }
    }

    /// Graceful stop, bounded wait, then unconditional kill. Safe to call repeatedly.
    pub fn terminate(&self, grace: Duration) -> Result<Termination> {
        if self.try_status().is_some() {
            return Ok(Termination::AlreadyExited);
        }
        self.send_term();
        let deadline = Instant::now() + grace;
        loop {
            if self.try_status().is_some() {
                tracing::debug!(pid = self.pid, "child exited after terminate");
                return Ok(Termination::Graceful);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL);
        }
        tracing::warn!(pid = self.pid, ?grace, "child ignored terminate, killing");
        self.send_kill();
        let mut child = lock(&self.child);
        match child.wait() {
            Ok(_) => Ok(Termination::Killed),
            Err(e) => Err(crate::errors::StardocError::CleanupFailure {
                resource: format!("process {} ({})", self.pid, self.program),
                message: e.to_string(),
            }),
        }
    }

    #[cfg(unix)]
    fn signal(&self, sig: nix::sys::signal::Signal) {
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;
        let pid = Pid::from_raw(self.pid as i32);
        let _ = match self.group {
            ProcessGroup::Own => killpg(pid, sig),
            ProcessGroup::Inherit => kill(pid, sig),
        };
    }

    #[cfg(unix)]
    fn send_term(&self) {
        self.signal(nix::sys::signal::Signal::SIGTERM);
    }

    #[cfg(unix)]
    fn send_kill(&self) {
        self.signal(nix::sys::signal::Signal::SIGKILL);
        let _ = lock(&self.child).kill();
    }

    #[cfg(not(unix))]
    fn send_term(&self) {
        let _ = lock(&self.child).kill();
    }

    #[cfg(not(unix))]
    fn send_kill(&self) {
        let _ = lock(&self.child).kill();
    }
}

/// Result of a run-to-completion command.
#[derive(Debug)]
pub struct Completed {
    pub status: ExitStatus,
    /// Last lines of combined output; empty when output was streamed live.
    pub tail: Vec<String>,
}

const TAIL_LINES: usize = 20;

/// Run a command to completion in `cwd`, in our own process group. With
/// `stream` the output is forwarded to our stdout/stderr; otherwise only the
/// tail is kept for error reporting.
pub fn run_to_completion(
    program: &str,
    args: &[String],
    cwd: &Path,
    stream: bool,
) -> Result<Completed> {
    run_supervised(program, args, cwd, stream, ProcessGroup::Inherit, |_| {})
}

/// `run_to_completion` with a choice of process group. `on_start` gets the
/// child before we block on it, so another thread can terminate it.
pub fn run_supervised(
    program: &str,
    args: &[String],
    cwd: &Path,
    stream: bool,
    group: ProcessGroup,
    on_start: impl FnOnce(&Arc<ManagedChild>),
) -> Result<Completed> {
    let tail: Arc<Mutex<VecDeque<String>>> = Arc::default();
    let sink: LineSink = if stream {
        forward_sink()
    } else {
        let tail = tail.clone();
        Arc::new(move |_: StreamKind, line: &str| {
            let mut t = lock(&tail);
            if t.len() == TAIL_LINES {
                t.pop_front();
            }
            t.push_back(line.trim_end().to_string());
        })
    };
    let child = Arc::new(ManagedChild::spawn(program, args, cwd, sink, group)?);
    on_start(&child);
    let status = child.wait(POLL).map_err(|e| spawn_failure(program, e))?;
    child.join_output();
    let tail = lock(&tail).drain(..).collect();
    Ok(Completed { status, tail })
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    kind: StreamKind,
    sink: LineSink,
    ready: Arc<ReadySignal>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if kind == StreamKind::Stdout && ready.get().is_none() {
                if let Some(port) = parse_ready_port(line) {
                    ready.fire(port);
                }
            }
            sink(kind, line);
        }
    })
}
