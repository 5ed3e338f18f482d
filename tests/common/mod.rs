#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Shell stand-in for npm: `install` creates node_modules, `run build` writes a
/// tiny dist/ (optionally after recording its pid and sleeping), `run dev`
/// prints the ready line and idles.
pub const FAKE_NPM: &str = r#"#!/bin/sh
case "$1" in
  install)
    if [ -n "$FAKE_INSTALL_MARKER" ]; then echo x >> "$FAKE_INSTALL_MARKER"; fi
    if [ "${FAKE_INSTALL_EXIT:-0}" != "0" ]; then echo "npm ERR! fake install failure" >&2; exit "$FAKE_INSTALL_EXIT"; fi
    mkdir -p node_modules/.bin
    exit 0
    ;;
  run)
    case "$2" in
      build)
        if [ -n "$FAKE_BUILD_PIDFILE" ]; then echo $$ > "$FAKE_BUILD_PIDFILE"; fi
        if [ -n "$FAKE_BUILD_SLEEP" ]; then sleep "$FAKE_BUILD_SLEEP"; fi
        if [ "${FAKE_BUILD_EXIT:-0}" != "0" ]; then echo "fake build failure" >&2; exit "$FAKE_BUILD_EXIT"; fi
        mkdir -p dist/_astro dist/guide
        echo '<html><body>home</body></html>' > dist/index.html
        echo '<html><body>guide</body></html>' > dist/guide/index.html
        echo 'console.log(1)' > dist/_astro/app.js
        exit 0
        ;;
      dev)
        shift 2
        port=4321
        while [ $# -gt 0 ]; do
          if [ "$1" = "--port" ]; then port="$2"; fi
          shift
        done
        if [ -n "$FAKE_DEV_IGNORE_TERM" ]; then trap '' TERM; fi
        if [ -z "$FAKE_DEV_SILENT" ]; then echo "  Local    http://localhost:$port/"; fi
        if [ -n "$FAKE_DEV_EXIT_AFTER" ]; then sleep "$FAKE_DEV_EXIT_AFTER"; exit 3; fi
        while true; do sleep 1; done
        ;;
    esac
    ;;
esac
exit 0
"#;

/// Test sandbox: a stardoc home, a docs source tree and a bin dir with the fake npm.
pub struct Sandbox {
    pub dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tmpdir");
        let s = Sandbox { dir };
        std::fs::create_dir_all(s.docs()).expect("docs dir");
        std::fs::write(s.docs().join("README.md"), "# Welcome\n").expect("readme");
        std::fs::create_dir_all(s.docs().join("guide")).expect("guide dir");
        std::fs::write(s.docs().join("guide/01-setup.md"), "Setup steps\n").expect("guide");
        s.install_fake_npm();
        s
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn home(&self) -> PathBuf {
        self.root().join("home")
    }

    pub fn docs(&self) -> PathBuf {
        self.root().join("docs")
    }

    pub fn bin(&self) -> PathBuf {
        self.root().join("bin")
    }

    fn install_fake_npm(&self) {
        std::fs::create_dir_all(self.bin()).expect("bin dir");
        let p = self.bin().join("npm");
        std::fs::write(&p, FAKE_NPM).expect("write fake npm");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755))
                .expect("chmod fake npm");
        }
    }

    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_stardoc"));
        let path = format!(
            "{}:{}",
            self.bin().display(),
            std::env::var("PATH").unwrap_or_default()
        );
        cmd.args(args)
            .current_dir(self.root())
            .env("PATH", path)
            .env("STARDOC_HOME", self.home())
            .env("STARDOC_PACKAGE_MANAGER", "npm")
            .env("NO_COLOR", "1")
            .env_remove("STARDOC_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    pub fn runs(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.home().join("runs")) {
            Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// A running stardoc whose output is collected in the background.
pub struct Running {
    pub child: Child,
    pub stdout: Arc<Mutex<String>>,
    pub stderr: Arc<Mutex<String>>,
}

fn collect<R: Read + Send + 'static>(r: R, buf: Arc<Mutex<String>>) {
    thread::spawn(move || {
        let reader = BufReader::new(r);
        for line in reader.split(b'\n').map_while(|l| l.ok()) {
            let mut b = buf.lock().expect("buf");
            b.push_str(&String::from_utf8_lossy(&line));
            b.push('\n');
        }
    });
}

impl Running {
    pub fn spawn(mut cmd: Command) -> Self {
        let mut child = cmd.spawn().expect("spawn stardoc");
        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        collect(child.stdout.take().expect("stdout"), stdout.clone());
        collect(child.stderr.take().expect("stderr"), stderr.clone());
        Running {
            child,
            stdout,
            stderr,
        }
    }

    pub fn stdout(&self) -> String {
        self.stdout.lock().expect("stdout").clone()
    }

    pub fn stderr(&self) -> String {
        self.stderr.lock().expect("stderr").clone()
    }

    /// Wait until stdout contains `needle`; false on timeout or early exit.
    pub fn wait_for_stdout(&mut self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.stdout().contains(needle) {
                return true;
            }
            if let Ok(Some(_)) = self.child.try_wait() {
                return self.stdout().contains(needle);
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    pub fn wait(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let st = self.child.wait_timeout(timeout).expect("wait");
        if st.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        // Let the collectors drain what is left in the pipes.
        thread::sleep(Duration::from_millis(100));
        st
    }

    /// The `📦 Workspace: <path>` line printed after setup.
    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.stdout()
            .lines()
            .find_map(|l| l.split_once("Workspace: ").map(|(_, p)| PathBuf::from(p.trim())))
    }

    #[cfg(unix)]
    pub fn signal(&self, sig: nix::sys::signal::Signal) {
        let pid = nix::unistd::Pid::from_raw(self.child.id() as i32);
        nix::sys::signal::kill(pid, sig).expect("send signal");
    }

    /// Signal the whole process group, like Ctrl+C in a terminal. Only valid
    /// for a child spawned with `in_own_group`.
    #[cfg(unix)]
    pub fn signal_group(&self, sig: nix::sys::signal::Signal) {
        let pgid = nix::unistd::Pid::from_raw(self.child.id() as i32);
        nix::sys::signal::killpg(pgid, sig).expect("send group signal");
    }
}

/// Run to completion and return (status, stdout, stderr).
pub fn run_to_end(cmd: Command, timeout: Duration) -> (Option<ExitStatus>, String, String) {
    let mut r = Running::spawn(cmd);
    let st = r.wait(timeout);
    (st, r.stdout(), r.stderr())
}

/// Make `cmd` lead a new process group so a test can signal it as a terminal would.
#[cfg(unix)]
pub fn in_own_group(mut cmd: Command) -> Command {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
    cmd
}

/// Poll until `path` holds a pid; None on timeout.
pub fn wait_for_pid(path: &Path, timeout: Duration) -> Option<i32> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(s) = std::fs::read_to_string(path) {
            if let Ok(pid) = s.trim().parse() {
                return Some(pid);
            }
        }
        thread::sleep(Duration::from_millis(50));
    }
    None
}

/// Whether `pid` is still a live process. A zombie awaiting reaping is not.
#[cfg(unix)]
pub fn pid_alive(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat.rsplit_once(") ").is_some_and(|(_, rest)| rest.starts_with('Z')),
        Err(_) => true,
    }
}

/// Wait up to `timeout` for `pid` to go away.
#[cfg(unix)]
pub fn wait_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while pid_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
    true
}

pub fn free_port() -> u16 {
    let l = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral");
    l.local_addr().expect("addr").port()
}

pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Assert `needles` appear in `hay` in the given order.
pub fn assert_in_order(hay: &str, needles: &[&str]) {
    let mut from = 0;
    for n in needles {
        match hay[from..].find(n) {
            Some(i) => from += i + n.len(),
            None => panic!("expected {n:?} after byte {from} in output:\n{hay}"),
        }
    }
}
