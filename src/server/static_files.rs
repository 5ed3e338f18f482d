//! Minimal HTTP/1.1 file server for a built `dist/` directory.
//!
//! One nonblocking accept loop polls the running flag; each connection is
//! handled on its own thread and closed after a single response.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{local_url, ServerHandle};
use crate::errors::{Result, StardocError};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const CONN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct StaticServer {
    root: PathBuf,
    port: u16,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StaticServer {
    /// Bind `port` on localhost and start serving `root`. The port is held from
    /// the availability check on, so nobody can grab it in between.
    pub fn start(root: &Path, port: u16, ready_timeout: Duration) -> Result<Self> {
        let listener = match TcpListener::bind(("127.0.0.1", port)) {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(StardocError::PortConflict(port))
            }
            Err(e) => {
                return Err(StardocError::InvalidArgument(format!(
                    "cannot bind port {port}: {e}"
                )))
            }
        };
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        listener.set_nonblocking(true).map_err(|e| {
            StardocError::InvalidArgument(format!("cannot configure listener: {e}"))
        })?;

        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let running = Arc::new(AtomicBool::new(true));
        let running_cl = running.clone();
        let root_cl = root.clone();
        let handle = thread::spawn(move || accept_loop(listener, root_cl, running_cl));

        let server = Self {
            root,
            port,
            running,
            handle: Mutex::new(Some(handle)),
        };
        if !wait_connectable(port, ready_timeout) {
            let _ = server.stop();
            return Err(StardocError::InvalidArgument(format!(
                "server on port {port} did not become ready within {}s",
                ready_timeout.as_secs()
            )));
        }
        println!("🚀 Server started at {}", server.url());
        Ok(server)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ServerHandle for StaticServer {
    fn name(&self) -> &str {
        "static server"
    }

    fn url(&self) -> String {
        local_url(self.port)
    }

    fn stop(&self) -> Result<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            return Err(StardocError::CleanupFailure {
                resource: format!("server on port {}", self.port),
                message: "accept loop panicked".to_string(),
            });
        }
        println!("🛑 Server stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn wait_connectable(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    while Instant::now() < deadline {
        if TcpStream::connect_timeout(&addr, Duration::from_millis(100)).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }
    false
}

fn accept_loop(listener: TcpListener, root: PathBuf, running: Arc<AtomicBool>) {
    tracing::debug!(root = %root.display(), "static server accept loop started");
    let root = Arc::new(root);
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let stream = match listener.accept() {
            Ok((s, _)) => s,
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    tracing::debug!(error = %e, "accept error");
                }
                thread::sleep(ACCEPT_POLL);
                continue;
            }
        };
        let _ = stream.set_nonblocking(false);
        let _ = stream.set_read_timeout(Some(CONN_TIMEOUT));
        let _ = stream.set_write_timeout(Some(CONN_TIMEOUT));
        let root = root.clone();
        thread::spawn(move || {
            let mut s = stream;
            if let Err(e) = handle_connection(&root, &mut s) {
                tracing::debug!(error = %e, "connection error");
            }
            let _ = s.shutdown(Shutdown::Both);
        });
    }
    tracing::debug!("static server accept loop stopped");
}

fn handle_connection(root: &Path, stream: &mut TcpStream) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    // Drain headers; nothing in them changes the response.
    loop {
        let mut h = String::new();
        if reader.read_line(&mut h)? == 0 || h == "\r\n" || h == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");
    let head_only = method == "HEAD";
    if method != "GET" && !head_only {
        return respond(
            stream,
            405,
            "Method Not Allowed",
            "text/plain; charset=utf-8",
            b"method not allowed\n",
            head_only,
        );
    }

    match resolve(root, target) {
        Some(path) => match fs::read(&path) {
            Ok(body) => respond(stream, 200, "OK", content_type(&path), &body, head_only),
            Err(_) => not_found(root, stream, head_only),
        },
        None => not_found(root, stream, head_only),
    }
}

fn not_found(root: &Path, stream: &mut TcpStream, head_only: bool) -> io::Result<()> {
    let custom = root.join("404.html");
    match fs::read(&custom) {
        Ok(body) => respond(
            stream,
            404,
            "Not Found",
            "text/html; charset=utf-8",
            &body,
            head_only,
        ),
        Err(_) => respond(
            stream,
            404,
            "Not Found",
            "text/plain; charset=utf-8",
            b"404 page not found\n",
            head_only,
        ),
    }
}

fn respond(
    stream: &mut TcpStream,
    code: u16,
    reason: &str,
    ctype: &str,
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    let header = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: {ctype}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    if !head_only {
        stream.write_all(body)?;
    }
    stream.flush()
}

/// Map a request target onto a file under `root`. Rejects anything that would
/// escape `root`; directories resolve to their `index.html`.
pub fn resolve(root: &Path, target: &str) -> Option<PathBuf> {
    let path_part = target.split(['?', '#']).next().unwrap_or("/");
    let decoded = percent_decode(path_part)?;
    let mut rel = PathBuf::new();
    for comp in Path::new(decoded.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(c) => rel.push(c),
            Component::CurDir => {}
            _ => return None,
        }
    }
    let mut full = root.join(&rel);
    if full.is_dir() {
        full = full.join("index.html");
    } else if !full.exists() && full.extension().is_none() {
        // Starlight emits `/guide/` as `guide/index.html`; accept `/guide` too.
        let alt = full.join("index.html");
        if alt.is_file() {
            full = alt;
        }
    }
    let canon = fs::canonicalize(&full).ok()?;
    if !canon.starts_with(root) || !canon.is_file() {
        return None;
    }
    Some(canon)
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        Some("woff") => "font/woff",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_traversal_and_maps_dirs() {
        let td = tempfile::tempdir().expect("tmpdir");
        let root = fs::canonicalize(td.path()).expect("canon");
        fs::create_dir_all(root.join("guide")).expect("mkdir");
        fs::write(root.join("index.html"), "home").expect("write");
        fs::write(root.join("guide/index.html"), "guide").expect("write");

        assert_eq!(resolve(&root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve(&root, "/guide/"), Some(root.join("guide/index.html")));
        assert_eq!(resolve(&root, "/guide?x=1"), Some(root.join("guide/index.html")));
        assert_eq!(resolve(&root, "/../etc/passwd"), None);
        assert_eq!(resolve(&root, "/%2e%2e/etc/passwd"), None);
        assert_eq!(resolve(&root, "/missing.html"), None);
    }

    #[test]
    fn test_percent_decode_requires_two_hex_digits() {
        assert_eq!(percent_decode("/a%20b"), Some("/a b".to_string()));
        assert_eq!(percent_decode("%41"), Some("A".to_string()));
        assert_eq!(percent_decode("%+1"), None);
        assert_eq!(percent_decode("%-1"), None);
        assert_eq!(percent_decode("%4"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("a.bin")), "application/octet-stream");
    }
}
