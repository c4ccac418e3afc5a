use std::collections::HashMap;
use std::fmt;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::request::{self, HttpRequest};
use super::response::HttpResponse;
use crate::config::Config;
use crate::ids::RequestId;
use crate::pool::{panic_message, TaskPool};
use crate::registry::{ModuleLoader, ModuleRegistry, StaticModuleLoader};
use crate::router::{RequestHandler, Router};
use crate::static_files::{mime_type, StaticFiles};

/// Callback receiving non-fatal warnings and fatal startup failures as
/// descriptive strings, in addition to the `tracing` events.
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Hard cap on the request header block.
const MAX_HEADER_SIZE: usize = 16 * 1024;
const READ_CHUNK: usize = 4096;
const LISTEN_BACKLOG: libc::c_int = 10;

/// Listener startup failures. Surfaced through the error callback; the
/// server does not start when one occurs.
#[derive(Debug)]
pub enum ServerError {
    Socket(io::Error),
    SocketOptions(io::Error),
    Bind(io::Error),
    Listen(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Socket(err) => write!(f, "socket creation failed: {err}"),
            ServerError::SocketOptions(err) => write!(f, "socket control behavior error: {err}"),
            ServerError::Bind(err) => write!(f, "socket binding failed: {err}"),
            ServerError::Listen(err) => write!(f, "socket listening failed: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// Closes a descriptor exactly once on scope exit.
struct SocketCloser {
    fd: libc::c_int,
}

impl SocketCloser {
    fn new(fd: libc::c_int) -> Self {
        SocketCloser { fd }
    }

    fn fd(&self) -> libc::c_int {
        self.fd
    }

    /// Give up ownership without closing.
    fn release(mut self) -> libc::c_int {
        mem::replace(&mut self.fd, -1)
    }
}

impl Drop for SocketCloser {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

/// Everything the accept loop and connection handling need, frozen at
/// `start` time. Route and error-page tables are not mutated afterwards.
struct ServerShared {
    host: String,
    port: u16,
    spa: bool,
    router: Router,
    public_dir: Option<StaticFiles>,
    error_pages: HashMap<u16, PathBuf>,
    config: Config,
    on_error: ErrorCallback,
    // Keeps loaded handler modules alive for the server's lifetime.
    #[allow(dead_code)]
    modules: ModuleRegistry,
    listener_fd: AtomicI32,
    bound_port: AtomicU16,
}

/// An embedded HTTP server.
///
/// All registration (`route`, `serve_public`, `error_page`, modules, config)
/// happens before [`WebServer::start`] consumes the value; the running
/// server's tables are immutable.
pub struct WebServer {
    host: String,
    port: u16,
    spa: bool,
    workers: usize,
    router: Router,
    public_dir: Option<StaticFiles>,
    error_pages: HashMap<u16, PathBuf>,
    modules: ModuleRegistry,
    config: Config,
    on_error: ErrorCallback,
}

impl WebServer {
    /// Create a server bound to `host:port` once started.
    ///
    /// `spa` enables the single-page-application fallback for the public
    /// directory. `workers` sizes the connection pool; zero selects one
    /// worker per CPU.
    pub fn new(
        host: &str,
        port: u16,
        spa: bool,
        workers: usize,
        on_error: ErrorCallback,
    ) -> Self {
        WebServer {
            host: host.to_string(),
            port,
            spa,
            workers,
            router: Router::new(),
            public_dir: None,
            error_pages: HashMap::new(),
            modules: ModuleRegistry::new(Box::<StaticModuleLoader>::default(), on_error.clone()),
            config: Config::new(),
            on_error,
        }
    }

    /// Register a handler for a `{name}`-style path pattern.
    pub fn route(&mut self, path_pattern: &str, handler: RequestHandler) {
        self.router.register(path_pattern, handler);
    }

    /// Serve static files from `public_dir` when no route matches.
    pub fn serve_public<P: Into<PathBuf>>(&mut self, public_dir: P) {
        self.public_dir = Some(StaticFiles::new(public_dir));
    }

    /// Serve the given file for a built-in error status.
    pub fn error_page<P: Into<PathBuf>>(&mut self, status: u16, filepath: P) {
        self.error_pages.insert(status, filepath.into());
    }

    /// Replace the loader used to resolve dynamic handler modules.
    pub fn set_module_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.modules = ModuleRegistry::new(loader, self.on_error.clone());
    }

    /// Load a handler module by opaque reference. Returns an id ≥ 1, or 0
    /// when the reference cannot be opened.
    pub fn add_module(&mut self, reference: &str) -> u32 {
        self.modules.register(reference)
    }

    /// Resolve a named handler from a loaded module. Unknown ids or names
    /// yield a stub handler producing `500 Internal Server Error`.
    pub fn load_handler(&self, module_id: u32, name: &str) -> RequestHandler {
        self.modules.load(module_id, name)
    }

    /// Attach the configuration snapshot passed to every handler.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// The currently attached configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the server: the accept loop runs as a task on the server's own
    /// worker pool. Startup failures (socket, bind, listen) are reported
    /// through the error callback and leave the handle stopped.
    pub fn start(self) -> ServerHandle {
        let pool = Arc::new(TaskPool::new(self.workers));
        let shared = Arc::new(ServerShared {
            host: self.host,
            port: self.port,
            spa: self.spa,
            router: self.router,
            public_dir: self.public_dir,
            error_pages: self.error_pages,
            config: self.config,
            on_error: self.on_error,
            modules: self.modules,
            listener_fd: AtomicI32::new(-1),
            bound_port: AtomicU16::new(0),
        });

        let loop_shared = shared.clone();
        pool.submit(move || accept_loop(&loop_shared));

        ServerHandle { shared, pool }
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    shared: Arc<ServerShared>,
    pool: Arc<TaskPool>,
}

impl ServerHandle {
    /// Shut the listener down and wait for in-flight connections to finish.
    /// Idempotent.
    pub fn stop(&self) {
        let fd = self.shared.listener_fd.swap(-1, Ordering::SeqCst);
        if fd >= 0 {
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
                libc::close(fd);
            }
            info!("server listener closed");
        }
        self.pool.wait_idle();
    }

    /// Whether the listener is currently open.
    pub fn is_running(&self) -> bool {
        self.shared.listener_fd.load(Ordering::SeqCst) >= 0
    }

    /// The port the listener is bound to. Zero until the listener is up;
    /// useful with an ephemeral port request.
    pub fn port(&self) -> u16 {
        self.shared.bound_port.load(Ordering::SeqCst)
    }

    /// Block until the listener accepts connections.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..100 {
            let port = self.port();
            if port != 0 && std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(shared: &ServerShared) {
    let fd = match open_listener(shared) {
        Ok(fd) => fd,
        Err(err) => {
            error!(error = %err, "server failed to start");
            (shared.on_error)(err.to_string());
            return;
        }
    };
    shared.listener_fd.store(fd, Ordering::SeqCst);
    info!(
        host = %shared.host,
        port = shared.bound_port.load(Ordering::SeqCst),
        "server listening"
    );

    loop {
        let client = unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if client < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EBADF) | Some(libc::EINVAL) => break,
                _ => {
                    (shared.on_error)(format!("failed to accept connection: {err}"));
                    continue;
                }
            }
        }
        handle_client(shared, client);
    }

    let fd = shared.listener_fd.swap(-1, Ordering::SeqCst);
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
}

fn open_listener(shared: &ServerShared) -> Result<libc::c_int, ServerError> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(ServerError::Socket(io::Error::last_os_error()));
    }
    let guard = SocketCloser::new(fd);

    let opt: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR | libc::SO_REUSEPORT,
            &opt as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(ServerError::SocketOptions(io::Error::last_os_error()));
    }

    let host_addr = if shared.host == "localhost" || shared.host == "127.0.0.1" {
        Ipv4Addr::UNSPECIFIED
    } else {
        shared.host.parse::<Ipv4Addr>().map_err(|_| {
            ServerError::Bind(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid host address '{}'", shared.host),
            ))
        })?
    };

    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: shared.port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(host_addr).to_be(),
        },
        sin_zero: [0; 8],
    };
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(ServerError::Bind(io::Error::last_os_error()));
    }

    if unsafe { libc::listen(fd, LISTEN_BACKLOG) } != 0 {
        return Err(ServerError::Listen(io::Error::last_os_error()));
    }

    // Recover the bound port so an ephemeral request (port 0) is observable.
    let mut bound: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(
            fd,
            &mut bound as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc == 0 {
        shared
            .bound_port
            .store(u16::from_be(bound.sin_port), Ordering::SeqCst);
    }

    Ok(guard.release())
}

/// Serve a single connection: read, parse, route, respond, close.
fn handle_client(shared: &ServerShared, client_fd: libc::c_int) {
    let socket = SocketCloser::new(client_fd);
    let request_id = RequestId::new();

    let mut raw: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut header_end: Option<usize> = None;
    while header_end.is_none() && raw.len() < MAX_HEADER_SIZE {
        let mut chunk = [0u8; READ_CHUNK];
        let n = unsafe {
            libc::recv(
                socket.fd(),
                chunk.as_mut_ptr() as *mut libc::c_void,
                READ_CHUNK,
                0,
            )
        };
        if n <= 0 {
            if raw.is_empty() {
                return;
            }
            (shared.on_error)(format!(
                "connection closed or errored during header read after {} bytes",
                raw.len()
            ));
            break;
        }
        raw.extend_from_slice(&chunk[..n as usize]);
        // Re-scan across the chunk seam.
        let from = raw.len().saturating_sub(n as usize + 3);
        header_end = find_terminator(&raw, from);
    }

    let Some(header_end) = header_end else {
        warn!(request_id = %request_id, bytes = raw.len(), "request headers too large or malformed");
        (shared.on_error)("Headers too large or malformed".to_string());
        let response = handle_error(
            shared,
            400,
            "Bad Request: Request headers too large or malformed.",
        );
        safe_send(shared, socket.fd(), &response.to_bytes());
        return;
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let mut request = match request::parse_head(&head) {
        Ok(request) => request,
        Err(message) => {
            (shared.on_error)(message.clone());
            let response = handle_error(shared, 400, &message);
            safe_send(shared, socket.fd(), &response.to_bytes());
            return;
        }
    };

    let content_length: usize = match request.headers.get("Content-Length") {
        Some(value) => match value.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                (shared.on_error)(format!("error parsing Content-Length: '{value}'"));
                let response =
                    handle_error(shared, 400, "Bad Request: Invalid Content-Length header.");
                safe_send(shared, socket.fd(), &response.to_bytes());
                return;
            }
        },
        None => 0,
    };

    let mut body: Vec<u8> = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0u8; READ_CHUNK];
        let wanted = (content_length - body.len()).min(READ_CHUNK);
        let n = unsafe {
            libc::recv(
                socket.fd(),
                chunk.as_mut_ptr() as *mut libc::c_void,
                wanted,
                0,
            )
        };
        if n < 0 {
            (shared.on_error)("failed to read complete request body".to_string());
            let response = handle_error(
                shared,
                500,
                "Internal Server Error: Failed to read request body.",
            );
            safe_send(shared, socket.fd(), &response.to_bytes());
            return;
        }
        if n == 0 {
            (shared.on_error)(format!(
                "connection closed during body read; expected {} more bytes",
                content_length - body.len()
            ));
            let response = handle_error(shared, 400, "Bad Request: Incomplete request body.");
            safe_send(shared, socket.fd(), &response.to_bytes());
            return;
        }
        body.extend_from_slice(&chunk[..n as usize]);
    }

    if let Err(message) = request::decode_body(&mut request, body, &shared.on_error) {
        let response = handle_error(shared, 400, &message);
        safe_send(shared, socket.fd(), &response.to_bytes());
        return;
    }

    info!(
        request_id = %request_id,
        method = %request.method,
        path = %request.path,
        "request received"
    );
    let response = route_request(shared, &request, request_id);
    info!(
        request_id = %request_id,
        status = response.status,
        "response written"
    );
    safe_send(shared, socket.fd(), &response.to_bytes());
}

/// Find the first matched route, falling back to the public directory, the
/// SPA index, and finally the 404 page.
fn route_request(shared: &ServerShared, request: &HttpRequest, request_id: RequestId) -> HttpResponse {
    if let Some((handler, params)) = shared.router.route(&request.path) {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| handler(&shared.config, request, &params)));
        return match outcome {
            Ok(response) => response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(request_id = %request_id, message = %message, "handler panicked");
                (shared.on_error)(format!(
                    "handler for '{}' failed: {message}",
                    request.path
                ));
                handle_error(shared, 500, "")
            }
        };
    }

    if let Some(public) = &shared.public_dir {
        if let Some(filepath) = public.resolve(&request.path) {
            if filepath.is_file() {
                return serve_static(shared, &filepath);
            }
        }
        if shared.spa && !StaticFiles::is_asset_request(&request.path) {
            if let Some(index) = public.spa_index() {
                return serve_static(shared, &index);
            }
        }
    }

    handle_error(shared, 404, "")
}

fn serve_static(shared: &ServerShared, filepath: &Path) -> HttpResponse {
    match std::fs::read(filepath) {
        Ok(contents) => {
            let mut response = HttpResponse::new(200);
            response.set_header("Content-Type", mime_type(filepath));
            response.body = contents;
            response
        }
        Err(_) => handle_error(
            shared,
            500,
            &format!("Could not read file: {}", filepath.display()),
        ),
    }
}

/// Build a built-in error response, preferring a registered error page.
fn handle_error(shared: &ServerShared, status: u16, message: &str) -> HttpResponse {
    let mut response = HttpResponse::new(status);

    if let Some(page) = shared.error_pages.get(&status) {
        match std::fs::read(page) {
            Ok(contents) => {
                response.reason = "Error Page".to_string();
                response.set_header("Content-Type", "text/html");
                response.body = contents;
            }
            Err(_) => {
                let mut body = format!(
                    "<h1>{status} - Error</h1><p>Failed to load error page: {}</p>",
                    page.display()
                );
                if !message.is_empty() {
                    body.push_str(&format!("<p>{message}</p>"));
                }
                response.set_header("Content-Type", "text/html");
                response.body = body.into_bytes();
            }
        }
        return response;
    }

    let message = if message.is_empty() {
        "An unexpected error occurred."
    } else {
        message
    };
    response.set_header("Content-Type", "text/plain");
    response.body = format!("Error {status}: {message}").into_bytes();
    response
}

/// Write the whole buffer, retrying short sends.
fn safe_send(shared: &ServerShared, fd: libc::c_int, data: &[u8]) {
    let mut sent = 0;
    while sent < data.len() {
        let n = unsafe {
            libc::send(
                fd,
                data[sent..].as_ptr() as *const libc::c_void,
                data.len() - sent,
                libc::MSG_NOSIGNAL,
            )
        };
        if n <= 0 {
            (shared.on_error)(if n == 0 {
                "peer closed connection unexpectedly".to_string()
            } else {
                format!("failed to send response: {}", io::Error::last_os_error())
            });
            return;
        }
        sent += n as usize;
    }
}

fn find_terminator(raw: &[u8], from: usize) -> Option<usize> {
    raw[from..]
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + from)
}
