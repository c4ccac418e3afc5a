//! # Server Module
//!
//! The embedded HTTP server: request ingestion, response serialization, and
//! the listener lifecycle.
//!
//! ## Connection model
//!
//! One request per accepted connection. The accept loop runs as a task on
//! the server's worker pool; each accepted descriptor is handled inline and
//! closed once the response has been written. There is no keep-alive, no
//! chunked transfer encoding, and no TLS.
//!
//! ## Request processing
//!
//! ```text
//! accept → read header block (16 KiB cap) → parse request line + headers
//!        → read body (Content-Length) → decode body by content type
//!        → route → handler / static file / SPA index / error page
//!        → serialize response → close
//! ```
//!
//! Supported body types: `application/x-www-form-urlencoded` (decoded into
//! form fields), `multipart/form-data` (fields plus in-memory file uploads),
//! and anything else as an opaque byte payload.
//!
//! ## Example
//!
//! ```rust,no_run
//! use girder::server::{HttpResponse, WebServer};
//! use std::sync::Arc;
//!
//! let mut server = WebServer::new(
//!     "127.0.0.1",
//!     8080,
//!     false,
//!     4,
//!     Arc::new(|message| eprintln!("server error: {message}")),
//! );
//! server.route("/hello/{name}", Arc::new(|_config, _request, params| {
//!     HttpResponse::text(200, format!("hello, {}", params["name"]))
//! }));
//! let handle = server.start();
//! handle.wait_ready().unwrap();
//! ```

mod core;
pub mod request;
pub mod response;

pub use core::{ErrorCallback, ServerError, ServerHandle, WebServer};
pub use request::{HttpRequest, UploadedFile};
pub use response::HttpResponse;
