//! # Router Module
//!
//! Path-pattern routing with named parameter extraction.
//!
//! ## Overview
//!
//! Patterns may contain `{name}` placeholders; each placeholder matches a
//! single path segment (possibly empty). Registration compiles the pattern
//! into an anchored regex and records the placeholder names in order.
//!
//! Routes are evaluated in registration order and the first match wins, so
//! more specific patterns should be registered before catch-alls.
//!
//! ## Parameter extraction
//!
//! Captured segments populate a parameters map keyed by placeholder name.
//! A placeholder that captured the empty string is omitted: `/{id}` matched
//! against `/` yields no `id` entry.
//!
//! ## Example
//!
//! ```rust
//! use girder::router::Router;
//! use girder::server::HttpResponse;
//! use std::sync::Arc;
//!
//! let mut router = Router::new();
//! router.register("/api/user/{id}", Arc::new(|_config, _request, params| {
//!     HttpResponse::text(200, format!("user {}", params["id"]))
//! }));
//!
//! let (_handler, params) = router.route("/api/user/42").unwrap();
//! assert_eq!(params["id"], "42");
//! ```

mod core;

pub use core::{PathParams, RequestHandler, Router};
