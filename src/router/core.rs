use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::server::{HttpRequest, HttpResponse};

/// Parameters extracted from `{name}` placeholders in a matched path.
pub type PathParams = HashMap<String, String>;

/// A request handler: configuration snapshot, parsed request, extracted path
/// parameters in, response out. Callable from any pool thread.
pub type RequestHandler =
    Arc<dyn Fn(&Config, &HttpRequest, &PathParams) -> HttpResponse + Send + Sync>;

struct Route {
    pattern: Regex,
    param_names: Vec<String>,
    handler: RequestHandler,
}

/// Matches request paths against registered patterns in registration order.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Router { routes: Vec::new() }
    }

    /// Register a handler for a path pattern.
    ///
    /// Each `{name}` placeholder matches one (possibly empty) path segment.
    /// The compiled pattern is anchored at both ends.
    pub fn register(&mut self, path_pattern: &str, handler: RequestHandler) {
        let (pattern, param_names) = compile_pattern(path_pattern);
        info!(
            pattern = %path_pattern,
            params = ?param_names,
            total_routes = self.routes.len() + 1,
            "route registered"
        );
        self.routes.push(Route {
            pattern,
            param_names,
            handler,
        });
    }

    /// Match a request path. The first registered matching route wins.
    ///
    /// Returns the handler plus the populated parameters map; empty captures
    /// are omitted.
    pub fn route(&self, path: &str) -> Option<(&RequestHandler, PathParams)> {
        for route in &self.routes {
            let Some(captures) = route.pattern.captures(path) else {
                continue;
            };

            let mut params = PathParams::new();
            for (i, name) in route.param_names.iter().enumerate() {
                if let Some(value) = captures.get(i + 1) {
                    if !value.as_str().is_empty() {
                        params.insert(name.clone(), value.as_str().to_string());
                    }
                }
            }

            debug!(path = %path, params = ?params, "route matched");
            return Some((&route.handler, params));
        }
        None
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether any routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Compile a `{name}` pattern into an anchored regex and the ordered list of
/// placeholder names.
fn compile_pattern(path_pattern: &str) -> (Regex, Vec<String>) {
    let placeholder = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex is valid");

    let mut param_names = Vec::new();
    for caps in placeholder.captures_iter(path_pattern) {
        param_names.push(caps[1].to_string());
    }

    let compiled = placeholder.replace_all(path_pattern, "([^/]*)");
    let anchored = format!("^{compiled}$");
    let pattern = Regex::new(&anchored).expect("compiled route pattern is valid");
    (pattern, param_names)
}
