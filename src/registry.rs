//! Dynamic handler registry.
//!
//! Externally built handler modules are registered by an opaque string
//! reference and assigned an integer id; named handlers are then resolved
//! from a module at lookup time. The registry is loader-agnostic: a
//! [`ModuleLoader`] turns references into modules, and the in-tree
//! [`StaticModuleLoader`] backs them with a registration table assembled at
//! startup. Nothing is cached between lookups, and the registry keeps every
//! opened module alive until it is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::router::RequestHandler;
use crate::server::{ErrorCallback, HttpResponse};

/// A loaded code unit exporting handlers by name.
pub trait HandlerModule: Send + Sync {
    /// Resolve an exported handler. `None` when the name is unknown.
    fn resolve(&self, name: &str) -> Option<RequestHandler>;
}

/// Capability that opens an opaque module reference.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, reference: &str) -> Option<Arc<dyn HandlerModule>>;
}

/// A [`HandlerModule`] backed by a table of named closures.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, RequestHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable::default()
    }

    pub fn insert(&mut self, name: &str, handler: RequestHandler) {
        self.handlers.insert(name.to_string(), handler);
    }
}

impl HandlerModule for HandlerTable {
    fn resolve(&self, name: &str) -> Option<RequestHandler> {
        self.handlers.get(name).cloned()
    }
}

/// A [`ModuleLoader`] over a fixed reference→module table.
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: HashMap<String, Arc<dyn HandlerModule>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        StaticModuleLoader::default()
    }

    /// Make `module` available under `reference`.
    pub fn insert(&mut self, reference: &str, module: Arc<dyn HandlerModule>) {
        self.modules.insert(reference.to_string(), module);
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn open(&self, reference: &str) -> Option<Arc<dyn HandlerModule>> {
        self.modules.get(reference).cloned()
    }
}

/// Owns loaded handler modules and resolves named handlers from them.
pub struct ModuleRegistry {
    loader: Box<dyn ModuleLoader>,
    modules: HashMap<u32, Arc<dyn HandlerModule>>,
    next_id: u32,
    on_error: ErrorCallback,
}

impl ModuleRegistry {
    pub fn new(loader: Box<dyn ModuleLoader>, on_error: ErrorCallback) -> Self {
        ModuleRegistry {
            loader,
            modules: HashMap::new(),
            next_id: 1,
            on_error,
        }
    }

    /// Open `reference` and register the resulting module.
    ///
    /// Returns the assigned id (always ≥ 1), or 0 when the reference cannot
    /// be opened.
    pub fn register(&mut self, reference: &str) -> u32 {
        match self.loader.open(reference) {
            Some(module) => {
                let id = self.next_id;
                self.next_id += 1;
                self.modules.insert(id, module);
                info!(module_id = id, reference = %reference, "handler module registered");
                id
            }
            None => {
                error!(reference = %reference, "handler module failed to load");
                (self.on_error)(format!("failed to load handler module '{reference}'"));
                0
            }
        }
    }

    /// Resolve a named handler from a registered module.
    ///
    /// Resolution happens on every call; nothing is cached. Unknown ids or
    /// names report through the error callback and yield a stub handler that
    /// answers `500 Internal Server Error`.
    pub fn load(&self, module_id: u32, name: &str) -> RequestHandler {
        let Some(module) = self.modules.get(&module_id) else {
            (self.on_error)(format!(
                "handler module with id {module_id} not found or invalid"
            ));
            return stub_handler("Error: Dynamic module not loaded.");
        };

        match module.resolve(name) {
            Some(handler) => handler,
            None => {
                (self.on_error)(format!(
                    "error finding handler '{name}' in module id {module_id}"
                ));
                stub_handler("Error: Dynamic handler function not found.")
            }
        }
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether any module is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn stub_handler(message: &'static str) -> RequestHandler {
    Arc::new(move |_, _, _| HttpResponse::text(500, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::router::PathParams;
    use crate::server::request::HttpRequest;
    use http::Method;
    use std::collections::HashMap as Map;

    fn silent() -> ErrorCallback {
        Arc::new(|_| {})
    }

    fn empty_request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            path: "/".to_string(),
            headers: Map::new(),
            cookies: Map::new(),
            form_fields: Map::new(),
            upload_files: Map::new(),
            body: Vec::new(),
        }
    }

    fn sample_loader() -> StaticModuleLoader {
        let mut table = HandlerTable::new();
        table.insert(
            "greet",
            Arc::new(|_, _, _| HttpResponse::text(200, "greetings")),
        );
        let mut loader = StaticModuleLoader::new();
        loader.insert("mod_greeter", Arc::new(table));
        loader
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let mut registry = ModuleRegistry::new(Box::new(sample_loader()), silent());
        assert_eq!(registry.register("mod_greeter"), 1);
        assert_eq!(registry.register("mod_greeter"), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_unknown_reference_returns_zero() {
        let reported = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = reported.clone();
        let mut registry = ModuleRegistry::new(
            Box::new(sample_loader()),
            Arc::new(move |msg| sink.lock().unwrap().push(msg)),
        );
        assert_eq!(registry.register("missing"), 0);
        assert!(registry.is_empty());
        assert_eq!(reported.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_load_resolves_named_handler() {
        let mut registry = ModuleRegistry::new(Box::new(sample_loader()), silent());
        let id = registry.register("mod_greeter");
        let handler = registry.load(id, "greet");
        let response = handler(&Config::new(), &empty_request(), &PathParams::new());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"greetings");
    }

    #[test]
    fn test_load_unknown_module_yields_stub() {
        let registry = ModuleRegistry::new(Box::new(sample_loader()), silent());
        let handler = registry.load(42, "greet");
        let response = handler(&Config::new(), &empty_request(), &PathParams::new());
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_load_unknown_name_yields_stub() {
        let mut registry = ModuleRegistry::new(Box::new(sample_loader()), silent());
        let id = registry.register("mod_greeter");
        let handler = registry.load(id, "nope");
        let response = handler(&Config::new(), &empty_request(), &PathParams::new());
        assert_eq!(response.status, 500);
    }
}
