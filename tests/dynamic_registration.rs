//! Dynamic handler modules registered through the server: module ids,
//! name resolution, and the 500 stub for unresolvable handlers.

mod common;

use common::http::{parse_parts, send_request};
use girder::{HandlerTable, HttpResponse, StaticModuleLoader, WebServer};
use std::sync::Arc;

fn employee_loader() -> StaticModuleLoader {
    let mut table = HandlerTable::new();
    table.insert(
        "fetch_employee",
        Arc::new(|_, _, params| {
            match params.get("id") {
                Some(id) => HttpResponse::json(
                    200,
                    serde_json::json!({ "employee_id": id, "name": "John Doe" }),
                ),
                None => HttpResponse::text(400, "no id in path"),
            }
        }),
    );
    let mut loader = StaticModuleLoader::new();
    loader.insert("employee_module", Arc::new(table));
    loader
}

#[test]
fn test_module_handler_serves_requests() {
    common::init_tracing();
    let mut server = WebServer::new("127.0.0.1", 0, false, 2, common::silent_errors());
    server.set_module_loader(Box::new(employee_loader()));

    let module_id = server.add_module("employee_module");
    assert_eq!(module_id, 1);
    let handler = server.load_handler(module_id, "fetch_employee");
    server.route("/employee/{id}", handler);

    let handle = server.start();
    handle.wait_ready().unwrap();

    let (status, content_type, body) = parse_parts(&send_request(
        handle.port(),
        "GET /employee/e7 HTTP/1.1\r\nHost: x\r\n\r\n",
    ));
    assert_eq!(status, 200);
    assert_eq!(content_type, "application/json");
    assert!(body.contains(r#""employee_id":"e7""#));

    handle.stop();
}

#[test]
fn test_unknown_module_reference_reports_and_returns_zero() {
    let (errors, messages) = common::collecting_errors();
    let mut server = WebServer::new("127.0.0.1", 0, false, 1, errors);
    server.set_module_loader(Box::new(employee_loader()));

    assert_eq!(server.add_module("no_such_module"), 0);
    assert!(messages
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("no_such_module")));
}

#[test]
fn test_unresolvable_handler_serves_500_stub() {
    common::init_tracing();
    let (errors, messages) = common::collecting_errors();
    let mut server = WebServer::new("127.0.0.1", 0, false, 2, errors);
    server.set_module_loader(Box::new(employee_loader()));

    let module_id = server.add_module("employee_module");
    let missing = server.load_handler(module_id, "does_not_exist");
    server.route("/broken", missing);
    assert!(messages
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("does_not_exist")));

    let handle = server.start();
    handle.wait_ready().unwrap();

    let (status, _, body) = parse_parts(&send_request(
        handle.port(),
        "GET /broken HTTP/1.1\r\nHost: x\r\n\r\n",
    ));
    assert_eq!(status, 500);
    assert!(body.contains("Dynamic handler function not found"));

    handle.stop();
}
