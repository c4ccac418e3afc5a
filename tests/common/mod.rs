#![allow(dead_code)]

use girder::ErrorCallback;
use std::sync::{Arc, Mutex, Once};

/// Install a test tracing subscriber once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// An error callback that records every reported message.
pub fn collecting_errors() -> (ErrorCallback, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: ErrorCallback = Arc::new(move |message| {
        sink.lock().unwrap().push(message);
    });
    (callback, messages)
}

/// An error callback that drops every report.
pub fn silent_errors() -> ErrorCallback {
    Arc::new(|_| {})
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// Send a raw HTTP request and return the full raw response. The server
    /// closes the connection after one response, so reading to EOF yields
    /// exactly one reply.
    pub fn send_request(port: u16, request: &str) -> String {
        send_request_bytes(port, request.as_bytes())
    }

    pub fn send_request_bytes(port: u16, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(request).unwrap();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response);
        String::from_utf8_lossy(&response).into_owned()
    }

    /// Send a request and close the write side immediately, simulating a
    /// peer that hangs up before delivering the advertised body.
    pub fn send_request_then_close_write(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response);
        String::from_utf8_lossy(&response).into_owned()
    }

    /// Split a raw response into (status, content-type, body).
    pub fn parse_parts(response: &str) -> (u16, String, String) {
        let (head, body) = response
            .split_once("\r\n\r\n")
            .unwrap_or((response, ""));

        let mut status = 0;
        let mut content_type = String::new();
        for line in head.lines() {
            if line.starts_with("HTTP/1.1") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap_or(0);
            } else if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-type") {
                    content_type = value.trim().to_string();
                }
            }
        }
        (status, content_type, body.to_string())
    }

    /// Collect every header line of a raw response into (name, value) pairs.
    pub fn response_headers(response: &str) -> Vec<(String, String)> {
        let head = response.split("\r\n\r\n").next().unwrap_or("");
        head.lines()
            .skip(1)
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }
}
