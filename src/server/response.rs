use serde_json::Value;
use std::collections::BTreeMap;

/// Standard reason phrase for a status code.
pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// An HTTP response under construction.
///
/// Serialized as: status line, `Content-Length`, headers, `Set-Cookie`
/// directives, blank line, body. `Content-Length` always reflects the body
/// length at serialization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    headers: BTreeMap<String, String>,
    /// Cookie name → full `Set-Cookie` directive.
    cookies: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty response with the standard reason phrase for `status`.
    pub fn new(status: u16) -> Self {
        HttpResponse {
            status,
            reason: status_reason(status).to_string(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// A `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", "text/plain");
        response.body = body.into().into_bytes();
        response
    }

    /// A `text/html` response.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", "text/html");
        response.body = body.into().into_bytes();
        response
    }

    /// An `application/json` response serialized from a JSON value.
    pub fn json(status: u16, body: Value) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", "application/json");
        response.body = serde_json::to_vec(&body).unwrap();
        response
    }

    /// Set or replace a header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Look up a header set on this response.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Set a cookie with optional attributes.
    ///
    /// An attribute with an empty value is serialized as a bare flag, so
    /// `("HttpOnly", "")` yields `; HttpOnly`.
    pub fn set_cookie(&mut self, name: &str, value: &str, attributes: &[(&str, &str)]) {
        let mut directive = format!("{name}={value}");
        for (attr, attr_value) in attributes {
            directive.push_str("; ");
            directive.push_str(attr);
            if !attr_value.is_empty() {
                directive.push('=');
                directive.push_str(attr_value);
            }
        }
        self.cookies.insert(name.to_string(), directive);
    }

    /// Serialize the response into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        for directive in self.cookies.values() {
            head.push_str(&format!("Set-Cookie: {directive}\r\n"));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(200)
    }
}
