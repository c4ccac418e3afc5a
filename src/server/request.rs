use http::Method;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::warn;

use super::core::ErrorCallback;

/// A file received through a `multipart/form-data` upload, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Original filename supplied by the client.
    pub filename: String,
    /// MIME type from the part's `Content-Type`, defaulting to
    /// `application/octet-stream`.
    pub content_type: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

/// A parsed HTTP request.
///
/// Header names are case-sensitive and duplicates resolve last-writer-wins.
/// Form fields are populated for URL-encoded and multipart bodies; other
/// bodies are kept as raw bytes only.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub form_fields: HashMap<String, String>,
    pub upload_files: HashMap<String, UploadedFile>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Parse the request line and header block (everything before the blank
/// line). Returns a bad-request message on a malformed request line.
pub(crate) fn parse_head(head: &str) -> Result<HttpRequest, String> {
    let mut lines = head.split('\n');

    let request_line = lines.next().unwrap_or("").trim_end_matches('\r');
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Err("Bad Request: Malformed request line.".to_string());
    };
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| "Bad Request: Malformed request line.".to_string())?;

    let mut request = HttpRequest {
        method,
        path: path.to_string(),
        headers: HashMap::new(),
        cookies: HashMap::new(),
        form_fields: HashMap::new(),
        upload_files: HashMap::new(),
        body: Vec::new(),
    };

    for line in lines {
        let Some((name, value)) = split_header_line(line) else {
            continue;
        };
        if name == "Cookie" {
            parse_cookies(&value, &mut request.cookies);
        }
        request.headers.insert(name, value);
    }

    Ok(request)
}

/// Split one `Name: value` header line; strips the trailing CR and one
/// leading space of the value. Lines without a colon are skipped.
fn split_header_line(line: &str) -> Option<(String, String)> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let (name, value) = line.split_once(':')?;
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name.to_string(), value.to_string()))
}

/// Split a `Cookie` header into name/value pairs, trimming whitespace on
/// both sides of each.
fn parse_cookies(header_value: &str, cookies: &mut HashMap<String, String>) {
    for pair in header_value.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        cookies.insert(name.trim().to_string(), value.trim().to_string());
    }
}

/// Attach the body to the request and decode it according to its
/// `Content-Type`. Returns a bad-request message for multipart payloads
/// without a boundary parameter.
pub(crate) fn decode_body(
    request: &mut HttpRequest,
    body: Vec<u8>,
    report: &ErrorCallback,
) -> Result<(), String> {
    let content_type = request
        .headers
        .get("Content-Type")
        .cloned()
        .unwrap_or_default();

    if content_type.starts_with("multipart/form-data") {
        let boundary_re = Regex::new("boundary=([^;]+)").expect("boundary regex is valid");
        let Some(caps) = boundary_re.captures(&content_type) else {
            report("multipart form-data without boundary".to_string());
            return Err("Bad Request: Malformed multipart/form-data (missing boundary).".to_string());
        };
        let boundary = caps[1].to_string();
        parse_multipart(&body, &boundary, request, report);
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = String::from_utf8_lossy(&body).into_owned();
        parse_url_encoded(&text, &mut request.form_fields, report);
    }

    request.body = body;
    Ok(())
}

/// Decode `key=value&key=value` pairs, percent-decoding both sides.
fn parse_url_encoded(
    body: &str,
    fields: &mut HashMap<String, String>,
    report: &ErrorCallback,
) {
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        fields.insert(url_decode(key, report), url_decode(value, report));
    }
}

/// Percent-decode a URL-encoded token. `+` becomes a space; `%HH` becomes a
/// byte. Malformed `%` sequences are preserved verbatim and reported as a
/// non-fatal warning.
fn url_decode(encoded: &str, report: &ErrorCallback) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match hex_pair(bytes[i + 1], bytes[i + 2]) {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    let sequence = String::from_utf8_lossy(&bytes[i..i + 3]).into_owned();
                    warn!(sequence = %sequence, "malformed URL encoding preserved verbatim");
                    report(format!("Malformed URL encoding encountered: {sequence}"));
                    out.push(bytes[i]);
                    i += 1;
                }
            },
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Walk a `multipart/form-data` body, splitting on `--boundary`.
///
/// Parts carrying a `filename="…"` disposition attribute become uploaded
/// files; others become plain form fields. Structurally broken parts are
/// skipped with a warning; the `--boundary--` terminator ends the walk.
fn parse_multipart(
    body: &[u8],
    boundary: &str,
    request: &mut HttpRequest,
    report: &ErrorCallback,
) {
    let delimiter = format!("--{boundary}").into_bytes();
    let name_re = Regex::new("name=\"([^\"]+)\"").expect("name regex is valid");
    let filename_re = Regex::new("filename=\"([^\"]+)\"").expect("filename regex is valid");

    let mut cursor = 0;
    while let Some(found) = find_bytes(body, &delimiter, cursor) {
        let mut part_start = found + delimiter.len();

        if body[part_start..].starts_with(b"--") {
            break;
        }
        if body[part_start..].starts_with(b"\r\n") {
            part_start += 2;
        } else {
            report("Malformed multipart part: boundary not followed by CRLF; will be skipped".to_string());
            cursor = part_start;
            continue;
        }

        let Some(part_end) = find_bytes(body, &delimiter, part_start) else {
            report("Malformed multipart body: part without end delimiter; skipping remaining body".to_string());
            break;
        };

        let part = &body[part_start..part_end];
        let Some(headers_end) = find_bytes(part, b"\r\n\r\n", 0) else {
            report("Malformed multipart part: no header-body separator; skipping part".to_string());
            cursor = part_end;
            continue;
        };

        let head = String::from_utf8_lossy(&part[..headers_end]).into_owned();
        let mut part_body = &part[headers_end + 4..];
        if part_body.ends_with(b"\r\n") {
            part_body = &part_body[..part_body.len() - 2];
        }

        let mut part_headers = HashMap::new();
        for line in head.split('\n') {
            if let Some((name, value)) = split_header_line(line) {
                part_headers.insert(name, value);
            }
        }

        let Some(disposition) = part_headers.get("Content-Disposition") else {
            report("Multipart part without Content-Disposition header; skipping part".to_string());
            cursor = part_end;
            continue;
        };

        let Some(name_caps) = name_re.captures(disposition) else {
            report("Multipart part Content-Disposition without 'name' attribute; skipping part".to_string());
            cursor = part_end;
            continue;
        };
        let field_name = name_caps[1].to_string();

        if let Some(filename_caps) = filename_re.captures(disposition) {
            let content_type = part_headers
                .get("Content-Type")
                .cloned()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            request.upload_files.insert(
                field_name,
                UploadedFile {
                    filename: filename_caps[1].to_string(),
                    content_type,
                    data: part_body.to_vec(),
                },
            );
        } else {
            request
                .form_fields
                .insert(field_name, String::from_utf8_lossy(part_body).into_owned());
        }

        cursor = part_end;
    }
}

/// First occurrence of `needle` in `haystack` at or after `from`.
fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn silent() -> ErrorCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn test_parse_head_request_line_and_headers() {
        let request = parse_head(
            "POST /submit HTTP/1.1\r\nHost: example\r\nContent-Type: text/plain\r\nHost: second",
        )
        .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/submit");
        // Duplicate names: last writer wins.
        assert_eq!(request.headers["Host"], "second");
        assert_eq!(request.headers["Content-Type"], "text/plain");
    }

    #[test]
    fn test_malformed_request_line_rejected() {
        assert!(parse_head("GARBAGE").is_err());
        assert!(parse_head("").is_err());
    }

    #[test]
    fn test_cookie_header_is_split() {
        let request =
            parse_head("GET / HTTP/1.1\r\nCookie: sessionId=abc123; theme = dark ; broken")
                .unwrap();
        assert_eq!(request.cookies["sessionId"], "abc123");
        assert_eq!(request.cookies["theme"], "dark");
        assert_eq!(request.cookies.len(), 2);
    }

    #[test]
    fn test_url_encoded_body() {
        let mut request = parse_head(
            "POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded",
        )
        .unwrap();
        decode_body(
            &mut request,
            b"name=Alice%20Liddell&age=7".to_vec(),
            &silent(),
        )
        .unwrap();
        assert_eq!(request.form_fields["name"], "Alice Liddell");
        assert_eq!(request.form_fields["age"], "7");
    }

    #[test]
    fn test_url_decode_plus_and_malformed_percent() {
        let reported = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = reported.clone();
        let report: ErrorCallback = Arc::new(move |msg| sink.lock().unwrap().push(msg));

        assert_eq!(url_decode("a+b%2Fc", &report), "a b/c");
        assert_eq!(url_decode("bad%zzseq", &report), "bad%zzseq");
        assert_eq!(reported.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_multipart_field_and_file() {
        let body = concat!(
            "--X\r\n",
            "Content-Disposition: form-data; name=\"description\"\r\n",
            "\r\n",
            "hello\r\n",
            "--X\r\n",
            "Content-Disposition: form-data; name=\"myFile\"; filename=\"a.txt\"\r\n",
            "\r\n",
            "abc\r\n",
            "--X--\r\n",
        );
        let mut request = parse_head(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=X",
        )
        .unwrap();
        decode_body(&mut request, body.as_bytes().to_vec(), &silent()).unwrap();

        assert_eq!(request.form_fields["description"], "hello");
        let file = &request.upload_files["myFile"];
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(file.data, b"abc");
        assert_eq!(request.upload_files.len(), 1);
    }

    #[test]
    fn test_multipart_part_content_type_is_kept() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"img\"; filename=\"p.png\"\r\n",
            "Content-Type: image/png\r\n",
            "\r\n",
            "PNGDATA\r\n",
            "--B--\r\n",
        );
        let mut request = parse_head(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=B",
        )
        .unwrap();
        decode_body(&mut request, body.as_bytes().to_vec(), &silent()).unwrap();
        assert_eq!(request.upload_files["img"].content_type, "image/png");
    }

    #[test]
    fn test_multipart_part_without_name_is_skipped() {
        let body = concat!(
            "--X\r\n",
            "Content-Disposition: form-data\r\n",
            "\r\n",
            "orphan\r\n",
            "--X\r\n",
            "Content-Disposition: form-data; name=\"kept\"\r\n",
            "\r\n",
            "yes\r\n",
            "--X--\r\n",
        );
        let reported = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = reported.clone();
        let report: ErrorCallback = Arc::new(move |msg| sink.lock().unwrap().push(msg));

        let mut request = parse_head(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=X",
        )
        .unwrap();
        decode_body(&mut request, body.as_bytes().to_vec(), &report).unwrap();
        assert_eq!(request.form_fields.len(), 1);
        assert_eq!(request.form_fields["kept"], "yes");
        assert!(!reported.lock().unwrap().is_empty());
    }

    #[test]
    fn test_multipart_missing_boundary_is_bad_request() {
        let mut request =
            parse_head("POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data").unwrap();
        assert!(decode_body(&mut request, b"irrelevant".to_vec(), &silent()).is_err());
    }

    #[test]
    fn test_opaque_body_kept_raw() {
        let mut request =
            parse_head("POST /raw HTTP/1.1\r\nContent-Type: application/octet-stream").unwrap();
        decode_body(&mut request, vec![0, 159, 146, 150], &silent()).unwrap();
        assert_eq!(request.body, vec![0, 159, 146, 150]);
        assert!(request.form_fields.is_empty());
    }

    #[test]
    fn test_find_bytes() {
        assert_eq!(find_bytes(b"aabbcc", b"bb", 0), Some(2));
        assert_eq!(find_bytes(b"aabbcc", b"bb", 3), None);
        assert_eq!(find_bytes(b"aabb", b"aabbcc", 0), None);
    }
}
