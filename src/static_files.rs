//! Static file resolution for the web server's public directory, including
//! the extension→MIME mapping and the single-page-application fallback rules.

use std::path::{Component, Path, PathBuf};

/// Maps request paths into a public directory and classifies them.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// The configured public directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a URL path to a file below the public directory.
    ///
    /// `/` and the empty path resolve to `/index.html`. Paths that try to
    /// escape the base directory resolve to `None`.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let requested = if url_path.is_empty() || url_path == "/" {
            "/index.html"
        } else {
            url_path
        };

        let clean = requested.trim_start_matches('/');
        let mut resolved = self.base_dir.clone();
        for component in Path::new(clean).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }

    /// Whether `url_path` resolves to an existing regular file.
    pub fn file_exists(&self, url_path: &str) -> bool {
        self.resolve(url_path).is_some_and(|p| p.is_file())
    }

    /// The SPA index file, when present.
    pub fn spa_index(&self) -> Option<PathBuf> {
        let index = self.base_dir.join("index.html");
        index.is_file().then_some(index)
    }

    /// SPA fallback applies only to non-asset requests: a path whose final
    /// segment contains a `.` is treated as an asset and never falls back.
    pub fn is_asset_request(url_path: &str) -> bool {
        url_path
            .rsplit('/')
            .next()
            .is_some_and(|segment| segment.contains('.'))
    }
}

/// MIME type for a file, derived from its extension.
pub fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_root_resolves_to_index() {
        let sf = StaticFiles::new("/srv/public");
        assert_eq!(
            sf.resolve("/").unwrap(),
            PathBuf::from("/srv/public/index.html")
        );
        assert_eq!(
            sf.resolve("").unwrap(),
            PathBuf::from("/srv/public/index.html")
        );
    }

    #[test]
    fn test_traversal_is_blocked() {
        let sf = StaticFiles::new("/srv/public");
        assert!(sf.resolve("/../etc/passwd").is_none());
        assert!(sf.resolve("/a/../../etc/passwd").is_none());
    }

    #[test]
    fn test_asset_detection() {
        assert!(StaticFiles::is_asset_request("/app/bundle.js"));
        assert!(StaticFiles::is_asset_request("/favicon.ico"));
        assert!(!StaticFiles::is_asset_request("/app/dashboard"));
        assert!(!StaticFiles::is_asset_request("/"));
    }

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_type(Path::new("x.html")), "text/html");
        assert_eq!(mime_type(Path::new("x.JS")), "application/javascript");
        assert_eq!(mime_type(Path::new("x.tar.gz")), "application/octet-stream");
        assert_eq!(mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_spa_index_detection() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StaticFiles::new(dir.path());
        assert!(sf.spa_index().is_none());
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        assert!(sf.spa_index().is_some());
    }

    #[test]
    fn test_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.css"), "body {}").unwrap();
        let sf = StaticFiles::new(dir.path());
        assert!(sf.file_exists("/app.css"));
        assert!(!sf.file_exists("/missing.css"));
    }
}
