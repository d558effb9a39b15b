//! Static file serving for `GET /builds/**`.
//!
//! Resolution order for a request path under the output root:
//! 1. Exact file match → serve file
//! 2. Directory with index.html → serve index.html
//! 3. Anything else → 404

use super::routes::Reply;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Map a URL path (already stripped of its mount prefix) to a file under
/// `root`.
///
/// Returns `None` for paths that try to leave `root` or name nothing
/// servable.
pub fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let decoded = urlencoding::decode(url_path).ok()?;
    let relative = Path::new(decoded.trim_matches('/'));

    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local_path = root.join(relative);
    if local_path.is_file() {
        return Some(local_path);
    }

    let index_path = local_path.join("index.html");
    index_path.is_file().then_some(index_path)
}

/// Serve `url_path` from `root`. Blocking.
pub fn serve(root: &Path, url_path: &str) -> Reply {
    let Some(path) = resolve(root, url_path) else {
        return Reply::not_found();
    };

    match fs::read(&path) {
        Ok(content) => Reply::new(200, content).with_header("Content-Type", guess_content_type(&path)),
        Err(_) => Reply::not_found(),
    }
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",

        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("master/blog/my post")).unwrap();
        fs::write(dir.path().join("master/index.html"), "home").unwrap();
        fs::write(dir.path().join("master/blog/my post/index.html"), "post").unwrap();
        fs::write(dir.path().join("master/app.js"), "js").unwrap();
        fs::write(dir.path().join("secret.toml"), "secret").unwrap();
        dir
    }

    #[test]
    fn test_resolve_file_and_index() {
        let dir = output();
        let root = dir.path();

        assert_eq!(resolve(root, "/master/app.js"), Some(root.join("master/app.js")));
        assert_eq!(resolve(root, "/master/"), Some(root.join("master/index.html")));
        assert_eq!(resolve(root, "/master"), Some(root.join("master/index.html")));
    }

    #[test]
    fn test_resolve_percent_decodes() {
        let dir = output();
        assert_eq!(
            resolve(dir.path(), "/master/blog/my%20post/"),
            Some(dir.path().join("master/blog/my post/index.html"))
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = output();
        let root = dir.path().join("master");
        assert_eq!(resolve(&root, "/../secret.toml"), None);
        assert_eq!(resolve(&root, "/blog/%2E%2E/%2E%2E/secret.toml"), None);
    }

    #[test]
    fn test_resolve_missing() {
        let dir = output();
        assert_eq!(resolve(dir.path(), "/master/nope.html"), None);
        assert_eq!(resolve(dir.path(), "/master/blog/"), None);
    }

    #[test]
    fn test_serve_sets_content_type() {
        let dir = output();
        let reply = serve(dir.path(), "/master/index.html");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(reply.body, b"home");

        assert_eq!(serve(dir.path(), "/master/missing").status, 404);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.woff2")), "font/woff2");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
    }
}
