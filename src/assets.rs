//! Bundled UI assets.
//!
//! The files under `ui/` are compiled into the binary and served read-only.
//! Lookup is by exact file name, so request paths can never reach the
//! filesystem.

/// Asset served for the empty path.
pub const INDEX: &str = "index.html";

static ASSETS: &[(&str, &[u8])] = &[
    ("index.html", include_bytes!("../ui/index.html")),
    ("app.js", include_bytes!("../ui/app.js")),
    ("style.css", include_bytes!("../ui/style.css")),
    ("favicon.svg", include_bytes!("../ui/favicon.svg")),
];

static MIME_TYPES: &[(&str, &str)] = &[
    (".html", "text/html"),
    (".css", "text/css"),
    (".js", "application/javascript"),
    (".svg", "image/svg+xml"),
];

/// Fallback for names without a known extension.
const DEFAULT_MIME: &str = "text/plain";

/// Map a request path to an asset name; the empty path means the index.
pub fn resolve_name(path: &str) -> &str {
    if path.is_empty() {
        INDEX
    } else {
        path
    }
}

pub fn lookup(name: &str) -> Option<&'static [u8]> {
    ASSETS
        .iter()
        .find(|(asset, _)| *asset == name)
        .map(|(_, data)| *data)
}

/// MIME type from the file name suffix.
pub fn mime_type(name: &str) -> &'static str {
    MIME_TYPES
        .iter()
        .find(|(ext, _)| name.ends_with(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}
