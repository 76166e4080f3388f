//! Per-response rewrites for the bundled UI.
//!
//! The index page carries two markers that are filled in at serve time:
//! the theme class (driven by the `theme` cookie) and the version banner.

use crate::assets;
use crate::handler::Transform;
use crate::http::{Request, Response};
use bytes::Bytes;
use memchr::memmem;
use std::sync::Arc;

const THEME_MARKER: &[u8] = b"__THEME__";
const VERSION_MARKER: &[u8] = b"__VERSION__";

/// Build the transform hook stamping `version` into the index page.
pub fn transform(version: &'static str) -> Transform {
    Arc::new(move |request: &Request, mut response: Response| {
        if assets::resolve_name(&request.path) != assets::INDEX {
            return response;
        }

        let theme: &[u8] = match request.header("cookie") {
            Some(cookie) if cookie.contains("theme=light") => b" light",
            _ => b"",
        };

        let body = replace_all(&response.body, THEME_MARKER, theme);
        let body = replace_all(&body, VERSION_MARKER, version.as_bytes());
        response.body = Bytes::from(body);
        response
    })
}

/// Replace every occurrence of `needle` in `haystack`.
pub fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;

    for pos in memmem::find_iter(haystack, needle) {
        out.extend_from_slice(&haystack[last..pos]);
        out.extend_from_slice(replacement);
        last = pos + needle.len();
    }

    out.extend_from_slice(&haystack[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{read_request, StatusCode};

    async fn request(raw: &str) -> Request {
        let mut src = raw.as_bytes();
        read_request(&mut src, 8192).await.unwrap()
    }

    fn index_response() -> Response {
        Response::new(StatusCode::OK)
            .with_body(&b"<body class=\"page__THEME__\"><footer>__VERSION__</footer>"[..])
    }

    #[test]
    fn test_replace_all() {
        assert_eq!(replace_all(b"a-b-c", b"-", b"+="), b"a+=b+=c");
        assert_eq!(replace_all(b"abc", b"x", b"y"), b"abc");
        assert_eq!(replace_all(b"xx", b"x", b""), b"");
    }

    #[tokio::test]
    async fn test_light_theme_from_cookie() {
        let hook = transform("1.2.3");
        let req = request("GET / HTTP/1.1\r\nCookie: session=1; theme=light\r\n\r\n").await;
        let resp = hook(&req, index_response());

        assert_eq!(
            &resp.body[..],
            b"<body class=\"page light\"><footer>1.2.3</footer>"
        );
    }

    #[tokio::test]
    async fn test_default_theme() {
        let hook = transform("dev");
        let req = request("GET /index.html HTTP/1.1\r\n\r\n").await;
        let resp = hook(&req, index_response());

        assert_eq!(&resp.body[..], b"<body class=\"page\"><footer>dev</footer>");
    }

    #[tokio::test]
    async fn test_other_paths_untouched() {
        let hook = transform("dev");
        let req = request("GET /missing HTTP/1.1\r\nCookie: theme=light\r\n\r\n").await;
        let resp = hook(&req, Response::not_found());

        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(&resp.body[..], b"Not Found");
    }
}
