//! Fully buffered HTTP response.
//!
//! [`HttpResponse`] is what a page object usually reads from. It holds the
//! final URL (after redirects), an optional status code, the ordered
//! response headers and the raw body bytes. All fields reflect the
//! response as received; nothing is re-encoded.
//!
//! ## Text decoding
//! [`HttpResponse::text`] decodes the body once and caches the result.
//! The encoding is resolved in this order:
//! 1. the encoding passed to [`HttpResponse::with_encoding`],
//! 2. a byte order mark,
//! 3. the `Content-Type` charset,
//! 4. a `<meta>` / XML declaration in the body,
//! 5. inference: UTF-8 if the body is valid UTF-8, `windows-1252` otherwise.
use encoding_rs::Encoding;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use super::body::HttpResponseBody;
use super::headers::HttpHeaders;

#[derive(Clone)]
pub struct HttpResponse {
    url: Url,
    body: HttpResponseBody,
    status: Option<u16>,
    headers: HttpHeaders,
    /// Encoding label given by the creator of the response, if any.
    encoding: Option<String>,

    resolved_encoding: OnceLock<&'static Encoding>,
    text: OnceLock<String>,
}

impl HttpResponse {
    pub fn new(url: Url, body: impl Into<HttpResponseBody>) -> Self {
        Self {
            url,
            body: body.into(),
            status: None,
            headers: HttpHeaders::new(),
            encoding: None,
            resolved_encoding: OnceLock::new(),
            text: OnceLock::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self.reset_caches();
        self
    }

    /// Forces the encoding used to decode the body. Unknown labels are
    /// ignored during detection but still kept, so they survive a capture.
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self.reset_caches();
        self
    }

    fn reset_caches(&mut self) {
        self.resolved_encoding = OnceLock::new();
        self.text = OnceLock::new();
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &HttpResponseBody {
        &self.body
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// Encoding label explicitly set on this response.
    pub fn explicit_encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Encoding used by [`text`](Self::text).
    pub fn encoding(&self) -> &'static Encoding {
        self.resolved_encoding.get_or_init(|| self.detect_encoding())
    }

    fn detect_encoding(&self) -> &'static Encoding {
        if let Some(label) = &self.encoding {
            match Encoding::for_label(label.as_bytes()) {
                Some(enc) => return enc,
                None => log::warn!("Unknown encoding label {label:?} on response for {}", self.url),
            }
        }
        self.body
            .bom_encoding()
            .or_else(|| self.headers.declared_encoding())
            .or_else(|| self.body.declared_encoding())
            .unwrap_or_else(|| infer_encoding(&self.body))
    }

    /// Body decoded to text. Computed on first use and cached.
    pub fn text(&self) -> &str {
        let encoding = self.encoding();
        self.text.get_or_init(|| {
            let (text, _, had_errors) = encoding.decode(&self.body);
            if had_errors {
                log::debug!("Body of {} is not valid {}; replaced invalid sequences", self.url, encoding.name());
            }
            text.into_owned()
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.body.json()
    }

    /// Resolves `other` against the response URL.
    pub fn urljoin(&self, other: &str) -> Result<Url, url::ParseError> {
        self.url.join(other)
    }
}

/// Falls back to UTF-8 when the bytes allow it, `windows-1252` otherwise
/// (it decodes any byte sequence).
fn infer_encoding(body: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(body).is_ok() {
        encoding_rs::UTF_8
    } else {
        encoding_rs::WINDOWS_1252
    }
}

impl PartialEq for HttpResponse {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.status == other.status
            && self.headers == other.headers
            && self.body == other.body
            && self.encoding == other.encoding
    }
}

impl Eq for HttpResponse {}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn text_uses_content_type_charset() {
        let resp = HttpResponse::new(url(), b"caf\xe9".to_vec())
            .with_status(200)
            .with_headers(HttpHeaders::from_pairs([("Content-Type", "text/html; charset=latin1")]));
        assert_eq!(resp.encoding(), encoding_rs::WINDOWS_1252);
        assert_eq!(resp.text(), "caf\u{e9}");
    }

    #[test]
    fn explicit_encoding_wins_over_headers() {
        let resp = HttpResponse::new(url(), "caf\u{e9}".as_bytes().to_vec())
            .with_headers(HttpHeaders::from_pairs([("Content-Type", "text/html; charset=latin1")]))
            .with_encoding("utf-8");
        assert_eq!(resp.encoding(), encoding_rs::UTF_8);
        assert_eq!(resp.text(), "caf\u{e9}");
    }

    #[test]
    fn bom_wins_over_headers() {
        let resp = HttpResponse::new(url(), b"\xef\xbb\xbfhi".to_vec())
            .with_headers(HttpHeaders::from_pairs([("Content-Type", "text/html; charset=latin1")]));
        assert_eq!(resp.encoding(), encoding_rs::UTF_8);
        assert_eq!(resp.text(), "hi");
    }

    #[test]
    fn meta_charset_then_inference() {
        let resp = HttpResponse::new(url(), b"<meta charset=cp1251>\xcf\xf0\xe8".to_vec());
        assert_eq!(resp.encoding(), encoding_rs::WINDOWS_1251);
        assert!(resp.text().ends_with("\u{41f}\u{440}\u{438}"));

        let resp = HttpResponse::new(url(), b"plain \xff bytes".to_vec());
        assert_eq!(resp.encoding(), encoding_rs::WINDOWS_1252);

        let resp = HttpResponse::new(url(), "plain".as_bytes().to_vec());
        assert_eq!(resp.encoding(), encoding_rs::UTF_8);
    }

    #[test]
    fn unknown_explicit_label_falls_through() {
        let resp = HttpResponse::new(url(), "x".as_bytes().to_vec()).with_encoding("no-such-charset");
        assert_eq!(resp.encoding(), encoding_rs::UTF_8);
        assert_eq!(resp.explicit_encoding(), Some("no-such-charset"));
    }

    #[test]
    fn text_is_cached() {
        let resp = HttpResponse::new(url(), "<html></html>".as_bytes().to_vec());
        let a = resp.text() as *const str;
        let b = resp.text() as *const str;
        assert_eq!(a, b);
    }

    #[test]
    fn equality_ignores_caches() {
        let a = HttpResponse::new(url(), "x".as_bytes().to_vec()).with_status(200);
        let b = a.clone();
        let _ = a.text();
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_status(404));
    }

    #[test]
    fn urljoin_and_json() {
        let resp = HttpResponse::new(url(), r#"{"ok": true}"#.as_bytes().to_vec());
        assert_eq!(resp.urljoin("/other").unwrap().as_str(), "https://example.com/other");
        let v: serde_json::Value = resp.json().unwrap();
        assert_eq!(v["ok"], true);
    }
}
