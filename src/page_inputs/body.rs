//! Raw HTTP bodies and charset sniffing helpers.
use encoding_rs::Encoding;
use serde::de::DeserializeOwned;
use std::ops::Deref;

/// How far into a body we look for a `<meta charset>` declaration.
const DECLARED_ENCODING_SNIFF_LEN: usize = 4096;

/// Raw response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponseBody(Vec<u8>);

impl HttpResponseBody {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Encoding announced by a byte order mark.
    pub fn bom_encoding(&self) -> Option<&'static Encoding> {
        Encoding::for_bom(&self.0).map(|(enc, _)| enc)
    }

    /// Encoding declared inside the document (`<meta charset>`,
    /// `http-equiv` or an XML prolog).
    pub fn declared_encoding(&self) -> Option<&'static Encoding> {
        declared_body_encoding(&self.0)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }
}

impl Deref for HttpResponseBody {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HttpResponseBody {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for HttpResponseBody {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl From<&str> for HttpResponseBody {
    fn from(v: &str) -> Self {
        Self(v.as_bytes().to_vec())
    }
}

impl From<String> for HttpResponseBody {
    fn from(v: String) -> Self {
        Self(v.into_bytes())
    }
}

/// Raw request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequestBody(Vec<u8>);

impl HttpRequestBody {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for HttpRequestBody {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HttpRequestBody {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&str> for HttpRequestBody {
    fn from(v: &str) -> Self {
        Self(v.as_bytes().to_vec())
    }
}

impl From<String> for HttpRequestBody {
    fn from(v: String) -> Self {
        Self(v.into_bytes())
    }
}

/// Extracts the charset from a `Content-Type` value and maps it to an
/// encoding. Unknown labels yield `None`.
pub(crate) fn charset_from_content_type(ct: &str) -> Option<&'static Encoding> {
    // very small, permissive parse: look for "charset=..."
    let lower = ct.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let after = &ct[idx + "charset=".len()..];
    // charset value may be quoted or end at ; or end of string
    let end = after.find([';', ' ', '\t']).unwrap_or(after.len());
    let label = after[..end].trim_matches(['"', '\'']);
    Encoding::for_label(label.as_bytes())
}

fn declared_body_encoding(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(DECLARED_ENCODING_SNIFF_LEN)];
    // Only ASCII matters for the markup we look for.
    let head: String = head
        .iter()
        .map(|&b| if b.is_ascii() { (b as char).to_ascii_lowercase() } else { ' ' })
        .collect();

    if let Some(rest) = head.strip_prefix("<?xml") {
        let prolog = &rest[..rest.find("?>").unwrap_or(rest.len())];
        if let Some(label) = attribute_value(prolog, "encoding") {
            if let Some(enc) = Encoding::for_label(label.as_bytes()) {
                return Some(enc);
            }
        }
    }

    let mut pos = 0;
    while let Some(found) = head[pos..].find("<meta") {
        let start = pos + found + "<meta".len();
        let end = head[start..].find('>').map_or(head.len(), |e| start + e);
        let tag = &head[start..end];

        if let Some(label) = attribute_value(tag, "charset") {
            if let Some(enc) = Encoding::for_label(label.as_bytes()) {
                return Some(enc);
            }
        }
        if tag.contains("http-equiv") {
            if let Some(content) = attribute_value(tag, "content") {
                if let Some(enc) = charset_from_content_type(content) {
                    return Some(enc);
                }
            }
        }
        pos = end;
    }
    None
}

/// Value of `name=...` inside a lowercased tag body. Handles single,
/// double and missing quotes.
fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(found) = tag[search..].find(name) {
        let idx = search + found;
        search = idx + name.len();
        // Must be a whole attribute name, not a suffix of another one.
        if idx > 0 && tag.as_bytes()[idx - 1].is_ascii_alphanumeric() {
            continue;
        }
        let rest = tag[search..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else { continue };
        let rest = rest.trim_start();
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let inner = &rest[1..];
                &inner[..inner.find(q).unwrap_or(inner.len())]
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || matches!(c, '/' | '"' | '\'' | ';'))
                    .unwrap_or(rest.len());
                &rest[..end]
            }
        };
        return Some(value.trim());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_charset() {
        assert_eq!(charset_from_content_type("text/html; charset=utf-8"), Some(encoding_rs::UTF_8));
        assert_eq!(charset_from_content_type("text/html; Charset=\"UTF-8\""), Some(encoding_rs::UTF_8));
        assert_eq!(charset_from_content_type("text/html;charset=gbk; x=y"), Some(encoding_rs::GBK));
        assert_eq!(charset_from_content_type("text/html"), None);
        assert_eq!(charset_from_content_type("text/html; charset=bogus"), None);
    }

    #[test]
    fn bom_detection() {
        let body = HttpResponseBody::new(b"\xef\xbb\xbf<html></html>".to_vec());
        assert_eq!(body.bom_encoding(), Some(encoding_rs::UTF_8));
        let body = HttpResponseBody::new(b"\xff\xfeh\x00".to_vec());
        assert_eq!(body.bom_encoding(), Some(encoding_rs::UTF_16LE));
        assert_eq!(HttpResponseBody::from("plain").bom_encoding(), None);
    }

    #[test]
    fn meta_charset_detection() {
        let body = HttpResponseBody::from(r#"<html><head><meta charset="gb2312"></head></html>"#);
        assert_eq!(body.declared_encoding(), Some(encoding_rs::GBK));

        let body = HttpResponseBody::from(
            r#"<html><head><META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=windows-1251"></head>"#,
        );
        assert_eq!(body.declared_encoding(), Some(encoding_rs::WINDOWS_1251));

        let body = HttpResponseBody::from(r#"<?xml version="1.0" encoding="ISO-8859-2"?><root/>"#);
        assert_eq!(body.declared_encoding(), Some(encoding_rs::ISO_8859_2));

        let body = HttpResponseBody::from("<html><title>no meta</title></html>");
        assert_eq!(body.declared_encoding(), None);
    }

    #[test]
    fn json_body() {
        let body = HttpResponseBody::from(r#"{"a": [1, 2]}"#);
        let v: serde_json::Value = body.json().unwrap();
        assert_eq!(v["a"][1], 2);
        assert!(HttpResponseBody::from("nope").json::<serde_json::Value>().is_err());
    }
}
