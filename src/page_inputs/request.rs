use http::Method;
use sha1::{Digest, Sha1};
use url::Url;

use super::body::HttpRequestBody;
use super::headers::HttpHeaders;

/// Description of an HTTP request.
///
/// Used both as the request that produced the current page and as the
/// argument of [`HttpClient`](super::HttpClient) follow-up requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    url: Url,
    method: Method,
    headers: HttpHeaders,
    body: HttpRequestBody,
}

impl HttpRequest {
    /// A `GET` request without headers or body.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: impl Into<HttpRequestBody>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HttpHeaders::new(),
            body: HttpRequestBody::default(),
        }
    }

    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<HttpRequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &HttpRequestBody {
        &self.body
    }

    /// Resolves `other` against the request URL.
    pub fn urljoin(&self, other: &str) -> Result<Url, url::ParseError> {
        self.url.join(other)
    }

    /// Stable SHA-1 hex digest identifying this request.
    ///
    /// Two requests that differ only in query argument order, URL fragment
    /// or header insertion order share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(canonicalize_url(&self.url).as_bytes());
        hasher.update(b"\n");

        let mut headers: Vec<_> = self.headers.iter().collect();
        headers.sort();
        for (name, value) in headers {
            hasher.update(format!("{}:{}\n", title_case(name), value).as_bytes());
        }
        hasher.update(b"\n");
        hasher.update(self.body.as_bytes());

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// URL with the fragment dropped and query arguments sorted.
pub fn canonicalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }
    url.to_string()
}

// "content-TYPE" -> "Content-Type"
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_alphabetic() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            out.push(c);
            upper_next = true;
        }
    }
    out
}
