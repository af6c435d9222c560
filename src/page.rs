//! Page object contracts.
//!
//! A page object is a plain struct holding `Arc`s to its inputs. It
//! implements [`Injectable`] so the registry can build it, and
//! [`ItemPage`] to extract an item. Construction never does I/O or
//! extraction; all the work happens in [`ItemPage::to_item`].
//!
//! ```rust
//! use std::sync::Arc;
//! use pageobject::errors::{ExtractionError, ResolveError};
//! use pageobject::page::{Injectable, ItemPage};
//! use pageobject::page_inputs::HttpResponse;
//! use pageobject::registry::{Capability, Dependency, InputSet, Resolved};
//!
//! struct TitlePage {
//!     response: Arc<HttpResponse>,
//! }
//!
//! impl Capability for TitlePage {
//!     const NAME: &'static str = "TitlePage";
//! }
//!
//! impl Injectable for TitlePage {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::input::<HttpResponse>("response")]
//!     }
//!     fn build(r: &Resolved) -> Result<Self, ResolveError> {
//!         Ok(Self { response: r.get()? })
//!     }
//!     fn inputs(&self) -> InputSet {
//!         InputSet::new().with(&self.response)
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl ItemPage for TitlePage {
//!     type Item = String;
//!     async fn to_item(&self) -> Result<String, ExtractionError> {
//!         let text = self.response.text();
//!         let start = text.find("<title>").ok_or_else(|| ExtractionError::structure("no <title>"))?;
//!         let rest = &text[start + "<title>".len()..];
//!         let end = rest.find("</title>").ok_or_else(|| ExtractionError::structure("unclosed <title>"))?;
//!         Ok(rest[..end].to_string())
//!     }
//! }
//! ```

mod fields;

pub use fields::{item_from_fields, item_from_fields_sync, FieldCache, Fields, ItemFieldFilter, SyncFields};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use url::Url;

use crate::errors::{ExtractionError, ResolveError};
use crate::page_inputs::HttpResponse;
use crate::registry::{Capability, Dependency, InputSet, Resolved};

/// A type the registry can construct from declared dependencies.
pub trait Injectable: Capability + Sized {
    /// Declared inputs, in constructor order.
    fn dependencies() -> Vec<Dependency>;

    /// Builds the value from its resolved dependencies. Must not do I/O.
    fn build(resolved: &Resolved) -> Result<Self, ResolveError>;

    /// The inputs this instance holds, for capture.
    fn inputs(&self) -> InputSet;
}

/// A page object that extracts one item.
#[async_trait]
pub trait ItemPage: Injectable {
    type Item: Serialize + DeserializeOwned + Send + Sync;

    async fn to_item(&self) -> Result<Self::Item, ExtractionError>;
}

/// Base page for HTML responses, with a few helpers derived from the
/// response. Embed it as a nested page (`Dependency::page::<WebPage>`).
pub struct WebPage {
    response: Arc<HttpResponse>,
    base_url: OnceLock<Url>,
}

impl WebPage {
    pub fn new(response: Arc<HttpResponse>) -> Self {
        Self {
            response,
            base_url: OnceLock::new(),
        }
    }

    pub fn response(&self) -> &Arc<HttpResponse> {
        &self.response
    }

    pub fn url(&self) -> &Url {
        self.response.url()
    }

    pub fn html(&self) -> &str {
        self.response.text()
    }

    /// Base URL for relative links: the document's `<base href>` when
    /// present and valid, the response URL otherwise.
    pub fn base_url(&self) -> &Url {
        self.base_url.get_or_init(|| {
            base_href(self.html())
                .and_then(|href| self.url().join(href).ok())
                .unwrap_or_else(|| self.url().clone())
        })
    }

    pub fn urljoin(&self, other: &str) -> Result<Url, url::ParseError> {
        self.base_url().join(other)
    }
}

impl Capability for WebPage {
    const NAME: &'static str = "WebPage";
}

impl Injectable for WebPage {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::input::<HttpResponse>("response")]
    }

    fn build(resolved: &Resolved) -> Result<Self, ResolveError> {
        Ok(Self::new(resolved.get()?))
    }

    fn inputs(&self) -> InputSet {
        InputSet::new().with(&self.response)
    }
}

fn base_href(html: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets, so positions map back to `html`.
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<base")? + "<base".len();
    let end = lower[start..].find('>').map_or(lower.len(), |e| start + e);
    let attr = start + lower[start..end].find("href")? + "href".len();

    let rest = html[attr..end].trim_start().strip_prefix('=')?.trim_start();
    let value = match rest.chars().next()? {
        q @ ('"' | '\'') => {
            let inner = &rest[1..];
            &inner[..inner.find(q)?]
        }
        _ => &rest[..rest.find(char::is_whitespace).unwrap_or(rest.len())],
    };
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_inputs::HttpHeaders;

    fn page(body: &str) -> WebPage {
        let url = Url::parse("https://example.com/dir/page.html").unwrap();
        let response = HttpResponse::new(url, body)
            .with_status(200)
            .with_headers(HttpHeaders::from_pairs([("Content-Type", "text/html; charset=utf-8")]));
        WebPage::new(Arc::new(response))
    }

    #[test]
    fn urljoin_uses_response_url() {
        let p = page("<html><a href='x'>x</a></html>");
        assert_eq!(p.urljoin("other.html").unwrap().as_str(), "https://example.com/dir/other.html");
        assert_eq!(p.base_url(), p.url());
    }

    #[test]
    fn urljoin_honours_base_href() {
        let p = page(r#"<html><head><BASE HREF="https://cdn.example.org/Assets/"></head></html>"#);
        assert_eq!(p.base_url().as_str(), "https://cdn.example.org/Assets/");
        assert_eq!(p.urljoin("a.png").unwrap().as_str(), "https://cdn.example.org/Assets/a.png");

        let p = page("<base href=/root/><p>");
        assert_eq!(p.urljoin("x").unwrap().as_str(), "https://example.com/root/x");
    }

    #[test]
    fn html_is_decoded_text() {
        let p = page("<p>caf\u{e9}</p>");
        assert_eq!(p.html(), "<p>caf\u{e9}</p>");
        assert_eq!(p.inputs().len(), 1);
    }
}
