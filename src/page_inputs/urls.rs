use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Deref;
use url::Url;

/// URL of the request that triggered the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestUrl(Url);

/// Final URL of the response, after redirects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseUrl(Url);

macro_rules! url_newtype {
    ($ty:ident) => {
        impl $ty {
            pub fn new(url: Url) -> Self {
                Self(url)
            }

            pub fn parse(s: &str) -> Result<Self, url::ParseError> {
                Url::parse(s).map(Self)
            }

            pub fn as_url(&self) -> &Url {
                &self.0
            }

            pub fn into_url(self) -> Url {
                self.0
            }

            /// Resolves `other` against this URL.
            pub fn join(&self, other: &str) -> Result<Url, url::ParseError> {
                self.0.join(other)
            }
        }

        impl Deref for $ty {
            type Target = Url;

            fn deref(&self) -> &Url {
                &self.0
            }
        }

        impl From<Url> for $ty {
            fn from(url: Url) -> Self {
                Self(url)
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

url_newtype!(RequestUrl);
url_newtype!(ResponseUrl);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_display() {
        let u = ResponseUrl::parse("https://example.com/a/b?q=1").unwrap();
        assert_eq!(u.join("../c").unwrap().as_str(), "https://example.com/c");
        assert_eq!(u.to_string(), "https://example.com/a/b?q=1");
        assert_eq!(u.host_str(), Some("example.com"));
    }

    #[test]
    fn serializes_as_string() {
        let u = RequestUrl::parse("https://example.com/").unwrap();
        assert_eq!(serde_json::to_string(&u).unwrap(), r#""https://example.com/""#);
        let back: RequestUrl = serde_json::from_str(r#""https://example.com/""#).unwrap();
        assert_eq!(back, u);
    }
}
