//! Ordered, case-insensitive HTTP header multimap.
//!
//! Unlike [`http::HeaderMap`], [`HttpHeaders`] keeps the original casing
//! of every header name and the exact order in which entries were added,
//! which is what a byte-exact fixture round trip needs. Lookups ignore
//! ASCII case.
use encoding_rs::Encoding;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::body::charset_from_content_type;

/// A `{"name": ..., "value": ...}` pair, as found in HAR files and
/// similar exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

/// Header multimap. Serializes as a list of `[name, value]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn from_name_value_pairs(pairs: &[NameValue]) -> Self {
        Self::from_pairs(pairs.iter().map(|p| (p.name.clone(), p.value.clone())))
    }

    /// Builds headers from raw byte names and (possibly repeated) byte
    /// values, decoding both with `encoding`.
    ///
    /// Every value in a list becomes its own entry, in order.
    pub fn from_raw<I>(raw: I, encoding: &'static Encoding) -> Self
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<Vec<u8>>)>,
    {
        let mut headers = Self::new();
        for (name, values) in raw {
            let (name, _, _) = encoding.decode(&name);
            for value in values {
                let (value, _, _) = encoding.decode(&value);
                headers.append(name.as_ref(), value.as_ref());
            }
        }
        headers
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Charset named by the `Content-Type` header, if any.
    pub fn declared_encoding(&self) -> Option<&'static Encoding> {
        self.get("Content-Type").and_then(charset_from_content_type)
    }

    /// Converts into an [`http::HeaderMap`]. Casing of names is lost.
    pub fn to_header_map(&self) -> Result<HeaderMap, http::Error> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            let name = HeaderName::from_bytes(k.as_bytes())?;
            let value = HeaderValue::from_str(v)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl From<&HeaderMap> for HttpHeaders {
    fn from(map: &HeaderMap) -> Self {
        // Values that are not visible ASCII are decoded lossily.
        Self::from_pairs(map.iter().map(|(k, v)| {
            let value = match v.to_str() {
                Ok(s) => s.to_string(),
                Err(_) => String::from_utf8_lossy(v.as_bytes()).into_owned(),
            };
            (k.as_str().to_string(), value)
        }))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
