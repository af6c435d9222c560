//! Error taxonomy.
//!
//! Every layer has its own error enum so a failing fixture can be triaged
//! by looking at the variant alone:
//!
//! - [`ResolveError`]: the registry could not build a page object.
//! - [`ExtractionError`]: the page object's own extraction logic failed.
//! - [`HttpError`]: a follow-up request issued through the
//!   [`HttpClient`](crate::page_inputs::HttpClient) failed, including
//!   replay misses.
//! - [`SerializationError`]: inputs could not be captured or restored.
//! - [`ConfigError`]: a configuration builder rejected its values.
//!
//! The harness wraps these in [`HarnessError`](crate::testing::HarnessError)
//! together with the fixture path.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no provider for `{type_name}` (required by {required_by})")]
    UnresolvableCapability {
        type_name: &'static str,
        required_by: &'static str,
    },

    #[error("cyclic dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<&'static str> },

    #[error("`{page}` asked for `{type_name}` which it does not declare")]
    UndeclaredDependency {
        page: &'static str,
        type_name: &'static str,
    },

    #[error("provider for `{type_name}` failed: {source}")]
    ProviderFailed {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("value registered for `{type_name}` has a different concrete type")]
    TypeMismatch { type_name: &'static str },

    #[error("`{type_name}` is already registered")]
    DuplicateProvider { type_name: &'static str },

    #[error("resolution cancelled")]
    Cancelled,
}

/// Failure raised by extraction code.
///
/// Kept apart from [`ResolveError`] and [`SerializationError`] so that a
/// broken fixture is never mistaken for broken extraction logic.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The page did not have the structure the page object expects.
    #[error("{0}")]
    Structure(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{name}`: {source}")]
    Field {
        name: String,
        #[source]
        source: Box<ExtractionError>,
    },

    #[error("item does not match its schema: {0}")]
    ItemSchema(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl ExtractionError {
    pub fn structure(message: impl Into<String>) -> Self {
        ExtractionError::Structure(message.into())
    }

    /// Short, stable name of the variant. Stored in expected-exception
    /// fixtures.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::Structure(_) => "Structure",
            ExtractionError::MissingField(_) => "MissingField",
            ExtractionError::Field { .. } => "Field",
            ExtractionError::ItemSchema(_) => "ItemSchema",
            ExtractionError::Http(e) => e.kind(),
        }
    }

    /// The replay miss behind this error, looking through `Field` wrappers.
    /// A replay miss means the fixture lacks a recording, not that
    /// extraction is wrong.
    pub fn replay_miss(&self) -> Option<&HttpError> {
        match self {
            ExtractionError::Http(e @ HttpError::UnsupportedReplayInteraction { .. }) => Some(e),
            ExtractionError::Field { source, .. } => source.replay_miss(),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{method} {url} returned status {status}")]
    ResponseStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("no recorded interaction for {method} {url}: {reason}")]
    UnsupportedReplayInteraction {
        method: String,
        url: String,
        reason: String,
    },
}

impl HttpError {
    pub fn kind(&self) -> &'static str {
        match self {
            HttpError::Transport { .. } => "HttpTransport",
            HttpError::ResponseStatus { .. } => "HttpResponseStatus",
            HttpError::UnsupportedReplayInteraction { .. } => "UnsupportedReplayInteraction",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("no codec registered for input type `{0}`")]
    UnsupportedInputType(String),

    #[error("`{type_name}` cannot be captured: {reason}")]
    NonCapturable { type_name: String, reason: String },

    #[error("corrupt fixture data in {location}: {reason}")]
    CorruptFixture { location: String, reason: String },

    #[error("schema version {found} is not supported (expected {supported})")]
    SchemaVersionMismatch { found: u64, supported: u32 },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SerializationError {
    pub(crate) fn corrupt(location: impl Into<String>, reason: impl ToString) -> Self {
        SerializationError::CorruptFixture {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SerializationError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("file name `{0}` must be a plain, non-empty file name")]
    InvalidFileName(String),

    #[error("file extension `{0}` must be non-empty and must not contain dots or separators")]
    InvalidExtension(String),

    #[error("`{0}` is used for more than one fixture file")]
    DuplicateFileName(String),
}

/// Crate level error, for callers that do not care which layer failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Harness(#[from] crate::testing::HarnessError),
}
