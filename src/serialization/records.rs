use serde::{Deserialize, Serialize};

use crate::config::SCHEMA_VERSION;
use crate::errors::SerializationError;

/// How a part's payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Raw bytes, stored untouched.
    Binary,
    /// UTF-8 text.
    Text,
    /// A JSON document.
    Json,
}

/// One file worth of a captured input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPart {
    pub name: String,
    pub format: FormatTag,
    /// File extension used on disk, without the dot.
    pub extension: String,
    pub payload: Vec<u8>,
}

impl SerializedPart {
    pub fn binary(name: impl Into<String>, extension: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format: FormatTag::Binary,
            extension: extension.into(),
            payload,
        }
    }

    pub fn text(name: impl Into<String>, extension: impl Into<String>, payload: String) -> Self {
        Self {
            name: name.into(),
            format: FormatTag::Text,
            extension: extension.into(),
            payload: payload.into_bytes(),
        }
    }

    /// Serializes `value` as pretty printed (or compact) JSON.
    pub fn json<T: Serialize>(name: impl Into<String>, value: &T, pretty: bool) -> Result<Self, serde_json::Error> {
        let payload = if pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(Self {
            name: name.into(),
            format: FormatTag::Json,
            extension: "json".to_string(),
            payload,
        })
    }
}

/// All parts captured for one input type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedInput {
    pub type_name: String,
    pub parts: Vec<SerializedPart>,
}

impl SerializedInput {
    /// Looks up a part, failing with `CorruptFixture` when it is absent.
    pub fn part(&self, name: &str) -> Result<&SerializedPart, SerializationError> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SerializationError::corrupt(self.type_name.as_str(), format!("missing part `{name}`")))
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8], SerializationError> {
        Ok(&self.part(name)?.payload)
    }

    pub fn text(&self, name: &str) -> Result<&str, SerializationError> {
        std::str::from_utf8(&self.part(name)?.payload)
            .map_err(|e| SerializationError::corrupt(self.location(name), e))
    }

    /// Parses a JSON part into `T`. Structural problems are reported as
    /// `CorruptFixture`.
    pub fn json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, SerializationError> {
        serde_json::from_slice(&self.part(name)?.payload).map_err(|e| SerializationError::corrupt(self.location(name), e))
    }

    pub(crate) fn location(&self, part: &str) -> String {
        format!("{}-{}", self.type_name, part)
    }
}

/// Ordered, versioned set of captured inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedInputSet {
    pub schema_version: u32,
    pub inputs: Vec<SerializedInput>,
}

impl SerializedInputSet {
    pub fn new(inputs: Vec<SerializedInput>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            inputs,
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&SerializedInput> {
        self.inputs.iter().find(|i| i.type_name == type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.type_name.as_str())
    }

    pub(crate) fn check_version(&self) -> Result<(), SerializationError> {
        check_schema_version(u64::from(self.schema_version))
    }
}

pub(crate) fn check_schema_version(found: u64) -> Result<(), SerializationError> {
    if found != u64::from(SCHEMA_VERSION) {
        return Err(SerializationError::SchemaVersionMismatch {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}
