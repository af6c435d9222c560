//! Fixture directories on disk.
//!
//! ```text
//! <fixture>/
//!     meta.json                      FixtureMeta
//!     inputs/<Type>-<part>.<ext>     one file per captured part
//!     output.json                    expected item (optional)
//!     exception.json                 expected extraction error (optional)
//! ```
//!
//! Every JSON file is written pretty printed so fixtures diff nicely.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

use super::records::{check_schema_version, FormatTag, SerializedInput, SerializedInputSet, SerializedPart};
use crate::config::HarnessConfig;
use crate::errors::SerializationError;

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureMeta {
    pub page_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub crate_version: String,
    pub schema_version: u32,
    pub inputs: Vec<InputManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputManifest {
    pub type_name: String,
    pub parts: Vec<PartManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartManifest {
    pub name: String,
    pub format: FormatTag,
    /// File name inside the inputs directory.
    pub file: String,
}

fn part_file_name(type_name: &str, part: &SerializedPart) -> String {
    format!("{}-{}.{}", type_name, part.name, part.extension)
}

/// Writes the inputs and `meta.json` of a fixture into `dir`, creating it
/// if needed.
pub fn write_inputs(
    dir: &Path,
    page_type: &str,
    set: &SerializedInputSet,
    config: &HarnessConfig,
) -> Result<FixtureMeta, SerializationError> {
    let inputs_dir = dir.join(&config.inputs_dir);
    fs::create_dir_all(&inputs_dir).map_err(|e| SerializationError::io(&inputs_dir, e))?;

    let mut manifest = Vec::with_capacity(set.inputs.len());
    for input in &set.inputs {
        let mut parts = Vec::with_capacity(input.parts.len());
        for part in &input.parts {
            let file = part_file_name(&input.type_name, part);
            let path = inputs_dir.join(&file);
            fs::write(&path, &part.payload).map_err(|e| SerializationError::io(&path, e))?;
            parts.push(PartManifest {
                name: part.name.clone(),
                format: part.format,
                file,
            });
        }
        manifest.push(InputManifest {
            type_name: input.type_name.clone(),
            parts,
        });
    }

    let meta = FixtureMeta {
        page_type: page_type.to_string(),
        captured_at: OffsetDateTime::now_utc(),
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: set.schema_version,
        inputs: manifest,
    };
    write_json(&dir.join(&config.meta_file), &meta)?;
    log::debug!("Wrote {} inputs for {} to {}", set.inputs.len(), page_type, dir.display());
    Ok(meta)
}

/// Reads `meta.json`. The schema version is checked before anything else
/// is interpreted.
pub fn read_meta(dir: &Path, config: &HarnessConfig) -> Result<FixtureMeta, SerializationError> {
    let path = dir.join(&config.meta_file);
    let raw: serde_json::Value = read_json(&path)?;
    let version = raw
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| SerializationError::corrupt(path.display().to_string(), "missing schema_version"))?;
    check_schema_version(version)?;
    serde_json::from_value(raw).map_err(|e| SerializationError::corrupt(path.display().to_string(), e))
}

/// Loads the parts listed in `meta` back into memory.
pub fn read_inputs(dir: &Path, meta: &FixtureMeta, config: &HarnessConfig) -> Result<SerializedInputSet, SerializationError> {
    let inputs_dir = dir.join(&config.inputs_dir);
    let mut inputs = Vec::with_capacity(meta.inputs.len());
    for manifest in &meta.inputs {
        let mut parts = Vec::with_capacity(manifest.parts.len());
        for part in &manifest.parts {
            if part.file.contains(['/', '\\']) || part.file.starts_with('.') {
                return Err(SerializationError::corrupt(&part.file, "input file must be a plain file name"));
            }
            let path = inputs_dir.join(&part.file);
            let payload = fs::read(&path).map_err(|e| SerializationError::io(&path, e))?;
            if part.format == FormatTag::Text && std::str::from_utf8(&payload).is_err() {
                return Err(SerializationError::corrupt(&part.file, "text part is not valid UTF-8"));
            }
            let extension = Path::new(&part.file)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            parts.push(SerializedPart {
                name: part.name.clone(),
                format: part.format,
                extension,
                payload,
            });
        }
        inputs.push(SerializedInput {
            type_name: manifest.type_name.clone(),
            parts,
        });
    }
    Ok(SerializedInputSet {
        schema_version: meta.schema_version,
        inputs,
    })
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SerializationError> {
    let mut contents =
        serde_json::to_string_pretty(value).map_err(|e| SerializationError::corrupt(path.display().to_string(), e))?;
    contents.push('\n');
    fs::write(path, contents).map_err(|e| SerializationError::io(path, e))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SerializationError> {
    let contents = fs::read(path).map_err(|e| SerializationError::io(path, e))?;
    serde_json::from_slice(&contents).map_err(|e| SerializationError::corrupt(path.display().to_string(), e))
}

/// Like [`read_json`], but a missing file is `None`.
pub(crate) fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SerializationError> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}
