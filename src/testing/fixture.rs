use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::discovery::FixtureDescriptor;
use crate::config::{validate_file_name, CaptureConfig, HarnessConfig};
use crate::errors::{Error, ExtractionError, SerializationError};
use crate::page::ItemPage;
use crate::serialization::store::{self, read_json_opt, write_json, FixtureMeta};
use crate::serialization::{self, CodecRegistry, SerializedInputSet};

/// Contents of `exception.json`: the extraction error a fixture expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedError {
    /// [`ExtractionError::kind`] of the error.
    pub kind: String,
    pub message: String,
}

impl From<&ExtractionError> for ExpectedError {
    fn from(err: &ExtractionError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// What running the page object against a fixture should produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Item(Value),
    Error(ExpectedError),
}

impl Expected {
    pub fn from_result(result: &Result<Value, ExtractionError>) -> Self {
        match result {
            Ok(item) => Expected::Item(item.clone()),
            Err(e) => Expected::Error(e.into()),
        }
    }
}

/// A fixture read from disk.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub descriptor: FixtureDescriptor,
    pub meta: FixtureMeta,
    pub inputs: SerializedInputSet,
    /// `None` when neither output nor exception file exists.
    pub expected: Option<Expected>,
}

impl Fixture {
    pub fn load(descriptor: &FixtureDescriptor, config: &HarnessConfig) -> Result<Self, SerializationError> {
        let meta = store::read_meta(&descriptor.path, config)?;
        Self::from_meta(descriptor.clone(), meta, config)
    }

    /// Finishes loading a fixture whose meta file was already read.
    pub fn from_meta(descriptor: FixtureDescriptor, meta: FixtureMeta, config: &HarnessConfig) -> Result<Self, SerializationError> {
        let inputs = store::read_inputs(&descriptor.path, &meta, config)?;
        let expected = read_expected(&descriptor.path, config)?;
        Ok(Self {
            descriptor,
            meta,
            inputs,
            expected,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.descriptor.path
    }
}

fn read_expected(dir: &Path, config: &HarnessConfig) -> Result<Option<Expected>, SerializationError> {
    let output: Option<Value> = read_json_opt(&dir.join(&config.output_file))?;
    let exception: Option<ExpectedError> = read_json_opt(&dir.join(&config.exception_file))?;
    match (output, exception) {
        (Some(_), Some(_)) => Err(SerializationError::corrupt(
            dir.display().to_string(),
            format!("both {} and {} are present", config.output_file, config.exception_file),
        )),
        (Some(item), None) => Ok(Some(Expected::Item(item))),
        (None, Some(err)) => Ok(Some(Expected::Error(err))),
        (None, None) => Ok(None),
    }
}

/// Writes the expected output (or expected error) of the fixture in `dir`,
/// removing the file of the other kind.
pub fn write_expected(dir: &Path, expected: &Expected, config: &HarnessConfig) -> Result<(), SerializationError> {
    let (write, stale) = match expected {
        Expected::Item(_) => (&config.output_file, &config.exception_file),
        Expected::Error(_) => (&config.exception_file, &config.output_file),
    };
    let path = dir.join(write);
    match expected {
        Expected::Item(item) => write_json(&path, item)?,
        Expected::Error(err) => write_json(&path, err)?,
    }
    let stale = dir.join(stale);
    if stale.exists() {
        fs::remove_file(&stale).map_err(|e| SerializationError::io(&stale, e))?;
    }
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Runs extraction and turns the item into JSON.
pub(crate) async fn extract<P: ItemPage>(page: &P) -> Result<Value, ExtractionError> {
    let item = page.to_item().await?;
    Ok(serde_json::to_value(item)?)
}

/// Records a fixture from a live page object under
/// `<root>/<P::NAME>/<name>` and returns its directory.
///
/// Extraction runs before capture so the interactions of an
/// [`HttpClient`](crate::page_inputs::HttpClient) input are part of the
/// fixture. A failing extraction is stored as an expected error, except
/// for a replay miss, which is returned as an error and saves nothing.
pub async fn save_fixture<P: ItemPage>(
    page: &P,
    root: &Path,
    name: &str,
    codecs: &CodecRegistry,
    capture: &CaptureConfig,
    config: &HarnessConfig,
) -> Result<PathBuf, Error> {
    validate_file_name(name)?;
    let result = match extract(page).await {
        Err(err) if err.replay_miss().is_some() => return Err(err.into()),
        other => other,
    };
    let expected = Expected::from_result(&result);
    let set = serialization::capture(page, codecs, capture)?;

    let dir = root.join(P::NAME).join(name);
    let inputs_dir = dir.join(&config.inputs_dir);
    if inputs_dir.exists() {
        fs::remove_dir_all(&inputs_dir).map_err(|e| SerializationError::io(&inputs_dir, e))?;
    }
    store::write_inputs(&dir, P::NAME, &set, config)?;
    write_expected(&dir, &expected, config)?;
    log::info!("Saved fixture {}/{}", P::NAME, name);
    Ok(dir)
}
