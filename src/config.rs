//! Configuration for the registry, the capture layer and the fixture harness.
//!
//! All three configs have sensible defaults via [`Default`] and a fluent
//! builder that validates on `build()`.
//!
//! # Examples
//!
//! ```rust
//! use pageobject::config::{ClientCaptureMode, CaptureConfig, HarnessConfig, RecordMode};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let capture = CaptureConfig::builder()
//!     .client_mode(ClientCaptureMode::Reject)
//!     .body_extension("json")
//!     .build()?;
//!
//! let harness = HarnessConfig::builder()
//!     .record_mode(RecordMode::Never)
//!     .ignore_field("scraped_at")
//!     .build()?;
//! # Ok(()) }
//! ```

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Version of the on-disk fixture format written by this crate.
///
/// Fixtures carrying any other version are rejected instead of being parsed.
pub const SCHEMA_VERSION: u32 = 1;

/// What happens when the same type is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The last registration wins.
    #[default]
    Replace,
    /// The second registration fails with
    /// [`ResolveError::DuplicateProvider`](crate::errors::ResolveError::DuplicateProvider).
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub duplicate_policy: DuplicatePolicy,
}

/// How an [`HttpClient`](crate::page_inputs::HttpClient) input is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCaptureMode {
    /// Store the request/response pairs the client saw, so they can be
    /// replayed in order.
    #[default]
    Record,
    /// Refuse to capture pages that depend on a client.
    Reject,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub client_mode: ClientCaptureMode,
    /// Extension used for captured response bodies (default: `html`).
    pub body_extension: String,
    /// Pretty print JSON files so fixtures diff nicely in code review.
    pub pretty_json: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            client_mode: ClientCaptureMode::Record,
            body_extension: "html".to_string(),
            pretty_json: true,
        }
    }
}

impl CaptureConfig {
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureConfigBuilder {
    inner: CaptureConfig,
}

impl CaptureConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut CaptureConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn client_mode(self, mode: ClientCaptureMode) -> Self { self.map(|c| c.client_mode = mode) }
    pub fn body_extension<S: Into<String>>(self, ext: S) -> Self { self.map(|c| c.body_extension = ext.into()) }
    pub fn pretty_json(self, on: bool) -> Self { self.map(|c| c.pretty_json = on) }

    pub fn build(self) -> Result<CaptureConfig, ConfigError> {
        validate_extension(&self.inner.body_extension)?;
        Ok(self.inner)
    }
}

/// What the harness does with a fixture that has no expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    /// A missing expected output is an error.
    Never,
    /// Run the extraction and write the expected output when it is missing.
    #[default]
    MissingOnly,
    /// Always run the extraction and overwrite the expected output.
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub record_mode: RecordMode,
    pub meta_file: String,
    pub inputs_dir: String,
    pub output_file: String,
    pub exception_file: String,
    /// Top level item fields left out of the comparison (volatile values
    /// such as timestamps).
    pub ignored_fields: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            record_mode: RecordMode::MissingOnly,
            meta_file: "meta.json".to_string(),
            inputs_dir: "inputs".to_string(),
            output_file: "output.json".to_string(),
            exception_file: "exception.json".to_string(),
            ignored_fields: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HarnessConfigBuilder {
    inner: HarnessConfig,
}

impl HarnessConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut HarnessConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn record_mode(self, mode: RecordMode) -> Self { self.map(|c| c.record_mode = mode) }
    pub fn meta_file<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.meta_file = name.into()) }
    pub fn inputs_dir<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.inputs_dir = name.into()) }
    pub fn output_file<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.output_file = name.into()) }
    pub fn exception_file<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.exception_file = name.into()) }
    pub fn ignore_field<S: Into<String>>(self, field: S) -> Self { self.map(|c| c.ignored_fields.push(field.into())) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut HarnessConfig)) -> Self { self.map(f) }

    pub fn build(self) -> Result<HarnessConfig, ConfigError> {
        let c = &self.inner;
        let names = [&c.meta_file, &c.inputs_dir, &c.output_file, &c.exception_file];
        for (i, name) in names.iter().enumerate() {
            validate_file_name(name)?;
            if names[..i].contains(name) {
                return Err(ConfigError::DuplicateFileName(name.to_string()));
            }
        }
        Ok(self.inner)
    }
}

// ---------- Validation ----------

pub(crate) fn validate_file_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn validate_extension(ext: &str) -> Result<(), ConfigError> {
    if ext.is_empty() || ext.contains(['.', '/', '\\']) {
        return Err(ConfigError::InvalidExtension(ext.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = HarnessConfig::default();
        assert_eq!(c.record_mode, RecordMode::MissingOnly);
        assert_eq!(c.output_file, "output.json");

        let c = CaptureConfig::default();
        assert_eq!(c.client_mode, ClientCaptureMode::Record);
        assert_eq!(c.body_extension, "html");

        assert_eq!(RegistryConfig::default().duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    fn capture_builder_rejects_bad_extension() {
        let err = CaptureConfig::builder().body_extension(".html").build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidExtension(".html".into()));
        assert!(CaptureConfig::builder().body_extension("").build().is_err());
        assert!(CaptureConfig::builder().body_extension("bin").build().is_ok());
    }

    #[test]
    fn harness_builder_rejects_paths_and_duplicates() {
        let err = HarnessConfig::builder().output_file("a/b.json").build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidFileName("a/b.json".into()));

        let err = HarnessConfig::builder().output_file("meta.json").build().unwrap_err();
        assert_eq!(err, ConfigError::DuplicateFileName("meta.json".into()));
    }

    #[test]
    fn harness_builder_collects_ignored_fields() {
        let c = HarnessConfig::builder()
            .ignore_field("a")
            .ignore_field("b")
            .record_mode(RecordMode::Overwrite)
            .build()
            .unwrap();
        assert_eq!(c.ignored_fields, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(c.record_mode, RecordMode::Overwrite);
    }
}
