//! Fixture based regression tests for page objects.
//!
//! A fixture is a directory with the captured inputs of one extraction and
//! its expected result (see [`serialization::store`](crate::serialization::store)
//! for the layout). Working with fixtures is split in two phases:
//!
//! 1. [`discover`] lists fixture directories. It only looks at the file
//!    tree.
//! 2. [`Harness::run_fixture`] loads one fixture, rebuilds the page object
//!    from the restored inputs, runs extraction and compares the item (or
//!    the error) with what was stored.
//!
//! A test runner integration is a thin loop over both, and
//! [`assert_fixtures`] is exactly that loop for a single `#[test]`.
//!
//! New fixtures are made from live page objects with [`save_fixture`]. A
//! fixture without expected output is completed on its first run unless
//! the [`RecordMode`](crate::config::RecordMode) says otherwise.

mod diff;
mod discovery;
mod fixture;
mod runner;

pub use diff::{diff_values, DiffKind, FieldDiff};
pub use discovery::{discover, FixtureDescriptor};
pub use fixture::{save_fixture, write_expected, Expected, ExpectedError, Fixture};
pub use runner::{assert_fixtures, Failure, FixtureReport, Harness, Outcome, PageCatalog, SuiteReport};

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{ExtractionError, ResolveError, SerializationError};

/// Lifecycle of one fixture run. `Passed`, `Failed`, `Errored` and
/// `Recorded` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureState {
    Discovered,
    Loaded,
    Executed,
    Passed,
    Failed,
    Errored,
    Recorded,
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureState::Discovered => "discovered",
            FixtureState::Loaded => "loaded",
            FixtureState::Executed => "executed",
            FixtureState::Passed => "passed",
            FixtureState::Failed => "failed",
            FixtureState::Errored => "errored",
            FixtureState::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

/// A fixture that could not be run to a comparison.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Collection error: no page object of that type is known.
    #[error("{}: unknown page type `{page_type}`", .path.display())]
    UnknownPageType { path: PathBuf, page_type: String },

    #[error("{}: cannot load fixture: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: SerializationError,
    },

    #[error("{}: cannot build page object: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: ResolveError,
    },

    #[error("{}: no expected output and recording is disabled", .path.display())]
    MissingExpectation { path: PathBuf },

    /// Extraction asked for an HTTP interaction the fixture did not capture.
    /// Never recorded as expected output.
    #[error("{}: incomplete fixture: {source}", .path.display())]
    UnsupportedReplayInteraction {
        path: PathBuf,
        #[source]
        source: ExtractionError,
    },

    #[error("{}: cannot record expected output: {source}", .path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: SerializationError,
    },
}

impl HarnessError {
    pub(crate) fn load(path: &Path, source: SerializationError) -> Self {
        HarnessError::Load {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            HarnessError::UnknownPageType { path, .. }
            | HarnessError::Load { path, .. }
            | HarnessError::Resolve { path, .. }
            | HarnessError::MissingExpectation { path }
            | HarnessError::UnsupportedReplayInteraction { path, .. }
            | HarnessError::Record { path, .. } => path,
        }
    }

    /// `true` for problems found while collecting fixtures, as opposed to
    /// running them.
    pub fn is_collection_error(&self) -> bool {
        matches!(self, HarnessError::UnknownPageType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_the_fixture_path() {
        let err = HarnessError::UnknownPageType {
            path: PathBuf::from("fixtures/Gone/x"),
            page_type: "Gone".into(),
        };
        assert!(err.is_collection_error());
        assert_eq!(err.path(), Path::new("fixtures/Gone/x"));
        assert_eq!(err.to_string(), "fixtures/Gone/x: unknown page type `Gone`");

        let err = HarnessError::load(
            Path::new("fixtures/P/y"),
            SerializationError::SchemaVersionMismatch { found: 9, supported: 1 },
        );
        assert!(!err.is_collection_error());
        assert!(err.to_string().contains("schema version 9"));
    }
}
