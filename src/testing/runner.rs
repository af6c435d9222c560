use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::diff::{diff_values, FieldDiff};
use super::discovery::{discover, FixtureDescriptor};
use super::fixture::{extract, write_expected, Expected, ExpectedError, Fixture};
use super::{FixtureState, HarnessError};
use crate::config::{HarnessConfig, RecordMode};
use crate::errors::{ExtractionError, ResolveError, SerializationError};
use crate::page::ItemPage;
use crate::registry::{InputSet, Registry, ResolutionContext};
use crate::serialization::{self, store, CodecRegistry};

type RunFn = fn(Arc<Registry>, InputSet) -> BoxFuture<'static, Result<Result<Value, ExtractionError>, ResolveError>>;

fn run_page<P: ItemPage>(
    registry: Arc<Registry>,
    inputs: InputSet,
) -> BoxFuture<'static, Result<Result<Value, ExtractionError>, ResolveError>> {
    Box::pin(async move {
        let ctx = ResolutionContext::replay(registry, inputs);
        let page = ctx.resolve::<P>().await?;
        Ok(extract(&*page).await)
    })
}

/// The page object types a harness can run, by `Capability::NAME`.
#[derive(Clone, Default)]
pub struct PageCatalog {
    runners: HashMap<&'static str, RunFn>,
}

impl PageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ItemPage>(mut self) -> Self {
        self.runners.insert(P::NAME, run_page::<P>);
        self
    }

    pub fn contains(&self, page_type: &str) -> bool {
        self.runners.contains_key(page_type)
    }

    pub fn page_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.runners.keys().copied()
    }
}

impl fmt::Debug for PageCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.runners.keys()).finish()
    }
}

/// Why a fixture did not pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    ItemMismatch(Vec<FieldDiff>),
    /// An item was expected but extraction failed.
    UnexpectedError(ExpectedError),
    /// An error was expected but extraction produced an item.
    MissingError { expected: ExpectedError, item: Value },
    ErrorMismatch { expected: ExpectedError, actual: ExpectedError },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::ItemMismatch(diffs) => {
                write!(f, "{} field(s) differ", diffs.len())?;
                for diff in diffs {
                    write!(f, "\n    {diff}")?;
                }
                Ok(())
            }
            Failure::UnexpectedError(err) => write!(f, "extraction failed: {} ({})", err.message, err.kind),
            Failure::MissingError { expected, item } => {
                write!(f, "expected {} error `{}`, got item {}", expected.kind, expected.message, item)
            }
            Failure::ErrorMismatch { expected, actual } => write!(
                f,
                "expected {} error `{}`, got {} error `{}`",
                expected.kind, expected.message, actual.kind, actual.message
            ),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Passed,
    /// Record mode wrote the expected output instead of comparing.
    Recorded,
    Failed(Failure),
    Errored(HarnessError),
}

impl Outcome {
    pub fn state(&self) -> FixtureState {
        match self {
            Outcome::Passed => FixtureState::Passed,
            Outcome::Recorded => FixtureState::Recorded,
            Outcome::Failed(_) => FixtureState::Failed,
            Outcome::Errored(_) => FixtureState::Errored,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed | Outcome::Recorded)
    }
}

#[derive(Debug)]
pub struct FixtureReport {
    pub descriptor: FixtureDescriptor,
    pub outcome: Outcome,
}

impl fmt::Display for FixtureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Failed(failure) => write!(f, "{}: FAILED: {}", self.descriptor.id, failure),
            Outcome::Errored(err) => write!(f, "{}: ERROR: {}", self.descriptor.id, err),
            other => write!(f, "{}: {}", self.descriptor.id, other.state()),
        }
    }
}

/// Results of a whole fixture tree.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub reports: Vec<FixtureReport>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_success())
    }

    pub fn count(&self, state: FixtureState) -> usize {
        self.reports.iter().filter(|r| r.outcome.state() == state).count()
    }

    /// Fixtures that could not be collected (unknown page type), kept apart
    /// from execution failures.
    pub fn collection_errors(&self) -> impl Iterator<Item = &FixtureReport> {
        self.reports
            .iter()
            .filter(|r| matches!(&r.outcome, Outcome::Errored(e) if e.is_collection_error()))
    }

    pub fn problems(&self) -> impl Iterator<Item = &FixtureReport> {
        self.reports.iter().filter(|r| !r.outcome.is_success())
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in self.problems() {
            writeln!(f, "{report}")?;
        }
        write!(
            f,
            "{} passed, {} recorded, {} failed, {} errored",
            self.count(FixtureState::Passed),
            self.count(FixtureState::Recorded),
            self.count(FixtureState::Failed),
            self.count(FixtureState::Errored),
        )
    }
}

/// Replays fixtures against the page objects of a [`PageCatalog`].
///
/// Extraction is driven with `pollster`, so the harness works from plain
/// `#[test]` functions without an async runtime.
pub struct Harness {
    registry: Arc<Registry>,
    codecs: CodecRegistry,
    catalog: PageCatalog,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(catalog: PageCatalog) -> Self {
        Self {
            registry: Registry::empty(),
            codecs: CodecRegistry::new(),
            catalog,
            config: HarnessConfig::default(),
        }
    }

    /// Registry handed to the replay context. Replay disables every
    /// provider, so page objects are built from the fixture inputs alone.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn discover(&self, root: &Path) -> Result<Vec<FixtureDescriptor>, SerializationError> {
        discover(root, &self.config)
    }

    pub fn run_fixture(&self, descriptor: &FixtureDescriptor) -> FixtureReport {
        pollster::block_on(self.run_fixture_async(descriptor))
    }

    pub async fn run_fixture_async(&self, descriptor: &FixtureDescriptor) -> FixtureReport {
        let outcome = self.execute(descriptor).await.unwrap_or_else(Outcome::Errored);
        match &outcome {
            Outcome::Passed | Outcome::Recorded => log::debug!("{}: {}", descriptor.id, outcome.state()),
            Outcome::Failed(failure) => log::warn!("{}: {}", descriptor.id, failure),
            Outcome::Errored(err) => log::error!("{}", err),
        }
        FixtureReport {
            descriptor: descriptor.clone(),
            outcome,
        }
    }

    /// Runs every fixture below `root`. A failing fixture never stops the
    /// others.
    pub fn run_all(&self, root: &Path) -> Result<SuiteReport, SerializationError> {
        let descriptors = self.discover(root)?;
        log::info!("Running {} fixtures from {}", descriptors.len(), root.display());
        let reports = descriptors.iter().map(|d| self.run_fixture(d)).collect();
        Ok(SuiteReport { reports })
    }

    async fn execute(&self, descriptor: &FixtureDescriptor) -> Result<Outcome, HarnessError> {
        let path = &descriptor.path;
        trace(descriptor, FixtureState::Discovered);

        let meta = store::read_meta(path, &self.config).map_err(|e| HarnessError::load(path, e))?;
        let run = *self
            .catalog
            .runners
            .get(meta.page_type.as_str())
            .ok_or_else(|| HarnessError::UnknownPageType {
                path: path.clone(),
                page_type: meta.page_type.clone(),
            })?;
        let fixture = Fixture::from_meta(descriptor.clone(), meta, &self.config).map_err(|e| HarnessError::load(path, e))?;

        let record = match (&fixture.expected, self.config.record_mode) {
            (_, RecordMode::Overwrite) | (None, RecordMode::MissingOnly) => true,
            (None, RecordMode::Never) => return Err(HarnessError::MissingExpectation { path: path.clone() }),
            (Some(_), _) => false,
        };

        let inputs =
            serialization::restore_inputs(&self.codecs, &fixture.inputs).map_err(|e| HarnessError::load(path, e))?;
        trace(descriptor, FixtureState::Loaded);

        let actual = run(self.registry.clone(), inputs).await.map_err(|source| HarnessError::Resolve {
            path: path.clone(),
            source,
        })?;
        let actual = match actual {
            Err(source) if source.replay_miss().is_some() => {
                return Err(HarnessError::UnsupportedReplayInteraction {
                    path: path.clone(),
                    source,
                })
            }
            other => other,
        };
        trace(descriptor, FixtureState::Executed);

        if record {
            write_expected(fixture.dir(), &Expected::from_result(&actual), &self.config).map_err(|source| {
                HarnessError::Record {
                    path: path.clone(),
                    source,
                }
            })?;
            return Ok(Outcome::Recorded);
        }

        let failure = match fixture.expected {
            Some(expected) => compare(expected, actual, &self.config.ignored_fields),
            None => None,
        };
        Ok(failure.map_or(Outcome::Passed, Outcome::Failed))
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish()
    }
}

fn trace(descriptor: &FixtureDescriptor, state: FixtureState) {
    log::trace!("{}: {}", descriptor.id, state);
}

fn compare(expected: Expected, actual: Result<Value, ExtractionError>, ignored: &[String]) -> Option<Failure> {
    match (expected, actual) {
        (Expected::Item(expected), Ok(item)) => {
            let diffs = diff_values(&expected, &item, ignored);
            (!diffs.is_empty()).then_some(Failure::ItemMismatch(diffs))
        }
        (Expected::Item(_), Err(err)) => Some(Failure::UnexpectedError((&err).into())),
        (Expected::Error(expected), Ok(item)) => Some(Failure::MissingError { expected, item }),
        (Expected::Error(expected), Err(err)) => {
            let actual = ExpectedError::from(&err);
            (expected != actual).then_some(Failure::ErrorMismatch { expected, actual })
        }
    }
}

/// Runs every fixture below `root` and panics with a report when any of
/// them did not pass. Meant to be called from a `#[test]`.
pub fn assert_fixtures(harness: &Harness, root: &Path) {
    let report = match harness.run_all(root) {
        Ok(report) => report,
        Err(e) => panic!("cannot discover fixtures in {}: {e}", root.display()),
    };
    if !report.is_success() {
        panic!("fixture suite failed:\n{report}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::page::Injectable;
    use crate::page_inputs::HttpResponse;
    use crate::registry::{Capability, Dependency, Resolved};
    use crate::testing::save_fixture;
    use async_trait::async_trait;
    use std::fs;
    use url::Url;

    struct HeadingPage {
        response: Arc<HttpResponse>,
    }

    impl Capability for HeadingPage {
        const NAME: &'static str = "HeadingPage";
    }

    impl Injectable for HeadingPage {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::input::<HttpResponse>("response")]
        }
        fn build(r: &Resolved) -> Result<Self, ResolveError> {
            Ok(Self { response: r.get()? })
        }
        fn inputs(&self) -> InputSet {
            InputSet::new().with(&self.response)
        }
    }

    #[async_trait]
    impl ItemPage for HeadingPage {
        type Item = Value;
        async fn to_item(&self) -> Result<Value, ExtractionError> {
            let text = self.response.text();
            let start = text.find("<h1>").ok_or_else(|| ExtractionError::structure("no heading"))?;
            let rest = &text[start + 4..];
            let end = rest.find("</h1>").ok_or_else(|| ExtractionError::structure("unclosed heading"))?;
            Ok(serde_json::json!({ "heading": &rest[..end], "url": self.response.url().as_str() }))
        }
    }

    fn response(body: &str) -> Arc<HttpResponse> {
        let url = Url::parse("https://example.com/a").unwrap();
        Arc::new(HttpResponse::new(url, body.to_string()).with_status(200))
    }

    fn save(root: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let page = HeadingPage { response: response(body) };
        pollster::block_on(save_fixture(
            &page,
            root,
            name,
            &CodecRegistry::new(),
            &CaptureConfig::default(),
            &HarnessConfig::default(),
        ))
        .unwrap()
    }

    fn harness() -> Harness {
        Harness::new(PageCatalog::new().register::<HeadingPage>())
    }

    #[test]
    fn saved_fixtures_pass() {
        let root = tempfile::tempdir().unwrap();
        save(root.path(), "ok", "<h1>Hello</h1>");
        save(root.path(), "broken", "<p>nothing</p>");

        let report = harness().run_all(root.path()).unwrap();
        assert_eq!(report.count(FixtureState::Passed), 2, "{report}");
        assert!(report.is_success());
    }

    #[test]
    fn changed_output_is_a_field_level_failure() {
        let root = tempfile::tempdir().unwrap();
        let dir = save(root.path(), "ok", "<h1>Hello</h1>");
        fs::write(
            dir.join("output.json"),
            r#"{"heading": "Goodbye", "url": "https://example.com/a"}"#,
        )
        .unwrap();

        let harness = harness();
        let descriptor = FixtureDescriptor::new(root.path(), dir);
        match harness.run_fixture(&descriptor).outcome {
            Outcome::Failed(Failure::ItemMismatch(diffs)) => {
                assert_eq!(diffs.len(), 1);
                assert_eq!(diffs[0].path, "$.heading");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn ignored_fields_are_not_compared() {
        let root = tempfile::tempdir().unwrap();
        let dir = save(root.path(), "ok", "<h1>Hello</h1>");
        fs::write(dir.join("output.json"), r#"{"heading": "Hello", "url": "elsewhere"}"#).unwrap();

        let config = HarnessConfig::builder().ignore_field("url").build().unwrap();
        let report = harness().with_config(config).run_fixture(&FixtureDescriptor::new(root.path(), dir));
        assert!(matches!(report.outcome, Outcome::Passed));
    }

    #[test]
    fn expected_error_that_no_longer_happens_fails() {
        let root = tempfile::tempdir().unwrap();
        let dir = save(root.path(), "broken", "<p>nothing</p>");
        assert!(dir.join("exception.json").exists());
        fs::write(dir.join("inputs/HttpResponse-body.html"), "<h1>Now fixed</h1>").unwrap();

        let report = harness().run_fixture(&FixtureDescriptor::new(root.path(), dir));
        match report.outcome {
            Outcome::Failed(Failure::MissingError { expected, .. }) => assert_eq!(expected.kind, "Structure"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn record_modes() {
        let root = tempfile::tempdir().unwrap();
        let dir = save(root.path(), "ok", "<h1>Hello</h1>");
        fs::remove_file(dir.join("output.json")).unwrap();
        let descriptor = FixtureDescriptor::new(root.path(), dir.clone());

        let never = HarnessConfig::builder().record_mode(RecordMode::Never).build().unwrap();
        let report = harness().with_config(never).run_fixture(&descriptor);
        assert!(matches!(report.outcome, Outcome::Errored(HarnessError::MissingExpectation { .. })));

        let report = harness().run_fixture(&descriptor);
        assert!(matches!(report.outcome, Outcome::Recorded));
        assert!(dir.join("output.json").exists());
        assert!(matches!(harness().run_fixture(&descriptor).outcome, Outcome::Passed));

        fs::write(dir.join("output.json"), r#"{"heading": "stale"}"#).unwrap();
        let overwrite = HarnessConfig::builder().record_mode(RecordMode::Overwrite).build().unwrap();
        let report = harness().with_config(overwrite).run_fixture(&descriptor);
        assert!(matches!(report.outcome, Outcome::Recorded));
        assert!(matches!(harness().run_fixture(&descriptor).outcome, Outcome::Passed));
    }

    #[test]
    fn registry_providers_are_not_used_during_replay() {
        let root = tempfile::tempdir().unwrap();
        save(root.path(), "ok", "<h1>Hello</h1>");

        let live = Registry::builder()
            .register(|| Ok(HttpResponse::new(Url::parse("https://example.com/b")?, "<h1>Live</h1>")))
            .build()
            .unwrap();
        let report = harness().with_registry(live).run_all(root.path()).unwrap();
        assert_eq!(report.count(FixtureState::Passed), 1, "{report}");
    }

    #[test]
    fn unknown_page_type_is_a_collection_error() {
        let root = tempfile::tempdir().unwrap();
        save(root.path(), "ok", "<h1>Hello</h1>");

        let report = Harness::new(PageCatalog::new()).run_all(root.path()).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.collection_errors().count(), 1);
        assert!(report.to_string().contains("unknown page type `HeadingPage`"));
    }

    #[test]
    fn corrupt_inputs_are_load_errors() {
        let root = tempfile::tempdir().unwrap();
        let dir = save(root.path(), "ok", "<h1>Hello</h1>");
        fs::write(dir.join("inputs/HttpResponse-info.json"), "{not json").unwrap();

        let report = harness().run_fixture(&FixtureDescriptor::new(root.path(), dir));
        match report.outcome {
            Outcome::Errored(err @ HarnessError::Load { .. }) => assert!(!err.is_collection_error()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn empty_tree_is_a_successful_suite() {
        let root = tempfile::tempdir().unwrap();
        let report = harness().run_all(root.path()).unwrap();
        assert!(report.reports.is_empty());
        assert_fixtures(&harness(), root.path());
    }
}
