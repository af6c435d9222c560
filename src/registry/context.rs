use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::key::{AnyArc, Capability, Dependency, DependencyKind, InputSet, Resolved, TypeKey};
use super::provider::{provider_failed, synthesizer, Plan};
use super::Registry;
use crate::errors::ResolveError;
use crate::page::Injectable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Slot = Arc<OnceCell<AnyArc>>;

/// Scope in which resolved values are cached and shared.
///
/// Resolving the same type twice in one context yields the same `Arc`.
/// Concurrent resolutions of one type are collapsed, so a provider runs
/// at most once per context. Contexts never share cache entries.
pub struct ResolutionContext {
    id: ContextId,
    registry: Arc<Registry>,
    use_providers: bool,
    slots: Mutex<HashMap<TypeKey, Slot>>,
}

impl ResolutionContext {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            id: ContextId::new(),
            registry,
            use_providers: true,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// A context that only knows the values in `seed`. Registered
    /// providers are never called, so nothing live can leak into a
    /// replayed extraction. Nested page objects and built-in derivations
    /// still work.
    pub fn replay(registry: Arc<Registry>, seed: InputSet) -> Self {
        let slots = seed
            .iter()
            .map(|(key, value)| (key, Arc::new(OnceCell::new_with(Some(value.clone())))))
            .collect();
        Self {
            id: ContextId::new(),
            registry,
            use_providers: false,
            slots: Mutex::new(slots),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolves a page object and everything it depends on.
    pub async fn resolve<P: Injectable>(&self) -> Result<Arc<P>, ResolveError> {
        let value = self.resolve_root(Dependency::page::<P>("root")).await?;
        value
            .downcast::<P>()
            .map_err(|_| ResolveError::TypeMismatch { type_name: P::NAME })
    }

    /// Like [`resolve`](Self::resolve), but gives up with
    /// [`ResolveError::Cancelled`] once `token` is cancelled. Values
    /// already cached stay valid; half-built ones are dropped.
    pub async fn resolve_cancellable<P: Injectable>(&self, token: &CancellationToken) -> Result<Arc<P>, ResolveError> {
        tokio::select! {
            _ = token.cancelled() => {
                log::debug!("Resolution of {} cancelled in context {}", P::NAME, self.id);
                Err(ResolveError::Cancelled)
            }
            res = self.resolve::<P>() => res,
        }
    }

    /// Resolves a single input type.
    pub async fn get<T: Capability>(&self) -> Result<Arc<T>, ResolveError> {
        let value = self.resolve_root(Dependency::input::<T>("root")).await?;
        value
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch { type_name: T::NAME })
    }

    async fn resolve_root(&self, dep: Dependency) -> Result<AnyArc, ResolveError> {
        self.check_acyclic(&dep, "root", &mut Vec::new(), &mut HashSet::new())?;
        self.resolve_dep(dep, "root").await
    }

    fn slot(&self, key: TypeKey) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    fn is_seeded(&self, key: TypeKey) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .is_some_and(|slot| slot.initialized())
    }

    /// Picks how `dep` will be produced: a registered provider first,
    /// then the page object's own constructor, then a built-in derivation.
    fn plan(&self, dep: &Dependency, required_by: &'static str) -> Result<Plan<'_>, ResolveError> {
        if self.use_providers {
            if let Some(provider) = self.registry.provider(dep.key) {
                return Ok(Plan::Provider(provider));
            }
        }
        if let DependencyKind::Page(recipe) = dep.kind {
            return Ok(Plan::Recipe(recipe));
        }
        synthesizer(dep.key)
            .map(Plan::Recipe)
            .ok_or(ResolveError::UnresolvableCapability {
                type_name: dep.key.name(),
                required_by,
            })
    }

    /// Walks the declared graph before anything runs, so a cycle is
    /// reported instead of deadlocking on a half-initialised slot.
    fn check_acyclic(
        &self,
        dep: &Dependency,
        required_by: &'static str,
        path: &mut Vec<TypeKey>,
        done: &mut HashSet<TypeKey>,
    ) -> Result<(), ResolveError> {
        if path.contains(&dep.key) {
            let mut names: Vec<_> = path
                .iter()
                .skip_while(|k| **k != dep.key)
                .map(|k| k.name())
                .collect();
            names.push(dep.key.name());
            return Err(ResolveError::CyclicDependency { path: names });
        }
        if done.contains(&dep.key) || self.is_seeded(dep.key) {
            return Ok(());
        }

        let children = self.plan(dep, required_by)?.dependencies();
        path.push(dep.key);
        for child in &children {
            self.check_acyclic(child, dep.key.name(), path, done)?;
        }
        path.pop();
        done.insert(dep.key);
        Ok(())
    }

    fn resolve_dep(&self, dep: Dependency, required_by: &'static str) -> BoxFuture<'_, Result<AnyArc, ResolveError>> {
        async move {
            let slot = self.slot(dep.key);
            let value = slot.get_or_try_init(|| self.produce(dep, required_by)).await?;
            Ok(value.clone())
        }
        .boxed()
    }

    async fn produce(&self, dep: Dependency, required_by: &'static str) -> Result<AnyArc, ResolveError> {
        let plan = self.plan(&dep, required_by)?;
        let resolved = self.resolve_all(dep.key.name(), plan.dependencies()).await?;
        match plan {
            Plan::Provider(provider) => {
                log::debug!("Calling provider for {} in context {}", dep.key.name(), self.id);
                (provider.call)(resolved).await.map_err(|e| provider_failed(dep.key, e))
            }
            Plan::Recipe(recipe) => (recipe.build)(&resolved),
        }
    }

    /// Resolves siblings concurrently.
    async fn resolve_all(&self, owner: &'static str, dependencies: Vec<Dependency>) -> Result<Resolved, ResolveError> {
        let values = try_join_all(dependencies.iter().map(|d| self.resolve_dep(*d, owner))).await?;
        let mut resolved = Resolved::new(owner);
        for (dep, value) in dependencies.iter().zip(values) {
            resolved.insert_erased(dep.key, value);
        }
        Ok(resolved)
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("id", &self.id)
            .field("use_providers", &self.use_providers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_inputs::{HttpResponse, ResponseUrl};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    struct Counter(usize);
    impl Capability for Counter {
        const NAME: &'static str = "Counter";
    }

    struct Leaf {
        counter: Arc<Counter>,
    }
    impl Capability for Leaf {
        const NAME: &'static str = "Leaf";
    }
    impl Injectable for Leaf {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::input::<Counter>("counter")]
        }
        fn build(r: &Resolved) -> Result<Self, ResolveError> {
            Ok(Self { counter: r.get()? })
        }
        fn inputs(&self) -> InputSet {
            InputSet::new().with(&self.counter)
        }
    }

    struct Root {
        counter: Arc<Counter>,
        leaf: Arc<Leaf>,
    }
    impl Capability for Root {
        const NAME: &'static str = "Root";
    }
    impl Injectable for Root {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::input::<Counter>("counter"), Dependency::page::<Leaf>("leaf")]
        }
        fn build(r: &Resolved) -> Result<Self, ResolveError> {
            Ok(Self {
                counter: r.get()?,
                leaf: r.get()?,
            })
        }
        fn inputs(&self) -> InputSet {
            InputSet::new().with(&self.counter).with_page(self.leaf.as_ref())
        }
    }

    // A <-> B through nested page declarations.
    struct CycleA;
    struct CycleB;
    impl Capability for CycleA {
        const NAME: &'static str = "CycleA";
    }
    impl Capability for CycleB {
        const NAME: &'static str = "CycleB";
    }
    impl Injectable for CycleA {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::page::<CycleB>("b")]
        }
        fn build(_: &Resolved) -> Result<Self, ResolveError> {
            Ok(CycleA)
        }
        fn inputs(&self) -> InputSet {
            InputSet::new()
        }
    }
    impl Injectable for CycleB {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::page::<CycleA>("a")]
        }
        fn build(_: &Resolved) -> Result<Self, ResolveError> {
            Ok(CycleB)
        }
        fn inputs(&self) -> InputSet {
            InputSet::new()
        }
    }

    fn counting_registry(calls: Arc<AtomicUsize>) -> Arc<Registry> {
        Registry::builder()
            .register_async(move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(Counter(n))
                }
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn shared_input_is_resolved_once_per_context() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(calls.clone());

        let ctx = registry.context();
        let root = ctx.resolve::<Root>().await.unwrap();
        assert!(Arc::ptr_eq(&root.counter, &root.leaf.counter));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let again = ctx.resolve::<Root>().await.unwrap();
        assert!(Arc::ptr_eq(&root, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let other = registry.context().resolve::<Root>().await.unwrap();
        assert!(!Arc::ptr_eq(&root.counter, &other.counter));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_resolutions_share_one_provider_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = counting_registry(calls.clone()).context();

        let (a, b) = tokio::join!(ctx.get::<Counter>(), ctx.resolve::<Leaf>());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap().counter));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cycles_are_reported() {
        let ctx = Registry::empty().context();
        match ctx.resolve::<CycleA>().await {
            Err(ResolveError::CyclicDependency { path }) => {
                assert_eq!(path, vec!["CycleA", "CycleB", "CycleA"]);
            }
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn missing_provider_names_the_requirer() {
        let ctx = Registry::empty().context();
        match ctx.resolve::<Leaf>().await {
            Err(ResolveError::UnresolvableCapability { type_name, required_by }) => {
                assert_eq!(type_name, "Counter");
                assert_eq!(required_by, "Leaf");
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn provider_errors_are_wrapped() {
        let registry = Registry::builder()
            .register::<Counter, _>(|| Err(anyhow::anyhow!("backend down")))
            .build()
            .unwrap();
        let err = registry.context().get::<Counter>().await.err().unwrap();
        assert!(matches!(err, ResolveError::ProviderFailed { type_name: "Counter", .. }));
        assert!(err.to_string().contains("backend down"));
    }

    #[tokio::test]
    async fn replay_context_ignores_providers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(calls.clone());
        let seed = InputSet::new().with(&Arc::new(Counter(42)));

        let ctx = ResolutionContext::replay(registry.clone(), seed);
        let root = ctx.resolve::<Root>().await.unwrap();
        assert_eq!(root.counter.0, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let empty = ResolutionContext::replay(registry, InputSet::new());
        assert!(matches!(
            empty.get::<Counter>().await,
            Err(ResolveError::UnresolvableCapability { .. })
        ));
    }

    #[tokio::test]
    async fn response_url_is_derived_from_response() {
        let url = Url::parse("https://example.com/final").unwrap();
        let seed = InputSet::new().with(&Arc::new(HttpResponse::new(url.clone(), "")));
        let ctx = ResolutionContext::replay(Registry::empty(), seed);
        assert_eq!(ctx.get::<ResponseUrl>().await.unwrap().as_url(), &url);
    }

    #[tokio::test]
    async fn cancellation_aborts_resolution() {
        let registry = Registry::builder()
            .register_async(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Counter(0))
            })
            .build()
            .unwrap();
        let ctx = registry.context();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            ctx.resolve_cancellable::<Leaf>(&token).await,
            Err(ResolveError::Cancelled)
        ));
    }
}
