//! Capability registry.
//!
//! The host assembles a [`Registry`] once at startup with a
//! [`RegistryBuilder`], registering one provider per input type. The
//! frozen registry is shared behind an [`Arc`] and never changes while
//! requests are processed. Every page fetch gets its own
//! [`ResolutionContext`], which caches resolved values for that fetch
//! only.
//!
//! Capabilities are keyed by their Rust type alone. Two meanings of the
//! same data are two newtypes, each a [`Capability`] with its own
//! provider.
//!
//! ```rust
//! use pageobject::page_inputs::{HttpResponse, ResponseUrl};
//! use pageobject::registry::Registry;
//! # async fn demo() -> Result<(), pageobject::errors::ResolveError> {
//! let registry = Registry::builder()
//!     .register(|| {
//!         let url = url::Url::parse("https://example.com/")?;
//!         Ok(HttpResponse::new(url, "<html></html>"))
//!     })
//!     .build()?;
//!
//! let ctx = registry.context();
//! // No provider for ResponseUrl: it is derived from the response.
//! let url = ctx.get::<ResponseUrl>().await?;
//! assert_eq!(url.as_str(), "https://example.com/");
//! # Ok(()) }
//! ```

mod context;
mod key;
mod provider;

pub use context::{ContextId, ResolutionContext};
pub use key::{AnyArc, Capability, Dependency, InputSet, Recipe, Resolved, TypeKey};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::config::{DuplicatePolicy, RegistryConfig};
use crate::errors::ResolveError;
use provider::Provider;

/// Frozen set of providers.
pub struct Registry {
    providers: HashMap<TypeKey, Provider>,
    config: RegistryConfig,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A registry without providers. Page objects can still be built from
    /// seeded values and built-in derivations.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            providers: HashMap::new(),
            config: RegistryConfig::default(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_registered<T: Capability>(&self) -> bool {
        self.providers.contains_key(&TypeKey::of::<T>())
    }

    /// Registered types, in no particular order.
    pub fn registered(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.providers.keys().copied()
    }

    /// A fresh resolution context backed by this registry.
    pub fn context(self: &Arc<Self>) -> ResolutionContext {
        ResolutionContext::new(self.clone())
    }

    pub(crate) fn provider(&self, key: TypeKey) -> Option<&Provider> {
        self.providers.get(&key)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    providers: HashMap<TypeKey, Provider>,
    duplicates: Vec<TypeKey>,
}

impl RegistryBuilder {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    /// Registers a synchronous provider without dependencies.
    pub fn register<T, F>(self, f: F) -> Self
    where
        T: Capability,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let provider = Provider::new(Vec::new(), move |_| std::future::ready(f()));
        self.insert(TypeKey::of::<T>(), provider)
    }

    /// Registers an async provider without dependencies.
    pub fn register_async<T, F, Fut>(self, f: F) -> Self
    where
        T: Capability,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let provider = Provider::new(Vec::new(), move |_| f());
        self.insert(TypeKey::of::<T>(), provider)
    }

    /// Registers a provider that needs other capabilities. They are
    /// resolved in the same context before `f` runs.
    pub fn register_with<T, F, Fut>(self, dependencies: Vec<Dependency>, f: F) -> Self
    where
        T: Capability,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let provider = Provider::new(dependencies, f);
        self.insert(TypeKey::of::<T>(), provider)
    }

    /// Registers a value shared by every context.
    pub fn register_value<T: Capability>(self, value: Arc<T>) -> Self {
        self.insert(TypeKey::of::<T>(), Provider::shared(value))
    }

    fn insert(mut self, key: TypeKey, provider: Provider) -> Self {
        if self.providers.insert(key, provider).is_some() {
            log::debug!("Provider for {} registered more than once", key.name());
            self.duplicates.push(key);
        }
        self
    }

    pub fn build(self) -> Result<Arc<Registry>, ResolveError> {
        if self.config.duplicate_policy == DuplicatePolicy::Reject {
            if let Some(key) = self.duplicates.first() {
                return Err(ResolveError::DuplicateProvider { type_name: key.name() });
            }
        }
        Ok(Arc::new(Registry {
            providers: self.providers,
            config: self.config,
        }))
    }
}
