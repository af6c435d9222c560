use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

use super::key::{AnyArc, Capability, Dependency, Recipe, Resolved, TypeKey};
use crate::errors::ResolveError;
use crate::page_inputs::{HttpRequest, HttpResponse, RequestUrl, ResponseUrl};

pub(crate) type ProviderFn = Arc<dyn Fn(Resolved) -> BoxFuture<'static, anyhow::Result<AnyArc>> + Send + Sync>;

/// A host supplied factory for one capability type.
#[derive(Clone)]
pub(crate) struct Provider {
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) call: ProviderFn,
}

impl Provider {
    pub(crate) fn new<T, F, Fut>(dependencies: Vec<Dependency>, f: F) -> Self
    where
        T: Capability,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let call: ProviderFn = Arc::new(move |resolved| {
            f(resolved)
                .map(|res| res.map(|value| Arc::new(value) as AnyArc))
                .boxed()
        });
        Self { dependencies, call }
    }

    /// Hands out the same shared value to every context.
    pub(crate) fn shared<T: Capability>(value: Arc<T>) -> Self {
        let value: AnyArc = value;
        let call: ProviderFn = Arc::new(move |_| {
            let value = value.clone();
            async move { Ok(value) }.boxed()
        });
        Self {
            dependencies: Vec::new(),
            call,
        }
    }
}

/// Built-in derivations, used when nothing else can produce a type.
pub(crate) fn synthesizer(key: TypeKey) -> Option<Recipe> {
    if key == TypeKey::of::<ResponseUrl>() {
        Some(Recipe {
            dependencies: || vec![Dependency::input::<HttpResponse>("response")],
            build: |resolved| {
                let response = resolved.get::<HttpResponse>()?;
                let url: AnyArc = Arc::new(ResponseUrl::new(response.url().clone()));
                Ok(url)
            },
        })
    } else if key == TypeKey::of::<RequestUrl>() {
        Some(Recipe {
            dependencies: || vec![Dependency::input::<HttpRequest>("request")],
            build: |resolved| {
                let request = resolved.get::<HttpRequest>()?;
                let url: AnyArc = Arc::new(RequestUrl::new(request.url().clone()));
                Ok(url)
            },
        })
    } else {
        None
    }
}

/// What a context does to produce a value of some type.
pub(crate) enum Plan<'a> {
    Provider(&'a Provider),
    Recipe(Recipe),
}

impl Plan<'_> {
    pub(crate) fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Plan::Provider(p) => p.dependencies.clone(),
            Plan::Recipe(r) => (r.dependencies)(),
        }
    }
}

pub(crate) fn provider_failed(key: TypeKey, source: anyhow::Error) -> ResolveError {
    ResolveError::ProviderFailed {
        type_name: key.name(),
        source,
    }
}
