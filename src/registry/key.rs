use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::errors::ResolveError;
use crate::page::Injectable;

/// A type-erased, shareable value held by a resolution context.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Anything that can be injected into a page object: input values,
/// capability handles and page objects themselves.
///
/// `NAME` identifies the type in error messages and in fixtures on disk,
/// so it must be unique and should never change once fixtures exist.
pub trait Capability: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Identity of a [`Capability`] type. Compares by [`TypeId`] only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Capability>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How to build a value out of other resolved values. Used for nested
/// page objects and for the built-in derivations (e.g. `ResponseUrl`
/// from `HttpResponse`).
#[derive(Clone, Copy)]
pub struct Recipe {
    pub(crate) dependencies: fn() -> Vec<Dependency>,
    pub(crate) build: fn(&Resolved) -> Result<AnyArc, ResolveError>,
}

#[derive(Clone, Copy)]
pub(crate) enum DependencyKind {
    /// Must come from a provider, a seed or a built-in derivation.
    Input,
    /// Page object; built from its own dependencies unless a provider
    /// overrides it.
    Page(Recipe),
}

/// One declared input of a page object or provider: which type, and the
/// role it plays for the declaring type.
#[derive(Clone, Copy)]
pub struct Dependency {
    pub key: TypeKey,
    pub role: &'static str,
    pub(crate) kind: DependencyKind,
}

impl Dependency {
    pub fn input<T: Capability>(role: &'static str) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            role,
            kind: DependencyKind::Input,
        }
    }

    pub fn page<P: Injectable>(role: &'static str) -> Self {
        Self {
            key: TypeKey::of::<P>(),
            role,
            kind: DependencyKind::Page(Recipe {
                dependencies: P::dependencies,
                build: build_erased::<P>,
            }),
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self.kind, DependencyKind::Page(_))
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("page", &self.is_page())
            .finish()
    }
}

fn build_erased<P: Injectable>(resolved: &Resolved) -> Result<AnyArc, ResolveError> {
    let page: AnyArc = Arc::new(P::build(resolved)?);
    Ok(page)
}

/// The resolved dependencies handed to a constructor.
///
/// Only declared types can be fetched; asking for anything else is an
/// [`ResolveError::UndeclaredDependency`].
pub struct Resolved {
    owner: &'static str,
    values: HashMap<TypeKey, AnyArc>,
}

impl Resolved {
    /// An empty set for `owner`. Handy to build page objects by hand in
    /// tests.
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            values: HashMap::new(),
        }
    }

    pub fn with<T: Capability>(mut self, value: Arc<T>) -> Self {
        self.values.insert(TypeKey::of::<T>(), value);
        self
    }

    pub(crate) fn insert_erased(&mut self, key: TypeKey, value: AnyArc) {
        self.values.insert(key, value);
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn get<T: Capability>(&self) -> Result<Arc<T>, ResolveError> {
        let value = self
            .values
            .get(&TypeKey::of::<T>())
            .ok_or(ResolveError::UndeclaredDependency {
                page: self.owner,
                type_name: T::NAME,
            })?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch { type_name: T::NAME })
    }
}

/// The inputs a page object holds, in declaration order, flattened
/// through nested page objects. This is what gets captured into a
/// fixture.
#[derive(Clone, Default)]
pub struct InputSet {
    entries: Vec<(TypeKey, AnyArc)>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input. A type already present is kept as is.
    pub fn with<T: Capability>(mut self, value: &Arc<T>) -> Self {
        self.push(TypeKey::of::<T>(), value.clone());
        self
    }

    /// Adds every input of a nested page object.
    pub fn with_page<P: Injectable>(mut self, page: &P) -> Self {
        for (key, value) in page.inputs().entries {
            self.push(key, value);
        }
        self
    }

    pub(crate) fn push(&mut self, key: TypeKey, value: AnyArc) {
        if !self.entries.iter().any(|(k, _)| *k == key) {
            self.entries.push((key, value));
        }
    }

    pub fn get<T: Capability>(&self) -> Option<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.clone().downcast::<T>().ok())
    }

    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeKey, &AnyArc)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for InputSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha(u32);
    impl Capability for Alpha {
        const NAME: &'static str = "Alpha";
    }

    struct Beta;
    impl Capability for Beta {
        const NAME: &'static str = "Beta";
    }

    #[test]
    fn type_keys_compare_by_type() {
        assert_eq!(TypeKey::of::<Alpha>(), TypeKey::of::<Alpha>());
        assert_ne!(TypeKey::of::<Alpha>(), TypeKey::of::<Beta>());
        assert_eq!(TypeKey::of::<Beta>().name(), "Beta");
    }

    #[test]
    fn resolved_rejects_undeclared_types() {
        let resolved = Resolved::new("Owner").with(Arc::new(Alpha(7)));
        assert_eq!(resolved.get::<Alpha>().unwrap().0, 7);
        match resolved.get::<Beta>() {
            Err(ResolveError::UndeclaredDependency { page, type_name }) => {
                assert_eq!(page, "Owner");
                assert_eq!(type_name, "Beta");
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn resolved_reports_type_mismatch() {
        let mut resolved = Resolved::new("Owner");
        resolved.insert_erased(TypeKey::of::<Alpha>(), Arc::new(Beta));
        assert!(matches!(resolved.get::<Alpha>(), Err(ResolveError::TypeMismatch { .. })));
    }

    #[test]
    fn input_set_keeps_first_value_per_type() {
        let first = Arc::new(Alpha(1));
        let set = InputSet::new().with(&first).with(&Arc::new(Beta)).with(&Arc::new(Alpha(2)));
        assert_eq!(set.len(), 2);
        assert!(Arc::ptr_eq(&set.get::<Alpha>().unwrap(), &first));
    }
}
