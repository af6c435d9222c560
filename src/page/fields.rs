//! Building items field by field.
//!
//! Instead of writing `to_item` by hand, a page can list named fields and
//! let [`item_from_fields`] assemble the item:
//!
//! ```rust
//! use pageobject::errors::ExtractionError;
//! use pageobject::page::{item_from_fields_sync, ItemFieldFilter, SyncFields};
//! use serde_json::{json, Value};
//!
//! struct Product;
//!
//! impl SyncFields for Product {
//!     fn field_names(&self) -> &'static [&'static str] {
//!         &["name", "currency"]
//!     }
//!     fn field(&self, name: &str) -> Result<Value, ExtractionError> {
//!         match name {
//!             "name" => Ok(json!("Chair")),
//!             "currency" => Ok(json!("USD")),
//!             other => Err(ExtractionError::MissingField(other.to_string())),
//!         }
//!     }
//! }
//!
//! let item: Value = item_from_fields_sync(&Product, ItemFieldFilter::All).unwrap();
//! assert_eq!(item, json!({"name": "Chair", "currency": "USD"}));
//! ```
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::errors::ExtractionError;

/// A page whose item is made of named, possibly async, fields.
#[async_trait]
pub trait Fields: Send + Sync {
    /// Field names, in item order.
    fn field_names(&self) -> &'static [&'static str];

    async fn field(&self, name: &str) -> Result<Value, ExtractionError>;
}

/// Synchronous counterpart of [`Fields`].
pub trait SyncFields {
    fn field_names(&self) -> &'static [&'static str];

    fn field(&self, name: &str) -> Result<Value, ExtractionError>;
}

/// Which fields end up in the item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemFieldFilter {
    /// Every field the page lists.
    #[default]
    All,
    /// Only fields the item type knows about. Others are skipped instead
    /// of failing deserialization of a strict item type.
    Only(&'static [&'static str]),
}

impl ItemFieldFilter {
    fn keeps(&self, name: &str) -> bool {
        match self {
            ItemFieldFilter::All => true,
            ItemFieldFilter::Only(names) => names.contains(&name),
        }
    }
}

/// Evaluates the page's fields one after another and deserializes the
/// result into `T`.
pub async fn item_from_fields<T, P>(page: &P, filter: ItemFieldFilter) -> Result<T, ExtractionError>
where
    T: DeserializeOwned,
    P: Fields + ?Sized,
{
    let mut map = Map::new();
    for &name in page.field_names().iter().filter(|n| filter.keeps(n)) {
        let value = page.field(name).await.map_err(|e| field_error(name, e))?;
        map.insert(name.to_string(), value);
    }
    Ok(serde_json::from_value(Value::Object(map))?)
}

pub fn item_from_fields_sync<T, P>(page: &P, filter: ItemFieldFilter) -> Result<T, ExtractionError>
where
    T: DeserializeOwned,
    P: SyncFields + ?Sized,
{
    let mut map = Map::new();
    for &name in page.field_names().iter().filter(|n| filter.keeps(n)) {
        let value = page.field(name).map_err(|e| field_error(name, e))?;
        map.insert(name.to_string(), value);
    }
    Ok(serde_json::from_value(Value::Object(map))?)
}

fn field_error(name: &str, source: ExtractionError) -> ExtractionError {
    ExtractionError::Field {
        name: name.to_string(),
        source: Box::new(source),
    }
}

/// Per-instance memo for expensive fields. Each field is computed at most
/// once, even when requested concurrently; failures are not cached.
#[derive(Default)]
pub struct FieldCache {
    slots: Mutex<HashMap<&'static str, Arc<OnceCell<Arc<dyn Any + Send + Sync>>>>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<T, F, Fut>(&self, name: &'static str, f: F) -> Result<T, ExtractionError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ExtractionError>>,
    {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .clone();
        let value = slot
            .get_or_try_init(move || async move {
                let value: Arc<dyn Any + Send + Sync> = Arc::new(f().await?);
                Ok::<_, ExtractionError>(value)
            })
            .await?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ExtractionError::structure(format!("field `{name}` cached with a different type")))
    }
}
