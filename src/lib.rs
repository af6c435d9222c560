//! Page objects decoupled from crawling.
//!
//! A page object declares the inputs it needs ([`page::Injectable`]), the
//! [`registry`] builds it from whatever providers the host registered, and
//! [`page::ItemPage::to_item`] extracts an item. The inputs used for an
//! extraction can be captured with [`serialization`] and replayed offline
//! as regression tests with [`testing`].

pub mod config;
pub mod errors;
pub mod net;
pub mod page;
pub mod page_inputs;
pub mod registry;
pub mod serialization;
pub mod testing;

pub use errors::Error;
pub use page::{Injectable, ItemPage, WebPage};
pub use registry::{Capability, Dependency, InputSet, Registry, RegistryBuilder, ResolutionContext, Resolved};
