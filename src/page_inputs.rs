//! Input types a page object can declare.
//!
//! These are plain, immutable values (plus the [`HttpClient`] handle).
//! They know nothing about how they were obtained: a host builds them
//! from whatever its network layer returns, the fixture layer builds them
//! from disk.

mod body;
mod client;
mod headers;
mod params;
mod request;
mod response;
mod urls;

pub use body::{HttpRequestBody, HttpResponseBody};
pub use client::{AllowStatus, DownloadFailure, Exchange, HttpClient};
pub use headers::{HttpHeaders, NameValue};
pub use params::PageParams;
pub use request::{canonicalize_url, HttpRequest};
pub use response::HttpResponse;
pub use urls::{RequestUrl, ResponseUrl};

use crate::registry::Capability;

macro_rules! capability {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Capability for $ty {
                const NAME: &'static str = stringify!($ty);
            }
        )*
    };
}

capability!(HttpResponse, HttpRequest, HttpClient, PageParams, RequestUrl, ResponseUrl);
