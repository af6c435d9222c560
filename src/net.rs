//! Transport seam behind [`HttpClient`](crate::page_inputs::HttpClient).
//!
//! The core never performs network I/O on its own. Hosts plug in a
//! [`Downloader`]; the fixture harness plugs in a [`ReplayDownloader`]
//! that answers from a recorded interaction log.

mod fetch;
mod replay;

pub use fetch::ReqwestDownloader;
pub use replay::ReplayDownloader;

use async_trait::async_trait;

use crate::errors::HttpError;
use crate::page_inputs::{HttpRequest, HttpResponse};

/// Performs a single HTTP request and buffers the whole response.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;
}
