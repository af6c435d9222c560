//! Follow-up request capability.
//!
//! A page object that needs more than the initial response depends on
//! [`HttpClient`]. Every request goes through the host's
//! [`Downloader`]; the client itself never opens a connection. During
//! replay the downloader is a [`ReplayDownloader`] fed with the
//! exchanges the client saved while the fixture was captured.
use futures::future::join_all;
use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

use super::body::HttpRequestBody;
use super::headers::HttpHeaders;
use super::request::HttpRequest;
use super::response::HttpResponse;
use crate::errors::HttpError;
use crate::net::{Downloader, ReplayDownloader};

/// A request and what the downloader answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: HttpRequest,
    pub response: Result<HttpResponse, DownloadFailure>,
}

impl Exchange {
    /// The exchange to log for a download, or `None` for a replay miss,
    /// which says nothing about the site.
    fn logged(request: &HttpRequest, result: &Result<HttpResponse, HttpError>) -> Option<Self> {
        let response = match result {
            Ok(response) => Ok(response.clone()),
            Err(err) => Err(DownloadFailure::of(err)?),
        };
        Some(Self {
            request: request.clone(),
            response,
        })
    }
}

/// A failed download as kept in the interaction log. Replaying it fails
/// the request again with the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadFailure {
    Transport { reason: String },
    ResponseStatus { status: u16 },
}

impl DownloadFailure {
    fn of(err: &HttpError) -> Option<Self> {
        match err {
            HttpError::Transport { source, .. } => Some(DownloadFailure::Transport {
                reason: source.to_string(),
            }),
            HttpError::ResponseStatus { status, .. } => Some(DownloadFailure::ResponseStatus { status: *status }),
            HttpError::UnsupportedReplayInteraction { .. } => None,
        }
    }

    /// The error `request` failed with when it was logged.
    pub fn to_error(&self, request: &HttpRequest) -> HttpError {
        match self {
            DownloadFailure::Transport { reason } => HttpError::Transport {
                url: request.url().to_string(),
                source: anyhow::anyhow!("{reason}"),
            },
            DownloadFailure::ResponseStatus { status } => HttpError::ResponseStatus {
                method: request.method().to_string(),
                url: request.url().to_string(),
                status: *status,
            },
        }
    }
}

/// Which response statuses are returned instead of raising
/// [`HttpError::ResponseStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowStatus {
    /// Statuses below 400.
    #[default]
    Success,
    /// Statuses below 400 plus the listed ones.
    Also(Vec<u16>),
    /// Every status.
    Any,
}

impl AllowStatus {
    fn allows(&self, status: u16) -> bool {
        match self {
            AllowStatus::Success => status < 400,
            AllowStatus::Also(extra) => status < 400 || extra.contains(&status),
            AllowStatus::Any => true,
        }
    }
}

pub struct HttpClient {
    downloader: Arc<dyn Downloader>,
    save_responses: bool,
    saved: Mutex<Vec<Exchange>>,
}

impl HttpClient {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            downloader,
            save_responses: false,
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Keeps every exchange so the client can later be captured into a
    /// fixture.
    pub fn save_responses(mut self, on: bool) -> Self {
        self.save_responses = on;
        self
    }

    /// A client that answers from `exchanges`, in order, and never
    /// touches the network.
    pub fn replay(exchanges: Vec<Exchange>) -> Self {
        Self::new(Arc::new(ReplayDownloader::new(exchanges)))
    }

    pub fn saves_responses(&self) -> bool {
        self.save_responses
    }

    /// Exchanges recorded so far, in request order.
    pub fn saved_responses(&self) -> Vec<Exchange> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn get(&self, url: Url) -> Result<HttpResponse, HttpError> {
        self.execute(HttpRequest::get(url)).await
    }

    pub async fn post(&self, url: Url, body: impl Into<HttpRequestBody>) -> Result<HttpResponse, HttpError> {
        self.execute(HttpRequest::post(url, body)).await
    }

    pub async fn request(
        &self,
        method: Method,
        url: Url,
        headers: HttpHeaders,
        body: impl Into<HttpRequestBody>,
    ) -> Result<HttpResponse, HttpError> {
        let request = HttpRequest::new(method, url).with_headers(headers).with_body(body);
        self.execute(request).await
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.execute_with(request, &AllowStatus::default()).await
    }

    pub async fn execute_with(&self, request: HttpRequest, allow: &AllowStatus) -> Result<HttpResponse, HttpError> {
        let result = self.downloader.download(&request).await;
        if self.save_responses {
            self.record(Exchange::logged(&request, &result));
        }
        check_status(&request, result?, allow)
    }

    /// Sends all requests concurrently. Results come back in request
    /// order; one failure does not cancel the others.
    pub async fn batch_execute(&self, requests: Vec<HttpRequest>, allow: &AllowStatus) -> Vec<Result<HttpResponse, HttpError>> {
        let downloads = join_all(requests.iter().map(|r| self.downloader.download(r))).await;

        if self.save_responses {
            let exchanges: Vec<_> = requests
                .iter()
                .zip(&downloads)
                .filter_map(|(req, res)| Exchange::logged(req, res))
                .collect();
            self.record(exchanges);
        }

        requests
            .iter()
            .zip(downloads)
            .map(|(req, res)| res.and_then(|response| check_status(req, response, allow)))
            .collect()
    }

    fn record(&self, exchanges: impl IntoIterator<Item = Exchange>) {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(exchanges);
    }
}

fn check_status(request: &HttpRequest, response: HttpResponse, allow: &AllowStatus) -> Result<HttpResponse, HttpError> {
    match response.status() {
        Some(status) if !allow.allows(status) => Err(HttpError::ResponseStatus {
            method: request.method().to_string(),
            url: request.url().to_string(),
            status,
        }),
        _ => Ok(response),
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("save_responses", &self.save_responses)
            .field("saved", &self.saved_responses().len())
            .finish_non_exhaustive()
    }
}
