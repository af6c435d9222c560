use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::Downloader;
use crate::errors::HttpError;
use crate::page_inputs::{Exchange, HttpRequest, HttpResponse};


/// Answers requests from a recorded interaction log, strictly in order.
///
/// Each request must match the next logged request (by fingerprint).
/// A request past the end of the log, or one that does not match, is an
/// [`HttpError::UnsupportedReplayInteraction`] and leaves the log as it
/// was. Logged failures fail again. No live I/O ever happens.
#[derive(Debug, Default)]
pub struct ReplayDownloader {
    log: Mutex<VecDeque<Exchange>>,
}

impl ReplayDownloader {
    pub fn new(exchanges: impl IntoIterator<Item = Exchange>) -> Self {
        Self {
            log: Mutex::new(exchanges.into_iter().collect()),
        }
    }

    /// Number of logged interactions not consumed yet.
    pub fn remaining(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Downloader for ReplayDownloader {
    async fn download(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let unsupported = |reason: String| HttpError::UnsupportedReplayInteraction {
            method: request.method().to_string(),
            url: request.url().to_string(),
            reason,
        };

        let exchange = {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            match log.front() {
                Some(next) if next.request.fingerprint() != request.fingerprint() => {
                    return Err(unsupported(format!(
                        "next logged request is {} {}",
                        next.request.method(),
                        next.request.url()
                    )));
                }
                _ => log.pop_front(),
            }
        }
        .ok_or_else(|| unsupported("interaction log exhausted".to_string()))?;

        log::debug!("Replaying {} {}", request.method(), request.url());
        exchange.response.map_err(|failure| failure.to_error(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_inputs::DownloadFailure;
    use url::Url;

    fn exchange(path: &str, body: &str) -> Exchange {
        let url = Url::parse("https://example.com/").unwrap().join(path).unwrap();
        Exchange {
            request: HttpRequest::get(url.clone()),
            response: Ok(HttpResponse::new(url, body).with_status(200)),
        }
    }

    #[tokio::test]
    async fn answers_in_order_then_fails() {
        let a = exchange("/a", "A");
        let b = exchange("/b", "B");
        let replay = ReplayDownloader::new([a.clone(), b.clone()]);

        assert_eq!(replay.download(&a.request).await.unwrap().text(), "A");
        assert_eq!(replay.remaining(), 1);
        assert_eq!(replay.download(&b.request).await.unwrap().text(), "B");

        let err = replay.download(&a.request).await.unwrap_err();
        assert!(matches!(err, HttpError::UnsupportedReplayInteraction { ref reason, .. } if reason.contains("exhausted")));
    }

    #[tokio::test]
    async fn out_of_order_request_is_rejected() {
        let a = exchange("/a", "A");
        let b = exchange("/b", "B");
        let replay = ReplayDownloader::new([a.clone(), b.clone()]);

        let err = replay.download(&b.request).await.unwrap_err();
        match err {
            HttpError::UnsupportedReplayInteraction { url, reason, .. } => {
                assert_eq!(url, "https://example.com/b");
                assert!(reason.contains("https://example.com/a"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(replay.remaining(), 2);
        assert_eq!(replay.download(&a.request).await.unwrap().text(), "A");
        assert_eq!(replay.download(&b.request).await.unwrap().text(), "B");
    }

    #[tokio::test]
    async fn logged_failures_fail_again() {
        let url = Url::parse("https://example.com/down").unwrap();
        let failed = Exchange {
            request: HttpRequest::get(url.clone()),
            response: Err(DownloadFailure::Transport {
                reason: "connection reset".into(),
            }),
        };
        let replay = ReplayDownloader::new([failed.clone()]);

        let err = replay.download(&failed.request).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport { .. }));
        assert_eq!(err.to_string(), "request to https://example.com/down failed: connection reset");
        assert_eq!(replay.remaining(), 0);
    }
}
