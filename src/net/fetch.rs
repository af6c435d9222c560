use async_trait::async_trait;

use super::Downloader;
use crate::errors::HttpError;
use crate::page_inputs::{HttpHeaders, HttpRequest, HttpResponse};

/// Live downloader backed by a [`reqwest::Client`].
///
/// Provided for hosts that do not bring their own transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let transport = |e: anyhow::Error| HttpError::Transport {
            url: request.url().to_string(),
            source: e,
        };

        let headers = request.headers().to_header_map().map_err(|e| transport(e.into()))?;
        let res = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(headers)
            .body(request.body().to_vec())
            .send()
            .await
            .map_err(|e| transport(e.into()))?;

        // Fetch results
        let final_url = res.url().clone();
        let status = res.status().as_u16();
        let headers = HttpHeaders::from(res.headers());

        // Fetch body. We don't do streaming
        let body = res.bytes().await.map_err(|e| transport(e.into()))?.to_vec();
        log::debug!("{} {} -> {} ({} bytes)", request.method(), final_url, status, body.len());

        Ok(HttpResponse::new(final_url, body)
            .with_status(status)
            .with_headers(headers))
    }
}
