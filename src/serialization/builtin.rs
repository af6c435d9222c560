//! Codecs for the built-in input types.
//!
//! | input          | parts                                              |
//! |----------------|----------------------------------------------------|
//! | `HttpResponse` | `body` (raw bytes), `info` (url, status, headers)  |
//! | `HttpRequest`  | `body` (raw bytes), `info` (method, url, headers)  |
//! | `PageParams`   | `params`                                           |
//! | `RequestUrl`   | `url`                                              |
//! | `ResponseUrl`  | `url`                                              |
//! | `HttpClient`   | `exchanges` (see [`ClientCaptureMode`])            |
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use super::codec::{CodecRegistry, InputCodec};
use super::records::{SerializedInput, SerializedPart};
use crate::config::{CaptureConfig, ClientCaptureMode};
use crate::errors::SerializationError;
use crate::page_inputs::{
    DownloadFailure, Exchange, HttpClient, HttpHeaders, HttpRequest, HttpResponse, PageParams, RequestUrl, ResponseUrl,
};
use crate::registry::Capability;

pub(crate) fn register_all(codecs: &mut CodecRegistry) {
    codecs
        .register(ResponseCodec)
        .register(RequestCodec)
        .register(ParamsCodec)
        .register(RequestUrlCodec)
        .register(ResponseUrlCodec)
        .register(ClientCodec);
}

fn json_part<T: Serialize>(
    type_name: &str,
    name: &str,
    value: &T,
    config: &CaptureConfig,
) -> Result<SerializedPart, SerializationError> {
    SerializedPart::json(name, value, config.pretty_json).map_err(|e| SerializationError::NonCapturable {
        type_name: type_name.to_string(),
        reason: e.to_string(),
    })
}

// ---------- HttpResponse ----------

#[derive(Serialize, Deserialize)]
struct ResponseInfo {
    url: Url,
    status: Option<u16>,
    headers: HttpHeaders,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}

impl ResponseInfo {
    fn of(response: &HttpResponse) -> Self {
        Self {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
            encoding: response.explicit_encoding().map(str::to_string),
        }
    }

    fn into_response(self, body: Vec<u8>) -> HttpResponse {
        let mut response = HttpResponse::new(self.url, body).with_headers(self.headers);
        if let Some(status) = self.status {
            response = response.with_status(status);
        }
        if let Some(encoding) = self.encoding {
            response = response.with_encoding(encoding);
        }
        response
    }
}

pub struct ResponseCodec;

impl InputCodec for ResponseCodec {
    type Input = HttpResponse;

    fn capture(&self, input: &HttpResponse, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        Ok(vec![
            SerializedPart::binary("body", config.body_extension.as_str(), input.body().to_vec()),
            json_part(HttpResponse::NAME, "info", &ResponseInfo::of(input), config)?,
        ])
    }

    fn restore(&self, input: &SerializedInput) -> Result<HttpResponse, SerializationError> {
        let info: ResponseInfo = input.json("info")?;
        Ok(info.into_response(input.bytes("body")?.to_vec()))
    }
}

// ---------- HttpRequest ----------

#[derive(Serialize, Deserialize)]
struct RequestInfo {
    method: String,
    url: Url,
    headers: HttpHeaders,
}

impl RequestInfo {
    fn of(request: &HttpRequest) -> Self {
        Self {
            method: request.method().to_string(),
            url: request.url().clone(),
            headers: request.headers().clone(),
        }
    }

    fn into_request(self, body: Vec<u8>, location: &str) -> Result<HttpRequest, SerializationError> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| SerializationError::corrupt(location, e))?;
        Ok(HttpRequest::new(method, self.url).with_headers(self.headers).with_body(body))
    }
}

pub struct RequestCodec;

impl InputCodec for RequestCodec {
    type Input = HttpRequest;

    fn capture(&self, input: &HttpRequest, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        Ok(vec![
            SerializedPart::binary("body", "bin", input.body().to_vec()),
            json_part(HttpRequest::NAME, "info", &RequestInfo::of(input), config)?,
        ])
    }

    fn restore(&self, input: &SerializedInput) -> Result<HttpRequest, SerializationError> {
        let info: RequestInfo = input.json("info")?;
        info.into_request(input.bytes("body")?.to_vec(), &input.location("info"))
    }
}

// ---------- PageParams / URLs ----------

pub struct ParamsCodec;

impl InputCodec for ParamsCodec {
    type Input = PageParams;

    fn capture(&self, input: &PageParams, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        Ok(vec![json_part(PageParams::NAME, "params", input, config)?])
    }

    fn restore(&self, input: &SerializedInput) -> Result<PageParams, SerializationError> {
        input.json("params")
    }
}

pub struct RequestUrlCodec;

impl InputCodec for RequestUrlCodec {
    type Input = RequestUrl;

    fn capture(&self, input: &RequestUrl, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        Ok(vec![json_part(RequestUrl::NAME, "url", input, config)?])
    }

    fn restore(&self, input: &SerializedInput) -> Result<RequestUrl, SerializationError> {
        input.json("url")
    }
}

pub struct ResponseUrlCodec;

impl InputCodec for ResponseUrlCodec {
    type Input = ResponseUrl;

    fn capture(&self, input: &ResponseUrl, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        Ok(vec![json_part(ResponseUrl::NAME, "url", input, config)?])
    }

    fn restore(&self, input: &SerializedInput) -> Result<ResponseUrl, SerializationError> {
        input.json("url")
    }
}

// ---------- HttpClient ----------

/// Body inside the exchange log: kept readable when it is UTF-8.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EncodedBody {
    Text(String),
    Base64(String),
}

impl EncodedBody {
    fn encode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => EncodedBody::Text(text.to_string()),
            Err(_) => EncodedBody::Base64(BASE64.encode(bytes)),
        }
    }

    fn decode(self, location: &str) -> Result<Vec<u8>, SerializationError> {
        match self {
            EncodedBody::Text(text) => Ok(text.into_bytes()),
            EncodedBody::Base64(data) => BASE64.decode(data).map_err(|e| SerializationError::corrupt(location, e)),
        }
    }
}

/// One logged exchange. Either `response` and `response_body` or
/// `failure` are present.
#[derive(Serialize, Deserialize)]
struct ExchangeRecord {
    request: RequestInfo,
    request_body: EncodedBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<ResponseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_body: Option<EncodedBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<DownloadFailure>,
}

impl ExchangeRecord {
    fn of(exchange: &Exchange) -> Self {
        let (response, response_body, failure) = match &exchange.response {
            Ok(response) => (
                Some(ResponseInfo::of(response)),
                Some(EncodedBody::encode(response.body())),
                None,
            ),
            Err(failure) => (None, None, Some(failure.clone())),
        };
        Self {
            request: RequestInfo::of(&exchange.request),
            request_body: EncodedBody::encode(exchange.request.body()),
            response,
            response_body,
            failure,
        }
    }

    fn into_exchange(self, location: &str) -> Result<Exchange, SerializationError> {
        let request = self.request.into_request(self.request_body.decode(location)?, location)?;
        let response = match (self.response, self.response_body, self.failure) {
            (Some(info), Some(body), None) => Ok(info.into_response(body.decode(location)?)),
            (None, None, Some(failure)) => Err(failure),
            _ => {
                return Err(SerializationError::corrupt(
                    location,
                    format!("exchange for {} needs either a response or a failure", request.url()),
                ))
            }
        };
        Ok(Exchange { request, response })
    }
}

pub struct ClientCodec;

impl InputCodec for ClientCodec {
    type Input = HttpClient;

    fn capture(&self, input: &HttpClient, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        let non_capturable = |reason: &str| SerializationError::NonCapturable {
            type_name: HttpClient::NAME.to_string(),
            reason: reason.to_string(),
        };
        match config.client_mode {
            ClientCaptureMode::Reject => Err(non_capturable("client capture is disabled")),
            ClientCaptureMode::Record if !input.saves_responses() => Err(non_capturable(
                "the client does not save its responses; build it with save_responses(true)",
            )),
            ClientCaptureMode::Record => {
                let records: Vec<_> = input.saved_responses().iter().map(ExchangeRecord::of).collect();
                Ok(vec![json_part(HttpClient::NAME, "exchanges", &records, config)?])
            }
        }
    }

    fn restore(&self, input: &SerializedInput) -> Result<HttpClient, SerializationError> {
        let location = input.location("exchanges");
        let records: Vec<ExchangeRecord> = input.json("exchanges")?;
        let exchanges = records
            .into_iter()
            .map(|r| r.into_exchange(&location))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HttpClient::replay(exchanges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HttpError;
    use crate::net::Downloader;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn round_trip<C: InputCodec>(codec: &C, value: &C::Input) -> C::Input {
        let config = CaptureConfig::default();
        let input = SerializedInput {
            type_name: C::Input::NAME.to_string(),
            parts: codec.capture(value, &config).unwrap(),
        };
        codec.restore(&input).unwrap()
    }

    #[test]
    fn response_round_trip_is_exact() {
        let response = HttpResponse::new(url("https://example.com/x"), b"\xff\xfe not utf-8 \x00".to_vec())
            .with_status(203)
            .with_headers(HttpHeaders::from_pairs([
                ("Set-Cookie", "b=2"),
                ("content-type", "text/html"),
                ("set-cookie", "a=1"),
            ]))
            .with_encoding("latin1");
        let restored = round_trip(&ResponseCodec, &response);
        assert_eq!(restored, response);
        assert_eq!(restored.body().as_bytes(), response.body().as_bytes());
        assert_eq!(
            restored.headers().iter().collect::<Vec<_>>(),
            response.headers().iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn response_without_status_stays_without_status() {
        let response = HttpResponse::new(url("https://example.com/"), "");
        assert_eq!(round_trip(&ResponseCodec, &response).status(), None);
    }

    #[test]
    fn response_body_uses_configured_extension() {
        let config = CaptureConfig::builder().body_extension("json").build().unwrap();
        let parts = ResponseCodec
            .capture(&HttpResponse::new(url("https://example.com/"), "{}"), &config)
            .unwrap();
        assert_eq!(parts[0].extension, "json");
        assert_eq!(parts[0].format, super::super::FormatTag::Binary);
    }

    #[test]
    fn malformed_headers_are_corrupt() {
        let input = SerializedInput {
            type_name: "HttpResponse".into(),
            parts: vec![
                SerializedPart::binary("body", "html", Vec::new()),
                SerializedPart::text("info", "json", r#"{"url": "https://example.com/", "status": 200, "headers": {"a": 1}}"#.into()),
            ],
        };
        assert!(matches!(ResponseCodec.restore(&input), Err(SerializationError::CorruptFixture { .. })));
    }

    #[test]
    fn request_and_params_round_trip() {
        let request = HttpRequest::post(url("https://example.com/api?q=1"), "a=1&b=2").with_header("X-Token", "t");
        assert_eq!(round_trip(&RequestCodec, &request), request);

        let params = PageParams::new().with("locale", "de").with("page", 3);
        assert_eq!(round_trip(&ParamsCodec, &params), params);

        let response_url = ResponseUrl::parse("https://example.com/final").unwrap();
        assert_eq!(round_trip(&ResponseUrlCodec, &response_url), response_url);
    }

    struct Fixed;

    #[async_trait]
    impl Downloader for Fixed {
        async fn download(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            Ok(HttpResponse::new(request.url().clone(), b"\x89PNG\r\n".to_vec()).with_status(200))
        }
    }

    #[tokio::test]
    async fn client_exchanges_round_trip_into_replay() {
        let client = HttpClient::new(Arc::new(Fixed)).save_responses(true);
        client.get(url("https://example.com/img.png")).await.unwrap();

        let replay = round_trip(&ClientCodec, &client);
        let response = replay.get(url("https://example.com/img.png")).await.unwrap();
        assert_eq!(response.body().as_bytes(), b"\x89PNG\r\n");
        assert!(replay.get(url("https://example.com/img.png")).await.is_err());
    }

    struct Flaky;

    #[async_trait]
    impl Downloader for Flaky {
        async fn download(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            Err(HttpError::Transport {
                url: request.url().to_string(),
                source: anyhow::anyhow!("timed out"),
            })
        }
    }

    #[tokio::test]
    async fn failed_exchanges_are_captured() {
        let client = HttpClient::new(Arc::new(Flaky)).save_responses(true);
        assert!(client.get(url("https://example.com/slow")).await.is_err());

        let parts = ClientCodec.capture(&client, &CaptureConfig::default()).unwrap();
        let logged: serde_json::Value = serde_json::from_slice(&parts[0].payload).unwrap();
        assert_eq!(logged[0]["failure"], serde_json::json!({"kind": "transport", "reason": "timed out"}));
        assert!(logged[0].get("response").is_none());

        let replay = round_trip(&ClientCodec, &client);
        let err = replay.get(url("https://example.com/slow")).await.unwrap_err();
        assert_eq!(err.to_string(), "request to https://example.com/slow failed: timed out");
    }

    #[test]
    fn exchange_without_response_or_failure_is_corrupt() {
        let input = SerializedInput {
            type_name: HttpClient::NAME.to_string(),
            parts: vec![SerializedPart::json(
                "exchanges",
                &serde_json::json!([{
                    "request": {"method": "GET", "url": "https://example.com/", "headers": []},
                    "request_body": {"text": ""}
                }]),
                false,
            )
            .unwrap()],
        };
        assert!(matches!(
            ClientCodec.restore(&input),
            Err(SerializationError::CorruptFixture { .. })
        ));
    }

    #[test]
    fn client_capture_modes() {
        let saving = HttpClient::new(Arc::new(Fixed)).save_responses(true);
        let reject = CaptureConfig::builder().client_mode(ClientCaptureMode::Reject).build().unwrap();
        assert!(matches!(
            ClientCodec.capture(&saving, &reject),
            Err(SerializationError::NonCapturable { .. })
        ));

        let not_saving = HttpClient::new(Arc::new(Fixed));
        assert!(matches!(
            ClientCodec.capture(&not_saving, &CaptureConfig::default()),
            Err(SerializationError::NonCapturable { .. })
        ));
        assert!(ClientCodec.capture(&saving, &CaptureConfig::default()).is_ok());
    }
}
