use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::config::Config;
use crate::endpoint::PreparedRequest;

/// Longest response body excerpt kept for error logs.
const SUMMARY_MAX_CHARS: usize = 256;
/// Bytes of the response body retained while draining it; enough for
/// `SUMMARY_MAX_CHARS` of any UTF-8 text plus leading whitespace.
const EXCERPT_MAX_BYTES: usize = 4 * SUMMARY_MAX_CHARS + 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Status and a short excerpt of the body of a web-hook response.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub summary: String,
}

impl WebhookResponse {
    pub fn new(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            summary: summarize(body),
        }
    }
}

fn summarize(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

/// Leading bytes of a response body. Everything past the cap is discarded.
#[derive(Debug, Default)]
struct BodyExcerpt {
    bytes: Vec<u8>,
}

impl BodyExcerpt {
    fn push(&mut self, chunk: &[u8]) {
        let room = EXCERPT_MAX_BYTES.saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..room.min(chunk.len())]);
    }

    fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Sends one prepared POST and reads the response to completion, so the
/// underlying connection can go back to the pool.
pub trait Transport {
    fn post(
        &self,
        request: &PreparedRequest,
        body: Bytes,
    ) -> impl Future<Output = Result<WebhookResponse, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl From<&Config> for HttpSettings {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            pool_max_idle_per_host: config.pool_max_idle_per_host,
            pool_idle_timeout: config.pool_idle_timeout,
        }
    }
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn post(
        &self,
        request: &PreparedRequest,
        body: Bytes,
    ) -> Result<WebhookResponse, TransportError> {
        let mut resp = self
            .client
            .post(request.url().clone())
            .headers(request.headers().clone())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let mut excerpt = BodyExcerpt::default();
        while let Some(chunk) = resp.chunk().await? {
            excerpt.push(&chunk);
        }
        Ok(WebhookResponse::new(status, &excerpt.text()))
    }
}
