use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::app_config::{AppConfigError, AppConfigSnapshot, ConfigStore};

/// Application-configuration key (and operator parameter) holding the web-hook URL.
pub const SLACK_URL_KEY: &str = "slackUrl";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("slackUrl not found in application configuration or operator parameters")]
    UrlMissing,

    #[error("slackUrl from application configuration is not a valid URL: {0}")]
    InvalidUrl(String),
}

/// POST template for the current web-hook URL.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    url: Url,
    headers: HeaderMap,
}

impl PreparedRequest {
    pub fn new(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { url, headers }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Tracks where deliveries go.
///
/// The effective URL is the `slackUrl` entry of the cached application
/// configuration when present, otherwise the operator parameter. The cache
/// is only replaced by [`refresh_config`](Self::refresh_config).
///
/// Not synchronised: the delivery loop is the only caller and calls serially.
pub struct EndpointResolver<S: ConfigStore> {
    static_url: Option<Url>,
    app_config_name: Option<String>,
    store: S,
    app_cache: AppConfigSnapshot,
    prepared: Option<PreparedRequest>,
}

impl<S: ConfigStore> EndpointResolver<S> {
    pub fn new(static_url: Option<Url>, app_config_name: Option<String>, store: S) -> Self {
        Self {
            static_url,
            app_config_name,
            store,
            app_cache: AppConfigSnapshot::new(),
            prepared: None,
        }
    }

    /// Replace the cached application configuration with a fresh snapshot,
    /// or with an empty map when no configuration name is set.
    pub async fn refresh_config(&mut self) -> Result<(), AppConfigError> {
        self.app_cache = match &self.app_config_name {
            Some(name) => self.store.snapshot(name).await?,
            None => AppConfigSnapshot::new(),
        };
        debug!(
            entries = self.app_cache.len(),
            "application configuration refreshed"
        );
        Ok(())
    }

    /// Determine the effective URL and rebuild the prepared request if it changed.
    pub fn resolve_and_prepare(&mut self) -> Result<&PreparedRequest, EndpointError> {
        let url = self.effective_url()?;

        let unchanged = self.prepared.as_ref().is_some_and(|p| p.url == url);
        if !unchanged {
            debug!(url = %redact(&url), "web-hook URL changed, preparing request");
        }
        let prepared = match self.prepared.take() {
            Some(p) if unchanged => p,
            _ => PreparedRequest::new(url),
        };
        Ok(&*self.prepared.insert(prepared))
    }

    /// The URL the last successful [`resolve_and_prepare`](Self::resolve_and_prepare) settled on.
    pub fn current_url(&self) -> Option<&Url> {
        self.prepared.as_ref().map(|p| &p.url)
    }

    fn effective_url(&self) -> Result<Url, EndpointError> {
        match self.app_cache.get(SLACK_URL_KEY) {
            Some(raw) => Url::parse(raw).map_err(|_| EndpointError::InvalidUrl(raw.clone())),
            None => self.static_url.clone().ok_or(EndpointError::UrlMissing),
        }
    }
}

/// The web-hook path embeds its secret; keep only scheme and host in logs.
pub fn redact(url: &Url) -> String {
    format!("{}://{}/…", url.scheme(), url.host_str().unwrap_or_default())
}
