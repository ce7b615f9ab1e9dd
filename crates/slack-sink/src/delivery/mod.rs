use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, trace};
use url::Url;

use crate::app_config::{AppConfigError, ConfigStore};
use crate::config::Config;
use crate::endpoint::{EndpointError, EndpointResolver, redact};
use crate::render::{MessageFields, RenderMode};
use crate::schema::{Schema, SchemaError};
use crate::transport::{Transport, TransportError};
use crate::tuple::BatchQueue;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("unsupported input schema: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    AppConfig(#[from] AppConfigError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the host hands the stage at startup.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub name: String,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub slack_url: Option<Url>,
    pub app_config_name: Option<String>,
    pub message_fields: MessageFields,
    pub rate_limit: Duration,
}

impl From<&Config> for SinkOptions {
    fn from(config: &Config) -> Self {
        Self {
            slack_url: config.slack_url.clone(),
            app_config_name: config.app_config_name.clone(),
            message_fields: config.message_fields.clone(),
            rate_limit: config.rate_limit,
        }
    }
}

/// Result of one [`SlackSink::deliver`] call. The host keeps going after
/// every outcome; only `Acked` advances the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The queue was empty.
    Idle,
    /// 200 received, head removed, rate-limit pause taken.
    Acked,
    /// Web hook answered with a non-200 status; head kept.
    Rejected { status: StatusCode },
    /// Nothing was acknowledged (no URL, unrenderable tuple or transport failure); head kept.
    Failed,
}

/// Forwards the head of an upstream batch queue to a Slack incoming web hook.
///
/// One instance is one logical worker. `deliver` takes `&mut self` and must be
/// awaited to completion before the next call, which gives strict FIFO order
/// and keeps the endpoint state free of locking.
pub struct SlackSink<T: Transport, S: ConfigStore> {
    name: String,
    mode: RenderMode,
    resolver: EndpointResolver<S>,
    transport: T,
    rate_limit: Duration,
}

impl<T: Transport, S: ConfigStore> SlackSink<T, S> {
    /// Fetch the application configuration, make sure some URL is available
    /// and classify the input schema. Any failure aborts startup.
    pub async fn initialize(
        context: &StageContext,
        options: SinkOptions,
        store: S,
        transport: T,
    ) -> Result<Self, InitError> {
        trace!(stage = %context.name, "stage initializing");

        let mut resolver = EndpointResolver::new(options.slack_url, options.app_config_name, store);
        resolver.refresh_config().await?;
        resolver.resolve_and_prepare()?;

        let mode = RenderMode::classify(&context.schema, &options.message_fields)?;
        debug!(
            stage = %context.name,
            mode = mode.name(),
            schema = %context.schema,
            "schema classified"
        );

        Ok(Self {
            name: context.name.clone(),
            mode,
            resolver,
            transport,
            rate_limit: options.rate_limit,
        })
    }

    pub fn mode(&self) -> &RenderMode {
        &self.mode
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.resolver.current_url()
    }

    /// Try to deliver the head of `batch`.
    ///
    /// The head is removed only after a 200 response, followed by the
    /// rate-limit pause. Any other response leaves it in place for the next
    /// call; a 404 additionally re-reads the application configuration in
    /// case the web-hook URL was rotated.
    pub async fn deliver<Q: BatchQueue>(&mut self, batch: &mut Q) -> DeliveryOutcome {
        let Some(head) = batch.peek() else {
            return DeliveryOutcome::Idle;
        };

        let prepared = match self.resolver.resolve_and_prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(stage = %self.name, error = %e, "no usable web-hook URL");
                return DeliveryOutcome::Failed;
            }
        };

        let body = match self.mode.render(head.tuple()) {
            Ok(body) => body,
            Err(e) => {
                error!(stage = %self.name, error = %e, "failed to render tuple");
                return DeliveryOutcome::Failed;
            }
        };

        let url = redact(prepared.url());
        let response = match self.transport.post(prepared, body).await {
            Ok(response) => response,
            Err(e) => {
                error!(stage = %self.name, url = %url, error = %e, "web-hook request failed");
                return DeliveryOutcome::Failed;
            }
        };

        if response.status == StatusCode::OK {
            batch.remove();
            debug!(stage = %self.name, url = %url, "message delivered");
            tokio::time::sleep(self.rate_limit).await;
            return DeliveryOutcome::Acked;
        }

        error!(
            stage = %self.name,
            url = %url,
            status = %response.status,
            response = %response.summary,
            "web hook rejected message"
        );
        if response.status == StatusCode::NOT_FOUND {
            self.refresh_after_not_found().await;
        }
        DeliveryOutcome::Rejected {
            status: response.status,
        }
    }

    /// A failed refresh keeps the previous snapshot.
    async fn refresh_after_not_found(&mut self) {
        if let Err(e) = self.resolver.refresh_config().await {
            error!(stage = %self.name, error = %e, "failed to refresh application configuration");
        }
    }

    /// Release the HTTP client. Queued tuples belong to the upstream and are left alone.
    pub fn shutdown(self) {
        trace!(stage = %self.name, "stage shutting down");
    }
}
