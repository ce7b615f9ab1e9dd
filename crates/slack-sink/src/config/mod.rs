use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::render::MessageFields;
use crate::schema::{Schema, SchemaError};

const DEFAULT_SCHEMA: &str = "message:rstring";
const DEFAULT_APP_CONFIG_DIR: &str = "/etc/slack-sink/app-config";
const DEFAULT_STAGE_NAME: &str = "slack-sink";
/// Slack accepts one message per second per web hook.
const MIN_RATE_LIMIT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SLACK_SINK_URL is not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("SLACK_SINK_RATE_LIMIT_MS must be at least {MIN_RATE_LIMIT_MS}, got {0}")]
    RateLimitTooLow(u64),

    #[error("SLACK_SINK_SCHEMA is invalid: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug)]
pub struct Config {
    /// Operator parameter `slackUrl`.
    pub slack_url: Option<Url>,
    /// Operator parameter `applicationConfigurationName`.
    pub app_config_name: Option<String>,
    pub app_config_dir: PathBuf,
    pub schema: Schema,
    /// Operator parameters `messageAttr`, `usernameAttr` and `iconUrlAttr`.
    pub message_fields: MessageFields,
    pub stage_name: String,
    pub rate_limit: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub retry_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("SLACK_SINK_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let slack_url = parse_url(vars)?;
        let app_config_name = non_empty(vars, "SLACK_SINK_APP_CONFIG_NAME");
        let app_config_dir = non_empty(vars, "SLACK_SINK_APP_CONFIG_DIR")
            .unwrap_or_else(|| DEFAULT_APP_CONFIG_DIR.to_owned())
            .into();
        let schema: Schema = non_empty(vars, "SLACK_SINK_SCHEMA")
            .as_deref()
            .unwrap_or(DEFAULT_SCHEMA)
            .parse()?;
        let message_fields = MessageFields {
            text: non_empty(vars, "SLACK_SINK_MESSAGE_ATTR"),
            username: non_empty(vars, "SLACK_SINK_USERNAME_ATTR"),
            icon_url: non_empty(vars, "SLACK_SINK_ICON_URL_ATTR"),
        };
        let stage_name = non_empty(vars, "SLACK_SINK_STAGE_NAME")
            .unwrap_or_else(|| DEFAULT_STAGE_NAME.to_owned());
        let rate_limit = parse_rate_limit(vars)?;
        let request_timeout = parse_duration_ms(vars, "SLACK_SINK_REQUEST_TIMEOUT_MS", 10_000)?;
        let connect_timeout = parse_duration_ms(vars, "SLACK_SINK_CONNECT_TIMEOUT_MS", 5000)?;
        let pool_max_idle_per_host = parse_usize(vars, "SLACK_SINK_POOL_MAX_IDLE_PER_HOST", 1000)?;
        let pool_idle_timeout = parse_duration_ms(vars, "SLACK_SINK_POOL_IDLE_TIMEOUT_MS", 30_000)?;
        let retry_interval = parse_duration_ms(vars, "SLACK_SINK_RETRY_INTERVAL_MS", 1000)?;

        Ok(Self {
            slack_url,
            app_config_name,
            app_config_dir,
            schema,
            message_fields,
            stage_name,
            rate_limit,
            request_timeout,
            connect_timeout,
            pool_max_idle_per_host,
            pool_idle_timeout,
            retry_interval,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|s| !s.is_empty()).cloned()
}

fn parse_url(vars: &HashMap<String, String>) -> Result<Option<Url>, ConfigError> {
    non_empty(vars, "SLACK_SINK_URL")
        .map(|raw| Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw)))
        .transpose()
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_rate_limit(vars: &HashMap<String, String>) -> Result<Duration, ConfigError> {
    let rate_limit = parse_duration_ms(vars, "SLACK_SINK_RATE_LIMIT_MS", MIN_RATE_LIMIT_MS)?;
    if rate_limit < Duration::from_millis(MIN_RATE_LIMIT_MS) {
        return Err(ConfigError::RateLimitTooLow(rate_limit.as_millis() as u64));
    }
    Ok(rate_limit)
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

#[cfg(test)]
mod tests;
