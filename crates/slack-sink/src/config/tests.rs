use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::*;
use crate::render::MessageFields;
use crate::schema::AttrType;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn applies_defaults() {
    let config = Config::parse(&vars(&[])).unwrap();
    assert!(config.slack_url.is_none());
    assert!(config.app_config_name.is_none());
    assert_eq!(config.app_config_dir, Path::new("/etc/slack-sink/app-config"));
    assert_eq!(config.stage_name, "slack-sink");
    assert_eq!(config.schema.len(), 1);
    assert_eq!(config.schema.attribute(0).unwrap().name, "message");
    assert_eq!(config.rate_limit, Duration::from_secs(1));
    assert_eq!(config.request_timeout, Duration::from_secs(10));
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.pool_max_idle_per_host, 1000);
    assert_eq!(config.pool_idle_timeout, Duration::from_secs(30));
    assert_eq!(config.retry_interval, Duration::from_secs(1));
    assert_eq!(config.message_fields, MessageFields::default());
}

#[test]
fn parses_url_and_app_config_name() {
    let config = Config::parse(&vars(&[
        ("SLACK_SINK_URL", "https://hooks.slack.com/services/T0/B0/abc"),
        ("SLACK_SINK_APP_CONFIG_NAME", "slack"),
        ("SLACK_SINK_APP_CONFIG_DIR", "/tmp/app-config"),
    ]))
    .unwrap();
    let url = config.slack_url.unwrap();
    assert_eq!(url.scheme(), "https");
    assert_eq!(url.host_str(), Some("hooks.slack.com"));
    assert_eq!(config.app_config_name.as_deref(), Some("slack"));
    assert_eq!(config.app_config_dir, Path::new("/tmp/app-config"));
}

#[test]
fn empty_values_count_as_absent() {
    let config = Config::parse(&vars(&[
        ("SLACK_SINK_URL", ""),
        ("SLACK_SINK_APP_CONFIG_NAME", ""),
        ("SLACK_SINK_SCHEMA", ""),
    ]))
    .unwrap();
    assert!(config.slack_url.is_none());
    assert!(config.app_config_name.is_none());
    assert_eq!(config.schema.attribute(0).unwrap().name, "message");
}

#[test]
fn rejects_invalid_url() {
    let err = Config::parse(&vars(&[("SLACK_SINK_URL", "not a url")])).unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidUrl(raw) if raw == "not a url"),
        "should reject invalid URL"
    );
}

#[test]
fn parses_custom_schema() {
    let config = Config::parse(&vars(&[("SLACK_SINK_SCHEMA", "text:ustring,level:int32")])).unwrap();
    assert_eq!(config.schema.len(), 2);
    assert_eq!(config.schema.attribute(0).unwrap().ty, AttrType::UString);
}

#[test]
fn rejects_invalid_schema() {
    let err = Config::parse(&vars(&[("SLACK_SINK_SCHEMA", "text:blob")])).unwrap_err();
    assert!(matches!(err, ConfigError::Schema(SchemaError::UnknownType(_))));
}

#[test]
fn overrides_timings_and_pool() {
    let config = Config::parse(&vars(&[
        ("SLACK_SINK_RATE_LIMIT_MS", "2500"),
        ("SLACK_SINK_REQUEST_TIMEOUT_MS", "2000"),
        ("SLACK_SINK_CONNECT_TIMEOUT_MS", "500"),
        ("SLACK_SINK_POOL_MAX_IDLE_PER_HOST", "8"),
        ("SLACK_SINK_POOL_IDLE_TIMEOUT_MS", "1000"),
        ("SLACK_SINK_RETRY_INTERVAL_MS", "0"),
        ("SLACK_SINK_STAGE_NAME", "alerts"),
    ]))
    .unwrap();
    assert_eq!(config.rate_limit, Duration::from_millis(2500));
    assert_eq!(config.request_timeout, Duration::from_millis(2000));
    assert_eq!(config.connect_timeout, Duration::from_millis(500));
    assert_eq!(config.pool_max_idle_per_host, 8);
    assert_eq!(config.pool_idle_timeout, Duration::from_millis(1000));
    assert_eq!(config.retry_interval, Duration::ZERO);
    assert_eq!(config.stage_name, "alerts");
}

#[test]
fn rejects_non_numeric_values() {
    for name in [
        "SLACK_SINK_RATE_LIMIT_MS",
        "SLACK_SINK_REQUEST_TIMEOUT_MS",
        "SLACK_SINK_POOL_MAX_IDLE_PER_HOST",
        "SLACK_SINK_RETRY_INTERVAL_MS",
    ] {
        let err = Config::parse(&vars(&[(name, "soon")])).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidNumeric(n, v) if n == name && v == "soon"),
            "{name} should reject non-numeric value, got {err}"
        );
    }
}

#[test]
fn rate_limit_cannot_go_below_one_second() {
    for value in ["0", "999"] {
        let err = Config::parse(&vars(&[("SLACK_SINK_RATE_LIMIT_MS", value)])).unwrap_err();
        assert!(
            matches!(err, ConfigError::RateLimitTooLow(ms) if ms.to_string() == value),
            "{value} should be rejected, got {err}"
        );
    }

    let config = Config::parse(&vars(&[("SLACK_SINK_RATE_LIMIT_MS", "1000")])).unwrap();
    assert_eq!(config.rate_limit, Duration::from_secs(1));
}

#[test]
fn parses_message_field_mappings() {
    let config = Config::parse(&vars(&[
        ("SLACK_SINK_SCHEMA", "message:rstring,sender:rstring,avatar:rstring"),
        ("SLACK_SINK_MESSAGE_ATTR", "message"),
        ("SLACK_SINK_USERNAME_ATTR", "sender"),
        ("SLACK_SINK_ICON_URL_ATTR", ""),
    ]))
    .unwrap();
    assert_eq!(
        config.message_fields,
        MessageFields {
            text: Some("message".into()),
            username: Some("sender".into()),
            icon_url: None,
        }
    );
}
