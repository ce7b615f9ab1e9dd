use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use thiserror::Error;
use tracing::warn;

/// Immutable copy of a named application configuration.
pub type AppConfigSnapshot = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to read application configuration {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("application configuration {path} is not a JSON object: {detail}")]
    Malformed { path: PathBuf, detail: String },
}

/// Source of named key-value application configurations.
///
/// Every call returns a fresh, atomic snapshot; an unknown name yields an
/// empty map rather than an error.
pub trait ConfigStore {
    fn snapshot(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<AppConfigSnapshot, AppConfigError>> + Send;
}

/// Application configurations stored as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl ConfigStore for FileConfigStore {
    async fn snapshot(&self, name: &str) -> Result<AppConfigSnapshot, AppConfigError> {
        let path = self.path_for(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AppConfigSnapshot::new()),
            Err(source) => return Err(AppConfigError::Read { path, source }),
        };
        parse_snapshot(&path, &raw)
    }
}

fn parse_snapshot(path: &Path, raw: &str) -> Result<AppConfigSnapshot, AppConfigError> {
    let malformed = |detail: String| AppConfigError::Malformed {
        path: path.to_owned(),
        detail,
    };

    let json: Json = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    let object = match json {
        Json::Object(object) => object,
        other => return Err(malformed(format!("found {other}"))),
    };

    let mut snapshot = AppConfigSnapshot::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Json::String(s) => {
                snapshot.insert(key, s);
            }
            other => warn!(
                path = %path.display(),
                key = %key,
                value = %other,
                "ignoring non-string application configuration value"
            ),
        }
    }
    Ok(snapshot)
}
