use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use url::Url;

use crate::app_config::{AppConfigError, AppConfigSnapshot, ConfigStore};
use crate::endpoint::PreparedRequest;
use crate::transport::{Transport, TransportError, WebhookResponse};

/// One POST as seen by a test double.
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RecordedPost {
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
pub struct MockTransportState {
    pub responses: Mutex<VecDeque<StatusCode>>,
    pub posts: Mutex<Vec<RecordedPost>>,
}

impl MockTransportState {
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }
}

/// Answers with scripted statuses in order, then `200 ok` once the script runs out.
pub struct MockTransport {
    pub state: Arc<MockTransportState>,
}

impl MockTransport {
    pub fn new(responses: Vec<StatusCode>) -> (Self, Arc<MockTransportState>) {
        let state = Arc::new(MockTransportState {
            responses: Mutex::new(responses.into()),
            posts: Mutex::new(Vec::new()),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Transport for MockTransport {
    async fn post(
        &self,
        request: &PreparedRequest,
        body: Bytes,
    ) -> Result<WebhookResponse, TransportError> {
        self.state.posts.lock().unwrap().push(RecordedPost {
            url: request.url().clone(),
            content_type: request
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            body,
        });
        let status = self
            .state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StatusCode::OK);
        let body = if status == StatusCode::OK { "ok" } else { "no_service" };
        Ok(WebhookResponse::new(status, body))
    }
}

/// Shared in-memory application configurations; clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    configs: Arc<Mutex<HashMap<String, AppConfigSnapshot>>>,
    reads: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, key: &str, value: &str) {
        self.configs
            .lock()
            .unwrap()
            .entry(name.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ConfigStore for MemoryConfigStore {
    async fn snapshot(&self, name: &str) -> Result<AppConfigSnapshot, AppConfigError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppConfigError::Malformed {
                path: PathBuf::from(format!("memory/{name}")),
                detail: "injected failure".into(),
            });
        }
        Ok(self
            .configs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

pub type WebhookLog = Arc<Mutex<Vec<(String, RecordedPost)>>>;

/// Local stand-in for a Slack incoming web hook.
///
/// Records every request as `(path, post)` and answers with the scripted
/// statuses in order, falling back to `200 ok`. Returns the base URL.
pub async fn mock_webhook(statuses: Vec<StatusCode>) -> (Url, WebhookLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let log: WebhookLog = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(Mutex::new(VecDeque::from(statuses)));

    let log_clone = Arc::clone(&log);
    let base_clone = base.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let log = Arc::clone(&log_clone);
            let script = Arc::clone(&script);
            let base = base_clone.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    handle(req, base.clone(), Arc::clone(&log), Arc::clone(&script))
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (base, log)
}

async fn handle<B>(
    req: Request<B>,
    base: Url,
    log: WebhookLog,
    script: Arc<Mutex<VecDeque<StatusCode>>>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let path = req.uri().path().to_owned();
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    let url = base.join(path.trim_start_matches('/')).unwrap();
    log.lock().unwrap().push((
        path,
        RecordedPost {
            url,
            content_type,
            body,
        },
    ));

    let status = script.lock().unwrap().pop_front().unwrap_or(StatusCode::OK);
    let reply = if status == StatusCode::OK { "ok" } else { "no_service" };
    Ok(Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(reply.as_bytes())))
        .unwrap())
}

/// Bind to port 0 and return the OS-assigned port, then release it so
/// nothing is listening there.
pub async fn closed_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
