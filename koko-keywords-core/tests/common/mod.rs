//! Test helpers shared across the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use koko_keywords_core::catalog::{CatalogSource, Dataset, KeywordEntry};
use koko_keywords_core::credential::Credential;
use koko_keywords_core::{Filter, KeywordMatcher, KeywordsConfig, KeywordsError};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const CREDENTIAL: &str = "client:secret";

/// `base64("client:secret")`
pub const BASIC_AUTH: &str = "Basic Y2xpZW50OnNlY3JldA==";

pub const ENDPOINT: &str = "https://catalog.test/keywords";

pub fn entries() -> Vec<KeywordEntry> {
    vec![
        KeywordEntry::new("sewerslide", "self-harm").with_locale("en"),
        KeywordEntry::new("kms", "self-harm").with_attribute("severity", "high"),
        KeywordEntry::new("breathing exercise", "wellness"),
    ]
}

/// Two catalog versions; the later one is "latest"
pub fn datasets() -> Vec<Dataset> {
    vec![
        Dataset::new("20220101", vec![KeywordEntry::new("kms", "self-harm")]),
        Dataset::new("20220206", entries()),
    ]
}

/// Catalog service body for version 20220206
pub fn catalog_body(version: &str) -> String {
    serde_json::json!({
        "version": version,
        "keywords": [
            {"keyword": "sewerslide", "category": "self-harm", "locale": "en"},
            {"keyword": "kms", "category": "self-harm", "attributes": {"severity": "high"}},
            {"phrase": "breathing exercise", "category": "wellness"}
        ]
    })
    .to_string()
}

/// Body in the regex shape the hosted service answers with
pub fn regex_catalog_body(version: &str) -> String {
    serde_json::json!({
        "version": version,
        "regex": {"keywords": ["sewer.?slide", "\\bkms\\b"], "preprocess": "\\s"}
    })
    .to_string()
}

/// Config with the test credential and no durable copy
pub fn config() -> KeywordsConfig {
    KeywordsConfig::new(ENDPOINT)
        .with_credential(CREDENTIAL)
        .without_disk_cache()
}

/// Config with the test credential and the durable copy under `dir`
pub fn config_in(dir: &Path) -> KeywordsConfig {
    KeywordsConfig::new(ENDPOINT)
        .with_credential(CREDENTIAL)
        .with_cache_dir(dir)
}

pub fn matcher_with(source: Arc<dyn CatalogSource>, config: &KeywordsConfig) -> KeywordMatcher {
    KeywordMatcher::with_source(source, config)
}

/// Catalog source that plays back a script of outcomes
///
/// Each fetch pops the next outcome; once the script is exhausted every
/// fetch fails with a refresh error.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Dataset, KeywordsError>>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Dataset, KeywordsError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            latency: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch(
        &self,
        _credential: &Credential,
        _version: Option<&str>,
        _filter: Option<&Filter>,
    ) -> Result<Dataset, KeywordsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut dataset)) => {
                dataset.fetched_at = chrono::Utc::now();
                Ok(dataset)
            }
            Some(Err(e)) => Err(e),
            None => Err(KeywordsError::refresh_msg("catalog service unavailable")),
        }
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

/// Canned HTTP answer
#[derive(Debug, Clone)]
pub enum StubReply {
    Respond { status: u16, body: String },
    /// Accept the connection and never answer
    Hang,
}

impl StubReply {
    pub fn ok(body: impl Into<String>) -> Self {
        StubReply::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        StubReply::Respond {
            status,
            body: String::new(),
        }
    }
}

/// Minimal HTTP/1.1 catalog service stub on a loopback port
///
/// Runs on its own thread, independent of any Tokio runtime, and answers
/// every request with the same reply.
pub struct StubServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// e.g. `GET /keywords?version=20220206 HTTP/1.1`
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl StubServer {
    pub fn start(reply: StubReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                recorded.lock().unwrap().push(request);

                match &reply {
                    StubReply::Hang => {
                        // Keep the socket open past any client timeout
                        std::thread::spawn(move || {
                            std::thread::sleep(Duration::from_secs(30));
                            drop(stream);
                        });
                    }
                    StubReply::Respond { status, body } => {
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason(*status),
                            body.len(),
                            body
                        );
                        let _ = stream.write_all(response.as_bytes());
                        let _ = stream.flush();
                    }
                }
            }
        });

        Self { port, requests }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/keywords", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Some(RecordedRequest {
        request_line: request_line.trim_end().to_string(),
        headers,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
