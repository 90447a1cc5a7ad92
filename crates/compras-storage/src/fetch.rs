//! Resilient JSON GET with bounded retries and endpoint-candidate fallback.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compras_core::RequestParams;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

const ERROR_BODY_LIMIT: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NotFound,
    Transient,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=299 => StatusClass::Success,
        404 => StatusClass::NotFound,
        429 | 500 | 502 | 503 | 504 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts per candidate, the first one included.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let exponent = u32::try_from(attempt_index).unwrap_or(u32::MAX);
        let multiplier = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A logical upstream endpoint and the concrete URLs that may serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Identifier used for archival, e.g. `modulo-arp/1_consultarARP`.
    pub name: String,
    pub candidates: Vec<String>,
}

impl Endpoint {
    /// Candidates are every base URL combined with every path, bases outermost.
    pub fn new(name: impl Into<String>, bases: &[String], paths: &[&str]) -> Self {
        let candidates = bases
            .iter()
            .flat_map(|base| {
                let base = base.trim().trim_end_matches('/').to_string();
                paths.iter().map(move |path| format!("{base}{path}"))
            })
            .collect();
        Self {
            name: name.into(),
            candidates,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: JsonValue,
    pub attempts: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("endpoint `{endpoint}` returned 404 at every candidate [{}]", tried.join(", "))]
    EndpointNotFound { endpoint: String, tried: Vec<String> },
    #[error("http status {status} for {url}: {body}")]
    UpstreamError { status: u16, url: String, body: String },
    #[error("upstream unavailable after {attempts} attempts for {url}: {last}")]
    UpstreamUnavailable {
        url: String,
        attempts: usize,
        last: String,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

/// Where the pagination driver gets its pages from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        params: &RequestParams,
    ) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug)]
pub struct ResilientFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
    resolved: Mutex<HashMap<String, usize>>,
}

impl ResilientFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
            resolved: Mutex::new(HashMap::new()),
        })
    }

    /// GETs `endpoint` with `params`, walking candidates on 404 and retrying
    /// transient failures on the same candidate. The candidate that answered
    /// is remembered for later calls to the same endpoint.
    pub async fn get_json(
        &self,
        endpoint: &Endpoint,
        params: &RequestParams,
    ) -> Result<FetchedPage, FetchError> {
        let span = info_span!("http_fetch", endpoint = %endpoint.name);
        let outcome: Result<FetchedPage, FetchError> = async {
            let start = self
                .resolved
                .lock()
                .await
                .get(&endpoint.name)
                .copied()
                .unwrap_or(0);

            let mut tried = Vec::new();
            for (index, url) in endpoint.candidates.iter().enumerate().skip(start) {
                match self.fetch_candidate(url, params).await? {
                    Some(page) => {
                        if index != start {
                            info!(url = %url, "resolved endpoint candidate");
                        }
                        self.resolved.lock().await.insert(endpoint.name.clone(), index);
                        return Ok(page);
                    }
                    None => {
                        warn!(url = %url, "candidate returned 404");
                        tried.push(url.clone());
                    }
                }
            }

            Err(FetchError::EndpointNotFound {
                endpoint: endpoint.name.clone(),
                tried,
            })
        }
        .instrument(span)
        .await;
        outcome
    }

    /// `Ok(None)` means the candidate answered 404.
    async fn fetch_candidate(
        &self,
        url: &str,
        params: &RequestParams,
    ) -> Result<Option<FetchedPage>, FetchError> {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            let result = self
                .client
                .get(url)
                .query(params.pairs())
                .header(ACCEPT, "application/json")
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    info!(attempt, status = status.as_u16(), url = %final_url, "http attempt");

                    match classify_status(status) {
                        // a body cut short or stalled past the timeout is
                        // a transport failure, retried like a 5xx
                        StatusClass::Success => match resp.bytes().await {
                            Ok(bytes) => {
                                let body = serde_json::from_slice(&bytes).map_err(|source| {
                                    FetchError::Decode {
                                        url: final_url.clone(),
                                        source,
                                    }
                                })?;
                                return Ok(Some(FetchedPage {
                                    url: final_url,
                                    status: status.as_u16(),
                                    body,
                                    attempts: attempt,
                                    fetched_at: Utc::now(),
                                }));
                            }
                            Err(err) => {
                                warn!(attempt, url, error = %err, "reading response body failed");
                                last_failure = format!("reading body: {err}");
                            }
                        },
                        StatusClass::NotFound => return Ok(None),
                        StatusClass::Transient => {
                            last_failure = format!("http status {status}");
                        }
                        StatusClass::Fatal => {
                            let mut body = resp.text().await.unwrap_or_default();
                            truncate_utf8(&mut body, ERROR_BODY_LIMIT);
                            return Err(FetchError::UpstreamError {
                                status: status.as_u16(),
                                url: final_url,
                                body,
                            });
                        }
                    }
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::NonRetryable {
                        return Err(FetchError::Request(err));
                    }
                    warn!(attempt, url, error = %err, "transport failure");
                    last_failure = err.to_string();
                }
            }

            if attempt < max_attempts {
                let delay = self.backoff.delay_for_attempt(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, url, "retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::UpstreamUnavailable {
            url: url.to_string(),
            attempts: max_attempts,
            last: last_failure,
        })
    }
}

#[async_trait]
impl PageSource for ResilientFetcher {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        params: &RequestParams,
    ) -> Result<FetchedPage, FetchError> {
        self.get_json(endpoint, params).await
    }
}

fn truncate_utf8(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
