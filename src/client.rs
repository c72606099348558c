use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::generator::{SearchClient, SearchTrafficGenerator};
use crate::terms::TermSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain HTTP implementation of [`SearchClient`] for one-off runs outside the
/// load-testing framework.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    base: Url,
}

impl HttpSearchClient {
    pub fn new(host: &str) -> Result<Self> {
        let base = parse_host(host)?;
        let client = Client::builder()
            .user_agent(concat!("searchload/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

/// Validate that `host` is an absolute http(s) URL.
pub fn parse_host(host: &str) -> Result<Url> {
    let url = Url::parse(host).with_context(|| format!("invalid target host {host}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("target host {host} must use http or https");
    }
    if url.host_str().is_none() {
        bail!("target host {host} has no host component");
    }
    Ok(url)
}

/// Status and timing for one request sent by [`HttpSearchClient`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub path: String,
    pub label: String,
    pub status: u16,
    pub latency_ms: u64,
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    type Outcome = Result<SearchOutcome>;

    async fn send_get(&mut self, path: &str, label: &str) -> Result<SearchOutcome> {
        let url = self
            .base
            .join(path)
            .with_context(|| format!("invalid request path {path}"))?;
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to reach search endpoint {url}"))?;
        let status = response.status().as_u16();
        response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;

        Ok(SearchOutcome {
            path: path.to_string(),
            label: label.to_string(),
            status,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Tally of a smoke run, keyed by HTTP status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SmokeSummary {
    pub sent: usize,
    pub succeeded: usize,
    pub errors: usize,
    pub statuses: BTreeMap<u16, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

impl SmokeSummary {
    fn record(&mut self, outcome: &Result<SearchOutcome>) {
        self.sent += 1;
        match outcome {
            Ok(outcome) => {
                *self.statuses.entry(outcome.status).or_default() += 1;
                if outcome.is_success() {
                    self.succeeded += 1;
                }
                self.max_latency_ms = Some(
                    self.max_latency_ms
                        .map_or(outcome.latency_ms, |max| max.max(outcome.latency_ms)),
                );
            }
            Err(_) => self.errors += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.sent - self.succeeded
    }
}

/// Send `count` generated requests back to back through `client`.
pub async fn run_smoke<S>(
    generator: &SearchTrafficGenerator,
    client: &mut HttpSearchClient,
    source: &mut S,
    count: usize,
) -> SmokeSummary
where
    S: TermSource + Send,
{
    let mut summary = SmokeSummary::default();
    for _ in 0..count {
        let outcome = generator.generate_request(client, source).await;
        match &outcome {
            Ok(result) if result.is_success() => {
                info!(path = %result.path, status = result.status, latency_ms = result.latency_ms, "search ok");
            }
            Ok(result) => {
                warn!(path = %result.path, status = result.status, "search returned non-success status");
            }
            Err(err) => {
                warn!(error = %err, "search request failed");
            }
        }
        summary.record(&outcome);
    }
    summary
}
