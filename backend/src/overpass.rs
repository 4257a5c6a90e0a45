use std::{sync::Arc, thread, time::Duration};

use thiserror::Error;

use crate::{
    cache::QueryCache,
    models::{OverpassResponse, ResampledPath},
    query::build_query,
    rules::FeatureRuleTable,
    transport::{OverpassTransport, TransportError, TransportResponse},
};

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// A failed attempt that is worth repeating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("rate limited (HTTP 429)")]
    TooManyRequests,
    #[error("gateway timeout (HTTP 504)")]
    GatewayTimeout,
    #[error("bad request (HTTP 400): {}", messages.join("; "))]
    BadRequest { messages: Vec<String> },
}

#[derive(Debug, Error)]
pub enum OverpassError {
    #[error("overpass request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("overpass answered with unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("overpass rejected the query: {}", messages.join("; "))]
    BadRequest { messages: Vec<String> },
    #[error("gave up after {attempts} attempts: {}", summarize(failures))]
    MaxRetriesExceeded {
        attempts: usize,
        failures: Vec<AttemptFailure>,
    },
    #[error("feature rules produce an empty query")]
    EmptyQuery,
}

fn summarize(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    /// Server-side timeout written into the query.
    pub query_timeout: Duration,
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// Treat HTTP 400 as transient. Overpass uses 400 for query syntax
    /// errors, so this is off unless explicitly wanted.
    pub retry_on_bad_request: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            query_timeout: Duration::from_secs(180),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            retry_on_bad_request: false,
        }
    }
}

/// What one HTTP exchange means for the retry loop.
#[derive(Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Vec<u8>),
    Retry(AttemptFailure),
    Fatal { status: u16, messages: Vec<String>, body: String },
}

pub fn classify_response(response: TransportResponse, retry_on_bad_request: bool) -> AttemptOutcome {
    match response.status {
        200..=299 => AttemptOutcome::Success(response.body),
        429 => AttemptOutcome::Retry(AttemptFailure::TooManyRequests),
        504 => AttemptOutcome::Retry(AttemptFailure::GatewayTimeout),
        400 => {
            let messages = extract_error_messages(&response.body);
            if retry_on_bad_request {
                AttemptOutcome::Retry(AttemptFailure::BadRequest { messages })
            } else {
                AttemptOutcome::Fatal {
                    status: 400,
                    messages,
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                }
            }
        }
        status => AttemptOutcome::Fatal {
            status,
            messages: Vec::new(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        },
    }
}

/// Pulls the `Error</strong>: ...` paragraphs out of an Overpass HTML error
/// page, with inner markup removed.
pub fn extract_error_messages(body: &[u8]) -> Vec<String> {
    const MARKER: &str = "Error</strong>:";

    let text = String::from_utf8_lossy(body);
    text.split(MARKER)
        .skip(1)
        .map(|chunk| {
            let message = chunk.split("</p>").next().unwrap_or(chunk);
            strip_tags(message).trim().to_string()
        })
        .filter(|message| !message.is_empty())
        .collect()
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Cache-first client for corridor queries against an Overpass endpoint.
pub struct OverpassGateway<T: OverpassTransport> {
    transport: T,
    cache: QueryCache,
    rules: Arc<FeatureRuleTable>,
    config: GatewayConfig,
}

impl<T: OverpassTransport> OverpassGateway<T> {
    pub fn new(
        transport: T,
        cache: QueryCache,
        rules: Arc<FeatureRuleTable>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            rules,
            config,
        }
    }

    pub fn rules(&self) -> &FeatureRuleTable {
        &self.rules
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Raw Overpass JSON for everything within `radius_m` of `path`.
    ///
    /// Served from the cache when today's entry for the same path, rules and
    /// radius exists. Cache faults, including entries that no longer parse,
    /// only cost a live query. Only bodies that parse as an Overpass JSON
    /// document are cached.
    pub fn query(&self, path: &ResampledPath, radius_m: f64) -> Result<Vec<u8>, OverpassError> {
        let key = QueryCache::make_key(&path.points, self.rules.config_hash(), radius_m);
        if let Some(bytes) = self.cache.get(&key) {
            match parse_document(&bytes) {
                Ok(()) => {
                    tracing::info!("using cached overpass result {}", key);
                    return Ok(bytes);
                }
                Err(err) => tracing::warn!("ignoring unreadable cache entry {}: {}", key, err),
            }
        }

        let query = build_query(
            &self.rules,
            &path.points,
            radius_m,
            self.config.query_timeout.as_secs(),
        )
        .ok_or(OverpassError::EmptyQuery)?;
        tracing::info!(
            "querying overpass for {} path points within {} m",
            path.points.len(),
            radius_m
        );
        tracing::debug!("overpass query:\n{}", query);

        let body = self.send_with_retry(&query)?;
        match parse_document(&body) {
            Ok(()) => {
                if let Err(err) = self.cache.put(&key, &body) {
                    tracing::warn!("could not cache overpass result: {}", err);
                }
            }
            Err(err) => tracing::warn!("not caching overpass result that is not JSON: {}", err),
        }
        Ok(body)
    }

    /// Posts `query`, repeating on retryable failures until the budget is
    /// spent. Blocks through the retry delays.
    pub fn send_with_retry(&self, query: &str) -> Result<Vec<u8>, OverpassError> {
        let mut failures = Vec::new();
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                thread::sleep(self.config.retry_delay);
            }

            let response = self.transport.post_query(&self.config.endpoint, query)?;
            match classify_response(response, self.config.retry_on_bad_request) {
                AttemptOutcome::Success(body) => return Ok(body),
                AttemptOutcome::Retry(failure) => {
                    tracing::warn!(
                        "overpass attempt {}/{} failed: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        failure
                    );
                    failures.push(failure);
                }
                AttemptOutcome::Fatal {
                    status: 400,
                    messages,
                    ..
                } => return Err(OverpassError::BadRequest { messages }),
                AttemptOutcome::Fatal { status, body, .. } => {
                    return Err(OverpassError::UnexpectedStatus { status, body })
                }
            }
        }

        Err(OverpassError::MaxRetriesExceeded {
            attempts: failures.len(),
            failures,
        })
    }
}

fn parse_document(body: &[u8]) -> Result<(), serde_json::Error> {
    serde_json::from_slice::<OverpassResponse>(body).map(|_| ())
}
