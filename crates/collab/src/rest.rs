//! REST implementation of [`TurnReasoner`] and [`Summarizer`].
//!
//! `RestCollaborator` wraps a `reqwest::Client` and translates each trait
//! method into the corresponding HTTP call, with automatic retry +
//! exponential back-off on transient (5xx / timeout) failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use uuid::Uuid;

use cs_domain::config::CollabConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;

use crate::provider::{Summarizer, TurnReasoner};
use crate::types::{Decision, SummaryRequest, SummaryResponse, TurnContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for the collaborator services.
///
/// Created once and reused for the lifetime of the process. The
/// underlying `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestCollaborator {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl RestCollaborator {
    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a new client from the shared `CollabConfig`.
    pub fn new(cfg: &CollabConfig) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let base_url = cfg.base_url.trim_end_matches('/').to_owned();

        Ok(Self {
            http,
            base_url,
            api_key: cfg.api_key.clone(),
            timeout,
            max_retries: cfg.max_retries,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    /// Decorate a `RequestBuilder` with the standard headers.
    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let trace_id = Uuid::new_v4().to_string();
        let mut rb = rb
            .header("X-Client-Type", "callsign")
            .header("X-Trace-Id", &trace_id);

        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }
        rb
    }

    /// Build the full URL for a path like `/v1/decide`.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient errors.
    ///
    /// * Retries on 5xx status codes and on timeouts.
    /// * Does **not** retry on 4xx (client errors are permanent).
    /// * Emits a `TraceEvent::CollaboratorCall` after every attempt.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let rb = self.decorate(build_request());
            let result = rb.send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    TraceEvent::CollaboratorCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    if resp.status().is_server_error() {
                        // 5xx, transient, retry
                        let body = resp.text().await.unwrap_or_default();
                        tracing::warn!(endpoint, attempt, status, "collaborator returned 5xx");
                        last_err = Some(Error::Collaborator {
                            endpoint: endpoint.to_owned(),
                            message: format!("returned {status}: {body}"),
                        });
                        continue;
                    }

                    if resp.status().is_client_error() {
                        // 4xx, permanent, do NOT retry
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Collaborator {
                            endpoint: endpoint.to_owned(),
                            message: format!("returned {status}: {body}"),
                        });
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);

                    TraceEvent::CollaboratorCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    tracing::warn!(endpoint, attempt, error = %e, "collaborator call failed");
                    last_err = Some(from_reqwest(e));
                    // Timeouts and connection errors are transient, retry
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Collaborator {
            endpoint: endpoint.to_owned(),
            message: "all retries exhausted".into(),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl TurnReasoner for RestCollaborator {
    async fn decide(&self, ctx: TurnContext) -> Result<Decision> {
        let url = self.url("/v1/decide");
        let resp = self
            .execute_with_retry("POST /v1/decide", || self.http.post(&url).json(&ctx))
            .await?;

        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body).map_err(|e| Error::Collaborator {
            endpoint: "POST /v1/decide".into(),
            message: format!("failed to parse decision: {e}: {body}"),
        })
    }
}

#[async_trait]
impl Summarizer for RestCollaborator {
    async fn summarize(&self, req: SummaryRequest) -> Result<String> {
        let url = self.url("/v1/summarize");
        let resp = self
            .execute_with_retry("POST /v1/summarize", || self.http.post(&url).json(&req))
            .await?;

        let body = resp.text().await.map_err(from_reqwest)?;
        let parsed: SummaryResponse =
            serde_json::from_str(&body).map_err(|e| Error::Collaborator {
                endpoint: "POST /v1/summarize".into(),
                message: format!("failed to parse summary: {e}: {body}"),
            })?;
        Ok(parsed.summary)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain `Error`.
///
/// Timeout errors become `Error::Timeout`; everything else becomes
/// `Error::Http`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
