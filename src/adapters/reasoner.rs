//! Reasoning service adapters.
//!
//! [`HttpReasoningService`] speaks to the external deterministic reasoner
//! over HTTP with retry on transient failures. [`ScriptedReasoningService`]
//! is an in-memory fake for tests and offline runs: it answers from a fixed
//! script keyed by domain.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::reasoning::{ReasoningService, SolveResponse};

/// Retry policy shared by the HTTP adapter: exponential backoff between
/// attempts, capped.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let backoff = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff)
    }
}

/// HTTP adapter for the reasoning service.
pub struct HttpReasoningService {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpReasoningService {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    async fn solve_once(
        &self,
        domain: &str,
        payload: &serde_json::Value,
    ) -> CoreResult<SolveResponse> {
        let url = format!("{}/solve/{domain}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::transport(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::transport(&format!("HTTP {status}: {body}")));
        }
        response
            .json::<SolveResponse>()
            .await
            .map_err(|e| CoreError::SchemaInvalid(e.to_string()))
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    async fn solve(&self, domain: &str, payload: &serde_json::Value) -> CoreResult<SolveResponse> {
        let mut last_err = None;
        for attempt in 0..=self.retry.max_retries {
            match self.solve_once(domain, payload).await {
                Ok(response) => return Ok(response),
                // Schema errors are permanent; retrying cannot help.
                Err(err @ CoreError::SchemaInvalid(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "reasoner solve attempt failed");
                    last_err = Some(err);
                    if attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CoreError::transport("reasoner unreachable")))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(
            self.client.get(&url).send().await,
            Ok(response) if response.status().is_success()
        )
    }
}

/// Deterministic in-memory reasoner for tests and offline runs.
///
/// Answers are keyed by domain; unknown domains report no solution.
pub struct ScriptedReasoningService {
    responses: HashMap<String, SolveResponse>,
    available: bool,
}

impl ScriptedReasoningService {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            available: true,
        }
    }

    /// Script a response for a domain.
    pub fn with_response(mut self, domain: impl Into<String>, response: SolveResponse) -> Self {
        self.responses.insert(domain.into(), response);
        self
    }

    /// Script a single-step solution path for a domain.
    pub fn with_solution(self, domain: impl Into<String>, step: impl Into<String>) -> Self {
        self.with_response(
            domain,
            SolveResponse {
                solution_found: true,
                solution_path: vec![step.into()],
                duration_ms: 1,
                ..SolveResponse::default()
            },
        )
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

impl Default for ScriptedReasoningService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoningService {
    async fn solve(&self, domain: &str, _payload: &serde_json::Value) -> CoreResult<SolveResponse> {
        if !self.available {
            return Err(CoreError::transport("scripted reasoner unavailable"));
        }
        Ok(self
            .responses
            .get(domain)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_solution() {
        let reasoner = ScriptedReasoningService::new().with_solution("acquisition", "mine");
        let response = reasoner.solve("acquisition", &json!({})).await.unwrap();
        assert!(response.solution_found);
        assert_eq!(response.solution_path, vec!["mine".to_string()]);
        assert!(reasoner.is_available().await);
    }

    #[tokio::test]
    async fn test_scripted_unknown_domain() {
        let reasoner = ScriptedReasoningService::new();
        let response = reasoner.solve("crafting", &json!({})).await.unwrap();
        assert!(!response.solution_found);
    }

    #[tokio::test]
    async fn test_scripted_unavailable() {
        let reasoner = ScriptedReasoningService::new().unavailable();
        assert!(!reasoner.is_available().await);
        assert!(reasoner.solve("acquisition", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_http_solve_and_retry() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/solve/acquisition")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/solve/acquisition")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "solution_found": true,
                    "solution_path": ["trade"],
                    "duration_ms": 3,
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let reasoner = HttpReasoningService::new(
            server.url(),
            Duration::from_millis(500),
            RetryPolicy {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        )
        .unwrap();

        let response = reasoner.solve("acquisition", &json!({})).await.unwrap();
        first.assert_async().await;
        second.assert_async().await;
        assert!(response.solution_found);
        assert_eq!(response.solution_path, vec!["trade".to_string()]);
    }

    #[tokio::test]
    async fn test_http_exhausted_retries_surface_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/solve/acquisition")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let reasoner = HttpReasoningService::new(
            server.url(),
            Duration::from_millis(500),
            RetryPolicy {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        )
        .unwrap();

        let err = reasoner.solve("acquisition", &json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn test_http_health_probe() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let reasoner = HttpReasoningService::new(
            server.url(),
            Duration::from_millis(500),
            RetryPolicy::default(),
        )
        .unwrap();
        assert!(reasoner.is_available().await);
    }
}
