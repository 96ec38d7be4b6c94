//! Inference gateway.
//!
//! Bounded retries with linear backoff, each attempt raced against a
//! deadline. A timed-out attempt is abandoned and counts as a failure;
//! the first success short-circuits the remaining attempts. Semantically
//! wrong but successful responses are never retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{CompletionRequest, LlmBackend, LlmError};

/// Attempt budget, backoff schedule and per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts (at least one is always made)
    pub attempts: u32,
    /// Attempt `i` waits `i * backoff_step_ms` before calling
    pub backoff_step_ms: u64,
    /// Deadline for each attempt
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_step_ms: 450,
            timeout_ms: 18_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("inference failed after {attempts} attempt(s): {last_error}")]
pub struct InferenceFailure {
    /// Attempts made
    pub attempts: u32,
    /// Error from the final attempt
    pub last_error: LlmError,
}

impl InferenceFailure {
    /// Whether the final attempt hit its deadline.
    pub fn timed_out(&self) -> bool {
        self.last_error.is_timeout()
    }
}

/// Run `op` under `policy`, returning the first success.
///
/// `op` receives the 0-based attempt index.
pub async fn retry_with_timeout<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, InferenceFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = LlmError::Unavailable("no attempt made".to_string());

    for attempt in 0..attempts {
        let backoff = policy.backoff_for(attempt);
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }

        match tokio::time::timeout(policy.timeout(), op(attempt)).await {
            Ok(Ok(value)) => {
                debug!(label, attempt, "Inference attempt succeeded");
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!(label, attempt, error = %e, "Inference attempt failed");
                last_error = e;
            }
            Err(_) => {
                warn!(label, attempt, timeout_ms = policy.timeout_ms, "Inference attempt timed out");
                last_error = LlmError::Timeout(policy.timeout_ms);
            }
        }
    }

    Err(InferenceFailure {
        attempts,
        last_error,
    })
}

/// Calls one backend under a retry policy.
#[derive(Clone)]
pub struct InferenceGateway {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
}

impl InferenceGateway {
    pub fn new(backend: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Model identifier of the backend.
    pub fn model(&self) -> &str {
        self.backend.id()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send one prompt and return the response text.
    pub async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceFailure> {
        let request = CompletionRequest::user(prompt)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);
        self.invoke_request(request).await
    }

    /// Send a prepared request and return the response text.
    pub async fn invoke_request(&self, request: CompletionRequest) -> Result<String, InferenceFailure> {
        let backend = Arc::clone(&self.backend);
        retry_with_timeout(&self.policy, backend.id(), |_| {
            let backend = Arc::clone(&backend);
            let request = request.clone();
            async move { backend.complete(request).await.map(|r| r.content) }
        })
        .await
    }
}
