//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text
    Text(String),
    /// Fail with this error
    Fail(LlmError),
    /// Sleep, then return this text
    Delayed(Duration, String),
}

/// Mock backend for testing.
///
/// Replies are taken from a script in order; once the script is exhausted
/// the default response is returned. Every prompt is recorded.
pub struct MockBackend {
    model_id: String,
    response_content: String,
    script: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            response_content: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the response content used once the script runs out.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Queue a scripted reply.
    pub fn then(self, reply: MockReply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
        self
    }

    /// Queue a text reply.
    pub fn then_text(self, content: impl Into<String>) -> Self {
        self.then(MockReply::Text(content.into()))
    }

    /// Queue a failure.
    pub fn then_fail(self, error: LlmError) -> Self {
        self.then(MockReply::Fail(error))
    }

    /// Queue a reply that arrives after a delay.
    pub fn then_delayed(self, delay: Duration, content: impl Into<String>) -> Self {
        self.then(MockReply::Delayed(delay, content.into()))
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far (last message of each request).
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| MockReply::Text(self.response_content.clone()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.last_content().to_string());
        }

        let content = match self.next_reply() {
            MockReply::Text(text) => text,
            MockReply::Fail(error) => return Err(error),
            MockReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                text
            }
        };

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();
        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
