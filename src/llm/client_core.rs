use anyhow::Result;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::llm::types::{ChatMessage, ChoiceMessageWithTools, ToolDef};

mod network;

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub(crate) inner: reqwest::Client,
    pub llm_cfg: LlmConfig,
    /// Running totals over every response this client has received
    pub tokens_used: Arc<AtomicU32>,
    pub prompt_tokens_used: Arc<AtomicU32>,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            inner,
            llm_cfg: LlmConfig::default(),
            tokens_used: Arc::new(AtomicU32::new(0)),
            prompt_tokens_used: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn with_llm_config(mut self, cfg: LlmConfig) -> Self {
        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        // Keep the default client if the builder rejects the settings.
        if let Ok(c) = builder.build() {
            self.inner = c;
        }
        self.llm_cfg = cfg;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        if let Some(pos) = base.rfind("/v1") {
            base.truncate(pos);
            base = base.trim_end_matches('/').to_string();
        }
        format!("{base}/v1/chat/completions")
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert("X-Title", HeaderValue::from_static("trip-planner"));
        Ok(headers)
    }

    pub fn get_tokens_used(&self) -> u32 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    pub fn add_tokens(&self, tokens: u32) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn get_prompt_tokens_used(&self) -> u32 {
        self.prompt_tokens_used.load(Ordering::Relaxed)
    }

    pub fn add_prompt_tokens(&self, tokens: u32) {
        self.prompt_tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// One chat.completions round trip with tool definitions attached.
    /// Transient failures are retried with backoff; the call gives up
    /// with an error once retries are exhausted or `cancel` fires.
    pub async fn chat_tools_once(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
        temperature: Option<f32>,
        cancel: Option<CancellationToken>,
    ) -> Result<ChoiceMessageWithTools> {
        network::chat_tools_once(self, model, messages, tools, temperature, cancel).await
    }

    pub(crate) fn backoff_delay(&self, attempt: usize, retry_after_secs: Option<u64>) -> Duration {
        if self.llm_cfg.respect_retry_after
            && let Some(secs) = retry_after_secs
        {
            return Duration::from_secs(secs);
        }
        let base = self.llm_cfg.retry_base_ms;
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let exp = base.saturating_mul(1u64 << shift);
        let jitter = self.llm_cfg.retry_jitter_ms as i64;
        let half = jitter / 2;
        let rnd = fastrand::i64(-half..=half).max(0) as u64;
        Duration::from_millis(exp.saturating_add(rnd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use httptest::{Expectation, Server, cycle, matchers::*, responders::*};

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".into(),
            content: Some(text.into()),
            tool_calls: vec![],
            tool_call_id: None,
            name: None,
        }]
    }

    fn fast_cfg(max_retries: usize) -> LlmConfig {
        LlmConfig {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            max_retries,
            retry_base_ms: 1,
            retry_jitter_ms: 0,
            respect_retry_after: false,
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn chat_tools_once_returns_tool_calls() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::headers(contains(key("authorization"))),
            ])
            .times(2)
            .respond_with(json_encoded(serde_json::json!({
                "id": "resp-1",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "flights_finder", "arguments": "{\"departure_airport\":\"JFK\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            }))),
        );

        let client = OpenAIClient::new(format!("{}/", server.url_str("")), "test-key")
            .unwrap()
            .with_llm_config(fast_cfg(0));
        let msg = client
            .chat_tools_once("llama-test", user("hi"), &[], Some(0.0), None)
            .await
            .unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_calls[0].function.name, "flights_finder");
        assert_eq!(client.get_tokens_used(), 15);
        assert_eq!(client.get_prompt_tokens_used(), 12);

        client
            .chat_tools_once("llama-test", user("again"), &[], Some(0.0), None)
            .await
            .unwrap();
        assert_eq!(client.get_tokens_used(), 30);
        assert_eq!(client.get_prompt_tokens_used(), 24);
    }

    #[tokio::test]
    async fn chat_tools_once_retries_on_500_then_succeeds() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .times(2)
                .respond_with(cycle![
                    status_code(500).body("oops"),
                    json_encoded(serde_json::json!({
                        "id": "test",
                        "choices": [
                            {"index": 0, "message": {"role": "assistant", "content": "ok"}}
                        ]
                    })),
                ]),
        );
        let client = OpenAIClient::new(format!("{}/", server.url_str("")), "x")
            .unwrap()
            .with_llm_config(fast_cfg(1));
        let msg = client
            .chat_tools_once("gpt", user("hi"), &[], None, None)
            .await
            .unwrap();
        assert_eq!(msg.content.as_deref(), Some("ok"));
        assert!(msg.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn chat_tools_once_no_retry_on_400() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .times(1)
                .respond_with(status_code(400).body("bad")),
        );
        let client = OpenAIClient::new(format!("{}/", server.url_str("")), "x")
            .unwrap()
            .with_llm_config(fast_cfg(3));
        let err = client
            .chat_tools_once("gpt", user("hi"), &[], None, None)
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("400"));
    }

    #[tokio::test]
    async fn chat_tools_once_empty_choices_is_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(serde_json::json!({"id": "x", "choices": []}))),
        );
        let client = OpenAIClient::new(format!("{}/", server.url_str("")), "x")
            .unwrap()
            .with_llm_config(fast_cfg(0));
        let err = client
            .chat_tools_once("gpt", user("hi"), &[], None, None)
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("no choices"));
    }

    #[tokio::test]
    async fn chat_tools_once_honours_cancellation() {
        let client = OpenAIClient::new("http://127.0.0.1:9/", "x")
            .unwrap()
            .with_llm_config(fast_cfg(0));
        let token = CancellationToken::new();
        token.cancel();
        let err = client
            .chat_tools_once("gpt", user("hi"), &[], None, Some(token))
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<crate::llm::LlmErrorKind>(),
            Some(&crate::llm::LlmErrorKind::Cancelled)
        );
    }

    #[test]
    fn endpoint_normalization() {
        let c = OpenAIClient::new("https://api.groq.com/openai/v1/", "x").unwrap();
        assert_eq!(c.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        let c2 = OpenAIClient::new("https://api.example.com/", "x").unwrap();
        assert_eq!(c2.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn backoff_prefers_retry_after_when_enabled() {
        let client = OpenAIClient::new("https://api.example.com/", "x")
            .unwrap()
            .with_llm_config(LlmConfig {
                respect_retry_after: true,
                retry_base_ms: 100,
                retry_jitter_ms: 0,
                ..LlmConfig::default()
            });
        assert_eq!(client.backoff_delay(1, Some(3)), Duration::from_secs(3));
        assert_eq!(client.backoff_delay(1, None), Duration::from_millis(100));
        assert_eq!(client.backoff_delay(3, None), Duration::from_millis(400));
    }
}
