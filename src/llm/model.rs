use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::client_core::OpenAIClient;
use crate::llm::types::{ChatMessage, ChoiceMessageWithTools, ToolDef};

/// Abstraction over the chat backend the agent loop talks to.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Submit the full message sequence with the declared tools and return
    /// the assistant's reply: free text, tool calls, or both.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
        cancel: &CancellationToken,
    ) -> Result<ChoiceMessageWithTools>;

    fn model_name(&self) -> &str;
}

/// `ChatModel` backed by an OpenAI-compatible chat.completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIChatModel {
    client: OpenAIClient,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIChatModel {
    pub fn new(client: OpenAIClient, model: impl Into<String>, temperature: Option<f32>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
        cancel: &CancellationToken,
    ) -> Result<ChoiceMessageWithTools> {
        self.client
            .chat_tools_once(
                &self.model,
                messages,
                tools,
                self.temperature,
                Some(cancel.clone()),
            )
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
