use anyhow::{Result, anyhow};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::OpenAIClient;
use crate::llm::types::{
    ChatMessage, ChatRequestWithTools, ChatResponseWithTools, ChoiceMessageWithTools, ToolDef,
};
use crate::llm::{LlmErrorKind, classify_error, should_retry};

struct AttemptFailure {
    error: anyhow::Error,
    kind: LlmErrorKind,
    retry_after: Option<u64>,
}

impl AttemptFailure {
    fn new(error: anyhow::Error, kind: LlmErrorKind) -> Self {
        Self {
            error,
            kind,
            retry_after: None,
        }
    }
}

pub async fn chat_tools_once(
    client: &OpenAIClient,
    model: &str,
    messages: Vec<ChatMessage>,
    tools: &[ToolDef],
    temperature: Option<f32>,
    cancel: Option<CancellationToken>,
) -> Result<ChoiceMessageWithTools> {
    let url = client.endpoint();
    let req = ChatRequestWithTools {
        model: model.to_string(),
        messages,
        temperature,
        tools: (!tools.is_empty()).then(|| tools.to_vec()),
        tool_choice: (!tools.is_empty()).then(|| serde_json::json!("auto")),
    };
    let headers = client.headers()?;

    if let Ok(payload) = serde_json::to_string(&req) {
        debug!(payload=%payload, endpoint=%url, "sending chat.completions (tools) payload");
    }

    let cancel_token = cancel.unwrap_or_default();
    let max_attempts = client.llm_cfg.max_retries.saturating_add(1);
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 1..=max_attempts {
        let failure = match send_once(client, &url, &headers, &req, &cancel_token).await {
            Ok(msg) => return Ok(msg),
            Err(f) => f,
        };

        if failure.kind == LlmErrorKind::Cancelled {
            return Err(failure.error);
        }
        if !should_retry(failure.kind) || attempt >= max_attempts {
            error!(attempt, kind=?failure.kind, err=%failure.error, "llm chat_tools_once failed");
            return Err(failure.error);
        }

        let wait = client.backoff_delay(attempt, failure.retry_after);
        info!(attempt, kind=?failure.kind, wait_ms=%wait.as_millis(), "retrying chat_tools_once");
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("chat_tools_once cancelled during retry sleep");
                return Err(anyhow!(LlmErrorKind::Cancelled));
            }
            _ = tokio::time::sleep(wait) => {}
        }
        last_err = Some(failure.error);
    }

    Err(last_err.unwrap_or_else(|| anyhow!("unknown error")))
}

async fn send_once(
    client: &OpenAIClient,
    url: &str,
    headers: &HeaderMap,
    req: &ChatRequestWithTools,
    cancel_token: &CancellationToken,
) -> std::result::Result<ChoiceMessageWithTools, AttemptFailure> {
    let timeout_duration = Duration::from_millis(client.llm_cfg.timeout_ms);
    let req_builder = client.inner.post(url).headers(headers.clone()).json(req);
    let resp_fut = tokio::time::timeout(timeout_duration, req_builder.send());

    let resp = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            warn!("chat_tools_once cancelled before send");
            return Err(AttemptFailure::new(anyhow!(LlmErrorKind::Cancelled), LlmErrorKind::Cancelled));
        }
        res = resp_fut => match res {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                let e = anyhow::Error::new(e).context("send chat request (tools)");
                let kind = classify_error(None, &e);
                return Err(AttemptFailure::new(e, kind));
            }
            Err(_) => {
                return Err(AttemptFailure::new(anyhow!(LlmErrorKind::Timeout), LlmErrorKind::Timeout));
            }
        },
    };

    let status = resp.status();
    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default().trim().to_owned();
        error!(status=%status.as_u16(), body=%text, "llm chat_tools_once non-success status");
        let e = anyhow!("chat (tools) error: {} - {}", status, text);
        let kind = classify_error(Some(status), &e);
        return Err(AttemptFailure {
            error: e,
            kind,
            retry_after,
        });
    }

    let body_fut = tokio::time::timeout(timeout_duration, resp.text());
    let response_text = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            warn!("chat_tools_once cancelled during body read");
            return Err(AttemptFailure::new(anyhow!(LlmErrorKind::Cancelled), LlmErrorKind::Cancelled));
        }
        res = body_fut => match res {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                let e = anyhow::Error::new(e).context("read chat response body (tools)");
                let kind = classify_error(None, &e);
                return Err(AttemptFailure::new(e, kind));
            }
            Err(_) => {
                return Err(AttemptFailure::new(anyhow!(LlmErrorKind::Timeout), LlmErrorKind::Timeout));
            }
        },
    };

    debug!(response_body=%response_text, "llm chat_tools_once response");
    let body: ChatResponseWithTools = serde_json::from_str(response_text.trim()).map_err(|e| {
        AttemptFailure::new(
            anyhow::Error::new(e).context("parse chat response (tools)"),
            LlmErrorKind::Deserialize,
        )
    })?;

    if let Some(usage) = &body.usage {
        client.add_tokens(usage.total_tokens);
        client.add_prompt_tokens(usage.prompt_tokens);
    }

    body.choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| AttemptFailure::new(anyhow!("no choices returned"), LlmErrorKind::Deserialize))
}
