use std::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::driver::{AgentError, LoopEvent};
use crate::agent::state::{ConversationState, Message, ToolInvocationRequest};
use crate::agent::AgentConfig;
use crate::tools::{ToolFailure, ToolKind, ToolOutcome};

/// Answer every pending request of the latest agent utterance, one at a
/// time, appending one tool result per request. Tool failures become
/// results; only cancellation aborts.
pub async fn execute_tools(
    cfg: &AgentConfig,
    state: &mut ConversationState,
    events: Option<&Sender<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<usize, AgentError> {
    let pending = state.pending_requests();
    for request in &pending {
        if let Some(tx) = events {
            let _ = tx.send(LoopEvent::ToolStarted {
                id: request.id.clone(),
                name: request.name.clone(),
            });
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(tool = %request.name, id = %request.id, "tool execution cancelled");
                return Err(AgentError::Cancelled);
            }
            outcome = invoke(cfg, request) => outcome,
        };

        if outcome.is_failure() {
            warn!(tool = %request.name, id = %request.id, result = %outcome.to_content(), "tool failed");
        } else {
            info!(tool = %request.name, id = %request.id, "tool finished");
        }
        if let Some(tx) = events {
            let _ = tx.send(LoopEvent::ToolFinished {
                id: request.id.clone(),
                name: request.name.clone(),
                ok: !outcome.is_failure(),
            });
        }

        state.append(Message::ToolResult {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome,
        });
    }
    Ok(pending.len())
}

async fn invoke(cfg: &AgentConfig, request: &ToolInvocationRequest) -> ToolOutcome {
    let Some(kind) = ToolKind::from_name(&request.name) else {
        return ToolFailure::UnknownTool(request.name.clone()).into();
    };
    match tokio::time::timeout(cfg.tool_timeout, cfg.tools.invoke(kind, &request.arguments)).await
    {
        Ok(outcome) => outcome,
        Err(_) => ToolFailure::Timeout(cfg.tool_timeout).into(),
    }
}
