use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::AgentConfig;
use crate::agent::state::{ConversationState, Message};

/// One model call over the whole history. Appends exactly one agent
/// utterance on success and leaves the state untouched on failure.
pub async fn agent_step(
    cfg: &AgentConfig,
    state: &mut ConversationState,
    cancel: &CancellationToken,
) -> Result<()> {
    let messages = state.to_wire(&cfg.directive);
    debug!(messages = messages.len(), model = cfg.model.model_name(), "agent step");
    let reply = cfg
        .model
        .complete(messages, &cfg.tools.definitions(), cancel)
        .await?;
    debug!(
        tool_calls = reply.tool_calls.len(),
        has_text = reply.content.as_deref().is_some_and(|c| !c.is_empty()),
        "agent replied"
    );
    state.append(Message::from_reply(reply));
    Ok(())
}
