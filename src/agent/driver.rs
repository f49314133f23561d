use std::sync::mpsc::Sender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::AgentConfig;
use crate::agent::executor::execute_tools;
use crate::agent::router::{Route, route};
use crate::agent::state::{ConversationState, Message};
use crate::agent::step::agent_step;
use crate::llm::LlmErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Agent,
    Route,
    Action,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model stopped requesting tools; `reply` is its final text.
    Completed { reply: String, rounds: usize },
    /// A round or time limit was hit first.
    Inconclusive { reason: String, rounds: usize },
}

impl LoopOutcome {
    pub fn rounds(&self) -> usize {
        match self {
            LoopOutcome::Completed { rounds, .. } | LoopOutcome::Inconclusive { rounds, .. } => *rounds,
        }
    }
}

/// Progress notifications for callers that want to show activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    AgentReplied { text: Option<String>, tool_calls: usize },
    ToolStarted { id: String, name: String },
    ToolFinished { id: String, name: String, ok: bool },
    Finished,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("language model call failed: {0:#}")]
    Model(anyhow::Error),
    #[error("turn cancelled")]
    Cancelled,
}

/// Run one user turn through the agent/route/action cycle.
///
/// On error the state is rolled back to what it was before `user_text` was
/// added, so a failed turn leaves no half-answered tool requests behind.
pub async fn run_turn(
    cfg: &AgentConfig,
    state: &mut ConversationState,
    user_text: &str,
    events: Option<&Sender<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, AgentError> {
    let mark = state.len();
    state.append(Message::UserUtterance(user_text.to_string()));
    let result = drive(cfg, state, events, cancel).await;
    if let Some(tx) = events {
        let _ = tx.send(LoopEvent::Finished);
    }
    if let Err(e) = &result {
        warn!(error = %e, "turn failed; discarding its messages");
        state.rollback(mark);
    }
    result
}

async fn drive(
    cfg: &AgentConfig,
    state: &mut ConversationState,
    events: Option<&Sender<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, AgentError> {
    let deadline = Instant::now() + cfg.session_timeout;
    let mut rounds = 0usize;
    let mut current = LoopState::Agent;

    loop {
        debug!(?current, rounds, "loop transition");
        current = match current {
            LoopState::Agent => {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                if rounds >= cfg.max_rounds {
                    warn!(rounds, "round limit reached");
                    return Ok(LoopOutcome::Inconclusive {
                        reason: format!("stopped after {rounds} model rounds without a final answer"),
                        rounds,
                    });
                }
                let step = tokio::time::timeout_at(deadline, agent_step(cfg, state, cancel));
                match step.await {
                    Err(_) => {
                        warn!(rounds, "session time limit reached");
                        return Ok(LoopOutcome::Inconclusive {
                            reason: format!(
                                "no final answer within {} seconds",
                                cfg.session_timeout.as_secs()
                            ),
                            rounds,
                        });
                    }
                    Ok(Err(e)) => {
                        if cancel.is_cancelled()
                            || matches!(e.downcast_ref::<LlmErrorKind>(), Some(LlmErrorKind::Cancelled))
                        {
                            return Err(AgentError::Cancelled);
                        }
                        error!(error = %format!("{e:#}"), "model call failed");
                        return Err(AgentError::Model(e));
                    }
                    Ok(Ok(())) => {}
                }
                rounds += 1;
                if let Some(tx) = events
                    && let Some((text, requests)) = state.latest_agent_utterance()
                {
                    let _ = tx.send(LoopEvent::AgentReplied {
                        text: text.map(str::to_string),
                        tool_calls: requests.len(),
                    });
                }
                LoopState::Route
            }
            LoopState::Route => match route(state) {
                Route::Continue => LoopState::Action,
                Route::Stop => LoopState::Done,
            },
            LoopState::Action => {
                let answered = execute_tools(cfg, state, events, cancel).await?;
                debug!(answered, "tool results appended");
                LoopState::Agent
            }
            LoopState::Done => {
                let reply = state
                    .latest_agent_utterance()
                    .and_then(|(text, _)| text)
                    .unwrap_or_default()
                    .to_string();
                info!(rounds, "turn completed");
                return Ok(LoopOutcome::Completed { reply, rounds });
            }
        };
    }
}
