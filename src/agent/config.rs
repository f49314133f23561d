use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::prompt;
use crate::config::LoopConfig;
use crate::llm::ChatModel;
use crate::tools::TravelTools;

/// Everything a session needs besides its own history. Built once at
/// startup and shared read-only by every turn.
#[derive(Clone)]
pub struct AgentConfig {
    pub directive: String,
    pub tools: TravelTools,
    pub model: Arc<dyn ChatModel>,
    pub max_rounds: usize,
    pub session_timeout: Duration,
    pub tool_timeout: Duration,
}

impl AgentConfig {
    pub fn new(model: Arc<dyn ChatModel>, tools: TravelTools, limits: &LoopConfig) -> Self {
        Self {
            directive: prompt::current_directive(),
            tools,
            model,
            max_rounds: limits.max_rounds.max(1),
            session_timeout: Duration::from_millis(limits.session_timeout_ms),
            tool_timeout: Duration::from_millis(limits.tool_timeout_ms),
        }
    }

    #[cfg(test)]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model.model_name())
            .field("max_rounds", &self.max_rounds)
            .field("session_timeout", &self.session_timeout)
            .field("tool_timeout", &self.tool_timeout)
            .finish_non_exhaustive()
    }
}
