use serde_json::Value;
use std::time::Duration;

/// Why a tool invocation produced no data. The display text is what the
/// model sees, so it is phrased for narration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolFailure {
    #[error("An API error occurred: {0}")]
    Provider(String),
    #[error("An unexpected error occurred: {0}")]
    Transport(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Unknown tool: {0}. Available tools: flights_finder, hotels_finder")]
    UnknownTool(String),
    #[error("The search did not complete within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

/// Outcome of one tool invocation. Every variant is fed back to the model
/// as ordinary content; none of them aborts the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Results(Vec<Value>),
    NoResults(String),
    Failed(ToolFailure),
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ToolOutcome::Failed(_))
    }

    /// Text placed in the tool message for the model.
    pub fn to_content(&self) -> String {
        match self {
            ToolOutcome::Results(items) => serde_json::to_string(items)
                .unwrap_or_else(|e| format!("An unexpected error occurred: {e}")),
            ToolOutcome::NoResults(text) => text.clone(),
            ToolOutcome::Failed(failure) => failure.to_string(),
        }
    }
}

impl From<ToolFailure> for ToolOutcome {
    fn from(failure: ToolFailure) -> Self {
        ToolOutcome::Failed(failure)
    }
}

/// Turn a provider payload into an outcome: an `error` field wins, then the
/// list under `results_key` (at most `cap` entries), else `no_results`.
/// An empty list after capping counts as no results.
pub fn interpret_results(
    payload: &Value,
    results_key: &str,
    cap: usize,
    no_results: &str,
) -> ToolOutcome {
    if let Some(err) = payload.get("error") {
        let text = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return ToolOutcome::Failed(ToolFailure::Provider(text));
    }
    let items: Vec<Value> = payload
        .get(results_key)
        .and_then(Value::as_array)
        .map(|items| items.iter().take(cap).cloned().collect())
        .unwrap_or_default();
    if items.is_empty() {
        ToolOutcome::NoResults(no_results.to_string())
    } else {
        ToolOutcome::Results(items)
    }
}
