use crate::agent::state::ConversationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The latest agent utterance asks for tools.
    Continue,
    Stop,
}

pub fn route(state: &ConversationState) -> Route {
    match state.latest_agent_utterance() {
        Some((_, requests)) if !requests.is_empty() => Route::Continue,
        _ => Route::Stop,
    }
}
