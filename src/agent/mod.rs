//! Conversation loop: agent step, router and tool executor wired into a
//! small state machine that runs until the model stops asking for tools.

mod config;
mod driver;
mod executor;
pub mod prompt;
mod router;
mod state;
mod step;

pub use config::AgentConfig;
pub use driver::{AgentError, LoopEvent, LoopOutcome, run_turn};
pub use state::{ConversationState, Message};

#[cfg(test)]
mod tests;
