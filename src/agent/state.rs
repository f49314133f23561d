use serde_json::Value;
use std::collections::HashSet;

use crate::llm::types::{ChatMessage, ChoiceMessageWithTools, ToolCall, ToolCallFunction};
use crate::tools::ToolOutcome;

/// A tool call requested by the model. Consumed once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    /// Parsed arguments. Text the model sent that is not JSON is kept as
    /// `Value::String` so it can be echoed back verbatim.
    pub arguments: Value,
}

impl ToolInvocationRequest {
    fn from_call(call: &ToolCall, id: String) -> Self {
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        Self {
            id,
            name: call.function.name.clone(),
            arguments,
        }
    }

    fn to_call(&self) -> ToolCall {
        let arguments = match &self.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        ToolCall {
            id: Some(self.id.clone()),
            r#type: "function".into(),
            function: ToolCallFunction {
                name: self.name.clone(),
                arguments,
            },
        }
    }
}

fn generated_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SystemDirective(String),
    UserUtterance(String),
    AgentUtterance {
        text: Option<String>,
        requests: Vec<ToolInvocationRequest>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
}

impl Message {
    /// Build an agent utterance from a model reply. Missing or repeated call
    /// ids are replaced so every request in the utterance is addressable.
    pub fn from_reply(reply: ChoiceMessageWithTools) -> Self {
        let mut seen = HashSet::new();
        let requests = reply
            .tool_calls
            .iter()
            .map(|call| {
                let id = match call.id.as_deref().map(str::trim) {
                    Some(id) if !id.is_empty() && !seen.contains(id) => id.to_string(),
                    _ => generated_call_id(),
                };
                seen.insert(id.clone());
                ToolInvocationRequest::from_call(call, id)
            })
            .collect();
        Message::AgentUtterance {
            text: reply.content,
            requests,
        }
    }

    pub fn to_wire(&self) -> ChatMessage {
        let (role, content) = match self {
            Message::SystemDirective(text) => ("system", Some(text.clone())),
            Message::UserUtterance(text) => ("user", Some(text.clone())),
            Message::AgentUtterance { text, .. } => ("assistant", text.clone()),
            Message::ToolResult { outcome, .. } => ("tool", Some(outcome.to_content())),
        };
        let mut msg = ChatMessage {
            role: role.into(),
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        };
        match self {
            Message::AgentUtterance { requests, .. } => {
                msg.tool_calls = requests.iter().map(ToolInvocationRequest::to_call).collect();
            }
            Message::ToolResult {
                call_id, tool_name, ..
            } => {
                msg.tool_call_id = Some(call_id.clone());
                msg.name = Some(tool_name.clone());
            }
            _ => {}
        }
        msg
    }
}

/// Ordered history of one session. Messages are only ever appended while a
/// turn runs; a failed turn is discarded as a whole via `rollback`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop everything appended after `mark`, restoring an earlier snapshot.
    pub(crate) fn rollback(&mut self, mark: usize) {
        self.messages.truncate(mark);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The most recent agent utterance, if any.
    pub fn latest_agent_utterance(&self) -> Option<(Option<&str>, &[ToolInvocationRequest])> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::AgentUtterance { text, requests } => Some((text.as_deref(), requests.as_slice())),
            _ => None,
        })
    }

    /// Requests in the latest agent utterance that have no result yet.
    pub fn pending_requests(&self) -> Vec<ToolInvocationRequest> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::AgentUtterance { .. }))
        else {
            return Vec::new();
        };
        let Message::AgentUtterance { requests, .. } = &self.messages[pos] else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        requests
            .iter()
            .filter(|r| !answered.contains(r.id.as_str()))
            .cloned()
            .collect()
    }

    /// Wire messages for the model, with `directive` prepended.
    pub fn to_wire(&self, directive: &str) -> Vec<ChatMessage> {
        std::iter::once(Message::SystemDirective(directive.to_string()).to_wire())
            .chain(self.messages.iter().map(Message::to_wire))
            .collect()
    }
}
