use super::*;
use crate::config::LoopConfig;
use crate::llm::types::{ChatMessage, ChoiceMessageWithTools, ToolCall, ToolCallFunction, ToolDef};
use crate::llm::{ChatModel, LlmErrorKind};
use crate::tools::serpapi::test_support::{closed_port_url, search_cfg};
use crate::tools::{SerpApiClient, ToolFailure, ToolOutcome, TravelTools};
use anyhow::anyhow;
use async_trait::async_trait;
use httptest::{Expectation, Server, matchers::*, responders::*};
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replays canned replies and records every request it receives.
struct ScriptedModel {
    replies: Mutex<VecDeque<anyhow::Result<ChoiceMessageWithTools>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    latency: Duration,
}

impl ScriptedModel {
    fn new(replies: Vec<anyhow::Result<ChoiceMessageWithTools>>) -> Arc<Self> {
        Self::slow(replies, Duration::ZERO)
    }

    /// Like `new`, but every reply takes `latency` to arrive.
    fn slow(replies: Vec<anyhow::Result<ChoiceMessageWithTools>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::default(),
            latency,
        })
    }

    fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ChoiceMessageWithTools> {
        assert_eq!(tools.len(), 2);
        self.seen.lock().unwrap().push(messages);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("script exhausted")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn text(content: &str) -> anyhow::Result<ChoiceMessageWithTools> {
    Ok(ChoiceMessageWithTools {
        role: "assistant".into(),
        content: Some(content.into()),
        tool_calls: vec![],
    })
}

fn calls(calls: Vec<ToolCall>) -> anyhow::Result<ChoiceMessageWithTools> {
    Ok(ChoiceMessageWithTools {
        role: "assistant".into(),
        content: None,
        tool_calls: calls,
    })
}

fn call(id: Option<&str>, name: &str, args: Value) -> ToolCall {
    ToolCall {
        id: id.map(str::to_string),
        r#type: "function".into(),
        function: ToolCallFunction {
            name: name.into(),
            arguments: args.to_string(),
        },
    }
}

fn jfk_lax() -> Value {
    json!({
        "departure_airport": "JFK",
        "arrival_airport": "LAX",
        "outbound_date": "2025-10-15",
        "adults": 2
    })
}

fn miami() -> Value {
    json!({
        "q": "Miami Beach",
        "check_in_date": "2025-11-20",
        "check_out_date": "2025-11-25"
    })
}

fn agent(model: Arc<ScriptedModel>, search_url: String, limits: LoopConfig) -> AgentConfig {
    let search = SerpApiClient::new(search_cfg(search_url)).unwrap();
    AgentConfig::new(model, TravelTools::new(search), &limits).with_directive("test directive")
}

async fn run_conversation(
    cfg: &AgentConfig,
    user_text: &str,
    events: Option<&mpsc::Sender<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<(LoopOutcome, ConversationState), AgentError> {
    let mut state = ConversationState::new();
    let outcome = run_turn(cfg, &mut state, user_text, events, cancel).await?;
    Ok((outcome, state))
}

fn tool_results(state: &ConversationState) -> Vec<(String, ToolOutcome)> {
    state
        .messages()
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult {
                call_id, outcome, ..
            } => Some((call_id.clone(), outcome.clone())),
            _ => None,
        })
        .collect()
}

/// Every request in the history has exactly one result.
fn assert_all_answered(state: &ConversationState) {
    let mut requested = Vec::new();
    for m in state.messages() {
        if let Message::AgentUtterance { requests, .. } = m {
            requested.extend(requests.iter().map(|r| r.id.clone()));
        }
    }
    let answered: Vec<String> = tool_results(state).into_iter().map(|(id, _)| id).collect();
    for id in &requested {
        assert_eq!(answered.iter().filter(|a| *a == id).count(), 1, "request {id}");
    }
    assert_eq!(requested.len(), answered.len());
}

#[tokio::test]
async fn flight_request_is_searched_then_summarised() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search.json"),
            request::query(url_decoded(contains(("engine", "google_flights")))),
            request::query(url_decoded(contains(("departure_id", "JFK")))),
            request::query(url_decoded(contains(("arrival_id", "LAX")))),
            request::query(url_decoded(contains(("outbound_date", "2025-10-15")))),
            request::query(url_decoded(contains(("adults", "2")))),
        ])
        .respond_with(json_encoded(json!({
            "best_flights": [{"price": 320, "flights": [{"airline": "Delta"}]}]
        }))),
    );
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("call_1"), "flights_finder", jfk_lax())]),
        text("Delta flies JFK to LAX on 2025-10-15 for $320."),
    ]);
    let cfg = agent(model.clone(), server.url_str(""), LoopConfig::default());

    let (outcome, state) = run_conversation(
        &cfg,
        "Find a flight JFK to LAX on 2025-10-15 for 2 adults",
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    match outcome {
        LoopOutcome::Completed { reply, rounds } => {
            assert!(reply.contains("$320"));
            assert_eq!(rounds, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(state.len(), 4);
    assert_all_answered(&state);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0][0].role, "system");
    assert_eq!(requests[0][0].content.as_deref(), Some("test directive"));
    let tool_msg = requests[1].last().unwrap();
    assert_eq!(tool_msg.role, "tool");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_msg.content.as_deref().unwrap().contains("320"));
}

#[tokio::test]
async fn network_failure_is_narrated_not_fatal() {
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("call_1"), "flights_finder", jfk_lax())]),
        text("The flight search is unavailable right now."),
    ]);
    let cfg = agent(model.clone(), closed_port_url(), LoopConfig::default());

    let (outcome, state) = run_conversation(&cfg, "fly me", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, LoopOutcome::Completed { .. }));
    let results = tool_results(&state);
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0].1,
        ToolOutcome::Failed(ToolFailure::Transport(_))
    ));
    let fed_back = model.requests()[1].last().unwrap().content.clone().unwrap();
    assert!(fed_back.starts_with("An unexpected error occurred"));
}

#[tokio::test]
async fn sibling_requests_get_their_own_results() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search.json"),
            request::query(url_decoded(contains(("engine", "google_flights")))),
        ])
        .respond_with(json_encoded(json!({"best_flights": [{"price": 199}]}))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search.json"),
            request::query(url_decoded(contains(("engine", "google_hotels")))),
        ])
        .respond_with(json_encoded(json!({"properties": [{"name": "Sea View"}]}))),
    );
    let model = ScriptedModel::new(vec![
        calls(vec![
            call(Some("call_f"), "flights_finder", jfk_lax()),
            call(Some("call_h"), "hotels_finder", miami()),
        ]),
        text("Flight $199, hotel Sea View."),
    ]);
    let cfg = agent(model, server.url_str(""), LoopConfig::default());

    let (_, state) = run_conversation(&cfg, "plan it", None, &CancellationToken::new())
        .await
        .unwrap();

    let results: std::collections::HashMap<_, _> = tool_results(&state).into_iter().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results["call_f"], ToolOutcome::Results(vec![json!({"price": 199})]));
    assert_eq!(
        results["call_h"],
        ToolOutcome::Results(vec![json!({"name": "Sea View"})])
    );
    assert_all_answered(&state);
}

#[tokio::test]
async fn unknown_tool_gets_an_error_result() {
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("call_x"), "car_rental", json!({"city": "Rome"}))]),
        text("I can only search flights and hotels."),
    ]);
    let cfg = agent(model, closed_port_url(), LoopConfig::default());

    let (outcome, state) = run_conversation(&cfg, "rent a car", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, LoopOutcome::Completed { .. }));
    let results = tool_results(&state);
    assert_eq!(results[0].0, "call_x");
    assert_eq!(
        results[0].1,
        ToolOutcome::Failed(ToolFailure::UnknownTool("car_rental".into()))
    );
}

#[tokio::test]
async fn missing_call_ids_are_generated_and_matched() {
    let model = ScriptedModel::new(vec![
        calls(vec![
            call(None, "car_rental", json!({})),
            call(None, "boat_rental", json!({})),
        ]),
        text("done"),
    ]);
    let cfg = agent(model.clone(), closed_port_url(), LoopConfig::default());

    let (_, state) = run_conversation(&cfg, "hi", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_all_answered(&state);
    let ids: HashSet<String> = tool_results(&state).into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.starts_with("call_")));

    let wire = &model.requests()[1];
    let assistant = wire.iter().find(|m| m.role == "assistant").unwrap();
    for tc in &assistant.tool_calls {
        assert!(ids.contains(tc.id.as_deref().unwrap()));
    }
}

#[tokio::test]
async fn round_limit_ends_inconclusive_with_every_request_answered() {
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("a"), "car_rental", json!({}))]),
        calls(vec![call(Some("b"), "car_rental", json!({}))]),
        calls(vec![call(Some("c"), "car_rental", json!({}))]),
    ]);
    let limits = LoopConfig {
        max_rounds: 2,
        ..LoopConfig::default()
    };
    let cfg = agent(model.clone(), closed_port_url(), limits);

    let (outcome, state) = run_conversation(&cfg, "loop", None, &CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        LoopOutcome::Inconclusive { rounds, .. } => assert_eq!(rounds, 2),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(model.requests().len(), 2);
    assert_all_answered(&state);
}

#[tokio::test]
async fn model_failure_is_reported_and_turn_discarded() {
    let model = ScriptedModel::new(vec![
        text("Hello! Where to?"),
        calls(vec![call(Some("a"), "car_rental", json!({}))]),
        Err(anyhow!("chat (tools) error: 401 Unauthorized - bad key")),
    ]);
    let cfg = agent(model, closed_port_url(), LoopConfig::default());
    let cancel = CancellationToken::new();
    let mut state = ConversationState::new();

    run_turn(&cfg, &mut state, "hi", None, &cancel).await.unwrap();
    let before = state.clone();

    let err = run_turn(&cfg, &mut state, "find a car", None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Model(_)));
    assert!(err.to_string().contains("401"));
    assert_eq!(state, before);
}

#[tokio::test]
async fn cancelled_turn_leaves_state_untouched() {
    let model = ScriptedModel::new(vec![text("never sent")]);
    let cfg = agent(model.clone(), closed_port_url(), LoopConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut state = ConversationState::new();

    let err = run_turn(&cfg, &mut state, "hi", None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert!(state.is_empty());
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn cancellation_reported_by_the_model_is_not_a_model_failure() {
    let model = ScriptedModel::new(vec![Err(anyhow!(LlmErrorKind::Cancelled))]);
    let cfg = agent(model, closed_port_url(), LoopConfig::default());
    let mut state = ConversationState::new();

    let err = run_turn(&cfg, &mut state, "hi", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
}

#[tokio::test]
async fn later_turns_see_earlier_history() {
    let model = ScriptedModel::new(vec![text("Where would you like to go?"), text("Paris it is.")]);
    let cfg = agent(model.clone(), closed_port_url(), LoopConfig::default());
    let cancel = CancellationToken::new();
    let mut state = ConversationState::new();

    run_turn(&cfg, &mut state, "I want a trip", None, &cancel)
        .await
        .unwrap();
    let outcome = run_turn(&cfg, &mut state, "Paris", None, &cancel)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoopOutcome::Completed {
            reply: "Paris it is.".into(),
            rounds: 1
        }
    );
    let second = &model.requests()[1];
    let roles: Vec<_> = second.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
}

#[tokio::test]
async fn events_trace_the_turn() {
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("call_1"), "car_rental", json!({}))]),
        text("done"),
    ]);
    let cfg = agent(model, closed_port_url(), LoopConfig::default());
    let (tx, rx) = mpsc::channel();

    run_conversation(&cfg, "hi", Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    let events: Vec<LoopEvent> = rx.iter().collect();
    assert_eq!(
        events,
        vec![
            LoopEvent::AgentReplied {
                text: None,
                tool_calls: 1
            },
            LoopEvent::ToolStarted {
                id: "call_1".into(),
                name: "car_rental".into()
            },
            LoopEvent::ToolFinished {
                id: "call_1".into(),
                name: "car_rental".into(),
                ok: false
            },
            LoopEvent::AgentReplied {
                text: Some("done".into()),
                tool_calls: 0
            },
            LoopEvent::Finished,
        ]
    );
}

#[tokio::test]
async fn slow_search_becomes_a_timeout_result() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search.json")).respond_with(
            delay_and_then(
                Duration::from_secs(2),
                json_encoded(json!({"properties": [{"name": "Too Late"}]})),
            ),
        ),
    );
    let model = ScriptedModel::new(vec![
        calls(vec![call(Some("call_h"), "hotels_finder", miami())]),
        text("The hotel search timed out, please try again."),
    ]);
    let limits = LoopConfig {
        tool_timeout_ms: 200,
        ..LoopConfig::default()
    };
    let cfg = agent(model.clone(), server.url_str(""), limits);

    let (outcome, state) = run_conversation(&cfg, "hotel in Miami", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, LoopOutcome::Completed { rounds: 2, .. }));
    assert_all_answered(&state);
    let results = tool_results(&state);
    assert_eq!(
        results[0].1,
        ToolOutcome::Failed(ToolFailure::Timeout(Duration::from_millis(200)))
    );
    let fed_back = model.requests()[1].last().unwrap().content.clone().unwrap();
    assert!(fed_back.contains("did not complete"));
}

#[tokio::test]
async fn session_deadline_ends_inconclusive_and_keeps_history() {
    let model = ScriptedModel::slow(
        vec![
            calls(vec![call(Some("a"), "car_rental", json!({}))]),
            text("too late"),
        ],
        Duration::from_millis(300),
    );
    let limits = LoopConfig {
        session_timeout_ms: 500,
        ..LoopConfig::default()
    };
    let cfg = agent(model.clone(), closed_port_url(), limits);

    let (outcome, state) = run_conversation(&cfg, "loop", None, &CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        LoopOutcome::Inconclusive { rounds, reason } => {
            assert_eq!(rounds, 1);
            assert!(reason.contains("seconds"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(model.requests().len(), 2);
    assert_eq!(state.len(), 3);
    assert_all_answered(&state);
}
