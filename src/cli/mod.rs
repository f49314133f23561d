use std::future::Future;
use std::io::{self, Write};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::io::{AsyncBufRead, Lines};

use crate::agent::{LoopEvent, LoopOutcome};
use crate::tools::default_tools_def;

pub const GREETING: &str = "Hello! How can I help you plan your trip today?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Tools,
    Reset,
    Clear,
    Quit,
    Unknown(String),
}

/// Slash commands; anything else is a message for the agent.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    Some(match line {
        "/help" => Command::Help,
        "/tools" => Command::Tools,
        "/reset" => Command::Reset,
        "/clear" => Command::Clear,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

pub fn print_help() {
    println!(
        "/help   Show help\n/tools  Show the search tools the assistant can use\n/reset  Start a new conversation\n/clear  Clear screen\n/quit   Quit (also /exit)\nCtrl-C cancels the request in progress, or quits at the prompt"
    );
}

/// What the prompt produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Wait for the next line unless `interrupt` resolves first.
pub async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> io::Result<Input>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
        _ = interrupt => Ok(Input::Interrupted),
    }
}

pub fn print_tools() {
    for def in default_tools_def() {
        println!("{}  {}", def.function.name, def.function.description);
    }
}

pub fn clear_screen() {
    print!("\x1B[2J\x1B[H");
    let _ = io::stdout().flush();
}

/// Print `text` a word at a time, pausing `delay` between words.
pub async fn print_streamed(text: &str, delay: Duration) -> io::Result<()> {
    let mut out = io::stdout();
    if delay.is_zero() {
        writeln!(out, "{text}")?;
        return out.flush();
    }
    for chunk in text.split_inclusive(char::is_whitespace) {
        write!(out, "{chunk}")?;
        out.flush()?;
        tokio::time::sleep(delay).await;
    }
    writeln!(out)?;
    out.flush()
}

pub fn outcome_text(outcome: &LoopOutcome) -> String {
    match outcome {
        LoopOutcome::Completed { reply, .. } if reply.trim().is_empty() => {
            "(the assistant returned an empty reply)".to_string()
        }
        LoopOutcome::Completed { reply, .. } => reply.clone(),
        LoopOutcome::Inconclusive { reason, .. } => format!(
            "I could not finish planning this request ({reason}). Please try narrowing it down or rephrasing it."
        ),
    }
}

pub fn describe_event(event: &LoopEvent) -> String {
    match event {
        LoopEvent::AgentReplied { tool_calls: 0, .. } => "[agent] final reply".to_string(),
        LoopEvent::AgentReplied {
            text: Some(text),
            tool_calls,
        } if !text.trim().is_empty() => {
            format!("[agent] requested {tool_calls} tool call(s): {}", text.trim())
        }
        LoopEvent::AgentReplied { tool_calls, .. } => {
            format!("[agent] requested {tool_calls} tool call(s)")
        }
        LoopEvent::ToolStarted { id, name } => format!("[tool] {name} ({id}) started"),
        LoopEvent::ToolFinished { id, name, ok } => format!(
            "[tool] {name} ({id}) {}",
            if *ok { "finished" } else { "failed" }
        ),
        LoopEvent::Finished => "[agent] turn finished".to_string(),
    }
}

/// Echo loop events to stderr on a background thread until the sender is
/// dropped.
pub fn spawn_event_printer() -> (Sender<LoopEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<LoopEvent>();
    let handle = std::thread::spawn(move || {
        for event in rx {
            eprintln!("{}", describe_event(&event));
        }
    });
    (tx, handle)
}
