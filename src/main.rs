mod agent;
mod cli;
mod config;
mod llm;
mod logging;
mod tools;

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentConfig, AgentError, ConversationState, LoopOutcome, run_turn};
use crate::cli::{Command, Input};
use crate::config::{AppConfig, CliOverrides};
use crate::llm::{OpenAIChatModel, OpenAIClient};
use crate::tools::{SerpApiClient, TravelTools};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tripc",
    version,
    about = "Conversational travel planner backed by flight and hotel search"
)]
struct Cli {
    /// Send a single request and print the reply instead of starting a chat
    #[arg(short, long)]
    prompt: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// API key (set via env GROQ_API_KEY recommended)
    #[arg(long)]
    api_key: Option<String>,

    /// Log level (error,warn,info,debug,trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Maximum model rounds per request
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Delay between printed words in milliseconds (0 prints at once)
    #[arg(long)]
    stream_delay_ms: Option<u64>,

    /// Show tool activity on stderr
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            max_rounds: self.max_rounds,
            stream_delay_ms: self.stream_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let cfg = logging::with_bootstrap(|| AppConfig::load(cli.overrides()))?;
    logging::init_logging(&cfg.log_level, cfg.log_file.as_deref())?;
    info!(
        model = %cfg.model,
        base_url = %cfg.base_url,
        max_rounds = cfg.agent.max_rounds,
        project_root = %cfg.project_root.display(),
        "app config"
    );
    if cfg.search.api_key.is_none() {
        warn!("SERPAPI_API_KEY is not set; searches will report an error");
    }

    let (agent_cfg, client) = build_agent(&cfg)?;
    let session = Session {
        agent: agent_cfg,
        client,
        verbose: cli.verbose,
        delay: Duration::from_millis(cfg.stream_delay_ms),
    };

    if let Some(prompt) = cli.prompt.as_deref() {
        return run_once(&session, prompt).await;
    }
    if !atty::is(atty::Stream::Stdin) {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }
        return run_once(&session, input).await;
    }
    run_repl(&session).await
}

struct Session {
    agent: AgentConfig,
    /// Shares token counters with the client inside `agent`.
    client: OpenAIClient,
    verbose: bool,
    delay: Duration,
}

fn build_agent(cfg: &AppConfig) -> Result<(AgentConfig, OpenAIClient)> {
    let api_key = cfg
        .api_key
        .clone()
        .context("no language model API key; set GROQ_API_KEY or pass --api-key")?;
    let client = OpenAIClient::new(cfg.base_url.clone(), api_key)?.with_llm_config(cfg.llm.clone());
    let model = OpenAIChatModel::new(client.clone(), cfg.model.clone(), Some(cfg.temperature));
    let search = SerpApiClient::new(cfg.search.clone()).context("build search client")?;
    let agent = AgentConfig::new(Arc::new(model), TravelTools::new(search), &cfg.agent);
    Ok((agent, client))
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run one turn, cancelling it on Ctrl-C.
async fn turn(
    session: &Session,
    state: &mut ConversationState,
    input: &str,
) -> Result<LoopOutcome, AgentError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            ctrl_c().await;
            cancel.cancel();
        })
    };

    let tokens_before = (
        session.client.get_prompt_tokens_used(),
        session.client.get_tokens_used(),
    );
    let printer = session.verbose.then(cli::spawn_event_printer);
    let events = printer.as_ref().map(|(tx, _)| tx);
    let result = run_turn(&session.agent, state, input, events, &cancel).await;

    watcher.abort();
    if let Some((tx, handle)) = printer {
        drop(tx);
        let _ = handle.join();
        eprintln!(
            "[usage] this turn: prompt tokens {}, total tokens {}",
            session.client.get_prompt_tokens_used().saturating_sub(tokens_before.0),
            session.client.get_tokens_used().saturating_sub(tokens_before.1)
        );
    }
    if let Ok(outcome) = &result {
        debug!(rounds = outcome.rounds(), messages = state.len(), "turn done");
    }
    result
}

async fn run_once(session: &Session, input: &str) -> Result<()> {
    let mut state = ConversationState::new();
    let outcome = turn(session, &mut state, input).await?;
    cli::print_streamed(&cli::outcome_text(&outcome), session.delay).await?;
    Ok(())
}

async fn run_repl(session: &Session) -> Result<()> {
    println!("tripc - type /help for commands");
    println!("{}", cli::GREETING);

    let mut state = ConversationState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let line = match cli::next_input(&mut lines, ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                println!();
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(cmd) = cli::parse_command(line) {
            match cmd {
                Command::Help => cli::print_help(),
                Command::Tools => cli::print_tools(),
                Command::Reset => {
                    state.clear();
                    println!("{}", cli::GREETING);
                }
                Command::Clear => cli::clear_screen(),
                Command::Quit => break,
                Command::Unknown(other) => eprintln!("unknown command: {other} (try /help)"),
            }
            continue;
        }

        match turn(session, &mut state, line).await {
            Ok(outcome) => {
                cli::print_streamed(&cli::outcome_text(&outcome), session.delay).await?;
            }
            Err(AgentError::Cancelled) => eprintln!("[cancelled]"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
