use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley::core::config::{Config, EngineSettings};
use parley::core::conversation::ChatMode;
use parley::core::turn::{TurnEngine, TurnState};
use parley::tools::{NotificationHandle, ToolRegistry};
use parley::utils::logging::LoggingState;

/// One-shot driver: send a single message through the turn engine and print
/// the finalized assistant reply.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Streaming multi-provider chat turns")]
struct Cli {
    /// Message to send. Read from stdin when omitted.
    prompt: Vec<String>,

    /// Provider to talk to (openai, anthropic, gemini)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model identifier; defaults per provider
    #[arg(short, long)]
    model: Option<String>,

    /// Override the provider base URL
    #[arg(long)]
    base_url: Option<String>,

    /// System prompt prepended to the request history
    #[arg(long)]
    system: Option<String>,

    /// Conversation mode (general, debugging, integration)
    #[arg(long, default_value = "general")]
    mode: ChatMode,

    /// Append the transcript to this file
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn prompt_text(&self) -> Result<String, Box<dyn std::error::Error>> {
        if !self.prompt.is_empty() {
            return Ok(self.prompt.join(" "));
        }
        if std::io::stdin().is_terminal() {
            return Err("no prompt given and stdin is a terminal".into());
        }
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err("empty prompt".into());
        }
        Ok(text)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let prompt = cli.prompt_text()?;

    let mut config = Config::load()?;
    if cli.provider.is_some() {
        config.provider = cli.provider;
    }
    if cli.model.is_some() {
        config.model = cli.model;
    }
    if cli.base_url.is_some() {
        config.base_url = cli.base_url;
    }
    if cli.system.is_some() {
        config.system_prompt = cli.system;
    }
    if cli.log.is_some() {
        config.log_file = cli.log;
    }

    let settings = EngineSettings::resolve(&config, |name| std::env::var(name).ok())?;

    let mut logging = LoggingState::new(None);
    if let Some(path) = config.log_file {
        logging.set_log_file(path)?;
    }

    let notifications = NotificationHandle::new();
    notifications.register(|message| eprintln!("[notification] {message}"));
    let registry = ToolRegistry::with_builtins(notifications);

    let mut engine = TurnEngine::new(settings, registry, logging);
    engine.set_mode(cli.mode);

    let state = engine.run_turn(&prompt).await;
    if let Some(reply) = engine
        .store()
        .messages()
        .filter(|message| message.role.is_assistant())
        .last()
    {
        println!("{}", reply.content);
    }

    Ok(match state {
        TurnState::Errored => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
