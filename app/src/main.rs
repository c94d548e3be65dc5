use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use neonops::repl::write_tool_catalog;
use neonops::{run_repl, ChatSession, Interrupts};
use neonops_core::{
    telemetry, AppConfig, Dispatcher, LlmProviderKind, ToolId, TurnController, TurnOutcome,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "neonops", version, about = "Multi-tool AI chat for Web3 creators")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// Path to neonops.yaml; defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (the default).
    Chat(Selection),
    /// Send a single prompt and print the reply.
    Ask {
        #[command(flatten)]
        selection: Selection,
        prompt: Vec<String>,
    },
    /// List the available tools.
    Tools,
}

#[derive(Args, Debug, Default)]
struct Selection {
    #[arg(long)]
    tool: Option<ToolId>,
    #[arg(long)]
    provider: Option<LlmProviderKind>,
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::default_filter("warn"))?;

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())
        .map_err(|err| anyhow!(err.user_message()))
        .context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Chat(Selection::default())) {
        Command::Tools => {
            write_tool_catalog(&mut io::stdout().lock())?;
            Ok(())
        }
        Command::Chat(selection) => {
            selection.apply(&mut config);
            run_chat(&config)
        }
        Command::Ask { selection, prompt } => {
            selection.apply(&mut config);
            run_ask(&config, &prompt.join(" "))
        }
    }
}

impl Selection {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(tool) = self.tool {
            config.tool = tool;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
    }
}

fn build_session(config: &AppConfig) -> anyhow::Result<ChatSession> {
    let dispatcher = Dispatcher::from_config(config)?;
    Ok(ChatSession::new(TurnController::new(dispatcher), config))
}

fn run_chat(config: &AppConfig) -> anyhow::Result<()> {
    let runtime = Runtime::new()?;
    let mut session = build_session(config)?;
    let mut stdout = io::stdout();

    writeln!(stdout, "NeonOps · /help for commands")?;
    let result = runtime.block_on(async {
        let mut interrupts = Interrupts::ctrl_c();
        let stdin = BufReader::new(tokio::io::stdin());
        run_repl(&mut session, stdin, &mut stdout, &mut interrupts).await
    });
    // A blocking stdin read may still be parked; don't wait for it.
    runtime.shutdown_background();
    result
}

fn run_ask(config: &AppConfig, prompt: &str) -> anyhow::Result<()> {
    if prompt.trim().is_empty() {
        return Err(anyhow!("nothing to ask"));
    }
    let runtime = Runtime::new()?;
    let mut session = build_session(config)?;
    let mut stdout = io::stdout();
    match runtime.block_on(session.submit(prompt, &mut stdout))? {
        TurnOutcome::Failed(message) => Err(anyhow!(message)),
        _ => Ok(()),
    }
}
