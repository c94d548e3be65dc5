use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use neonops_core::{
    telemetry, AppConfig, Dispatcher, LlmProviderKind, ScriptedReply, ScriptedTransport,
    SessionStore, SwitchPolicy, ToolId, TurnController, TurnOutcome,
};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for NeonOps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an offline smoke test over the mock and a scripted Claude stream.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let mut config = AppConfig::default();
    config.apply_overrides(|name| (name == "CLAUDE_API_KEY").then(|| "sk-smoke".to_string()))?;

    let transport = ScriptedTransport::new().with_reply(ScriptedReply::chunks([
        "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"pong \"}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"from Claude\"}}\n\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    ]));
    let dispatcher = Dispatcher::with_transport(&config, Arc::new(transport.clone()));
    let controller = TurnController::new(dispatcher);
    let mut store = SessionStore::new(ToolId::Chat, SwitchPolicy::Keep);

    for provider in [LlmProviderKind::Mock, LlmProviderKind::Claude] {
        let mut streamed = 0usize;
        let outcome = runtime.block_on(controller.submit_active(
            &mut store,
            provider,
            "ping from xtask",
            &mut |_: &str| streamed += 1,
        ))?;
        match outcome {
            TurnOutcome::Completed(text) => {
                info!(%provider, deltas = streamed, reply = %text, "smoke turn completed");
            }
            TurnOutcome::Failed(message) => bail!("{provider} smoke turn failed: {message}"),
            TurnOutcome::Ignored => bail!("{provider} smoke turn was ignored"),
        }
    }

    if let Some(conversation) = store.active_conversation() {
        info!(
            "messages" = conversation.len(),
            "calls" = transport.call_count(),
            "smoke test conversation recorded"
        );
    }

    Ok(())
}
