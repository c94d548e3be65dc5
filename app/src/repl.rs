use crate::commands::{parse_line, ReplCommand, HELP};
use anyhow::Result;
use neonops_core::state::DIAGNOSTIC_PREFIX;
use neonops_core::{
    AppConfig, CancelHandle, LlmProviderKind, MessageRole, SessionStore, ToolId, TurnController,
    TurnObserver, TurnOutcome,
};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub fn role_badge(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "System",
        MessageRole::User => "You",
        MessageRole::Assistant => "NeonOps",
    }
}

pub fn write_tool_catalog(out: &mut impl Write) -> std::io::Result<()> {
    for tool in ToolId::ALL {
        writeln!(out, "{:<18} {}", tool.as_str(), tool.label())?;
    }
    Ok(())
}

/// Cancel handle of the turn currently streaming, if any. Clones share the slot.
#[derive(Clone, Default)]
pub struct ActiveTurn(Arc<Mutex<Option<CancelHandle>>>);

impl ActiveTurn {
    fn begin(&self, cancel: &CancelHandle) {
        *self.0.lock() = Some(cancel.clone());
    }

    fn end(&self) {
        self.0.lock().take();
    }

    /// Cancel the streaming turn. Returns `false` when none is in flight.
    pub fn cancel(&self) -> bool {
        match self.0.lock().as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Ctrl-C presses, fed by one signal listener that lives as long as the
/// session.
pub struct Interrupts {
    presses: mpsc::UnboundedReceiver<()>,
    listener: Option<JoinHandle<()>>,
}

impl Interrupts {
    /// Listen for Ctrl-C. Must be called from inside a tokio runtime.
    pub fn ctrl_c() -> Self {
        let (tx, presses) = mpsc::unbounded_channel();
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self {
            presses,
            listener: Some(listener),
        }
    }

    /// Presses delivered through a channel rather than the terminal.
    pub fn from_channel(presses: mpsc::UnboundedReceiver<()>) -> Self {
        Self {
            presses,
            listener: None,
        }
    }

    async fn pressed(&mut self) -> bool {
        self.presses.recv().await.is_some()
    }
}

impl Drop for Interrupts {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Prints deltas as they arrive and publishes the turn's cancel handle.
pub struct StreamRenderer<'a, W: Write> {
    out: &'a mut W,
    active: ActiveTurn,
}

impl<'a, W: Write> StreamRenderer<'a, W> {
    pub fn new(out: &'a mut W, active: ActiveTurn) -> Self {
        Self { out, active }
    }
}

impl<W: Write> TurnObserver for StreamRenderer<'_, W> {
    fn on_start(&mut self, cancel: &CancelHandle) {
        self.active.begin(cancel);
    }

    fn on_delta(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!(%err, "failed to write streamed text");
        }
    }
}

impl<W: Write> Drop for StreamRenderer<'_, W> {
    fn drop(&mut self) {
        self.active.end();
    }
}

/// Read commands from `input` until `/quit`, end of input, or Ctrl-C at the
/// prompt. Ctrl-C while a reply streams cancels only that turn.
pub async fn run_repl<R, W>(
    session: &mut ChatSession,
    input: R,
    out: &mut W,
    interrupts: &mut Interrupts,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let active = session.active_turn();
    loop {
        write!(out, "{}", session.prompt())?;
        out.flush()?;
        let line = tokio::select! {
            biased;
            line = lines.next_line() => line?,
            true = interrupts.pressed() => {
                writeln!(out)?;
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err}")?;
                continue;
            }
        };

        let turn = session.handle(command, out);
        tokio::pin!(turn);
        let keep_going = loop {
            tokio::select! {
                biased;
                result = &mut turn => break result?,
                true = interrupts.pressed() => {
                    if !active.cancel() {
                        tracing::debug!("interrupt with no turn in flight");
                    }
                }
            }
        };
        if !keep_going {
            return Ok(());
        }
    }
}

/// Interactive session state: the conversations and the selected provider.
pub struct ChatSession {
    controller: TurnController,
    store: SessionStore,
    provider: LlmProviderKind,
    active: ActiveTurn,
}

impl ChatSession {
    pub fn new(controller: TurnController, config: &AppConfig) -> Self {
        Self {
            controller,
            store: SessionStore::new(config.tool, config.switch_policy),
            provider: config.provider,
            active: ActiveTurn::default(),
        }
    }

    /// Handle for cancelling whichever turn is streaming.
    pub fn active_turn(&self) -> ActiveTurn {
        self.active.clone()
    }

    pub fn provider(&self) -> LlmProviderKind {
        self.provider
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn prompt(&self) -> String {
        format!("[{} · {}] > ", self.store.active_tool(), self.provider.as_str())
    }

    /// Apply one command. Returns `false` when the session should end.
    pub async fn handle<W: Write>(&mut self, command: ReplCommand, out: &mut W) -> Result<bool> {
        match command {
            ReplCommand::Submit(text) => {
                self.submit(&text, out).await?;
            }
            ReplCommand::SwitchTool(tool) => {
                let restored = self.store.activate(tool).len();
                writeln!(out, "Switched to {} ({restored} messages).", tool.label())?;
            }
            ReplCommand::SwitchProvider(provider) => {
                self.provider = provider;
                if !self.controller.dispatcher().credentials().is_configured(provider) {
                    writeln!(
                        out,
                        "{DIAGNOSTIC_PREFIX}no credential configured for {provider}; turns will fail until one is set."
                    )?;
                }
                writeln!(out, "Using {provider}.")?;
            }
            ReplCommand::History => {
                if let Some(conversation) = self.store.active_conversation() {
                    for message in conversation.messages() {
                        writeln!(
                            out,
                            "{} · {}\n{}\n",
                            role_badge(message.role),
                            message.created_at.format("%H:%M:%S"),
                            message.content
                        )?;
                    }
                }
            }
            ReplCommand::Clear => {
                self.store.active_conversation_mut().clear();
                writeln!(out, "Conversation cleared.")?;
            }
            ReplCommand::Tools => write_tool_catalog(out)?,
            ReplCommand::Help => writeln!(out, "{HELP}")?,
            ReplCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    pub async fn submit<W: Write>(&mut self, text: &str, out: &mut W) -> Result<TurnOutcome> {
        let outcome = {
            let mut renderer = StreamRenderer::new(out, self.active.clone());
            self.controller
                .submit_active(&mut self.store, self.provider, text, &mut renderer)
                .await?
        };
        match &outcome {
            TurnOutcome::Completed(_) => writeln!(out)?,
            TurnOutcome::Failed(message) => writeln!(out, "\n{DIAGNOSTIC_PREFIX}{message}")?,
            TurnOutcome::Ignored => {}
        }
        out.flush()?;
        Ok(outcome)
    }
}
