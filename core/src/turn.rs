use crate::dispatch::{CancelHandle, Dispatcher};
use crate::llm::{LlmProviderKind, TokenEvent};
use crate::persona::ToolId;
use crate::state::{ChatMessage, Conversation, HistoryError, MessageRole, SessionStore};
use futures::StreamExt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The provider answered; the reply was appended as an assistant message.
    Completed(String),
    /// The turn failed; a diagnostic assistant message was appended.
    Failed(String),
    /// Blank input. Nothing was appended or sent.
    Ignored,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Receives live output while a turn streams.
pub trait TurnObserver {
    /// Called once before the first event, with a handle that aborts the turn.
    fn on_start(&mut self, _cancel: &CancelHandle) {}

    fn on_delta(&mut self, text: &str);
}

impl<F: FnMut(&str)> TurnObserver for F {
    fn on_delta(&mut self, text: &str) {
        self(text)
    }
}

/// Appends the user message, drives the dispatcher and records the reply.
#[derive(Clone)]
pub struct TurnController {
    dispatcher: Dispatcher,
}

impl TurnController {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one turn. The user message is stored before any network activity,
    /// and exactly one assistant message follows it whatever the provider
    /// does. The only error is a conversation that is not expecting a user
    /// message.
    pub async fn submit<O: TurnObserver>(
        &self,
        tool: ToolId,
        provider: LlmProviderKind,
        conversation: &mut Conversation,
        user_text: &str,
        observer: &mut O,
    ) -> Result<TurnOutcome, HistoryError> {
        debug_assert_eq!(conversation.tool, tool, "conversation belongs to another tool");
        if user_text.trim().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }
        conversation.push(ChatMessage::new(MessageRole::User, user_text))?;
        let pending = PendingReply {
            conversation,
            settled: false,
        };

        let mut stream = self.dispatcher.run_turn(tool, provider, &*pending.conversation);
        observer.on_start(&stream.cancel_handle());

        let mut result = None;
        while let Some(event) = stream.next().await {
            match event {
                TokenEvent::TextDelta(text) => observer.on_delta(&text),
                TokenEvent::Complete(text) => result = Some(Ok(text)),
                TokenEvent::Error(message) => result = Some(Err(message)),
            }
        }

        // The turn stream always ends with a terminal event.
        let result = result.unwrap_or_else(|| Err(format!("{provider} returned no reply")));
        let (reply, outcome) = match result {
            Ok(text) => {
                info!(%tool, %provider, "assistant reply recorded");
                (
                    ChatMessage::new(MessageRole::Assistant, text.clone()),
                    TurnOutcome::Completed(text),
                )
            }
            Err(message) => {
                warn!(%tool, %provider, %message, "turn failed");
                (ChatMessage::diagnostic(&message), TurnOutcome::Failed(message))
            }
        };
        pending.settle(reply)?;
        Ok(outcome)
    }

    /// [`submit`](Self::submit) against the store's active tool.
    pub async fn submit_active<O: TurnObserver>(
        &self,
        store: &mut SessionStore,
        provider: LlmProviderKind,
        user_text: &str,
        observer: &mut O,
    ) -> Result<TurnOutcome, HistoryError> {
        let tool = store.active_tool();
        let conversation = store.active_conversation_mut();
        self.submit(tool, provider, conversation, user_text, observer)
            .await
    }
}

/// The user message of a turn in flight. If the turn is dropped before a reply
/// is recorded, a `cancelled` diagnostic is appended so the pairing holds.
struct PendingReply<'a> {
    conversation: &'a mut Conversation,
    settled: bool,
}

impl PendingReply<'_> {
    fn settle(mut self, reply: ChatMessage) -> Result<(), HistoryError> {
        self.settled = true;
        self.conversation.push(reply)
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(tool = %self.conversation.tool, "turn dropped before a reply arrived");
        if let Err(err) = self.conversation.push(ChatMessage::diagnostic("cancelled")) {
            warn!(%err, "failed to record cancelled turn");
        }
    }
}
