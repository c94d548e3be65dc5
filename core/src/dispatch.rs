use crate::auth::Credentials;
use crate::config::AppConfig;
use crate::llm::{Adapters, LlmProviderKind, TokenEvent, TokenStream};
use crate::persona::ToolId;
use crate::state::Conversation;
use crate::transport::{HttpTransport, ReqwestTransport, TransportError};
use futures::stream::{AbortHandle, Abortable};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

/// Runs one conversational turn against the selected provider.
#[derive(Clone)]
pub struct Dispatcher {
    credentials: Credentials,
    adapters: Adapters,
}

impl Dispatcher {
    pub fn new(credentials: Credentials, adapters: Adapters) -> Self {
        Self {
            credentials,
            adapters,
        }
    }

    /// Production dispatcher talking to the real provider endpoints.
    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(
            config.credentials(),
            Adapters::new(transport, &config.providers),
        )
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn adapters_mut(&mut self) -> &mut Adapters {
        &mut self.adapters
    }

    /// Start a turn. Nothing touches the network until the returned stream is
    /// polled, and a missing credential yields a single `Error` without any
    /// outbound call.
    pub fn run_turn(
        &self,
        tool: ToolId,
        provider: LlmProviderKind,
        conversation: &Conversation,
    ) -> TurnStream {
        let persona = tool.persona();
        let inner: TokenStream = match self.credentials.resolve(provider) {
            Ok(credential) => {
                let history = conversation.history_for_request();
                debug!(%tool, %provider, messages = history.len(), "dispatching turn");
                self.adapters
                    .for_kind(provider)
                    .stream(persona, &history, &credential)
            }
            Err(err) => {
                warn!(%tool, %provider, %err, "turn short-circuited");
                futures::stream::iter([TokenEvent::Error(err.to_string())]).boxed()
            }
        };
        TurnStream::new(provider, inner)
    }
}

/// Aborts an in-flight turn. The stream then ends with `Error("cancelled")`.
#[derive(Clone, Debug)]
pub struct CancelHandle(AbortHandle);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}

/// Token stream of one turn. Deltas pass through unchanged while being
/// accumulated; `Complete` carries the accumulated text rather than the
/// adapter's own, and nothing is yielded after the first terminal event.
pub struct TurnStream {
    provider: LlmProviderKind,
    inner: Abortable<TokenStream>,
    cancel: CancelHandle,
    buffer: String,
    finished: bool,
    completed: bool,
}

impl TurnStream {
    fn new(provider: LlmProviderKind, inner: TokenStream) -> Self {
        let (handle, registration) = AbortHandle::new_pair();
        Self {
            provider,
            inner: Abortable::new(inner, registration),
            cancel: CancelHandle(handle),
            buffer: String::new(),
            finished: false,
            completed: false,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Text accumulated so far. Cleared when the turn ends in an error.
    pub fn accumulated(&self) -> &str {
        &self.buffer
    }

    /// The completed reply, once the stream has yielded `Complete`.
    pub fn final_text(&self) -> Option<&str> {
        self.completed.then_some(self.buffer.as_str())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn fail(&mut self, message: String) -> TokenEvent {
        self.finished = true;
        if !self.buffer.is_empty() {
            debug!(
                provider = %self.provider,
                discarded = self.buffer.len(),
                "discarding partial reply"
            );
        }
        self.buffer.clear();
        TokenEvent::Error(message)
    }
}

impl Stream for TurnStream {
    type Item = TokenEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TokenEvent>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        let event = match futures::ready!(this.inner.poll_next_unpin(cx)) {
            Some(TokenEvent::TextDelta(text)) => {
                this.buffer.push_str(&text);
                TokenEvent::TextDelta(text)
            }
            Some(TokenEvent::Complete(_)) => {
                this.finished = true;
                this.completed = true;
                info!(provider = %this.provider, chars = this.buffer.len(), "turn completed");
                TokenEvent::Complete(this.buffer.clone())
            }
            Some(TokenEvent::Error(message)) => this.fail(message),
            None if this.cancel.is_cancelled() => this.fail("cancelled".to_string()),
            None => {
                let message = format!("{} stream ended without completing", this.provider);
                this.fail(message)
            }
        };
        Poll::Ready(Some(event))
    }
}
