use super::{LlmProviderKind, TokenEvent, TokenStream};
use crate::transport::{HttpRequest, HttpTransport, TransportError};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_ERROR_SUMMARY: usize = 300;

type EventStream =
    BoxStream<'static, Result<eventsource_stream::Event, EventStreamError<TransportError>>>;

/// One server-sent event as handed to a provider decoder. `event` is `None`
/// for the default `message` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl From<eventsource_stream::Event> for SseEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        let name = match event.event.as_str() {
            "" | "message" => None,
            _ => Some(event.event),
        };
        Self {
            event: name,
            data: event.data,
        }
    }
}

/// What a provider-specific decoder made of one SSE event.
pub(crate) enum Decoded {
    Delta(String),
    Skip,
    Done,
    Fail(String),
}

pub(crate) trait ChunkDecoder: Send + 'static {
    fn decode(&mut self, event: &SseEvent) -> Decoded;

    /// Called when the body ends before the decoder reported `Done`.
    fn finish(&mut self) -> Decoded;
}

/// Issue `request` lazily on first poll and turn its SSE body into token
/// events via `decoder`.
pub(crate) fn sse_token_stream<D: ChunkDecoder>(
    provider: LlmProviderKind,
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
    decoder: D,
) -> TokenStream {
    let call = SseCall {
        provider,
        request: Some((transport, request)),
        events: None,
        decoder,
        collected: String::new(),
        pending: VecDeque::new(),
        terminal_queued: false,
        done: false,
    };
    futures::stream::unfold(call, |mut call| async move {
        call.next_event().await.map(|event| (event, call))
    })
    .boxed()
}

struct SseCall<D> {
    provider: LlmProviderKind,
    request: Option<(Arc<dyn HttpTransport>, HttpRequest)>,
    events: Option<EventStream>,
    decoder: D,
    collected: String,
    pending: VecDeque<TokenEvent>,
    terminal_queued: bool,
    done: bool,
}

impl<D: ChunkDecoder> SseCall<D> {
    async fn next_event(&mut self) -> Option<TokenEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.done = true;
                    self.events = None;
                }
                return Some(event);
            }
            if self.done {
                return None;
            }
            if let Some((transport, request)) = self.request.take() {
                self.open(transport, request).await;
                continue;
            }
            let Some(events) = self.events.as_mut() else {
                self.done = true;
                return None;
            };
            match events.next().await {
                Some(Ok(event)) => self.interpret(&SseEvent::from(event)),
                Some(Err(EventStreamError::Transport(err))) => {
                    warn!(provider = %self.provider, %err, "stream interrupted");
                    self.queue_terminal(TokenEvent::Error(format!(
                        "{} stream interrupted: {err}",
                        self.provider
                    )));
                }
                Some(Err(err)) => {
                    warn!(provider = %self.provider, %err, "undecodable event stream");
                    self.queue_terminal(TokenEvent::Error(format!(
                        "{} sent a malformed stream: {err}",
                        self.provider
                    )));
                }
                None => {
                    if !self.terminal_queued {
                        let outcome = self.decoder.finish();
                        self.apply(outcome);
                    }
                    self.events = None;
                }
            }
        }
    }

    async fn open(&mut self, transport: Arc<dyn HttpTransport>, request: HttpRequest) {
        debug!(provider = %self.provider, url = %request.url, "sending chat request");
        let response = match transport.post(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(provider = %self.provider, %err, "chat request failed");
                self.queue_terminal(TokenEvent::Error(format!(
                    "{} request failed: {err}",
                    self.provider
                )));
                return;
            }
        };
        if !response.is_success() {
            let status = response.status;
            let body = response.text().await;
            warn!(provider = %self.provider, status, "provider returned an error status");
            self.queue_terminal(TokenEvent::Error(format!(
                "{} API error ({status}): {}",
                self.provider,
                summarize_error_body(&body)
            )));
            return;
        }
        self.events = Some(response.body.eventsource().boxed());
    }

    fn interpret(&mut self, event: &SseEvent) {
        if self.terminal_queued {
            return;
        }
        let outcome = self.decoder.decode(event);
        self.apply(outcome);
    }

    fn apply(&mut self, outcome: Decoded) {
        match outcome {
            Decoded::Delta(text) if text.is_empty() => {}
            Decoded::Delta(text) => {
                self.collected.push_str(&text);
                self.pending.push_back(TokenEvent::TextDelta(text));
            }
            Decoded::Skip => {}
            Decoded::Done => {
                let text = std::mem::take(&mut self.collected);
                self.queue_terminal(TokenEvent::Complete(text));
            }
            Decoded::Fail(message) => {
                warn!(provider = %self.provider, %message, "provider stream failed");
                self.queue_terminal(TokenEvent::Error(message));
            }
        }
    }

    fn queue_terminal(&mut self, event: TokenEvent) {
        if !self.terminal_queued {
            self.terminal_queued = true;
            self.pending.push_back(event);
        }
    }
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(summary) = error_message(&value) {
            return summary;
        }
    }
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_SUMMARY {
        let mut shortened: String = collapsed.chars().take(MAX_ERROR_SUMMARY).collect();
        shortened.push('…');
        shortened
    } else {
        collapsed
    }
}

/// `error.message`, a bare string `error`, or a top-level `message`.
pub(crate) fn error_message(value: &Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}
