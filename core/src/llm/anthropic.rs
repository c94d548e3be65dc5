use super::streaming::{error_message, sse_token_stream, ChunkDecoder, Decoded, SseEvent};
use super::{LlmProviderKind, ProviderAdapter, ProviderSettings, TokenStream};
use crate::state::ChatMessage;
use crate::transport::{HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API. The persona is sent in the
/// top-level `system` field, never inside `messages`.
pub struct AnthropicAdapter {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
}

impl AnthropicAdapter {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    pub fn build_request(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        credential: &str,
    ) -> HttpRequest {
        let messages: Vec<Value> = history
            .iter()
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();
        let mut body = json!({
            "model": self.settings.model,
            "messages": messages,
            "max_tokens": self.settings.max_tokens,
            "stream": true,
        });
        if !system_prompt.is_empty() {
            body["system"] = Value::String(system_prompt.to_string());
        }
        HttpRequest::post(self.settings.endpoint("v1/messages"), body)
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Accept", "text/event-stream")
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> LlmProviderKind {
        LlmProviderKind::Claude
    }

    fn stream(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        credential: &str,
    ) -> TokenStream {
        let request = self.build_request(system_prompt, history, credential);
        sse_token_stream(
            LlmProviderKind::Claude,
            self.transport.clone(),
            request,
            MessagesDecoder,
        )
    }
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaBody,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaBody {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

struct MessagesDecoder;

impl ChunkDecoder for MessagesDecoder {
    fn decode(&mut self, event: &SseEvent) -> Decoded {
        let payload = event.data.trim();
        if payload.is_empty() {
            return Decoded::Skip;
        }
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => return Decoded::Fail(format!("Claude sent a malformed chunk: {err}")),
        };
        let event_type = event
            .event
            .clone()
            .or_else(|| value.get("type").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_default();

        match event_type.as_str() {
            "content_block_delta" => match serde_json::from_value::<ContentBlockDelta>(value) {
                Ok(ContentBlockDelta {
                    delta: DeltaBody::TextDelta { text },
                }) => Decoded::Delta(text),
                Ok(_) => Decoded::Skip,
                Err(err) => Decoded::Fail(format!("Claude sent a malformed chunk: {err}")),
            },
            "message_stop" => Decoded::Done,
            "error" => {
                let message = error_message(&value).unwrap_or_else(|| payload.to_string());
                Decoded::Fail(format!("Claude reported an error: {message}"))
            }
            // message_start, content_block_start/stop, message_delta, ping and
            // any event types added later carry no text.
            _ => Decoded::Skip,
        }
    }

    fn finish(&mut self) -> Decoded {
        Decoded::Fail("Claude stream closed before message_stop".to_string())
    }
}
