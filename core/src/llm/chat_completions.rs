use super::streaming::{error_message, sse_token_stream, ChunkDecoder, Decoded, SseEvent};
use super::{LlmProviderKind, ProviderAdapter, ProviderSettings, TokenStream};
use crate::state::ChatMessage;
use crate::transport::{HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Adapter for OpenAI-compatible `/chat/completions` endpoints (DeepSeek,
/// OpenAI). The persona travels as a leading `system` entry in `messages`.
pub struct ChatCompletionsAdapter {
    kind: LlmProviderKind,
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
}

impl ChatCompletionsAdapter {
    pub fn new(
        kind: LlmProviderKind,
        settings: ProviderSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            kind,
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
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": system_prompt }));
        }
        messages.extend(
            history
                .iter()
                .map(|message| json!({ "role": message.role.as_str(), "content": message.content })),
        );
        let body = json!({
            "model": self.settings.model,
            "messages": messages,
            "stream": true,
            "max_tokens": self.settings.max_tokens,
        });
        HttpRequest::post(self.settings.endpoint("chat/completions"), body)
            .header("Authorization", format!("Bearer {credential}"))
            .header("Accept", "text/event-stream")
    }
}

impl ProviderAdapter for ChatCompletionsAdapter {
    fn kind(&self) -> LlmProviderKind {
        self.kind
    }

    fn stream(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        credential: &str,
    ) -> TokenStream {
        let request = self.build_request(system_prompt, history, credential);
        sse_token_stream(
            self.kind,
            self.transport.clone(),
            request,
            CompletionDecoder { kind: self.kind },
        )
    }
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

struct CompletionDecoder {
    kind: LlmProviderKind,
}

impl ChunkDecoder for CompletionDecoder {
    fn decode(&mut self, event: &SseEvent) -> Decoded {
        let payload = event.data.trim();
        if payload.is_empty() {
            return Decoded::Skip;
        }
        if payload == "[DONE]" {
            return Decoded::Done;
        }
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                return Decoded::Fail(format!("{} sent a malformed chunk: {err}", self.kind))
            }
        };
        if value.get("error").is_some_and(|error| !error.is_null()) {
            let message = error_message(&value).unwrap_or_else(|| payload.to_string());
            return Decoded::Fail(format!("{} reported an error: {message}", self.kind));
        }
        match serde_json::from_value::<CompletionChunk>(value) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .map(Decoded::Delta)
                .unwrap_or(Decoded::Skip),
            Err(err) => Decoded::Fail(format!("{} sent a malformed chunk: {err}", self.kind)),
        }
    }

    fn finish(&mut self) -> Decoded {
        // The stream closing is an acceptable end even without `[DONE]`.
        Decoded::Done
    }
}
