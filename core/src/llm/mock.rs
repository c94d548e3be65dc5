use super::{LlmProviderKind, ProviderAdapter, ProviderSettings, TokenEvent, TokenStream};
use crate::state::{ChatMessage, MessageRole};
use futures::StreamExt;

/// Offline provider. Replies with an echo of the latest user message, split
/// into word-sized segments.
pub struct MockAdapter {
    settings: ProviderSettings,
}

impl MockAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    fn reply(&self, history: &[ChatMessage]) -> String {
        let prompt = history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or("How can I help you today?");
        format!(
            "[Mock] Model {}: received '{}'.",
            self.settings.model, prompt
        )
    }
}

impl ProviderAdapter for MockAdapter {
    fn kind(&self) -> LlmProviderKind {
        LlmProviderKind::Mock
    }

    fn stream(
        &self,
        _system_prompt: &str,
        history: &[ChatMessage],
        _credential: &str,
    ) -> TokenStream {
        let reply = self.reply(history);
        let segments: Vec<String> = reply.split_inclusive(' ').map(str::to_owned).collect();
        let full_text = segments.concat();
        futures::stream::iter(segments)
            .map(TokenEvent::TextDelta)
            .chain(futures::stream::once(async move {
                TokenEvent::Complete(full_text)
            }))
            .boxed()
    }
}
