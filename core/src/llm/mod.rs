//! Provider adapters and the canonical token protocol they all speak.

mod anthropic;
mod chat_completions;
mod mock;
mod streaming;


pub use anthropic::AnthropicAdapter;
pub use chat_completions::ChatCompletionsAdapter;
pub use mock::MockAdapter;

use crate::state::ChatMessage;
use crate::transport::HttpTransport;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[serde(alias = "anthropic")]
    Claude,
    DeepSeek,
    OpenAi,
    Mock,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown provider `{0}`")]
pub struct UnknownProvider(pub String);

impl LlmProviderKind {
    pub const ALL: [LlmProviderKind; 4] = [
        LlmProviderKind::Claude,
        LlmProviderKind::DeepSeek,
        LlmProviderKind::OpenAi,
        LlmProviderKind::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::DeepSeek => "deepseek",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::DeepSeek => "DeepSeek",
            Self::OpenAi => "OpenAI",
            Self::Mock => "Mock",
        }
    }

    /// Environment variables consulted for this provider's credential, in
    /// priority order.
    pub fn credential_env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Claude => &["CLAUDE_API_KEY", "ANTHROPIC_API_KEY"],
            Self::DeepSeek => &["DEEPSEEK_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Mock => &[],
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Mock)
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for LlmProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "deepseek" | "deep_seek" | "deep-seek" => Ok(Self::DeepSeek),
            "openai" | "open_ai" | "open-ai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(UnknownProvider(value.to_string())),
        }
    }
}

/// Unit of the streaming protocol. A well-formed stream carries zero or more
/// `TextDelta`s followed by exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum TokenEvent {
    TextDelta(String),
    Complete(String),
    Error(String),
}

impl TokenEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::TextDelta(_))
    }
}

pub type TokenStream = BoxStream<'static, TokenEvent>;

/// Model and endpoint parameters for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

pub const DEFAULT_MAX_TOKENS: u32 = 1024;

impl ProviderSettings {
    pub fn defaults_for(kind: LlmProviderKind) -> Self {
        let (model, base_url) = match kind {
            LlmProviderKind::Claude => ("claude-3-sonnet-20240229", "https://api.anthropic.com"),
            LlmProviderKind::DeepSeek => ("deepseek-chat", "https://api.deepseek.com"),
            LlmProviderKind::OpenAi => ("gpt-4o-mini", "https://api.openai.com/v1"),
            LlmProviderKind::Mock => ("mock", ""),
        };
        Self {
            model: model.to_string(),
            base_url: base_url.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Translates the canonical request into one provider's wire call and the
/// provider's stream back into [`TokenEvent`]s.
///
/// `history` holds only user/assistant messages and `credential` is non-empty;
/// both are checked by the dispatcher. Implementations issue at most one
/// outbound call per invocation and report every failure as a terminal
/// `Error` event.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> LlmProviderKind;

    fn stream(&self, system_prompt: &str, history: &[ChatMessage], credential: &str)
        -> TokenStream;
}

/// Static mapping from provider to adapter.
#[derive(Clone)]
pub struct Adapters {
    claude: Arc<dyn ProviderAdapter>,
    deepseek: Arc<dyn ProviderAdapter>,
    openai: Arc<dyn ProviderAdapter>,
    mock: Arc<dyn ProviderAdapter>,
}

impl Adapters {
    /// Build the default adapter set. Providers absent from `settings` use
    /// [`ProviderSettings::defaults_for`].
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        settings: &HashMap<LlmProviderKind, ProviderSettings>,
    ) -> Self {
        let settings_for = |kind: LlmProviderKind| {
            settings
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| ProviderSettings::defaults_for(kind))
        };
        Self {
            claude: Arc::new(AnthropicAdapter::new(
                settings_for(LlmProviderKind::Claude),
                transport.clone(),
            )),
            deepseek: Arc::new(ChatCompletionsAdapter::new(
                LlmProviderKind::DeepSeek,
                settings_for(LlmProviderKind::DeepSeek),
                transport.clone(),
            )),
            openai: Arc::new(ChatCompletionsAdapter::new(
                LlmProviderKind::OpenAi,
                settings_for(LlmProviderKind::OpenAi),
                transport,
            )),
            mock: Arc::new(MockAdapter::new(settings_for(LlmProviderKind::Mock))),
        }
    }

    pub fn for_kind(&self, kind: LlmProviderKind) -> &dyn ProviderAdapter {
        match kind {
            LlmProviderKind::Claude => self.claude.as_ref(),
            LlmProviderKind::DeepSeek => self.deepseek.as_ref(),
            LlmProviderKind::OpenAi => self.openai.as_ref(),
            LlmProviderKind::Mock => self.mock.as_ref(),
        }
    }

    /// Swap in a custom adapter for the provider it reports via
    /// [`ProviderAdapter::kind`].
    pub fn replace(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let slot = match adapter.kind() {
            LlmProviderKind::Claude => &mut self.claude,
            LlmProviderKind::DeepSeek => &mut self.deepseek,
            LlmProviderKind::OpenAi => &mut self.openai,
            LlmProviderKind::Mock => &mut self.mock,
        };
        *slot = adapter;
    }
}
