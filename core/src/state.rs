use crate::persona::ToolId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Prefix marking an assistant entry that reports a failed turn.
pub const DIAGNOSTIC_PREFIX: &str = "⚠ ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub diagnostic: bool,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            diagnostic: false,
        }
    }

    /// Assistant-role entry standing in for a reply that never arrived.
    pub fn diagnostic(message: &str) -> Self {
        let mut entry = Self::new(
            MessageRole::Assistant,
            format!("{DIAGNOSTIC_PREFIX}{message}"),
        );
        entry.diagnostic = true;
        entry
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("system messages are injected per request and never stored")]
    SystemRole,
    #[error("expected a {expected} message next, got {found}")]
    OutOfTurn {
        expected: MessageRole,
        found: MessageRole,
    },
}

/// Ordered history for one tool. Entries strictly alternate user/assistant,
/// starting with a user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tool: ToolId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(tool: ToolId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tool,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Role the next appended message must carry.
    pub fn expected_role(&self) -> MessageRole {
        match self.messages.last() {
            Some(message) if message.role == MessageRole::User => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }

    pub fn push(&mut self, message: ChatMessage) -> Result<(), HistoryError> {
        if message.role == MessageRole::System {
            return Err(HistoryError::SystemRole);
        }
        let expected = self.expected_role();
        if message.role != expected {
            return Err(HistoryError::OutOfTurn {
                expected,
                found: message.role,
            });
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    /// History to send to a provider. Failed turns (a user message answered by
    /// a diagnostic) are left out so the model never sees our own error text.
    pub fn history_for_request(&self) -> Vec<ChatMessage> {
        let mut outbound = Vec::with_capacity(self.messages.len());
        let mut iter = self.messages.iter().peekable();
        while let Some(message) = iter.next() {
            if message.role == MessageRole::User
                && iter.peek().is_some_and(|next| next.diagnostic)
            {
                iter.next();
                continue;
            }
            outbound.push(message.clone());
        }
        outbound
    }
}

/// What happens to the conversation of the tool being left when the user
/// switches tools.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPolicy {
    #[default]
    Keep,
    Clear,
}

/// Per-session conversations keyed by tool.
#[derive(Debug, Clone)]
pub struct SessionStore {
    conversations: HashMap<ToolId, Conversation>,
    active: ToolId,
    policy: SwitchPolicy,
}

impl SessionStore {
    pub fn new(initial: ToolId, policy: SwitchPolicy) -> Self {
        let mut conversations = HashMap::new();
        conversations.insert(initial, Conversation::new(initial));
        Self {
            conversations,
            active: initial,
            policy,
        }
    }

    pub fn active_tool(&self) -> ToolId {
        self.active
    }

    pub fn policy(&self) -> SwitchPolicy {
        self.policy
    }

    pub fn activate(&mut self, tool: ToolId) -> &mut Conversation {
        if tool != self.active {
            if self.policy == SwitchPolicy::Clear {
                if let Some(previous) = self.conversations.get_mut(&self.active) {
                    previous.clear();
                }
            }
            tracing::debug!(from = %self.active, to = %tool, "switching tool");
            self.active = tool;
        }
        self.conversation_mut(tool)
    }

    pub fn conversation(&self, tool: ToolId) -> Option<&Conversation> {
        self.conversations.get(&tool)
    }

    pub fn conversation_mut(&mut self, tool: ToolId) -> &mut Conversation {
        self.conversations
            .entry(tool)
            .or_insert_with(|| Conversation::new(tool))
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.conversations.get(&self.active)
    }

    pub fn active_conversation_mut(&mut self) -> &mut Conversation {
        self.conversation_mut(self.active)
    }
}
