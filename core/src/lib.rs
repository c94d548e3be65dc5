pub mod auth;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod persona;
pub mod state;
pub mod telemetry;
pub mod transport;
pub mod turn;

pub use auth::{CredentialError, Credentials};
pub use config::{AppConfig, ConfigError};
pub use dispatch::{CancelHandle, Dispatcher, TurnStream};
pub use llm::{LlmProviderKind, ProviderAdapter, TokenEvent, TokenStream};
pub use persona::ToolId;
pub use state::{ChatMessage, Conversation, MessageRole, SessionStore, SwitchPolicy};
pub use transport::{HttpTransport, ScriptedReply, ScriptedTransport};
pub use turn::{TurnController, TurnObserver, TurnOutcome};
