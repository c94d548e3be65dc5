use crate::llm::LlmProviderKind;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder handed to the offline provider, which needs no secret.
const MOCK_CREDENTIAL: &str = "mock";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing credential for {0}")]
    Missing(LlmProviderKind),
}

/// Provider secrets shared across the session. Clones share the same table, so
/// a rotation through one handle is seen by the next turn of every holder.
#[derive(Clone, Default)]
pub struct Credentials {
    store: Arc<RwLock<HashMap<LlmProviderKind, String>>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(secrets: HashMap<LlmProviderKind, String>) -> Self {
        let credentials = Self::new();
        for (kind, secret) in secrets {
            credentials.set(kind, secret);
        }
        credentials
    }

    pub fn set(&self, kind: LlmProviderKind, secret: impl Into<String>) {
        self.store.write().insert(kind, secret.into());
    }

    pub fn remove(&self, kind: LlmProviderKind) {
        self.store.write().remove(&kind);
    }

    /// Fails closed: absent and blank secrets are both `Missing`.
    pub fn resolve(&self, kind: LlmProviderKind) -> Result<String, CredentialError> {
        if !kind.requires_credential() {
            return Ok(MOCK_CREDENTIAL.to_string());
        }
        self.store
            .read()
            .get(&kind)
            .map(|secret| secret.trim())
            .filter(|secret| !secret.is_empty())
            .map(str::to_owned)
            .ok_or(CredentialError::Missing(kind))
    }

    pub fn is_configured(&self, kind: LlmProviderKind) -> bool {
        self.resolve(kind).is_ok()
    }
}
