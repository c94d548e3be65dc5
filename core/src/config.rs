use crate::auth::Credentials;
use crate::llm::{LlmProviderKind, ProviderSettings};
use crate::persona::ToolId;
use crate::state::SwitchPolicy;
use directories::BaseDirs;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolved runtime configuration: file values overlaid with the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: LlmProviderKind,
    pub tool: ToolId,
    pub switch_policy: SwitchPolicy,
    pub request_timeout: Duration,
    pub providers: HashMap<LlmProviderKind, ProviderSettings>,
    secrets: HashMap<LlmProviderKind, String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Read { path, .. } => {
                format!("Could not read {}. Check the file permissions.", path.display())
            }
            Self::Invalid(detail) => format!("NeonOps is misconfigured: {detail}. Update neonops.yaml."),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Claude,
            tool: ToolId::Chat,
            switch_policy: SwitchPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            providers: LlmProviderKind::ALL
                .into_iter()
                .map(|kind| (kind, ProviderSettings::defaults_for(kind)))
                .collect(),
            secrets: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the YAML file (an explicit path, or the first
    /// candidate that exists), then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(%err, "failed to load .env");
            }
        }
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => locate_config_file(),
        };
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded configuration file");
                Self::from_yaml(&contents)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid neonops.yaml: {err}")))?;
        resolve_app_section(raw.app.unwrap_or_default())
    }

    /// Overlay environment values. `lookup` stands in for `std::env::var` so
    /// tests stay hermetic.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NEONOPS_PROVIDER").filter(|v| !v.trim().is_empty()) {
            self.provider = value
                .parse()
                .map_err(|err| ConfigError::Invalid(format!("NEONOPS_PROVIDER: {err}")))?;
        }
        for kind in LlmProviderKind::ALL {
            let secret = kind
                .credential_env_vars()
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty());
            if let Some(secret) = secret {
                self.secrets.insert(kind, secret.trim().to_string());
            }
        }
        Ok(())
    }

    pub fn settings_for(&self, kind: LlmProviderKind) -> ProviderSettings {
        self.providers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::defaults_for(kind))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::from_map(self.secrets.clone())
    }
}

fn resolve_app_section(app: AppSection) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();
    if let Some(provider) = app.provider {
        config.provider = provider
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("app.provider: {err}")))?;
    }
    if let Some(tool) = app.tool {
        config.tool = tool
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("app.tool: {err}")))?;
    }
    if let Some(policy) = app.switch_policy {
        config.switch_policy = policy;
    }
    if let Some(secs) = app.request_timeout_secs {
        if secs == 0 {
            return Err(ConfigError::Invalid(
                "app.request_timeout_secs must be positive".to_string(),
            ));
        }
        config.request_timeout = Duration::from_secs(secs);
    }

    for (name, section) in app.providers {
        let kind: LlmProviderKind = name
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("app.providers: {err}")))?;
        let mut settings = ProviderSettings::defaults_for(kind);
        if let Some(model) = section.model.filter(|m| !m.trim().is_empty()) {
            settings.model = model.trim().to_string();
        }
        if let Some(base_url) = section.base_url {
            settings.base_url = validate_base_url(kind, base_url.trim())?;
        }
        if let Some(max_tokens) = section.max_tokens {
            if max_tokens == 0 {
                return Err(ConfigError::Invalid(format!(
                    "max_tokens for {kind} must be positive"
                )));
            }
            settings.max_tokens = max_tokens;
        }
        let api_key = section.api_key.trim();
        if !api_key.is_empty() {
            config.secrets.insert(kind, api_key.to_string());
        }
        config.providers.insert(kind, settings);
    }
    Ok(config)
}

fn validate_base_url(kind: LlmProviderKind, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw)
        .map_err(|err| ConfigError::Invalid(format!("base_url for {kind} is invalid: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "base_url for {kind} must use http or https"
        )));
    }
    Ok(raw.to_string())
}

fn locate_config_file() -> Option<PathBuf> {
    neonops_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn neonops_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("neonops");
        paths.push(config_dir.join("neonops.yaml"));
        paths.push(config_dir.join("neonops.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".neonops").join("neonops.yaml"));
        paths.push(home_dir.join(".neonops").join("neonops.yml"));
    } else {
        paths.push(PathBuf::from("neonops.yaml"));
        paths.push(PathBuf::from("neonops.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    app: Option<AppSection>,
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    provider: Option<String>,
    tool: Option<String>,
    switch_policy: Option<SwitchPolicy>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    providers: HashMap<String, ProviderSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSection {
    #[serde(default)]
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
}
