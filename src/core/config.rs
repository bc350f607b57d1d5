//! Configuration loading and engine settings resolution.
//!
//! Values layer in the usual order: `config.toml` under the platform config
//! directory, then `PARLEY_*` environment variables, then CLI flags applied
//! by the caller. Provider API keys additionally resolve from each
//! provider's conventional environment variable.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

const ENV_PREFIX: &str = "PARLEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub log_file: Option<String>,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "parley")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => toml::from_str(&fs::read_to_string(&path)?)?,
            _ => Config::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from an environment lookup. Injected as a closure so
    /// tests never mutate process state.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut Option<String>); 6] = [
            ("PROVIDER", &mut self.provider),
            ("MODEL", &mut self.model),
            ("API_KEY", &mut self.api_key),
            ("BASE_URL", &mut self.base_url),
            ("SYSTEM_PROMPT", &mut self.system_prompt),
            ("LOG_FILE", &mut self.log_file),
        ];
        for (suffix, slot) in fields {
            if let Some(value) = lookup(&format!("{ENV_PREFIX}_{suffix}")) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
    }
}

/// Fully resolved settings the turn engine runs with.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub system_prompt: Option<String>,
}

fn default_model(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::OpenAi => "gpt-4o",
        ProviderKind::Anthropic => "claude-sonnet-4-5",
        ProviderKind::Gemini => "gemini-2.0-flash",
    }
}

impl EngineSettings {
    /// Resolve settings from config plus an environment lookup. A missing
    /// API key for the selected provider is a startup error; turns never
    /// begin without one.
    pub fn resolve(
        config: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = match &config.provider {
            Some(name) => name.parse::<ProviderKind>()?,
            None => ProviderKind::OpenAi,
        };

        let api_key = config
            .api_key
            .clone()
            .or_else(|| lookup(provider.api_key_env()).filter(|key| !key.is_empty()))
            .ok_or_else(|| {
                format!(
                    "no API key for {provider}: set {} or api_key in the config file",
                    provider.api_key_env()
                )
            })?;

        Ok(Self {
            provider,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model(provider).to_string()),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            system_prompt: config.system_prompt.clone(),
        })
    }
}
