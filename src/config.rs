use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used for the model client
    pub default_provider: String,

    /// Model provider configuration
    pub model_providers: HashMap<String, ModelProvider>,

    /// Model id and sampling settings, fixed for the process lifetime
    pub model: ModelSettings,

    /// Run tracing and feedback backend
    pub tracing: TracingConfig,

    /// Remote database query sub-agent
    pub query_agent: QueryAgentConfig,

    /// UI preferences
    pub ui: UiConfig,

    /// metachat home directory
    #[serde(skip)]
    pub home: PathBuf,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProvider {
    pub name: String,
    pub base_url: String,
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Settings fixed at model client construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP timeout for a single model call, in seconds
    pub request_timeout_secs: u64,
}

/// Tracing backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub project: String,
}

/// Query sub-agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryAgentConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub typewriter_delay_ms: u64,
    /// Longest wait for the next streamed event before a turn is abandoned
    pub turn_timeout_secs: u64,
    pub examples: Vec<String>,
    pub log_level: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            request_timeout_secs: 60,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.smith.langchain.com".to_string(),
            api_key: None,
            project: "metachat".to_string(),
        }
    }
}

impl Default for QueryAgentConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 120,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            typewriter_delay_ms: 50,
            turn_timeout_secs: 120,
            examples: vec![
                "What are the modalities that exist in the database? What are the least and most common ones?".to_string(),
                "What is the MongoDB query to find the injections used in SmartSPIM_675387_2023-05-23_23-05-56".to_string(),
                "Can you list all the procedures performed on 662616, including their start and end dates?".to_string(),
            ],
            log_level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".metachat");

        let mut model_providers = HashMap::new();
        for (id, name, base_url, key_env) in [
            ("anthropic", "Anthropic", "https://api.anthropic.com", "ANTHROPIC_API_KEY"),
            ("openai", "OpenAI", "https://api.openai.com", "OPENAI_API_KEY"),
            ("openrouter", "OpenRouter", "https://openrouter.ai/api", "OPENROUTER_API_KEY"),
            ("mistral", "Mistral", "https://api.mistral.ai", "MISTRAL_API_KEY"),
            ("xai", "xAI", "https://api.x.ai", "XAI_API_KEY"),
        ] {
            model_providers.insert(
                id.to_string(),
                ModelProvider {
                    name: name.to_string(),
                    base_url: base_url.to_string(),
                    api_key_env: Some(key_env.to_string()),
                    api_key: None,
                },
            );
        }

        Config {
            default_provider: "anthropic".to_string(),
            model_providers,
            model: ModelSettings::default(),
            tracing: TracingConfig::default(),
            query_agent: QueryAgentConfig::default(),
            ui: UiConfig::default(),
            home,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let default_home = Config::default().home;
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_home.join("config.toml"));

        let mut config = Self::load_file(&config_path)?;
        config.home = default_home;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Overlay environment-sourced settings
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = lookup("METACHAT_MODEL") {
            self.model.model = model;
        }
        if let Some(provider) = lookup("METACHAT_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(endpoint) = lookup("LANGCHAIN_ENDPOINT") {
            self.tracing.endpoint = endpoint;
        }
        if let Some(key) = lookup("LANGCHAIN_API_KEY") {
            self.tracing.api_key = Some(key);
        }
        if let Some(project) = lookup("LANGSMITH_PROJECT") {
            self.tracing.project = project;
        }
        if let Some(url) = lookup("METACHAT_QUERY_AGENT_URL") {
            self.query_agent.url = Some(url);
        }
        for provider in self.model_providers.values_mut() {
            if provider.api_key.is_none() {
                provider.api_key = provider.api_key_env.as_deref().and_then(&lookup);
            }
        }
    }

    /// Get the current model provider
    pub fn current_provider(&self) -> Option<&ModelProvider> {
        self.model_providers.get(&self.default_provider)
    }

    /// Directory that holds the TUI log file
    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_model_settings() {
        let config = Config::default();
        assert_eq!(config.model.temperature, 0.7);
        assert_eq!(config.model.max_tokens, 500);
        assert_eq!(config.ui.typewriter_delay_ms, 50);
        assert_eq!(config.ui.examples.len(), 3);
        assert!(config.current_provider().is_some());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.default_provider, "anthropic");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
default_provider = "openai"

[model]
model = "gpt-4o-mini"
temperature = 0.2
max_tokens = 256
request_timeout_secs = 30

[ui]
typewriter_delay_ms = 5
"#,
        )
        .unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.ui.typewriter_delay_ms, 5);
        assert_eq!(config.ui.turn_timeout_secs, 120);
        assert_eq!(config.tracing.project, "metachat");
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.tracing.project = "aind".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load_file(&path).unwrap();
        assert_eq!(loaded.tracing.project, "aind");
        assert_eq!(loaded.model, config.model);
    }

    #[test]
    fn env_overrides_apply_and_ignore_blank_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("LANGSMITH_PROJECT", "gamer"),
            ("LANGCHAIN_API_KEY", "ls-key"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("METACHAT_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tracing.project, "gamer");
        assert_eq!(config.tracing.api_key.as_deref(), Some("ls-key"));
        assert_eq!(config.model.model, "claude-3-5-haiku-latest");
        assert_eq!(
            config.current_provider().unwrap().api_key.as_deref(),
            Some("sk-ant")
        );
    }
}
