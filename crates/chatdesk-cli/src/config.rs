use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chatdesk_contracts::session::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "chatdesk.toml";
pub const DEFAULT_SECRETS_FILE: &str = "secrets.toml";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub generation: GenerationDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Unset means requests may take as long as they need.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct NewsConfig {
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GenerationDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u64,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub decompose: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_model() -> String { "gemini-1.5-flash".into() }
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
fn default_max_output_tokens() -> u64 { u64::from(DEFAULT_MAX_OUTPUT_TOKENS) }
fn default_log_level() -> String { "warn".into() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: None,
            request_timeout_secs: None,
        }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            persona: None,
            template: None,
            decompose: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// An explicit path must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = resolve_optional(path, DEFAULT_CONFIG_FILE) else {
        return Ok(Config::default());
    };
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// API keys as stored in the secrets file. Key names match the environment
/// variables that override them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    #[serde(rename = "GOOGLE_API_KEY", default)]
    pub google_api_key: Option<String>,
    #[serde(rename = "GEMINI_API_KEY", default)]
    pub gemini_api_key: Option<String>,
    #[serde(rename = "NEWS_API_KEY", default)]
    pub news_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub news: Option<String>,
}

impl Secrets {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_optional(path, DEFAULT_SECRETS_FILE) else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed reading secrets {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Environment variables take precedence over the file.
    pub fn resolve(&self, env: impl Fn(&str) -> Option<String>) -> ApiKeys {
        let pick = |name: &str, stored: &Option<String>| {
            non_empty(env(name)).or_else(|| non_empty(stored.clone()))
        };
        ApiKeys {
            gemini: pick("GOOGLE_API_KEY", &self.google_api_key)
                .or_else(|| pick("GEMINI_API_KEY", &self.gemini_api_key)),
            news: pick("NEWS_API_KEY", &self.news_api_key),
        }
    }
}

pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_optional(explicit: Option<&Path>, default_name: &str) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let fallback = PathBuf::from(default_name);
            fallback.is_file().then_some(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::{load_config, ApiKeys, Config, Secrets};

    #[test]
    fn partial_file_keeps_section_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("chatdesk.toml");
        fs::write(
            &path,
            "[api]\nrequest_timeout_secs = 30\n\n[generation]\ntemperature = 0.2\npersona = \"Witty Historian\"\n\n[logging]\nfile = \"chatdesk.log\"\n",
        )?;

        let config = load_config(Some(path.as_path()))?;
        assert_eq!(config.api.model, "gemini-1.5-flash");
        assert_eq!(config.api.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.generation.temperature, 0.2);
        assert_eq!(config.generation.max_output_tokens, 512);
        assert_eq!(config.generation.persona.as_deref(), Some("Witty Historian"));
        assert!(!config.generation.decompose);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(
            config.logging.file.as_deref(),
            Some(std::path::Path::new("chatdesk.log"))
        );
        assert_eq!(config.news.api_base, None);
        Ok(())
    }

    #[test]
    fn empty_file_is_all_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("empty.toml");
        fs::write(&path, "")?;
        assert_eq!(load_config(Some(path.as_path()))?, Config::default());
        assert_eq!(Config::default().api.request_timeout(), None);
        Ok(())
    }

    #[test]
    fn explicit_missing_or_broken_config_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(load_config(Some(temp.path().join("missing.toml").as_path())).is_err());

        let broken = temp.path().join("broken.toml");
        fs::write(&broken, "[api\nmodel = ")?;
        assert!(load_config(Some(broken.as_path())).is_err());
        Ok(())
    }

    #[test]
    fn environment_overrides_secrets_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("secrets.toml");
        fs::write(
            &path,
            "GOOGLE_API_KEY = \"file-google\"\nNEWS_API_KEY = \"file-news\"\n",
        )?;
        let secrets = Secrets::load(Some(path.as_path()))?;

        let keys = secrets.resolve(|name| match name {
            "NEWS_API_KEY" => Some("env-news".to_string()),
            "GOOGLE_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(
            keys,
            ApiKeys {
                gemini: Some("file-google".to_string()),
                news: Some("env-news".to_string()),
            }
        );
        Ok(())
    }

    #[test]
    fn gemini_key_name_is_accepted_as_alias() {
        let secrets = Secrets {
            gemini_api_key: Some("alias".to_string()),
            ..Secrets::default()
        };
        assert_eq!(secrets.resolve(|_| None).gemini.as_deref(), Some("alias"));
        assert_eq!(Secrets::default().resolve(|_| None), ApiKeys::default());
    }
}
