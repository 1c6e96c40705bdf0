use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const AGENTRY_DIR: &str = ".agentry";

/// Process-wide settings: provider credentials, endpoints and engine defaults.
/// The engine hands these to the model gateway as opaque inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_session_token: Option<String>,
    pub aws_region: String,
    pub bedrock_endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: String,
    pub workspace_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            openai_api_key: String::new(),
            openai_base_url: None,
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            aws_session_token: None,
            aws_region: "us-east-1".to_string(),
            bedrock_endpoint: None,
            request_timeout_secs: 120,
            max_retries: 3,
            log_level: "info".to_string(),
            workspace_dir: get_agentry_dir().join("workspace"),
        }
    }
}

impl Settings {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Settings::default())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn openai_api_key(&self) -> Option<String> {
        resolve_with_fallback(
            &["OPENAI_API_KEY", "AGENTRY_OPENAI_API_KEY"],
            &self.openai_api_key,
        )
    }

    pub fn aws_access_key_id(&self) -> Option<String> {
        resolve_with_fallback(&["AWS_ACCESS_KEY_ID"], &self.aws_access_key_id)
    }

    pub fn aws_secret_access_key(&self) -> Option<String> {
        resolve_with_fallback(&["AWS_SECRET_ACCESS_KEY"], &self.aws_secret_access_key)
    }

    pub fn aws_session_token(&self) -> Option<String> {
        resolve_with_fallback(
            &["AWS_SESSION_TOKEN"],
            self.aws_session_token.as_deref().unwrap_or(""),
        )
    }

    pub fn aws_region(&self) -> String {
        resolve_with_fallback(&["AWS_DEFAULT_REGION", "AWS_REGION"], &self.aws_region)
            .unwrap_or_else(|| "us-east-1".to_string())
    }
}

/// Environment first, then the configured value. Empty strings count as unset.
fn resolve_with_fallback(env_vars: &[&str], configured: &str) -> Option<String> {
    env_vars
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
        .or_else(|| (!configured.trim().is_empty()).then(|| configured.to_string()))
}

pub fn get_agentry_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(AGENTRY_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_agentry_dir().join("config.toml")
}

pub fn ensure_agentry_dir() -> Result<PathBuf> {
    let dir = get_agentry_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create agentry directory at {}", dir.display()))?;
    }

    Ok(dir)
}

pub fn load_config() -> Result<Settings> {
    let config_path = get_config_path();

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
    })?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

pub fn parse_config(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}

pub fn save_config(settings: &Settings) -> Result<()> {
    ensure_agentry_dir()?;

    let config_path = get_config_path();
    let content =
        toml::to_string_pretty(settings).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = parse_config("aws_region = \"eu-west-1\"\nmax_retries = 1\n").unwrap();
        assert_eq!(settings.aws_region, "eu-west-1");
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.request_timeout_secs, 120);
        assert!(settings.openai_base_url.is_none());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_config("max_retries = \"three\"").is_err());
    }

    #[test]
    fn configured_value_used_when_env_is_absent() {
        let value = resolve_with_fallback(&["AGENTRY_TEST_UNSET_VARIABLE"], "from-config");
        assert_eq!(value.as_deref(), Some("from-config"));
        assert!(resolve_with_fallback(&["AGENTRY_TEST_UNSET_VARIABLE"], "  ").is_none());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        assert_eq!(parse_config(&text).unwrap(), settings);
    }
}
