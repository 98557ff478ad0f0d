//! Layered configuration: file, then environment, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use deskpilot_claude::{ClaudeConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use deskpilot_core::{ExecutorConfig, RunConfig};
use deskpilot_desktop::{DEFAULT_CAPTURE_COMMAND, DEFAULT_MAX_BYTES, DEFAULT_MEDIA_TYPE};

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const MODEL_ENV: &str = "DESKPILOT_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub max_iterations: u32,
    /// Pause after each action, in milliseconds.
    pub stabilization_ms: u64,
    pub click_settle_ms: u64,
    pub require_absolute_paths: bool,
    pub capture_command: String,
    pub capture_media_type: String,
    pub max_observation_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: 100,
            stabilization_ms: 500,
            click_settle_ms: 50,
            require_absolute_paths: true,
            capture_command: DEFAULT_CAPTURE_COMMAND.into(),
            capture_media_type: DEFAULT_MEDIA_TYPE.into(),
            max_observation_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Config {
    /// `$CONFIG_DIR/deskpilot/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("deskpilot").join("config.toml"))
    }

    /// Load from `path` (or the default location) and apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.is_empty()) {
            self.model = model;
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("{API_KEY_ENV} is not set (export it or add api_key to the config file)"),
        }
    }

    /// Write the config as TOML, readable only by the owner on unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_private(path, &text)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Copy with the API key masked, for display.
    pub fn masked(&self) -> Self {
        Self {
            api_key: self.api_key.as_deref().map(mask_key),
            ..self.clone()
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            max_iterations: self.max_iterations,
            stabilization: Duration::from_millis(self.stabilization_ms),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            click_settle: Duration::from_millis(self.click_settle_ms),
            require_absolute_paths: self.require_absolute_paths,
        }
    }

    pub fn claude_config(&self) -> Result<ClaudeConfig> {
        Ok(ClaudeConfig::new(self.api_key()?)
            .model(&self.model)
            .base_url(&self.base_url)
            .max_tokens(self.max_tokens))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, text: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(text.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, text: &str) -> std::io::Result<()> {
    std::fs::write(path, text)
}

/// Keep the first and last four characters of long keys.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".into();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.run_config().stabilization, Duration::from_millis(500));
        assert_eq!(config.executor_config().click_settle, Duration::from_millis(50));
        assert!(config.require_absolute_paths);
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_iterations = 7\nmodel = \"claude-test\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.model, "claude-test");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.capture_command, DEFAULT_CAPTURE_COMMAND);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_iterations = \"many\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> =
            HashMap::from([(API_KEY_ENV, "sk-env"), (MODEL_ENV, "claude-env")]);
        let mut config = Config {
            api_key: Some("sk-file".into()),
            ..Default::default()
        };
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_key().unwrap(), "sk-env");
        assert_eq!(config.model, "claude-env");
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let mut config = Config {
            api_key: Some("sk-file".into()),
            ..Default::default()
        };
        config.apply_env(|_| Some(String::new()));
        assert_eq!(config.api_key().unwrap(), "sk-file");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskpilot/config.toml");
        let config = Config {
            api_key: Some("sk-ant-0123456789".into()),
            max_iterations: 12,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_masking() {
        assert_eq!(mask_key("sk-ant-api03-abcdefgh"), "sk-a...efgh");
        assert_eq!(mask_key("short"), "****");

        let config = Config {
            api_key: Some("sk-ant-api03-abcdefgh".into()),
            ..Default::default()
        };
        assert_eq!(config.masked().api_key.as_deref(), Some("sk-a...efgh"));
        assert!(Config::default().masked().api_key.is_none());
    }
}
