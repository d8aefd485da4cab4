use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// GitHub endpoints and HTTP behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub graphql_url: String,
    /// Applied to every request; a hung connection fails instead of blocking forever
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// OAuth App registration and the external code-exchange service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Receives `{"code": ...}` and answers `{"access_token": ...}` or `{"error": ...}`
    pub exchange_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            redirect_uri: "http://localhost:5173/callback".to_string(),
            scope: "repo".to_string(),
            exchange_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// How long a toast stays in the status bar
    pub toast_secs: u64,
    /// Start with every repository expanded
    pub expand_all: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_secs: 3,
            expand_all: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub oauth: OAuthConfig,
    pub ui: UiConfig,

    /// Where the token and pending OAuth state are persisted
    pub state_file: Option<String>,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ghbranch")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. A missing or broken file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unparseable config");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 5] = [
            ("GHBRANCH_CLIENT_ID", &mut self.oauth.client_id),
            ("GHBRANCH_REDIRECT_URI", &mut self.oauth.redirect_uri),
            ("GHBRANCH_EXCHANGE_URL", &mut self.oauth.exchange_url),
            ("GHBRANCH_API_URL", &mut self.github.api_url),
            ("GHBRANCH_GRAPHQL_URL", &mut self.github.graphql_url),
        ];

        for (key, field) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value.trim().to_string();
            }
        }
    }

    /// Path of the persisted key-value state (token, OAuth state)
    pub fn state_path(&self) -> PathBuf {
        match &self.state_file {
            Some(path) => PathBuf::from(shellexpand::tilde(path).to_string()),
            None => Self::config_dir().join("state.toml"),
        }
    }

    /// Log file used while the TUI owns the terminal
    pub fn log_path(&self) -> PathBuf {
        self.state_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_dir)
            .join("ghbranch.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let mut config = Config::load_from(&dir.path().join("nope.toml"));
        // Environment may carry overrides; compare only what it cannot touch
        config.oauth.client_id.clear();
        assert_eq!(config.ui, UiConfig::default());
        assert_eq!(config.oauth.scope, "repo");
        assert_eq!(config.github.request_timeout_secs, 30);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
state_file = "/tmp/ghbranch-state.toml"

[oauth]
client_id = "Iv1.abc"
exchange_url = "https://auth.example.com/exchange"

[ui]
toast_secs = 5
"#,
        )
        .expect("write");

        let config: Config = toml::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(config.oauth.client_id, "Iv1.abc");
        assert_eq!(config.oauth.authorize_url, "https://github.com/login/oauth/authorize");
        assert_eq!(config.ui.toast_secs, 5);
        assert!(!config.ui.expand_all);
        assert_eq!(config.state_path(), PathBuf::from("/tmp/ghbranch-state.toml"));
        assert_eq!(config.log_path(), PathBuf::from("/tmp/ghbranch.log"));
    }

    #[test]
    fn broken_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[oauth\nclient_id = ").expect("write");

        let config = Config::load_from(&path);
        assert_eq!(config.ui, UiConfig::default());
    }

    #[test]
    fn env_overrides_win_and_blank_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GHBRANCH_CLIENT_ID", "from-env"),
            ("GHBRANCH_EXCHANGE_URL", "  "),
            ("GHBRANCH_API_URL", "http://127.0.0.1:9999"),
        ]);

        let mut config = Config::default();
        config.oauth.exchange_url = "https://keep.me".to_string();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.oauth.client_id, "from-env");
        assert_eq!(config.oauth.exchange_url, "https://keep.me");
        assert_eq!(config.github.api_url, "http://127.0.0.1:9999");
        assert_eq!(config.github.graphql_url, GitHubConfig::default().graphql_url);
    }
}
