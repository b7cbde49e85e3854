//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storefront backend root, e.g. `https://shop.example.com`
    pub base_url: Option<String>,
    /// Live event endpoint; derived from `base_url` when unset
    pub live_url: Option<String>,
    /// Bearer token for the superuser console
    pub api_token: Option<String>,
    /// Identity the operator sends as
    pub operator_id: Option<String>,
    /// Optional cap on history fetch size
    pub history_limit: Option<usize>,
    /// Re-run the history fetch after the live stream reconnects
    #[serde(default)]
    pub resync_on_reconnect: bool,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "operator-chat", "operator-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Log file used while the TUI owns the terminal
    pub fn log_path() -> Result<PathBuf> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        Ok(dir.join("operator-chat.log"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the api token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("No backend URL. Run 'operator-chat configure --base-url <url>' first.")
    }

    pub fn operator_id(&self) -> Result<&str> {
        self.operator_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("No operator id. Run 'operator-chat configure --operator <id>' first.")
    }

    /// Live endpoint: explicit setting, or `base_url` with a ws scheme and `/live` path.
    pub fn live_url(&self) -> Result<String> {
        match self.live_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
            _ => Ok(derive_live_url(self.base_url()?)),
        }
    }

    /// Token with all but the last four characters hidden, for display.
    pub fn masked_token(&self) -> Option<String> {
        self.api_token.as_deref().map(mask_token)
    }
}

fn derive_live_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/live", ws)
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
