use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;


/// Complete vigil configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Outbound webhook URL (required, validated at startup)
    #[serde(default)]
    pub webhook_url: String,
    /// Usernames to track (required, at least one)
    #[serde(default)]
    pub usernames: Vec<String>,
    /// Target interval between passes (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Minimum spacing between notifications for one user (seconds)
    #[serde(default = "default_notify_cooldown")]
    pub notify_cooldown_seconds: u64,
    /// Path of the persisted state file
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Per-request HTTP timeout (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Maximum retries per failed request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff wait (milliseconds), doubled per attempt
    #[serde(default = "default_retry_base")]
    pub retry_base_ms: u64,
    /// Pause between users within one pass (milliseconds)
    #[serde(default = "default_entity_pause")]
    pub entity_pause_ms: u64,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Remote service endpoints. Defaults point at the public API;
/// overridable so tests can target a local server.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_users_base")]
    pub users_base: String,
    #[serde(default = "default_avatar_base")]
    pub avatar_base: String,
    #[serde(default = "default_presence_base")]
    pub presence_base: String,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_notify_cooldown() -> u64 {
    30
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base() -> u64 {
    500
}

fn default_entity_pause() -> u64 {
    150
}

fn default_users_base() -> String {
    "https://users.roblox.com".to_string()
}

fn default_avatar_base() -> String {
    "https://avatar.roblox.com".to_string()
}

fn default_presence_base() -> String {
    "https://presence.roblox.com".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            users_base: default_users_base(),
            avatar_base: default_avatar_base(),
            presence_base: default_presence_base(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            usernames: Vec::new(),
            poll_interval_seconds: default_poll_interval(),
            notify_cooldown_seconds: default_notify_cooldown(),
            state_file: default_state_file(),
            http_timeout_seconds: default_http_timeout(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base(),
            entity_pause_ms: default_entity_pause(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Check the fatal startup conditions. Everything downstream receives
    /// already-validated values and does not re-check them.
    pub fn validate(&self) -> Result<()> {
        if !is_webhook_url(&self.webhook_url) {
            bail!("invalid or missing webhook_url");
        }
        if self.usernames.iter().all(|u| u.trim().is_empty()) {
            bail!("no usernames configured");
        }
        Ok(())
    }

    /// Tracked usernames, trimmed, with blanks removed.
    pub fn usernames(&self) -> Vec<String> {
        self.usernames
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn notify_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.notify_cooldown_seconds.max(1) as i64)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.max(1))
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms.max(100))
    }

    pub fn entity_pause(&self) -> Duration {
        Duration::from_millis(self.entity_pause_ms)
    }
}

/// Accept only https webhook endpoints on the known webhook hosts.
fn is_webhook_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let Some((host, path)) = rest.split_once('/') else {
        return false;
    };
    let host_ok = matches!(
        host,
        "discord.com" | "discordapp.com" | "canary.discord.com" | "canary.discordapp.com"
    );
    host_ok && path.starts_with("api/webhooks/") && path.len() > "api/webhooks/".len()
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}
