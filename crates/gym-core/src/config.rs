use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the gymdesk client tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gym: GymConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GymConfig {
    /// Name printed in backups
    #[serde(default = "default_gym_name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the local SQLite database (defaults to ~/.local/share/gym/gym.db)
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Server URL (if None, runs in local-only mode)
    pub server_url: Option<String>,

    /// Bearer token sent to the server, if it requires one
    pub api_token: Option<String>,

    /// Periodic sync interval in seconds
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,

    /// How often the server health endpoint is probed
    #[serde(default = "default_probe_interval")]
    pub probe_interval_seconds: u64,

    /// Connectivity changes must be stable this long before they count
    #[serde(default = "default_debounce")]
    pub debounce_millis: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Machine-specific state that should not be shared across devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub device: DeviceState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// Device identifier (auto-generated if missing)
    pub device_id: Option<String>,
}

fn default_gym_name() -> String {
    "My Gym".to_string()
}

fn default_sync_interval() -> u64 {
    30
}

fn default_probe_interval() -> u64 {
    10
}

fn default_debounce() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            name: default_gym_name(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            api_token: None,
            interval_seconds: default_sync_interval(),
            probe_interval_seconds: default_probe_interval(),
            debounce_millis: default_debounce(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

fn data_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home_dir.join(".local").join("share").join("gym"))
}

impl Config {
    /// Default config location, honouring `GYM_CONFIG`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(custom_path) = std::env::var("GYM_CONFIG") {
            return Ok(PathBuf::from(custom_path));
        }
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(".config").join("gym").join("config.toml"))
    }

    /// Load configuration from the default location, writing defaults on
    /// first use
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            tracing::info!("created default config at {}", path.display());
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// The local database path, using the default if not configured
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.store.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("gym.db")),
        }
    }
}

impl State {
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(custom_path) = std::env::var("GYM_STATE") {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(data_dir()?.join("state.toml"))
    }

    /// Load state, creating it (with a fresh device id) if missing
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut state = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        if state.device.device_id.is_none() {
            let device_id = uuid::Uuid::new_v4().to_string();
            tracing::info!("generated new device_id: {device_id}");
            state.device.device_id = Some(device_id);
            state.save_to(&path)?;
        }
        Ok(state)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize state")?;
        fs::write(path, toml_str).context("Failed to write state file")?;
        Ok(())
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id.as_deref().unwrap_or("local")
    }
}
