use anyhow::Context;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Server configuration loaded from TOML file
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Network settings for the HTTP server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Host/interface to bind to, e.g. "127.0.0.1"
    pub host: String,
    /// Port to listen on, e.g. 5680
    pub port: u16,
    /// Bearer token clients must present on sync routes; open when absent
    pub api_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageSettings {
    /// Directory holding the server database. Defaults to `gym_server_data`
    /// next to the config file.
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load and parse the configuration from the given TOML file path
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        // Expand the API token from an environment variable if in ${VAR} form
        if let Some(token) = settings.server.api_token.as_mut() {
            if token.starts_with("${") && token.ends_with('}') {
                let var = token[2..token.len() - 1].to_string();
                *token = env::var(&var)
                    .with_context(|| format!("missing environment var {var} for api_token"))?;
            }
        }
        if settings.storage.data_dir.is_none() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            settings.storage.data_dir = Some(base.join("gym_server_data"));
        }
        Ok(settings)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .with_context(|| format!("invalid host address {}", self.server.host))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("gym_server_data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_defaults_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "[server]\nhost = \"127.0.0.1\"\nport = 5680\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.data_dir(), dir.path().join("gym_server_data"));
        assert_eq!(settings.socket_addr().unwrap().port(), 5680);
        assert!(settings.server.api_token.is_none());
    }

    #[test]
    fn api_token_is_read_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 1\napi_token = \"${GYM_SERVER_TEST_TOKEN}\"\n",
        )
        .unwrap();
        env::set_var("GYM_SERVER_TEST_TOKEN", "s3cret");

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.server.api_token.as_deref(), Some("s3cret"));
    }
}
