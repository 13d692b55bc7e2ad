//! Client configuration.
//!
//! Resolved once at startup from: explicit overrides > `CLOUDDEPLOY_*` env >
//! `<data_dir>/config.toml` > built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

const ENV_API_URL: &str = "CLOUDDEPLOY_API_URL";
const ENV_DATA_DIR: &str = "CLOUDDEPLOY_DATA_DIR";
const ENV_TIMEOUT_SECS: &str = "CLOUDDEPLOY_TIMEOUT_SECS";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME directory not found; pass --data-dir or set CLOUDDEPLOY_DATA_DIR")]
    NoHomeDir,

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to (no trailing slash)
    pub api_url: String,
    pub request_timeout: Duration,
    /// Fixed delay before the event stream reconnects after a failure
    pub reconnect_delay: Duration,
    /// Holds `client.db`, `config.toml` and `logs/`
    pub data_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_url: trim_base_url(api_url.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            data_dir: data_dir.into(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Full URL for an endpoint path such as `/auth/login`
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_url, endpoint)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("client.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Values that beat both the environment and the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub request_timeout: Option<Duration>,
}

/// On-disk `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
    reconnect_delay_secs: Option<u64>,
}

/// Resolve the configuration from overrides, the process environment, the
/// config file and defaults.
pub fn resolve(overrides: ConfigOverrides) -> Result<ClientConfig, ConfigError> {
    resolve_with_env(overrides, |key| std::env::var(key).ok())
}

/// Same as [`resolve`] with an injectable environment lookup.
pub fn resolve_with_env(
    overrides: ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let data_dir = match overrides.data_dir {
        Some(dir) => dir,
        None => match env(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(".clouddeploy"),
        },
    };

    let file = load_file_config(&data_dir)?;

    let api_url = overrides
        .api_url
        .or_else(|| env(ENV_API_URL).filter(|v| !v.is_empty()))
        .or(file.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let request_timeout = match overrides.request_timeout {
        Some(timeout) => timeout,
        None => match env(ENV_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS,
                    value: raw.clone(),
                }
            })?),
            None => file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        },
    };

    let reconnect_delay = file
        .reconnect_delay_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RECONNECT_DELAY);

    Ok(ClientConfig::new(api_url, data_dir)
        .with_request_timeout(request_timeout)
        .with_reconnect_delay(reconnect_delay))
}

fn load_file_config(data_dir: &Path) -> Result<FileConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve_with_env(
            ConfigOverrides {
                data_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            no_env,
        )
        .unwrap();

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.db_path(), dir.path().join("client.db"));
    }

    #[test]
    fn override_beats_env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "api_url = \"http://file.example/api\"\nrequest_timeout_secs = 5\nreconnect_delay_secs = 1\n",
        )
        .unwrap();

        let env = |key: &str| match key {
            "CLOUDDEPLOY_API_URL" => Some("http://env.example/api/".to_string()),
            _ => None,
        };

        let from_env = resolve_with_env(
            ConfigOverrides {
                data_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            env,
        )
        .unwrap();
        assert_eq!(from_env.api_url, "http://env.example/api");
        assert_eq!(from_env.request_timeout, Duration::from_secs(5));
        assert_eq!(from_env.reconnect_delay, Duration::from_secs(1));

        let from_flag = resolve_with_env(
            ConfigOverrides {
                api_url: Some("http://flag.example/api".into()),
                data_dir: Some(dir.path().to_path_buf()),
                request_timeout: Some(Duration::from_secs(9)),
            },
            env,
        )
        .unwrap();
        assert_eq!(from_flag.api_url, "http://flag.example/api");
        assert_eq!(from_flag.request_timeout, Duration::from_secs(9));
    }

    #[test]
    fn rejects_malformed_timeout_env() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_with_env(
            ConfigOverrides {
                data_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            |key| (key == "CLOUDDEPLOY_TIMEOUT_SECS").then(|| "soon".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_unknown_file_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "apiurl = \"typo\"\n").unwrap();
        let err = resolve_with_env(
            ConfigOverrides {
                data_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
