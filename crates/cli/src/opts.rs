//! Global CLI options.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use clouddeploy_client::config::{self, ClientConfig, ConfigOverrides};

/// Options shared by every command. Unset values fall through to the
/// `CLOUDDEPLOY_*` environment, then `<data_dir>/config.toml`, then defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// API base URL, e.g. http://localhost:3000/api
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory for the token store, config and logs (default: ~/.clouddeploy)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long = "timeout", global = true, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalOpts {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            data_dir: self.data_dir.clone(),
            request_timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn resolve(&self) -> Result<ClientConfig> {
        Ok(config::resolve(self.overrides())?)
    }
}
