use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::mount::BindingPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stickcp/config.toml";
pub const DEFAULT_MOUNT_POINT: &str = "/mnt/stickcp";
const ENV_PREFIX: &str = "STICKCP_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mount_point: PathBuf,
    pub binding_policy: BindingPolicy,
    pub remove_mount_point: bool,
    pub format_label: Option<String>,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            binding_policy: BindingPolicy::default(),
            remove_mount_point: false,
            format_label: None,
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `STICKCP_*` variables and CLI flags,
    /// later layers winning.
    ///
    /// An explicitly requested file (`--config` or `STICKCP_CONFIG`) must
    /// exist; the default `/etc` path is optional.
    pub fn new<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        let explicit = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("STICKCP_CONFIG").map(PathBuf::from));

        let file = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file not found: {}", path.display());
                }
                path
            }
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        figment
            .extract()
            .with_context(|| format!("Invalid configuration (file: {})", file.display()))
    }
}
