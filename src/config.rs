//! Terminal configuration.
//!
//! Read from `<data_dir>/config.json` when the file exists, then overridden
//! by `TURCOS_POS_*` environment variables. Every field has a default, so a
//! fresh device runs in local-only mode with no file at all.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::remote::DEFAULT_COLLECTION;

pub const CONFIG_FILE: &str = "config.json";
const APP_DIR_NAME: &str = "com.turcoshouse.pos";

pub const ENV_DATA_DIR: &str = "TURCOS_POS_DATA_DIR";
pub const ENV_REMOTE_URL: &str = "TURCOS_POS_REMOTE_URL";
pub const ENV_API_KEY: &str = "TURCOS_POS_API_KEY";
pub const ENV_SYNC_TIMEOUT: &str = "TURCOS_POS_SYNC_TIMEOUT_SECS";
pub const ENV_PRINT_CHANNEL: &str = "TURCOS_POS_PRINT_CHANNEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Where finished receipts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintChannel {
    /// Plain text on stdout.
    #[default]
    Console,
    /// ESC/POS bytes under `<data_dir>/receipts`.
    File,
    /// RawBT intent URI under `<data_dir>/receipts`.
    Rawbt,
}

impl fmt::Display for PrintChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrintChannel::Console => "console",
            PrintChannel::File => "file",
            PrintChannel::Rawbt => "rawbt",
        })
    }
}

impl FromStr for PrintChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(PrintChannel::Console),
            "file" => Ok(PrintChannel::File),
            "rawbt" => Ok(PrintChannel::Rawbt),
            other => Err(format!(
                "Invalid print channel: {other}. Must be console, file or rawbt"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptLayout {
    pub header: String,
    pub footer: Vec<String>,
    pub currency: String,
    pub width: usize,
}

impl Default for ReceiptLayout {
    fn default() -> Self {
        Self {
            header: "TURCO'S HOUSE".to_string(),
            footer: vec![
                "GRACIAS POR SU COMPRA".to_string(),
                "www.turcoshouse.com".to_string(),
            ],
            currency: "Q".to_string(),
            width: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub remote: RemoteConfig,
    pub sync_timeout_secs: u64,
    pub print_channel: PrintChannel,
    pub receipt: ReceiptLayout,
}

impl Default for PosConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            remote: RemoteConfig::default(),
            sync_timeout_secs: 10,
            print_channel: PrintChannel::default(),
            receipt: ReceiptLayout::default(),
        }
    }
}

impl PosConfig {
    /// Remote store settings, or `None` for local-only mode.
    pub fn remote(&self) -> Option<&RemoteConfig> {
        if self.remote.url.trim().is_empty() {
            None
        } else {
            Some(&self.remote)
        }
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs.max(1))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }
}

/// Platform default data directory.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(APP_DIR_NAME)
}

/// Data directory: explicit argument, then `TURCOS_POS_DATA_DIR`, then the
/// platform default.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match std::env::var(ENV_DATA_DIR) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => default_data_dir(),
    }
}

/// Load the configuration for `data_dir`.
pub fn load(data_dir: &Path) -> Result<PosConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    let mut config = match fs::read_to_string(&path) {
        Ok(raw) => {
            debug!(path = %path.display(), "Loading config file");
            serde_json::from_str::<PosConfig>(&raw)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => PosConfig::default(),
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    config.data_dir = data_dir.to_path_buf();
    apply_env(&mut config)?;

    info!(
        data_dir = %config.data_dir.display(),
        remote = config.remote().is_some(),
        print_channel = %config.print_channel,
        "Configuration loaded"
    );
    Ok(config)
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn apply_env(config: &mut PosConfig) -> Result<(), ConfigError> {
    if let Some(url) = env_value(ENV_REMOTE_URL) {
        config.remote.url = url;
    }
    if let Some(key) = env_value(ENV_API_KEY) {
        config.remote.api_key = Some(key);
    }
    if let Some(raw) = env_value(ENV_SYNC_TIMEOUT) {
        config.sync_timeout_secs = raw.parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_SYNC_TIMEOUT,
            value: raw.clone(),
        })?;
    }
    if let Some(raw) = env_value(ENV_PRINT_CHANNEL) {
        config.print_channel = raw.parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_PRINT_CHANNEL,
            value: raw.clone(),
        })?;
    }
    Ok(())
}
