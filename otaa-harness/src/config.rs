//! Harness configuration: a JSON process file and one CSV device table per
//! JoinEUI, both living in the same directory.
//!
//! ```json
//! {
//!     "joineui": ["70B3D57ED0000001"],
//!     "server_host": "0.0.0.0",
//!     "server_port": 1780,
//!     "region": "US915"
//! }
//! ```
use std::fs;
use std::path::{Path, PathBuf};

use otaa_encoding::keys::{AppKey, DevEui, JoinEui};
use serde::Deserialize;
use tracing::info;

use crate::join::{Application, JoinError};
use crate::logging::{LogConfig, RESULT_TARGET};
use crate::region::{Region, RegionError};

pub const DEFAULT_CONF_FILE: &str = "conf/test_harness.conf";

const DEVEUI_COLUMN: &str = "DEVEUI";
const APPKEY_COLUMN: &str = "APPKEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no joineui configured")]
    NoJoinEui,
    #[error("invalid joineui {0:?}")]
    InvalidJoinEui(String),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("{path}: missing column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{path}: row {row}: invalid {column} {value:?}")]
    InvalidValue { path: PathBuf, row: usize, column: &'static str, value: String },
    #[error("{path}: row {row}: {source}")]
    Device {
        path: PathBuf,
        row: usize,
        #[source]
        source: JoinError,
    },
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    1780
}

fn default_region() -> String {
    "US915".to_string()
}

fn default_test_log() -> PathBuf {
    PathBuf::from("test.log")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// JoinEUIs served by the harness, MSB first hex.
    #[serde(alias = "appeui")]
    pub joineui: Vec<String>,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub net_id: u32,
    #[serde(default)]
    pub debug_log: Option<PathBuf>,
    #[serde(default = "default_test_log")]
    pub test_log: PathBuf,
    /// Directory holding the device tables, the directory of the config file.
    #[serde(skip)]
    pub conf_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config = Self::from_json(&text)
            .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })?;
        config.conf_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn region(&self) -> Result<Region, ConfigError> {
        Ok(self.region.parse()?)
    }

    /// `host:port` the forwarder listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig { test_log: Some(self.test_log.clone()), debug_log: self.debug_log.clone() }
    }

    pub fn join_euis(&self) -> Result<Vec<JoinEui>, ConfigError> {
        if self.joineui.is_empty() {
            return Err(ConfigError::NoJoinEui);
        }
        self.joineui
            .iter()
            .map(|s| s.parse().map_err(|_| ConfigError::InvalidJoinEui(s.clone())))
            .collect()
    }

    /// Reads `<conf_dir>/<joineui>.csv` for every configured JoinEUI.
    pub fn load_applications(&self) -> Result<Vec<Application>, ConfigError> {
        let mut apps = Vec::with_capacity(self.joineui.len());
        for (name, join_eui) in self.joineui.iter().zip(self.join_euis()?) {
            let path = self.conf_dir.join(format!("{}.csv", name.trim()));
            let app = load_device_table(&path, join_eui, self.net_id)?;
            info!(
                target: RESULT_TARGET,
                "Test setup: JoinEUI {} imported {} devices from {}",
                join_eui,
                app.len(),
                path.display()
            );
            apps.push(app);
        }
        Ok(apps)
    }
}

/// Reads a CSV device table. The header names the `DEVEUI` and `APPKEY`
/// columns in any order, other columns are ignored. Fields may be quoted,
/// a quoted field can hold commas and `""` stands for a literal quote.
pub fn load_device_table(
    path: &Path,
    join_eui: JoinEui,
    net_id: u32,
) -> Result<Application, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    parse_device_table(&text, path, join_eui, net_id)
}

fn parse_device_table(
    text: &str,
    path: &Path,
    join_eui: JoinEui,
    net_id: u32,
) -> Result<Application, ConfigError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .map(|(_, l)| split_row(l).iter().map(|c| c.to_ascii_uppercase()).collect())
        .unwrap_or_default();
    let column = |name: &'static str| {
        header
            .iter()
            .position(|c| c == name)
            .ok_or(ConfigError::MissingColumn { path: path.to_path_buf(), column: name })
    };
    let dev_eui_col = column(DEVEUI_COLUMN)?;
    let app_key_col = column(APPKEY_COLUMN)?;

    let mut app = Application::new(join_eui, net_id);
    for (idx, line) in lines {
        let row = idx + 1;
        let cells = split_row(line);
        let cell = |col: usize| cells.get(col).map(String::as_str).unwrap_or("");
        let invalid = |column: &'static str, value: &str| ConfigError::InvalidValue {
            path: path.to_path_buf(),
            row,
            column,
            value: value.to_string(),
        };

        let dev_eui: DevEui =
            cell(dev_eui_col).parse().map_err(|_| invalid(DEVEUI_COLUMN, cell(dev_eui_col)))?;
        let app_key: AppKey =
            cell(app_key_col).parse().map_err(|_| invalid(APPKEY_COLUMN, cell(app_key_col)))?;
        app.add_device(dev_eui, app_key)
            .map_err(|source| ConfigError::Device { path: path.to_path_buf(), row, source })?;
    }
    Ok(app)
}

fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}
