//! # Runtime Configuration
//!
//! [`CsWebConfig`] collects the few knobs a display runtime needs: where the
//! PVWS gateway lives, how often value updates are flushed, and where logs go.
//! Values come from built-in defaults, then an optional JSON file, then
//! environment variables and command-line flags, each layer overriding the
//! previous one field by field.
//!
//! [`build_connection`] turns a configuration into the transport table used
//! by the store.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::connection::{
    Connection, ConnectionError, ConnectionForwarder, PvwsOptions, PvwsPlugin, SimulatorPlugin,
};

/// Config file read when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "csweb.json";

/// Prefixes the gateway serves when one is configured, most specific first.
pub const GATEWAY_PREFIXES: [&str; 7] =
    ["dev://", "eq://", "ssim://", "sim://", "loc://", "ca://", "pva://"];

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[clap(about = "Live process-variable display runtime", version)]
#[serde(rename_all = "camelCase")]
pub struct CsWebConfig {
    #[clap(long, env = "PVWS_SOCKET", help = "host:port of the PVWS gateway. Without it only simulated PVs are served.")]
    pub pvws_socket: Option<String>,

    #[clap(long, env = "PVWS_SSL", help = "Connect to the gateway with wss:// (true/false).")]
    pub pvws_ssl: Option<bool>,

    #[clap(long, env = "PVWS_RECONNECT_MS", help = "Delay in milliseconds before reopening a dropped gateway socket.")]
    pub pvws_reconnect_ms: Option<u64>,

    #[clap(long, env = "THROTTLE_PERIOD", help = "Interval in milliseconds between batched value updates. 0 applies updates immediately.")]
    pub throttle_period: Option<u64>,

    #[clap(long, env = "CSWEB_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl CsWebConfig {
    /// Built-in defaults, the bottom layer of [`load_config`].
    pub fn defaults() -> Self {
        Self {
            pvws_ssl: Some(false),
            pvws_reconnect_ms: Some(5000),
            throttle_period: Some(100),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two configs, where 'other' overrides 'self' for Some values
    pub fn merge(self, other: CsWebConfig) -> CsWebConfig {
        CsWebConfig {
            pvws_socket: other.pvws_socket.or(self.pvws_socket),
            pvws_ssl: other.pvws_ssl.or(self.pvws_ssl),
            pvws_reconnect_ms: other.pvws_reconnect_ms.or(self.pvws_reconnect_ms),
            throttle_period: other.throttle_period.or(self.throttle_period),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// The flush interval, or `None` when updates should not be throttled.
    pub fn throttle(&self) -> Option<Duration> {
        match self.throttle_period.unwrap_or(100) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Gateway options, if a gateway is configured.
    pub fn pvws_options(&self) -> Option<PvwsOptions> {
        let socket = self.pvws_socket.as_deref().filter(|s| !s.trim().is_empty())?;
        let mut options = PvwsOptions::new(socket.trim(), self.pvws_ssl.unwrap_or(false));
        if let Some(ms) = self.pvws_reconnect_ms {
            options.reconnect_delay = Duration::from_millis(ms);
        }
        Some(options)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Layers defaults, the JSON file (if any) and `cli` (which already carries
/// environment variables) into one configuration.
pub fn load_config(cli: CsWebConfig) -> CsWebConfig {
    let mut current_config = CsWebConfig::defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<CsWebConfig>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {e}. Falling back to other sources.",
                    config_file_path.display()
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {e}. Falling back to other sources.",
                config_file_path.display()
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli)
}

/// Assembles the transport table: the simulator for `sim://` and `loc://`,
/// and, when a gateway is configured, the gateway in front of it for every
/// protocol it proxies.
pub fn build_connection(config: &CsWebConfig) -> Result<Arc<dyn Connection>, ConnectionError> {
    let simulator: Arc<dyn Connection> = Arc::new(SimulatorPlugin::new());
    let mut prefix_connections: Vec<(String, Arc<dyn Connection>)> = vec![
        ("sim://".to_string(), Arc::clone(&simulator)),
        ("loc://".to_string(), simulator),
    ];

    if let Some(options) = config.pvws_options() {
        log::info!("Serving PVs through the gateway at {}", options.socket);
        let pvws: Arc<dyn Connection> = Arc::new(PvwsPlugin::new(options)?);
        let gateway = GATEWAY_PREFIXES
            .iter()
            .map(|prefix| (prefix.to_string(), Arc::clone(&pvws)));
        prefix_connections.splice(0..0, gateway);
    } else {
        log::info!("No gateway configured, serving simulated PVs only");
    }

    Ok(Arc::new(ConnectionForwarder::new(prefix_connections)))
}
