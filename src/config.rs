use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::monitors::thresholds::ThresholdPolicy;
use crate::storage::{DeviceRegistry, IspRegistry, Stores};
use crate::storage::schema::{DEFAULT_CREDENTIAL, DEFAULT_PROBE_PORT, DeviceType, NewDevice, NewIsp};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerConfig,
    pub prober: ProberConfig,
    pub storage: StorageConfig,
    pub publishers: Vec<PublisherConfig>,
    pub thresholds: ThresholdPolicy,
    /// WebSocket stream server; disabled when absent
    pub api: Option<ApiSettings>,
    pub devices: Vec<DeviceConfig>,
    pub isps: Vec<IspConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between sweep starts; `POLL_INTERVAL` and `--interval` take precedence
    pub interval: Option<u64>,
    /// Seconds a single probe may take before the device counts as unreachable
    pub probe_timeout: u64,
    pub concurrency: usize,
    /// Probe ISP links after every device sweep
    pub probe_isps: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: None,
            probe_timeout: 10,
            concurrency: 1,
            probe_isps: true,
        }
    }
}

impl PollerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProberConfig {
    /// Lab simulator, `192.168.0.0/16` answers
    #[default]
    Simulated,

    /// Metrics agent over HTTP
    Http,
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./netpulse.db")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublisherConfig {
    Webhook { url: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_cors: true,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub ip: IpAddr,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub credential: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub custom_targets: Vec<String>,
    pub poll_interval: Option<u64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl From<&DeviceConfig> for NewDevice {
    fn from(config: &DeviceConfig) -> Self {
        NewDevice {
            name: config.name.clone(),
            ip_address: config.ip,
            device_type: config.device_type,
            credential: config
                .credential
                .clone()
                .unwrap_or_else(|| DEFAULT_CREDENTIAL.to_string()),
            port: config.port.unwrap_or(DEFAULT_PROBE_PORT),
            custom_targets: config.custom_targets.clone(),
            poll_interval_secs: config.poll_interval,
            is_active: config.active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IspConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl From<&IspConfig> for NewIsp {
    fn from(config: &IspConfig) -> Self {
        NewIsp {
            name: config.name.clone(),
            host: config.host.clone(),
            is_active: config.active,
        }
    }
}

impl Config {
    /// Upsert the configured devices (by address) and ISPs (by name)
    pub async fn seed(&self, stores: &Stores) -> anyhow::Result<()> {
        for device in &self.devices {
            let device = stores
                .devices
                .upsert(NewDevice::from(device))
                .await
                .with_context(|| format!("failed to register device {}", device.name))?;
            debug!("registered device {} ({})", device.name, device.ip_address);
        }

        for isp in &self.isps {
            stores
                .isps
                .upsert_isp(NewIsp::from(isp))
                .await
                .with_context(|| format!("failed to register ISP {}", isp.name))?;
        }

        Ok(())
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file {}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
