//! Node configuration loading and management.

use orcanet_network::{DhtMode, NodeConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for the OrcaNet node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrcaConfig {
    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// P2P network settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Direct transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Payment endpoint of the local wallet.
    #[serde(default)]
    pub wallet: WalletConfig,

    /// What this node publishes when it registers as a proxy.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Seed the node keypair is derived from. Without one the node runs with
    /// a fresh identity on every start.
    #[serde(default)]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// P2P listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// P2P listen port.
    #[serde(default = "default_p2p_port")]
    pub port: u16,
    /// Relay node multiaddress, ending in `/p2p/<id>`.
    #[serde(default)]
    pub relay_addr: Option<String>,
    /// Bootstrap peer multiaddresses.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Kademlia mode: "client" or "server".
    #[serde(default = "default_dht_mode")]
    pub dht_mode: String,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_refresh_secs")]
    pub reservation_refresh_secs: u64,
    #[serde(default = "default_reservation_timeout")]
    pub reservation_timeout_secs: u64,
    /// Abort startup when the initial relay reservation fails.
    #[serde(default = "default_true")]
    pub require_reservation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,
    /// Directory uploaded files are kept in and served from.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_payment_url")]
    pub payment_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Human readable location, e.g. "NY, US".
    #[serde(default)]
    pub location: String,
    /// Address clients should use to reach the proxy.
    #[serde(default)]
    pub ip_address: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}
fn default_p2p_port() -> u16 {
    60000
}
fn default_dht_mode() -> String {
    "client".into()
}
fn default_query_timeout() -> u64 {
    60
}
fn default_refresh_secs() -> u64 {
    600
}
fn default_reservation_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_reply_timeout() -> u64 {
    60
}
fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}
fn default_api_addr() -> String {
    "0.0.0.0".into()
}
fn default_api_port() -> u16 {
    8080
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_payment_url() -> String {
    "http://localhost:18080/wallet/send".into()
}
fn default_proxy_port() -> u16 {
    8081
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_p2p_port(),
            relay_addr: None,
            bootstrap_peers: Vec::new(),
            dht_mode: default_dht_mode(),
            query_timeout_secs: default_query_timeout(),
            reservation_refresh_secs: default_refresh_secs(),
            reservation_timeout_secs: default_reservation_timeout(),
            require_reservation: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout(),
            files_dir: default_files_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            payment_url: default_payment_url(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            ip_address: String::new(),
            port: default_proxy_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl OrcaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: OrcaConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the full P2P listen multiaddress.
    pub fn p2p_multiaddr(&self) -> String {
        format!(
            "/ip4/{}/tcp/{}",
            self.network.listen_addr, self.network.port
        )
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }

    pub fn reservation_refresh(&self) -> Duration {
        Duration::from_secs(self.network.reservation_refresh_secs)
    }

    /// Settings for the network layer.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let dht_mode: DhtMode = self
            .network
            .dht_mode
            .parse()
            .map_err(anyhow::Error::msg)?;
        Ok(NodeConfig {
            listen_addrs: vec![self.p2p_multiaddr()],
            bootstrap_peers: self.network.bootstrap_peers.clone(),
            relay_addr: self.network.relay_addr.clone(),
            dht_mode,
            query_timeout: Duration::from_secs(self.network.query_timeout_secs),
            reservation_timeout: Duration::from_secs(self.network.reservation_timeout_secs),
            reply_timeout: Duration::from_secs(self.transfer.reply_timeout_secs),
            files_dir: self.transfer.files_dir.clone(),
            ..NodeConfig::default()
        })
    }
}
