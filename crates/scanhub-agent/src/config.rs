//! Agent configuration loaded from environment variables.
//!
//! Every setting has a default so the agent starts with zero configuration;
//! without a hub connection string it runs with registration degraded and
//! queues everything it scans.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use scanhub_cloud::RetryPolicy;
use scanhub_net::{load_peer_addrs, parse_peer_addrs, MonitorConfig, PeerAddr};
use scanhub_shared::constants::{
    DEFAULT_AGENT_ID, DEFAULT_DEVICE_PREFIX, DEFAULT_DEVICE_SALT, DEFAULT_INTERNET_TARGET,
    DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RETRY_BATCH, DEFAULT_RETRY_INTERVAL_SECS,
};

#[derive(Clone)]
pub struct AgentConfig {
    /// SQLite file. Env: `SCANHUB_DB_PATH`. Default: platform data dir.
    pub db_path: Option<PathBuf>,

    /// Owner connection string for the hub registry.
    /// Env: `IOTHUB_CONNECTION_STRING`. Default: none (degraded).
    pub hub_connection_string: Option<String>,

    /// Inventory REST API base URL. Env: `SCANHUB_API_URL`.
    /// Default: none (scan notifications disabled).
    pub api_base_url: Option<String>,

    /// Env: `SCANHUB_DEVICE_PREFIX`
    pub device_prefix: String,

    /// Env: `SCANHUB_DEVICE_SALT`
    pub device_salt: String,

    /// Device id used for the agent's own alerts. Env: `SCANHUB_AGENT_ID`
    pub agent_id: String,

    /// Env: `SCANHUB_PEERS` (comma list) and `SCANHUB_PEERS_FILE`
    pub peers: Vec<PeerAddr>,

    /// Env: `SCANHUB_INTERNET_TARGET`
    pub internet_target: String,

    /// Env: `SCANHUB_PROBE_TIMEOUT_SECS`
    pub probe_timeout: Duration,

    /// Probe cadences, staleness TTL and peer gating.
    /// Env: `SCANHUB_{INTERNET,HUB,PEER}_INTERVAL_SECS`,
    /// `SCANHUB_STATUS_TTL_SECS`, `SCANHUB_REQUIRE_PEER`
    pub monitor: MonitorConfig,

    /// Env: `SCANHUB_RETRY_INTERVAL_SECS`
    pub retry_interval: Duration,

    /// Env: `SCANHUB_RETRY_BATCH`
    pub retry_batch: usize,

    /// Backoff around registration and send calls.
    pub retry_policy: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            hub_connection_string: None,
            api_base_url: None,
            device_prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            device_salt: DEFAULT_DEVICE_SALT.to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            peers: Vec::new(),
            internet_target: DEFAULT_INTERNET_TARGET.to_string(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            monitor: MonitorConfig::default(),
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            retry_batch: DEFAULT_RETRY_BATCH,
            retry_policy: RetryPolicy::default(),
        }
    }
}

// Hand-written so the connection string never reaches the logs.
impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("db_path", &self.db_path)
            .field(
                "hub_connection_string",
                &self.hub_connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("device_prefix", &self.device_prefix)
            .field("agent_id", &self.agent_id)
            .field("peers", &self.peers.len())
            .field("internet_target", &self.internet_target)
            .field("probe_timeout", &self.probe_timeout)
            .field("monitor", &self.monitor)
            .field("retry_interval", &self.retry_interval)
            .field("retry_batch", &self.retry_batch)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl AgentConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = var("SCANHUB_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        config.hub_connection_string = var("IOTHUB_CONNECTION_STRING");
        config.api_base_url = var("SCANHUB_API_URL");

        if let Some(prefix) = var("SCANHUB_DEVICE_PREFIX") {
            config.device_prefix = prefix;
        }
        if let Some(salt) = var("SCANHUB_DEVICE_SALT") {
            config.device_salt = salt;
        }
        if let Some(id) = var("SCANHUB_AGENT_ID") {
            config.agent_id = id;
        }

        if let Some(list) = var("SCANHUB_PEERS") {
            config.peers.extend(parse_peer_addrs(&list));
        }
        if let Some(path) = var("SCANHUB_PEERS_FILE") {
            config.peers.extend(load_peer_addrs(&PathBuf::from(path)));
        }

        if let Some(val) = var("SCANHUB_REQUIRE_PEER") {
            config.monitor.require_peer = val != "false" && val != "0";
        }
        if let Some(target) = var("SCANHUB_INTERNET_TARGET") {
            config.internet_target = target;
        }

        let secs = |key: &str, current: Duration| match var(key) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => Duration::from_secs(n),
                _ => {
                    tracing::warn!(key, value = %raw, "Invalid duration, using default");
                    current
                }
            },
            None => current,
        };
        config.monitor.internet_interval =
            secs("SCANHUB_INTERNET_INTERVAL_SECS", config.monitor.internet_interval);
        config.monitor.hub_interval = secs("SCANHUB_HUB_INTERVAL_SECS", config.monitor.hub_interval);
        config.monitor.peer_interval =
            secs("SCANHUB_PEER_INTERVAL_SECS", config.monitor.peer_interval);
        config.monitor.status_ttl = secs("SCANHUB_STATUS_TTL_SECS", config.monitor.status_ttl);
        config.probe_timeout = secs("SCANHUB_PROBE_TIMEOUT_SECS", config.probe_timeout);
        config.retry_interval = secs("SCANHUB_RETRY_INTERVAL_SECS", config.retry_interval);

        if let Some(raw) = var("SCANHUB_RETRY_BATCH") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.retry_batch = n,
                _ => tracing::warn!(value = %raw, "Invalid SCANHUB_RETRY_BATCH, using default"),
            }
        }

        config
    }
}
