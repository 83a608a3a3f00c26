//! The agent's collaborators, built once at startup and shared by the
//! orchestrator and the retry worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use scanhub_cloud::{ApiClient, DeviceSender, HttpDeviceSender, RegistrationService, RetryPolicy};
use scanhub_net::{
    ConnectivityMonitor, PeerProbe, PeerTracker, Probes, SharedPeerTracker, TcpProbe,
};
use scanhub_shared::constants::HUB_PROBE_PORT;
use scanhub_shared::DeviceId;
use scanhub_store::{DeviceMapper, Store};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::notifier::ScanNotifier;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AgentContext {
    pub config: AgentConfig,
    pub store: Store,
    pub mapper: DeviceMapper,
    pub registration: RegistrationService,
    pub sender: Arc<dyn DeviceSender>,
    pub monitor: ConnectivityMonitor,
    pub notifier: Option<Arc<dyn ScanNotifier>>,
    pub peers: SharedPeerTracker,
    pub agent_id: DeviceId,
    pub retry: RetryPolicy,
    worker_running: AtomicBool,
    /// Held for the length of one pass over the unsent queue.
    drain_lock: tokio::sync::Mutex<()>,
}

impl AgentContext {
    /// Assemble a context from ready-made parts. The store and mapper are
    /// taken from the registration service so all three agree.
    pub fn new(
        config: AgentConfig,
        registration: RegistrationService,
        sender: Arc<dyn DeviceSender>,
        monitor: ConnectivityMonitor,
    ) -> Result<Self> {
        let mapper = registration.mapper().clone();
        let store = mapper.store().clone();
        let agent_id = DeviceId::new(config.agent_id.clone())?;
        let retry = config.retry_policy;
        Ok(Self {
            config,
            store,
            mapper,
            registration,
            sender,
            monitor,
            notifier: None,
            peers: PeerTracker::shared(),
            agent_id,
            retry,
            worker_running: AtomicBool::new(false),
            drain_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ScanNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_peers(mut self, peers: SharedPeerTracker) -> Self {
        self.peers = peers;
        self
    }

    /// Build the production context: SQLite store, hub registry and device
    /// clients over HTTPS, TCP probes.
    pub fn from_config(mut config: AgentConfig) -> Result<Self> {
        let store = match &config.db_path {
            Some(path) => Store::open_at(path)?,
            None => Store::new()?,
        };
        info!(path = %store.path().display(), "Opened local store");

        let mapper = DeviceMapper::new(store, &config.device_prefix, &config.device_salt);
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(scanhub_cloud::CloudError::from)?;

        let registration = RegistrationService::from_connection_string(
            http.clone(),
            mapper,
            config.hub_connection_string.as_deref(),
        )
        .with_retry(config.retry_policy);

        if config.peers.is_empty() && config.monitor.require_peer {
            warn!("No peers configured; cloud sends will not wait for a peer device");
            config.monitor.require_peer = false;
        }

        let peers = PeerTracker::shared();
        let probes = Probes {
            internet: Arc::new(TcpProbe::single(
                config.internet_target.clone(),
                config.probe_timeout,
            )),
            hub: Arc::new(TcpProbe::single(
                format!("{}:{HUB_PROBE_PORT}", registration.host_name()),
                config.probe_timeout,
            )),
            peer: Arc::new(PeerProbe::new(
                config.peers.clone(),
                config.probe_timeout,
                peers.clone(),
            )),
        };
        let monitor = ConnectivityMonitor::new(config.monitor.clone(), probes);
        let sender: Arc<dyn DeviceSender> = Arc::new(HttpDeviceSender::new(http));

        let notifier = match &config.api_base_url {
            Some(url) => Some(Arc::new(ApiClient::new(url.clone())?) as Arc<dyn ScanNotifier>),
            None => None,
        };

        let mut ctx = Self::new(config, registration, sender, monitor)?.with_peers(peers);
        ctx.notifier = notifier;
        Ok(ctx)
    }

    /// Run a synchronous store call off the async runtime.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> scanhub_store::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AgentError::Task(e.to_string()))?;
        Ok(result?)
    }

    /// Like [`with_store`](Self::with_store) for the mapper.
    pub async fn with_mapper<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceMapper) -> scanhub_store::Result<T> + Send + 'static,
    {
        let mapper = self.mapper.clone();
        let result = tokio::task::spawn_blocking(move || f(&mapper))
            .await
            .map_err(|e| AgentError::Task(e.to_string()))?;
        Ok(result?)
    }

    pub fn worker_running(&self) -> bool {
        self.worker_running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_worker_running(&self, running: bool) {
        self.worker_running.store(running, Ordering::SeqCst);
    }

    pub(crate) async fn lock_drain(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.drain_lock.lock().await
    }
}
