//! Fakes and fixtures shared by the agent's tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use scanhub_cloud::{
    CloudError, DeviceRegistry, DeviceSender, RegistrationService, RegistryDevice, RetryPolicy,
};
use scanhub_net::{ConnectivityMonitor, ManualProbe, MonitorConfig, Probes};
use scanhub_shared::{Barcode, ConnectionDescriptor, DeviceId, MessageKind, Signal};
use scanhub_store::{DeviceMapper, Store};

use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::notifier::ScanNotifier;
use crate::orchestrator::Orchestrator;

pub const HUB_HOST: &str = "fleet.azure-devices.net";

/// Records every message it is asked to send.
#[derive(Default)]
pub struct FakeSender {
    pub sent: Mutex<Vec<MessageKind>>,
    pub fail: AtomicBool,
}

impl FakeSender {
    pub fn sent(&self) -> Vec<MessageKind> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceSender for FakeSender {
    async fn send(
        &self,
        descriptor: &ConnectionDescriptor,
        message: &MessageKind,
    ) -> Result<(), CloudError> {
        assert_eq!(&descriptor.device_id, message.device_id());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CloudError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "hub unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// In-memory registry counting device creations.
#[derive(Default)]
pub struct FakeRegistry {
    devices: Mutex<HashMap<DeviceId, RegistryDevice>>,
    pub creates: AtomicUsize,
}

#[async_trait]
impl DeviceRegistry for FakeRegistry {
    fn host_name(&self) -> &str {
        HUB_HOST
    }

    async fn get_device(&self, device_id: &DeviceId) -> Result<Option<RegistryDevice>, CloudError> {
        Ok(self.devices.lock().unwrap().get(device_id).cloned())
    }

    async fn create_device(
        &self,
        device_id: &DeviceId,
        primary_key: &str,
        _secondary_key: &str,
    ) -> Result<RegistryDevice, CloudError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let device = RegistryDevice {
            device_id: device_id.clone(),
            primary_key: primary_key.to_string(),
            enabled: true,
        };
        self.devices
            .lock()
            .unwrap()
            .insert(device_id.clone(), device.clone());
        Ok(device)
    }
}

/// Inventory notifier that records barcodes and can be told to fail.
#[derive(Default)]
pub struct FakeNotifier {
    pub notified: Mutex<Vec<Barcode>>,
    pub fail: AtomicBool,
}

impl FakeNotifier {
    pub fn notified(&self) -> Vec<Barcode> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanNotifier for FakeNotifier {
    async fn notify_scan(&self, barcode: &Barcode) -> Result<String, CloudError> {
        self.notified.lock().unwrap().push(barcode.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CloudError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "inventory offline".into(),
            });
        }
        Ok("Saved".to_string())
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub sender: Arc<FakeSender>,
    pub registry: Option<Arc<FakeRegistry>>,
    pub notifier: Arc<FakeNotifier>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn ctx(&self) -> &AgentContext {
        self.orchestrator.context()
    }

    pub fn store(&self) -> &Store {
        &self.ctx().store
    }

    pub fn set_all(&self, up: bool) {
        for signal in Signal::ALL {
            self.ctx().monitor.record(signal, up);
        }
    }
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        retry_policy: RetryPolicy::none(),
        retry_interval: Duration::from_secs(3600),
        ..AgentConfig::default()
    }
}

/// Orchestrator over a temp store with fake cloud collaborators. Probes
/// stay down; tests drive connectivity with [`Harness::set_all`].
pub fn harness(with_registry: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_at(&dir.path().join("scanhub.db")).unwrap();
    let mapper = DeviceMapper::with_defaults(store);

    let registry = with_registry.then(|| Arc::new(FakeRegistry::default()));
    let registration = match &registry {
        Some(registry) => RegistrationService::new(mapper, registry.clone()),
        None => RegistrationService::degraded(mapper, HUB_HOST),
    }
    .with_retry(RetryPolicy::none());

    let probe = ManualProbe::new(false);
    let monitor = ConnectivityMonitor::new(
        MonitorConfig::default(),
        Probes {
            internet: Arc::new(probe.clone()),
            hub: Arc::new(probe.clone()),
            peer: Arc::new(probe),
        },
    );

    let sender = Arc::new(FakeSender::default());
    let notifier = Arc::new(FakeNotifier::default());
    let ctx = AgentContext::new(test_config(), registration, sender.clone(), monitor)
        .unwrap()
        .with_notifier(notifier.clone());

    Harness {
        orchestrator: Orchestrator::new(Arc::new(ctx)),
        sender,
        registry,
        notifier,
        _dir: dir,
    }
}
