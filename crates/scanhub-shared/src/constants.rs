/// Application name
pub const APP_NAME: &str = "scanhub";

/// Prefix prepended to every barcode-derived device id
pub const DEFAULT_DEVICE_PREFIX: &str = "scanner-";

/// Salt mixed into the barcode before hashing. Changing it re-keys every
/// device in the fleet, so it is fixed per deployment.
pub const DEFAULT_DEVICE_SALT: &str = "scanhub-barcode-device-v1";

/// Number of hex characters of the barcode hash kept in a device id
pub const DEVICE_HASH_LEN: usize = 12;

/// Longest accepted barcode (GTIN-14)
pub const MAX_BARCODE_LEN: usize = 14;

/// Symmetric device key size in bytes (before base64)
pub const DEVICE_KEY_SIZE: usize = 32;

/// Default internet probe target (Google DNS over TCP)
pub const DEFAULT_INTERNET_TARGET: &str = "8.8.8.8:53";

/// Port used to probe the hub endpoint
pub const HUB_PROBE_PORT: u16 = 443;

/// Ports tried, in order, when a peer address has no explicit port
pub const PEER_PROBE_PORTS: [u16; 4] = [22, 80, 5000, 8080];

/// Probe cadences in seconds
pub const DEFAULT_INTERNET_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HUB_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PEER_INTERVAL_SECS: u64 = 15;

/// Per-socket probe timeout in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;

/// Cached connectivity readings older than this are reported as stale
pub const DEFAULT_STATUS_TTL_SECS: u64 = 15;

/// Retry worker cadence in seconds
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// Maximum queued messages drained per retry cycle
pub const DEFAULT_RETRY_BATCH: usize = 10;

/// Application-level attempts around registration and send calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay in seconds; doubled after every failed attempt
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;

/// SAS token lifetime in seconds
pub const SAS_TOKEN_TTL_SECS: u64 = 3600;

/// IoT Hub REST api-version for registry operations
pub const REGISTRY_API_VERSION: &str = "2021-04-12";

/// IoT Hub REST api-version for device-to-cloud messages
pub const DEVICE_API_VERSION: &str = "2020-03-13";

/// Host used in degraded descriptors when no hub is configured
pub const UNCONFIGURED_HUB_HOST: &str = "unconfigured.azure-devices.net";

/// Device id the agent reports its own connectivity alerts under
pub const DEFAULT_AGENT_ID: &str = "scanhub-agent";
