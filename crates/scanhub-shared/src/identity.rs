//! Deterministic barcode → device identity derivation and device
//! credential generation.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::{DEVICE_HASH_LEN, DEVICE_KEY_SIZE};
use crate::error::ValidationError;
use crate::types::{Barcode, DeviceId};

/// Derive the device id for a barcode: `prefix + hex(BLAKE3(salt || barcode))[..12]`.
///
/// No randomness is involved, so re-scanning a barcode after a crash (or on
/// another unit sharing the salt) yields the same id and cloud lookups stay
/// idempotent.
pub fn derive_device_id(
    prefix: &str,
    salt: &str,
    barcode: &Barcode,
) -> Result<DeviceId, ValidationError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(barcode.as_str().as_bytes());
    let digest = hasher.finalize().to_hex();
    DeviceId::new(format!("{prefix}{}", &digest[..DEVICE_HASH_LEN]))
}

/// Generate a fresh base64-encoded 256-bit symmetric device key.
pub fn generate_device_key() -> String {
    let mut key = [0u8; DEVICE_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}
