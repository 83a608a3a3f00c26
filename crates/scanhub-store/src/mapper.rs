//! Barcode → device identity mapper.
//!
//! Wraps the mapping table with the deterministic id derivation from
//! [`scanhub_shared::identity`]. The mapping is created lazily on the first
//! scan of a barcode and never reassigned afterwards.

use chrono::Utc;

use scanhub_shared::constants::{DEFAULT_DEVICE_PREFIX, DEFAULT_DEVICE_SALT};
use scanhub_shared::identity::derive_device_id;
use scanhub_shared::{Barcode, ConnectionDescriptor, DeviceId};

use crate::database::Store;
use crate::error::Result;
use crate::models::BarcodeDeviceMapping;

#[derive(Debug, Clone)]
pub struct DeviceMapper {
    store: Store,
    prefix: String,
    salt: String,
}

impl DeviceMapper {
    pub fn new(store: Store, prefix: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            salt: salt.into(),
        }
    }

    pub fn with_defaults(store: Store) -> Self {
        Self::new(store, DEFAULT_DEVICE_PREFIX, DEFAULT_DEVICE_SALT)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Device id a barcode maps to, without touching the table.
    pub fn derive(&self, barcode: &Barcode) -> Result<DeviceId> {
        Ok(derive_device_id(&self.prefix, &self.salt, barcode)?)
    }

    /// Resolve a barcode to its device id, inserting a pending mapping the
    /// first time the barcode is seen and refreshing `last_used` otherwise.
    pub fn get_device_id_for_barcode(&self, barcode: &Barcode) -> Result<DeviceId> {
        Ok(self.lookup(barcode)?.device_id)
    }

    /// Like [`get_device_id_for_barcode`](Self::get_device_id_for_barcode)
    /// but returns the whole mapping row.
    pub fn lookup(&self, barcode: &Barcode) -> Result<BarcodeDeviceMapping> {
        let derived = self.derive(barcode)?;
        let mapping = self.store.upsert_mapping(barcode, &derived, Utc::now())?;

        if mapping.created_at == mapping.last_used {
            tracing::info!(barcode = %barcode, device_id = %mapping.device_id, "created device mapping");
        } else {
            tracing::debug!(barcode = %barcode, device_id = %mapping.device_id, "found device mapping");
        }
        if mapping.device_id != derived {
            // Rows written with an older prefix or salt keep their id.
            tracing::warn!(
                barcode = %barcode,
                stored = %mapping.device_id,
                derived = %derived,
                "stored device id differs from derivation; keeping stored id"
            );
        }
        Ok(mapping)
    }

    pub fn update_device_registration(
        &self,
        barcode: &Barcode,
        descriptor: &ConnectionDescriptor,
        cloud_registered: bool,
    ) -> Result<bool> {
        self.store
            .update_device_registration(barcode, descriptor, cloud_registered)
    }

    pub fn get_connection_descriptor_for_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<ConnectionDescriptor>> {
        self.store.get_connection_descriptor_for_barcode(barcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegistrationStatus;

    fn barcode(s: &str) -> Barcode {
        Barcode::parse(s).unwrap()
    }

    fn mapper(dir: &tempfile::TempDir) -> DeviceMapper {
        let store = Store::open_at(&dir.path().join("mapping.db")).unwrap();
        DeviceMapper::with_defaults(store)
    }

    #[test]
    fn test_same_barcode_same_device_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = mapper(&dir)
            .get_device_id_for_barcode(&barcode("40123456"))
            .unwrap();

        let reopened = mapper(&dir);
        let second = reopened
            .get_device_id_for_barcode(&barcode("40123456"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(reopened.store().mapping_stats().unwrap().total_mappings, 1);
    }

    #[test]
    fn test_two_barcodes_two_devices() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(&dir);

        let a = m.get_device_id_for_barcode(&barcode("40123456")).unwrap();
        let b = m.get_device_id_for_barcode(&barcode("99999999")).unwrap();
        let a_again = m.get_device_id_for_barcode(&barcode("40123456")).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, a_again);
        assert_eq!(m.store().list_mappings(10).unwrap().len(), 2);
    }

    #[test]
    fn test_new_mapping_is_pending_without_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(&dir);
        let code = barcode("40123456");

        assert!(m.store().is_new_barcode(&code).unwrap());
        let mapping = m.lookup(&code).unwrap();
        assert!(!m.store().is_new_barcode(&code).unwrap());

        assert_eq!(mapping.registration_status, RegistrationStatus::Pending);
        assert!(!mapping.cloud_registered);
        assert!(m.get_connection_descriptor_for_barcode(&code).unwrap().is_none());
    }

    #[test]
    fn test_registration_exposes_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(&dir);
        let code = barcode("40123456");
        let device_id = m.get_device_id_for_barcode(&code).unwrap();
        let descriptor = ConnectionDescriptor::new("hub.example.net", device_id, "a2V5");

        // A degraded descriptor is stored but not handed out.
        assert!(m.update_device_registration(&code, &descriptor, false).unwrap());
        assert!(m.get_connection_descriptor_for_barcode(&code).unwrap().is_none());

        assert!(m.update_device_registration(&code, &descriptor, true).unwrap());
        assert_eq!(
            m.get_connection_descriptor_for_barcode(&code).unwrap(),
            Some(descriptor)
        );

        let stats = m.store().mapping_stats().unwrap();
        assert_eq!(stats.registered_devices, 1);
        assert_eq!(stats.pending_registrations, 0);
        assert_eq!(stats.recent_activity, 1);
    }

    #[test]
    fn test_update_unknown_barcode_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(&dir);
        let descriptor =
            ConnectionDescriptor::new("hub", DeviceId::new("scanner-x").unwrap(), "k");
        assert!(!m
            .update_device_registration(&barcode("12345678"), &descriptor, true)
            .unwrap());
    }

    #[test]
    fn test_cleanup_keeps_registered_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(&dir);
        let registered = barcode("40123456");
        let pending = barcode("99999999");
        let device_id = m.get_device_id_for_barcode(&registered).unwrap();
        m.get_device_id_for_barcode(&pending).unwrap();
        m.update_device_registration(
            &registered,
            &ConnectionDescriptor::new("hub", device_id, "k"),
            true,
        )
        .unwrap();

        // Age every row past the cutoff.
        m.store()
            .connect()
            .unwrap()
            .execute(
                "UPDATE barcode_device_mapping SET last_used = '2000-01-01T00:00:00.000Z'",
                [],
            )
            .unwrap();

        assert_eq!(m.store().cleanup_stale_mappings(30).unwrap(), 1);
        assert!(m.store().get_mapping(&registered).unwrap().is_some());
        assert!(m.store().get_mapping(&pending).unwrap().is_none());
    }
}
