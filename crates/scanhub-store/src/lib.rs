//! # scanhub-store
//!
//! Local persistent storage for the scan agent, backed by a single SQLite
//! file. It holds the scan history, the unsent-message retry queue, and the
//! barcode → device identity mapping table.
//!
//! [`Store`] keeps only the database path. Every operation opens its own
//! `rusqlite::Connection` and closes it on return, so a `Store` can be
//! cloned into any thread without sharing a handle.

pub mod database;
pub mod mapper;
pub mod mappings;
pub mod migrations;
pub mod models;
pub mod scans;
pub mod unsent;

mod error;

pub use database::Store;
pub use error::{Result, StoreError};
pub use mapper::DeviceMapper;
pub use models::*;
