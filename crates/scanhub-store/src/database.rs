//! Database location and connection management.
//!
//! The [`Store`] struct owns only the path of the SQLite file. Migrations run
//! once in [`Store::open_at`]; afterwards every CRUD helper opens a fresh
//! connection through [`Store::connect`] and drops it before returning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// How long a connection waits on a lock held by another writer.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the scan agent's SQLite file.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

/// Row counts removed by [`Store::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetSummary {
    pub scans: usize,
    pub unsent_messages: usize,
}

impl Store {
    /// Open (or create) the default agent database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/scanhub/scanhub.db`
    /// - macOS:   `~/Library/Application Support/com.scanhub.scanhub/scanhub.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\scanhub\scanhub\data\scanhub.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "scanhub", "scanhub").ok_or(StoreError::NoDataDir)?;

        let db_path = project_dirs.data_dir().join("scanhub.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path and bring its schema
    /// up to date.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
        };

        let conn = store.connect()?;
        // WAL is persistent, so setting it once here covers later connections.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&conn)?;

        Ok(store)
    }

    /// Open a new connection to the database file.
    ///
    /// Callers get an independent handle that is closed on drop, which is
    /// what makes a `Store` safe to use from several threads at once.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Return the filesystem path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete every scan and every queued message. Barcode mappings survive
    /// so device identities stay stable across a reset.
    pub fn reset(&self) -> Result<ResetSummary> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let scans = tx.execute("DELETE FROM scans", [])?;
        let unsent_messages = tx.execute("DELETE FROM unsent_messages", [])?;
        tx.commit()?;

        tracing::warn!(scans, unsent_messages, "local scan history reset");

        Ok(ResetSummary {
            scans,
            unsent_messages,
        })
    }
}

/// Wrap a parse failure of text column `idx` as a rusqlite conversion error.
pub(crate) fn text_column_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
