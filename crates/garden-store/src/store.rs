//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use garden_types::{DeviceSnapshot, decode_snapshot, encode_snapshot};

use crate::error::{Error, Result};
use crate::schema;

/// A status record as stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStatus {
    /// Device identifier the record is keyed by.
    pub device_id: String,
    /// The decoded record.
    pub snapshot: DeviceSnapshot,
    /// When the record was last written.
    pub updated_at: OffsetDateTime,
}

/// SQLite-based store holding one status record per device.
///
/// The controller owns the record and overwrites it with each report; the
/// dashboard only ever reads it and writes the `command` key.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening status store at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL lets the controller write while the dashboard reads
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 2000;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Check that the database answers queries.
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // === Status record operations ===

    /// Read the status record for a device.
    ///
    /// Returns `Ok(None)` when no record exists yet.
    pub fn find_status(&self, device_id: &str) -> Result<Option<StoredStatus>> {
        let row = self
            .conn
            .query_row(
                "SELECT document, updated_at FROM status WHERE id = ?",
                [device_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((document, updated_at)) = row else {
            debug!("No status record for {}", device_id);
            return Ok(None);
        };

        let snapshot = decode_snapshot(document.as_bytes()).map_err(|source| Error::Decode {
            device_id: device_id.to_string(),
            source,
        })?;

        Ok(Some(StoredStatus {
            device_id: device_id.to_string(),
            snapshot,
            updated_at: from_timestamp(updated_at)?,
        }))
    }

    /// Replace the whole status record for a device.
    pub fn write_status(&self, device_id: &str, snapshot: &DeviceSnapshot) -> Result<()> {
        let document = encode_snapshot(snapshot).map_err(Error::Encode)?;
        self.write_document(device_id, &document)
    }

    /// Write raw document text for a device.
    ///
    /// No validation is done; this mirrors a controller writing whatever it
    /// likes into the record.
    pub fn write_document(&self, device_id: &str, document: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO status (id, document, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET document = ?2, updated_at = ?3",
            rusqlite::params![device_id, document, now_timestamp()],
        )?;
        Ok(())
    }

    /// Stage a command in the record's mailbox field.
    ///
    /// Last write wins; there is no compare-and-swap against what the
    /// controller may be writing. A missing record is created holding only
    /// the command. A record that is not a JSON object is left untouched and
    /// reported as [`Error::NotAnObject`].
    pub fn set_command(&self, device_id: &str, command: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let is_object: Option<bool> = tx
            .query_row(
                "SELECT CASE WHEN json_valid(document)
                             THEN json_type(document) = 'object'
                             ELSE 0 END
                 FROM status WHERE id = ?",
                [device_id],
                |row| row.get(0),
            )
            .optional()?;

        match is_object {
            Some(false) => {
                return Err(Error::NotAnObject {
                    device_id: device_id.to_string(),
                });
            }
            Some(true) => {
                tx.execute(
                    "UPDATE status SET document = json_set(document, '$.command', ?2),
                                       updated_at = ?3
                     WHERE id = ?1",
                    rusqlite::params![device_id, command, now_timestamp()],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO status (id, document, updated_at)
                         VALUES (?1, json_object('command', ?2), ?3)",
                    rusqlite::params![device_id, command, now_timestamp()],
                )?;
            }
        }

        tx.commit()?;
        debug!("Staged command {} for {}", command, device_id);
        Ok(())
    }
}

fn now_timestamp() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn from_timestamp(ts: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ts).map_err(|_| Error::InvalidTimestamp(ts))
}
