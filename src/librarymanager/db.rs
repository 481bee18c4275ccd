//! Persistent library ↔ volume mapping database.
//!
//! A thin wrapper around [`redb`] with the business logic for the library
//! manager.  Two tables hold the two logically inverse indexes:
//!
//! ```text
//! library-mappings: (library_id, volume_id) -> empty record
//! volume-mappings:  (volume_id, library_id) -> empty record
//! ```
//!
//! Records are intentionally empty so fields can be added later without
//! breaking existing databases.  Every operation runs in a single
//! transaction.

use std::path::Path;

use redb::{
    CommitError, Database as RedbDatabase, DatabaseError, StorageError, TableDefinition,
    TableError, TransactionError,
};
use thiserror::Error;

/// Name of the database file.
pub const DATABASE_FILE_NAME: &str = "datadog-csi-driver.db";

const LIBRARY_MAPPINGS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("library-mappings");
const VOLUME_MAPPINGS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("volume-mappings");

// Records are empty so fields can be added later without breaking existing
// databases.
const EMPTY_RECORD: &[u8] = &[];

/// Errors returned by [`Database`] operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// An ID argument was empty.
    #[error("{0} cannot be blank")]
    BlankId(&'static str),

    /// Failed to open or create the database file.
    #[error("could not open database: {0}")]
    Open(#[from] DatabaseError),

    /// Failed to start a transaction.
    #[error("could not start transaction: {0}")]
    Transaction(#[from] TransactionError),

    /// Failed to open a table inside a transaction.
    #[error("could not open table: {0}")]
    Table(#[from] TableError),

    /// Failed to read or write a record.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Failed to commit a transaction.
    #[error("could not commit transaction: {0}")]
    Commit(#[from] CommitError),
}

/// Persistent bidirectional library ↔ volume map.
pub struct Database {
    redb: RedbDatabase,
}

impl Database {
    /// Open the database under `base_path`, re-using an existing file when
    /// present.  The root tables are created on first open.
    pub fn open(base_path: &Path) -> Result<Self, DbError> {
        let redb = RedbDatabase::create(base_path.join(DATABASE_FILE_NAME))?;

        let tx = redb.begin_write()?;
        {
            tx.open_table(LIBRARY_MAPPINGS)?;
            tx.open_table(VOLUME_MAPPINGS)?;
        }
        tx.commit()?;

        Ok(Self { redb })
    }

    /// Create a bidirectional mapping between the library and volume.
    /// Idempotent.
    pub fn link_volume(&self, library_id: &str, volume_id: &str) -> Result<(), DbError> {
        validate_ids(library_id, volume_id)?;

        let tx = self.redb.begin_write()?;
        {
            let mut libraries = tx.open_table(LIBRARY_MAPPINGS)?;
            libraries.insert((library_id, volume_id), EMPTY_RECORD)?;

            let mut volumes = tx.open_table(VOLUME_MAPPINGS)?;
            volumes.insert((volume_id, library_id), EMPTY_RECORD)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove the mapping for a given volume.  Idempotent; missing entries
    /// on either side are not an error.
    pub fn unlink_volume(&self, library_id: &str, volume_id: &str) -> Result<(), DbError> {
        validate_ids(library_id, volume_id)?;

        let tx = self.redb.begin_write()?;
        {
            let mut libraries = tx.open_table(LIBRARY_MAPPINGS)?;
            libraries.remove((library_id, volume_id))?;

            let mut volumes = tx.open_table(VOLUME_MAPPINGS)?;
            volumes.remove((volume_id, library_id))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Return the number of volumes linked to a library.
    pub fn get_volume_count(&self, library_id: &str) -> Result<usize, DbError> {
        if library_id.is_empty() {
            return Err(DbError::BlankId("library ID"));
        }

        let tx = self.redb.begin_read()?;
        let libraries = tx.open_table(LIBRARY_MAPPINGS)?;

        let mut count = 0;
        for entry in libraries.range((library_id, "")..)? {
            let (key, _) = entry?;
            if key.value().0 != library_id {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Return the library mapped to a volume, or an empty string when the
    /// volume is unknown.  A volume only ever has one library mapped to it.
    pub fn get_library_for_volume(&self, volume_id: &str) -> Result<String, DbError> {
        if volume_id.is_empty() {
            return Err(DbError::BlankId("volume ID"));
        }

        let tx = self.redb.begin_read()?;
        let volumes = tx.open_table(VOLUME_MAPPINGS)?;

        for entry in volumes.range((volume_id, "")..)? {
            let (key, _) = entry?;
            let (outer, inner) = key.value();
            if outer != volume_id {
                break;
            }
            return Ok(inner.to_owned());
        }
        Ok(String::new())
    }
}

fn validate_ids(library_id: &str, volume_id: &str) -> Result<(), DbError> {
    if library_id.is_empty() {
        return Err(DbError::BlankId("library ID"));
    }
    if volume_id.is_empty() {
        return Err(DbError::BlankId("volume ID"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_and_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.link_volume("lib-1", "vol-1").unwrap();
        db.link_volume("lib-1", "vol-2").unwrap();
        db.link_volume("lib-2", "vol-3").unwrap();

        assert_eq!(db.get_volume_count("lib-1").unwrap(), 2);
        assert_eq!(db.get_volume_count("lib-2").unwrap(), 1);
        assert_eq!(db.get_volume_count("lib-3").unwrap(), 0);

        assert_eq!(db.get_library_for_volume("vol-1").unwrap(), "lib-1");
        assert_eq!(db.get_library_for_volume("vol-3").unwrap(), "lib-2");
        assert_eq!(db.get_library_for_volume("vol-9").unwrap(), "");
    }

    #[test]
    fn link_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.link_volume("lib-1", "vol-1").unwrap();
        db.link_volume("lib-1", "vol-1").unwrap();

        assert_eq!(db.get_volume_count("lib-1").unwrap(), 1);
    }

    #[test]
    fn unlink_removes_both_sides() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.link_volume("lib-1", "vol-1").unwrap();
        db.link_volume("lib-1", "vol-2").unwrap();

        db.unlink_volume("lib-1", "vol-1").unwrap();
        assert_eq!(db.get_volume_count("lib-1").unwrap(), 1);
        assert_eq!(db.get_library_for_volume("vol-1").unwrap(), "");
        assert_eq!(db.get_library_for_volume("vol-2").unwrap(), "lib-1");

        db.unlink_volume("lib-1", "vol-2").unwrap();
        assert_eq!(db.get_volume_count("lib-1").unwrap(), 0);
    }

    #[test]
    fn unlink_missing_mapping_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.unlink_volume("lib-1", "vol-1").unwrap();
        db.link_volume("lib-1", "vol-1").unwrap();
        db.unlink_volume("lib-2", "vol-1").unwrap();
        assert_eq!(db.get_library_for_volume("vol-1").unwrap(), "lib-1");
    }

    #[test]
    fn blank_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        assert!(matches!(
            db.link_volume("", "vol-1"),
            Err(DbError::BlankId("library ID"))
        ));
        assert!(matches!(
            db.link_volume("lib-1", ""),
            Err(DbError::BlankId("volume ID"))
        ));
        assert!(matches!(
            db.get_volume_count(""),
            Err(DbError::BlankId("library ID"))
        ));
        assert!(matches!(
            db.get_library_for_volume(""),
            Err(DbError::BlankId("volume ID"))
        ));
    }

    #[test]
    fn mappings_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let db = Database::open(tmp.path()).unwrap();
            db.link_volume("lib-1", "vol-1").unwrap();
        }

        let db = Database::open(tmp.path()).unwrap();
        assert_eq!(db.get_library_for_volume("vol-1").unwrap(), "lib-1");
        assert_eq!(db.get_volume_count("lib-1").unwrap(), 1);
    }
}
