//! Key-value backend over redb.
//!
//! Each entity kind lives in its own table, partitioned by user: composite
//! `(user_id, ...)` keys make "everything for one user" a prefix range.
//! There is no secondary index, so the filename query is a scan of the
//! user's partition filtered on the decoded record. That cost is acceptable
//! at this data scale.
//!
//! redb serializes write transactions, which is what makes the conditional
//! user insert atomic.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, backends::InMemoryBackend};
use tracing::info;

use super::{BookLabel, DocumentLink, ProgressRecord, StoreError, StoreResult, User};

/// username -> password hash. The username doubles as the user id.
const USERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("users-1");
/// (user_id, document) -> json-encoded [`ProgressRecord`].
const PROGRESS_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("progress-1");
/// (user_id, document_hash) -> canonical_hash.
const LINKS_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("document-links-1");
/// (user_id, canonical_hash) -> label.
const LABELS_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("book-labels-1");

/// redb-backed [`super::EntityStore`].
#[derive(Debug)]
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("loading entity database from {}", path.to_string_lossy());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::builder().create(path)?;
        Self::open(db)
    }

    /// Open an in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        info!("using in-memory entity database");
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::open(db)
    }

    fn open(db: Database) -> StoreResult<Self> {
        let write_tx = db.begin_write()?;
        {
            let _table = write_tx.open_table(USERS_TABLE)?;
            let _table = write_tx.open_table(PROGRESS_TABLE)?;
            let _table = write_tx.open_table(LINKS_TABLE)?;
            let _table = write_tx.open_table(LABELS_TABLE)?;
        }
        write_tx.commit()?;
        Ok(Self { db })
    }

    fn insert_kv(
        &self,
        table: TableDefinition<(&str, &str), &str>,
        key: (&str, &str),
        value: &str,
    ) -> StoreResult<()> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(table)?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_kv(
        &self,
        table: TableDefinition<(&str, &str), &str>,
        key: (&str, &str),
    ) -> StoreResult<bool> {
        let tx = self.db.begin_write()?;
        let removed = {
            let mut table = tx.open_table(table)?;
            table.remove(key)?.is_some()
        };
        tx.commit()?;
        Ok(removed)
    }

    fn get_kv(
        &self,
        table: TableDefinition<(&str, &str), &str>,
        key: (&str, &str),
    ) -> StoreResult<Option<String>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(table)?;
        Ok(table.get(key)?.map(|row| row.value().to_string()))
    }

    /// All `(key, value)` pairs in the partition of `user_id`.
    fn scan_kv(
        &self,
        table: TableDefinition<(&str, &str), &str>,
        user_id: &str,
    ) -> StoreResult<Vec<(String, String)>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(table)?;
        let mut out = Vec::new();
        for row in table.range((user_id, "")..)? {
            let (key, value) = row?;
            if key.value().0 != user_id {
                break;
            }
            out.push((key.value().1.to_string(), value.value().to_string()));
        }
        Ok(out)
    }
}

impl super::EntityStore for RedbStore {
    fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(USERS_TABLE)?;
        Ok(table.get(username)?.map(|row| User {
            id: username.to_string(),
            username: username.to_string(),
            password_hash: row.value().to_string(),
        }))
    }

    fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(USERS_TABLE)?;
            if table.get(username)?.is_some() {
                return Err(StoreError::UsernameTaken);
            }
            table.insert(username, password_hash)?;
        }
        tx.commit()?;
        Ok(User {
            id: username.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(USERS_TABLE)?;
        Ok(table.get(username)?.is_some())
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> StoreResult<()> {
        let value = serde_json::to_vec(record)?;
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(PROGRESS_TABLE)?;
            table.insert(
                (record.user_id.as_str(), record.document.as_str()),
                value.as_slice(),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_progress(&self, user_id: &str, document: &str) -> StoreResult<Option<ProgressRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(PROGRESS_TABLE)?;
        match table.get((user_id, document))? {
            Some(row) => Ok(Some(serde_json::from_slice(row.value())?)),
            None => Ok(None),
        }
    }

    fn get_all_progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(PROGRESS_TABLE)?;
        let mut records = Vec::new();
        for row in table.range((user_id, "")..)? {
            let (key, value) = row?;
            if key.value().0 != user_id {
                break;
            }
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn get_all_progress_for_filename(
        &self,
        user_id: &str,
        filename: &str,
    ) -> StoreResult<Vec<ProgressRecord>> {
        // partition scan, filtered after decoding
        let mut records = self.get_all_progress_for_user(user_id)?;
        records.retain(|record| record.filename.as_deref() == Some(filename));
        Ok(records)
    }

    fn get_canonical(&self, user_id: &str, document_hash: &str) -> StoreResult<Option<String>> {
        self.get_kv(LINKS_TABLE, (user_id, document_hash))
    }

    fn create_link(
        &self,
        user_id: &str,
        document_hash: &str,
        canonical_hash: &str,
    ) -> StoreResult<()> {
        self.insert_kv(LINKS_TABLE, (user_id, document_hash), canonical_hash)
    }

    fn delete_link(&self, user_id: &str, document_hash: &str) -> StoreResult<bool> {
        self.remove_kv(LINKS_TABLE, (user_id, document_hash))
    }

    fn get_all_links(&self, user_id: &str) -> StoreResult<Vec<DocumentLink>> {
        Ok(self
            .scan_kv(LINKS_TABLE, user_id)?
            .into_iter()
            .map(|(document_hash, canonical_hash)| DocumentLink {
                document_hash,
                canonical_hash,
            })
            .collect())
    }

    fn get_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<Option<String>> {
        self.get_kv(LABELS_TABLE, (user_id, canonical_hash))
    }

    fn set_label(&self, user_id: &str, canonical_hash: &str, label: &str) -> StoreResult<()> {
        self.insert_kv(LABELS_TABLE, (user_id, canonical_hash), label)
    }

    fn delete_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<bool> {
        self.remove_kv(LABELS_TABLE, (user_id, canonical_hash))
    }

    fn get_all_labels(&self, user_id: &str) -> StoreResult<Vec<BookLabel>> {
        Ok(self
            .scan_kv(LABELS_TABLE, user_id)?
            .into_iter()
            .map(|(canonical_hash, label)| BookLabel {
                canonical_hash,
                label,
            })
            .collect())
    }
}
