//! Entity store used by the sync and canonicalization engines.
//!
//! The store holds four entity kinds (users, progress records, document links
//! and book labels) behind one uniform [`EntityStore`] contract with two
//! implementations: an indexed relational schema over SQLite and a
//! partitioned key-value schema over redb. The backend is selected once at
//! startup from [`StorageConfig`].

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{Config, StorageConfig};

pub mod redb;
pub mod sqlite;

pub use self::redb::RedbStore;
pub use self::sqlite::SqliteStore;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Opaque stable identifier. The relational backend uses the row id, the
    /// key-value backend uses the username itself.
    pub id: String,
    /// Unique, case-sensitive username.
    pub username: String,
    /// Salted argon2 hash of the client credential.
    pub password_hash: String,
}

/// Reading progress for one canonical document of one user.
///
/// Exactly one live record exists per `(user_id, document)`; a write to an
/// existing key replaces the record entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Owning user.
    pub user_id: String,
    /// Canonical document identifier the record is stored under.
    pub document: String,
    /// Opaque reader position string.
    pub progress: String,
    /// Fraction read, in `0.0..=1.0`.
    pub percentage: f64,
    /// Human-readable device name.
    pub device: String,
    /// Device identifier.
    pub device_id: String,
    /// Write time, seconds since the unix epoch.
    pub timestamp: i64,
    /// Filename the document was synced under, if the client sent one.
    pub filename: Option<String>,
}

/// A flat equivalence edge from a raw document hash to its canonical hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    /// The raw document hash.
    pub document_hash: String,
    /// The canonical hash it resolves to. Never itself the `document_hash`
    /// of another link.
    pub canonical_hash: String,
}

/// A user-supplied display name override for one canonical document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLabel {
    /// The canonical hash the label is attached to.
    pub canonical_hash: String,
    /// The display name.
    pub label: String,
}

/// Errors from the storage layer.
///
/// Not-found is never an error: lookups return `Ok(None)` and deletions
/// return `Ok(false)`. A [`StoreError`] means the backend itself failed, or
/// a conditional insert lost to an existing row.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional user insert found the username taken.
    #[error("username already exists")]
    UsernameTaken,
    /// The relational backend failed.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The key-value backend failed.
    #[error(transparent)]
    Redb(#[from] ::redb::Error),
    /// A stored row failed to decode.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Creating the database directory failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! impl_from_redb {
    ($($err:ty),* $(,)?) => {
        $(impl From<$err> for StoreError {
            fn from(err: $err) -> Self {
                StoreError::Redb(err.into())
            }
        })*
    };
}

impl_from_redb!(
    ::redb::DatabaseError,
    ::redb::TransactionError,
    ::redb::TableError,
    ::redb::StorageError,
    ::redb::CommitError,
);

/// Result alias for storage calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Uniform contract over both storage backends.
///
/// Both implementations must expose identical semantics for uniqueness,
/// replace-on-write and not-found signaling. Callers must not assume low
/// latency from the key-value backend: "all records for a filename" is a
/// partition scan there.
pub trait EntityStore: Send + Sync + std::fmt::Debug {
    /// Look up a user by username.
    fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>>;
    /// Create a user. The insert is conditional at the storage layer so that
    /// concurrent registrations of the same username cannot both succeed.
    fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User>;
    /// Whether a username is taken.
    fn username_exists(&self, username: &str) -> StoreResult<bool>;

    /// Insert or fully replace the record at `(user_id, document)`.
    fn upsert_progress(&self, record: &ProgressRecord) -> StoreResult<()>;
    /// Get the record at `(user_id, document)`.
    fn get_progress(&self, user_id: &str, document: &str) -> StoreResult<Option<ProgressRecord>>;
    /// All progress records of a user.
    fn get_all_progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>>;
    /// All records of a user whose filename matches, across distinct
    /// canonical documents. Only the canonicalization engine calls this.
    fn get_all_progress_for_filename(
        &self,
        user_id: &str,
        filename: &str,
    ) -> StoreResult<Vec<ProgressRecord>>;

    /// Canonical hash a raw hash links to, if any.
    fn get_canonical(&self, user_id: &str, document_hash: &str) -> StoreResult<Option<String>>;
    /// Create a link edge. Replaces an existing edge for the same raw hash.
    fn create_link(
        &self,
        user_id: &str,
        document_hash: &str,
        canonical_hash: &str,
    ) -> StoreResult<()>;
    /// Delete a link edge. Returns whether one existed.
    fn delete_link(&self, user_id: &str, document_hash: &str) -> StoreResult<bool>;
    /// All link edges of a user.
    fn get_all_links(&self, user_id: &str) -> StoreResult<Vec<DocumentLink>>;

    /// Label for a canonical hash, if set.
    fn get_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<Option<String>>;
    /// Set or replace the label for a canonical hash.
    fn set_label(&self, user_id: &str, canonical_hash: &str, label: &str) -> StoreResult<()>;
    /// Delete the label for a canonical hash. Returns whether one existed.
    fn delete_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<bool>;
    /// All labels of a user.
    fn get_all_labels(&self, user_id: &str) -> StoreResult<Vec<BookLabel>>;
}

/// Open the backend selected by the config.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn EntityStore>> {
    match config {
        StorageConfig::Sqlite { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => Config::data_dir()?.join("reader-sync.db"),
            };
            Ok(Arc::new(SqliteStore::persistent(path)?))
        }
        StorageConfig::Redb { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => Config::data_dir()?.join("reader-sync.redb"),
            };
            Ok(Arc::new(RedbStore::persistent(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<Arc<dyn EntityStore>> {
        vec![
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(RedbStore::in_memory().unwrap()),
        ]
    }

    fn record(user_id: &str, document: &str, timestamp: i64) -> ProgressRecord {
        ProgressRecord {
            user_id: user_id.to_string(),
            document: document.to_string(),
            progress: "/body/DocFragment[2]".to_string(),
            percentage: 0.25,
            device: "boox".to_string(),
            device_id: "dev-1".to_string(),
            timestamp,
            filename: Some("book.epub".to_string()),
        }
    }

    #[test]
    fn create_user_is_conditional() {
        for store in backends() {
            let user = store.create_user("alice", "hash-a").unwrap();
            assert_eq!(user.username, "alice");
            assert!(store.username_exists("alice").unwrap());
            assert!(!store.username_exists("bob").unwrap());

            let err = store.create_user("alice", "hash-b").unwrap_err();
            assert!(matches!(err, StoreError::UsernameTaken));

            // the losing insert must not have clobbered the stored hash
            let stored = store.get_user_by_name("alice").unwrap().unwrap();
            assert_eq!(stored.password_hash, "hash-a");
        }
    }

    #[test]
    fn usernames_are_case_sensitive() {
        for store in backends() {
            store.create_user("Alice", "h").unwrap();
            assert!(store.get_user_by_name("alice").unwrap().is_none());
            store.create_user("alice", "h").unwrap();
        }
    }

    #[test]
    fn upsert_replaces_single_row() {
        for store in backends() {
            let first = record("u1", "doc1", 100);
            store.upsert_progress(&first).unwrap();

            let mut second = record("u1", "doc1", 200);
            second.progress = "/body/DocFragment[9]".to_string();
            second.percentage = 0.875;
            second.device = "phone".to_string();
            store.upsert_progress(&second).unwrap();

            let stored = store.get_progress("u1", "doc1").unwrap().unwrap();
            assert_eq!(stored, second);
            // exactly one live record per key, no accumulated history
            assert_eq!(store.get_all_progress_for_user("u1").unwrap().len(), 1);
        }
    }

    #[test]
    fn percentage_round_trips_exactly() {
        for store in backends() {
            let mut rec = record("u1", "doc1", 100);
            rec.percentage = 0.4242424242424242;
            store.upsert_progress(&rec).unwrap();
            let stored = store.get_progress("u1", "doc1").unwrap().unwrap();
            assert_eq!(stored.percentage, 0.4242424242424242);
        }
    }

    #[test]
    fn progress_is_partitioned_by_user() {
        for store in backends() {
            store.upsert_progress(&record("u1", "doc1", 100)).unwrap();
            store.upsert_progress(&record("u2", "doc1", 200)).unwrap();
            assert_eq!(store.get_all_progress_for_user("u1").unwrap().len(), 1);
            assert!(store.get_progress("u3", "doc1").unwrap().is_none());
        }
    }

    #[test]
    fn filename_query_spans_canonicals() {
        for store in backends() {
            store.upsert_progress(&record("u1", "doc1", 100)).unwrap();
            store.upsert_progress(&record("u1", "doc2", 200)).unwrap();
            let mut other = record("u1", "doc3", 300);
            other.filename = Some("other.epub".to_string());
            store.upsert_progress(&other).unwrap();
            let mut unnamed = record("u1", "doc4", 400);
            unnamed.filename = None;
            store.upsert_progress(&unnamed).unwrap();

            let mut found: Vec<String> = store
                .get_all_progress_for_filename("u1", "book.epub")
                .unwrap()
                .into_iter()
                .map(|r| r.document)
                .collect();
            found.sort();
            assert_eq!(found, vec!["doc1", "doc2"]);
        }
    }

    #[test]
    fn link_crud() {
        for store in backends() {
            assert!(store.get_canonical("u1", "b").unwrap().is_none());
            store.create_link("u1", "b", "a").unwrap();
            assert_eq!(store.get_canonical("u1", "b").unwrap().unwrap(), "a");

            // replace-on-write for the same raw hash
            store.create_link("u1", "b", "c").unwrap();
            assert_eq!(store.get_canonical("u1", "b").unwrap().unwrap(), "c");
            assert_eq!(store.get_all_links("u1").unwrap().len(), 1);

            assert!(store.delete_link("u1", "b").unwrap());
            assert!(!store.delete_link("u1", "b").unwrap());
            assert!(store.get_all_links("u1").unwrap().is_empty());
        }
    }

    #[test]
    fn label_crud() {
        for store in backends() {
            assert!(store.get_label("u1", "a").unwrap().is_none());
            store.set_label("u1", "a", "Moby Dick").unwrap();
            store.set_label("u1", "a", "Moby-Dick").unwrap();
            assert_eq!(store.get_label("u1", "a").unwrap().unwrap(), "Moby-Dick");
            assert_eq!(store.get_all_labels("u1").unwrap().len(), 1);
            assert!(store.get_all_labels("u2").unwrap().is_empty());

            assert!(store.delete_label("u1", "a").unwrap());
            assert!(!store.delete_label("u1", "a").unwrap());
        }
    }

    #[test]
    fn persistent_stores_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let sqlite_path = dir.path().join("store.db");
        {
            let store = SqliteStore::persistent(&sqlite_path).unwrap();
            store.create_user("alice", "hash-a").unwrap();
            store.upsert_progress(&record("alice", "doc-1", 100)).unwrap();
        }
        let store = SqliteStore::persistent(&sqlite_path).unwrap();
        assert!(store.username_exists("alice").unwrap());
        assert!(store.get_progress("alice", "doc-1").unwrap().is_some());

        let redb_path = dir.path().join("store.redb");
        {
            let store = RedbStore::persistent(&redb_path).unwrap();
            store.create_user("alice", "hash-a").unwrap();
            store.upsert_progress(&record("alice", "doc-1", 100)).unwrap();
        }
        let store = RedbStore::persistent(&redb_path).unwrap();
        assert!(store.username_exists("alice").unwrap());
        assert!(store.get_progress("alice", "doc-1").unwrap().is_some());
    }
}
