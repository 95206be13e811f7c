//! Relational backend over SQLite.
//!
//! Uniqueness and replace-on-write are enforced by the schema: composite
//! primary keys on the progress, link and label tables and a unique index on
//! usernames. User creation is a conditional insert in one statement, so
//! concurrent registrations cannot both succeed.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::{BookLabel, DocumentLink, ProgressRecord, StoreError, StoreResult, User};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    user_id TEXT NOT NULL,
    document TEXT NOT NULL,
    progress TEXT NOT NULL,
    percentage REAL NOT NULL,
    device TEXT NOT NULL,
    device_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    filename TEXT,
    PRIMARY KEY (user_id, document)
);
CREATE INDEX IF NOT EXISTS idx_progress_filename ON progress (user_id, filename);

CREATE TABLE IF NOT EXISTS document_links (
    user_id TEXT NOT NULL,
    document_hash TEXT NOT NULL,
    canonical_hash TEXT NOT NULL,
    PRIMARY KEY (user_id, document_hash)
);

CREATE TABLE IF NOT EXISTS book_labels (
    user_id TEXT NOT NULL,
    canonical_hash TEXT NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (user_id, canonical_hash)
);
"#;

/// SQLite-backed [`super::EntityStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("loading entity database from {}", path.to_string_lossy());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::open(conn)
    }

    /// Open an in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        info!("using in-memory entity database");
        Self::open(Connection::open_in_memory()?)
    }

    fn open(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl super::EntityStore for SqliteStore {
    fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get::<_, i64>(0)?.to_string(),
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)
             ON CONFLICT (username) DO NOTHING",
            params![username, password_hash],
        )?;
        if changed == 0 {
            return Err(StoreError::UsernameTaken);
        }
        Ok(User {
            id: conn.last_insert_rowid().to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM users WHERE username = ?1",
                params![username],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO progress
                (user_id, document, progress, percentage, device, device_id, timestamp, filename)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (user_id, document) DO UPDATE SET
                progress = excluded.progress,
                percentage = excluded.percentage,
                device = excluded.device,
                device_id = excluded.device_id,
                timestamp = excluded.timestamp,
                filename = excluded.filename",
            params![
                record.user_id,
                record.document,
                record.progress,
                record.percentage,
                record.device,
                record.device_id,
                record.timestamp,
                record.filename,
            ],
        )?;
        Ok(())
    }

    fn get_progress(&self, user_id: &str, document: &str) -> StoreResult<Option<ProgressRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT user_id, document, progress, percentage, device, device_id, timestamp, filename
                 FROM progress WHERE user_id = ?1 AND document = ?2",
                params![user_id, document],
                row_to_progress,
            )
            .optional()?;
        Ok(record)
    }

    fn get_all_progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, document, progress, percentage, device, device_id, timestamp, filename
             FROM progress WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_progress)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn get_all_progress_for_filename(
        &self,
        user_id: &str,
        filename: &str,
    ) -> StoreResult<Vec<ProgressRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, document, progress, percentage, device, device_id, timestamp, filename
             FROM progress WHERE user_id = ?1 AND filename = ?2",
        )?;
        let rows = stmt.query_map(params![user_id, filename], row_to_progress)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn get_canonical(&self, user_id: &str, document_hash: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let canonical = conn
            .query_row(
                "SELECT canonical_hash FROM document_links
                 WHERE user_id = ?1 AND document_hash = ?2",
                params![user_id, document_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(canonical)
    }

    fn create_link(
        &self,
        user_id: &str,
        document_hash: &str,
        canonical_hash: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO document_links (user_id, document_hash, canonical_hash)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, document_hash) DO UPDATE SET
                canonical_hash = excluded.canonical_hash",
            params![user_id, document_hash, canonical_hash],
        )?;
        Ok(())
    }

    fn delete_link(&self, user_id: &str, document_hash: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM document_links WHERE user_id = ?1 AND document_hash = ?2",
            params![user_id, document_hash],
        )?;
        Ok(changed > 0)
    }

    fn get_all_links(&self, user_id: &str) -> StoreResult<Vec<DocumentLink>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT document_hash, canonical_hash FROM document_links WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DocumentLink {
                document_hash: row.get(0)?,
                canonical_hash: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn get_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let label = conn
            .query_row(
                "SELECT label FROM book_labels WHERE user_id = ?1 AND canonical_hash = ?2",
                params![user_id, canonical_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label)
    }

    fn set_label(&self, user_id: &str, canonical_hash: &str, label: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_labels (user_id, canonical_hash, label) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, canonical_hash) DO UPDATE SET label = excluded.label",
            params![user_id, canonical_hash, label],
        )?;
        Ok(())
    }

    fn delete_label(&self, user_id: &str, canonical_hash: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM book_labels WHERE user_id = ?1 AND canonical_hash = ?2",
            params![user_id, canonical_hash],
        )?;
        Ok(changed > 0)
    }

    fn get_all_labels(&self, user_id: &str) -> StoreResult<Vec<BookLabel>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT canonical_hash, label FROM book_labels WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(BookLabel {
                canonical_hash: row.get(0)?,
                label: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressRecord> {
    Ok(ProgressRecord {
        user_id: row.get(0)?,
        document: row.get(1)?,
        progress: row.get(2)?,
        percentage: row.get(3)?,
        device: row.get(4)?,
        device_id: row.get(5)?,
        timestamp: row.get(6)?,
        filename: row.get(7)?,
    })
}
