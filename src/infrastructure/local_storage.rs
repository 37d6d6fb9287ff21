//! Local SQLite storage for targets, sync history and the tab document.
//!
//! The three records are keyed independently. Every write happens inside a
//! transaction so readers never observe a partially written set.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{
    AppError, RemoteKind, RemoteTargetConfig, Result, SyncResultEntry, TabGroupDocument,
};

/// Local storage repository using SQLite.
pub struct LocalStorage {
    conn: Mutex<Connection>,
}

impl LocalStorage {
    /// Opens or creates the local storage database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create storage directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::database)?;

        Self::with_connection(conn)
    }

    /// Opens a throwaway in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::database)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                r"
            -- Remote target configs, one JSON payload per (kind, id)
            CREATE TABLE IF NOT EXISTS remote_targets (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                position INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            -- Bounded per-target sync history
            CREATE TABLE IF NOT EXISTS sync_results (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                target_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                outcome TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            -- The local tab document
            CREATE TABLE IF NOT EXISTS tab_document (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                revision INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_results_target
                ON sync_results(kind, target_id, seq);
            ",
            )
            .map_err(AppError::database)?;

        Ok(())
    }

    /// Load all target configs in insertion order.
    pub fn load_targets(&self) -> Result<Vec<RemoteTargetConfig>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT kind, id, payload FROM remote_targets ORDER BY position ASC")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(AppError::database)?;

        let mut targets = Vec::new();
        for row in rows {
            let (kind, id, payload) = row.map_err(AppError::database)?;
            match serde_json::from_str::<RemoteTargetConfig>(&payload) {
                Ok(config) => targets.push(config),
                Err(e) => {
                    tracing::warn!(%kind, %id, error = %e, "Skipping unreadable target config");
                }
            }
        }

        Ok(targets)
    }

    /// Replace the full target set in one transaction.
    pub fn save_targets(&self, targets: &[RemoteTargetConfig]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(AppError::database)?;

        tx.execute("DELETE FROM remote_targets", [])
            .map_err(AppError::database)?;

        for (position, config) in targets.iter().enumerate() {
            let payload = serde_json::to_string(config).map_err(AppError::json_parse)?;
            tx.execute(
                "INSERT INTO remote_targets (kind, id, position, payload) VALUES (?1, ?2, ?3, ?4)",
                params![config.kind().as_str(), &config.id, position as i64, payload],
            )
            .map_err(AppError::database)?;
        }

        tx.commit().map_err(AppError::database)
    }

    /// Load the whole sync history, oldest first.
    ///
    /// Rows that no longer parse are skipped with a warning.
    pub fn load_results(&self) -> Result<Vec<SyncResultEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                r"
            SELECT kind, target_id, direction, outcome, message, created_at
            FROM sync_results
            ORDER BY seq ASC
            ",
            )
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(AppError::database)?;

        let mut entries = Vec::new();
        for row in rows {
            let row = row.map_err(AppError::database)?;
            match parse_result_row(&row) {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(kind = %row.0, id = %row.1, "Skipping unreadable sync result");
                }
            }
        }

        Ok(entries)
    }

    /// Append an entry and evict the target's oldest rows beyond `max`.
    pub fn append_result(&self, entry: &SyncResultEntry, max: usize) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(AppError::database)?;

        tx.execute(
            r"
            INSERT INTO sync_results (kind, target_id, direction, outcome, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                entry.kind.as_str(),
                &entry.target_id,
                entry.direction.as_str(),
                entry.outcome.as_str(),
                &entry.message,
                entry.timestamp.to_rfc3339(),
            ],
        )
        .map_err(AppError::database)?;

        tx.execute(
            r"
            DELETE FROM sync_results
            WHERE kind = ?1 AND target_id = ?2 AND seq NOT IN (
                SELECT seq FROM sync_results
                WHERE kind = ?1 AND target_id = ?2
                ORDER BY seq DESC
                LIMIT ?3
            )
            ",
            params![entry.kind.as_str(), &entry.target_id, max as i64],
        )
        .map_err(AppError::database)?;

        tx.commit().map_err(AppError::database)
    }

    /// Delete history rows. `None` widens the filter to every kind or id.
    pub fn clear_results(&self, kind: Option<RemoteKind>, target_id: Option<&str>) -> Result<()> {
        let conn = self.conn();
        match (kind, target_id) {
            (Some(kind), Some(id)) => conn.execute(
                "DELETE FROM sync_results WHERE kind = ?1 AND target_id = ?2",
                params![kind.as_str(), id],
            ),
            (Some(kind), None) => conn.execute(
                "DELETE FROM sync_results WHERE kind = ?1",
                params![kind.as_str()],
            ),
            (None, _) => conn.execute("DELETE FROM sync_results", []),
        }
        .map_err(AppError::database)?;

        Ok(())
    }

    /// Load the stored document and its local revision, if any.
    pub fn load_document(&self) -> Result<Option<(u64, TabGroupDocument)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT revision, payload FROM tab_document WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(AppError::database)?;

        match row {
            Some((revision, payload)) => {
                let document = TabGroupDocument::from_json(&payload)?;
                Ok(Some((revision.unsigned_abs(), document)))
            }
            None => Ok(None),
        }
    }

    /// Write the document together with its new revision.
    pub fn save_document(&self, revision: u64, document: &TabGroupDocument) -> Result<()> {
        let payload = serde_json::to_string(document).map_err(AppError::json_parse)?;
        let revision = i64::try_from(revision).map_err(|_| AppError::Database {
            message: "document revision overflow".into(),
            source: None,
        })?;

        self.conn()
            .execute(
                r"
            INSERT INTO tab_document (id, revision, payload) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                revision = excluded.revision,
                payload = excluded.payload
            ",
                params![revision, payload],
            )
            .map_err(AppError::database)?;

        Ok(())
    }
}

/// `sync_results` columns: kind, target id, direction, outcome, message, created at.
type ResultRow = (String, String, String, String, String, String);

fn parse_result_row(row: &ResultRow) -> Option<SyncResultEntry> {
    let (kind, target_id, direction, outcome, message, created_at) = row;
    Some(SyncResultEntry {
        kind: kind.parse::<RemoteKind>().ok()?,
        target_id: target_id.clone(),
        direction: direction.parse().ok()?,
        outcome: outcome.parse().ok()?,
        message: message.clone(),
        timestamp: DateTime::parse_from_rfc3339(created_at)
            .ok()?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        GistProvider, SyncDirection, SyncOutcome, TabGroup, TargetKey,
    };
    use tempfile::tempdir;

    fn entry(id: &str, message: &str) -> SyncResultEntry {
        SyncResultEntry::new(
            &TargetKey::new(RemoteKind::Gist, id),
            SyncDirection::Push,
            SyncOutcome::Success,
            message,
        )
    }

    #[test]
    fn test_open_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let storage = LocalStorage::open(&db_path).unwrap();

        let count: i64 = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name != 'sqlite_sequence'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 3);
    }

    #[test]
    fn test_targets_keep_insertion_order() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let targets = vec![
            RemoteTargetConfig::webdav("nas", "https://dav.example.com", "me", "pw", "t.json"),
            RemoteTargetConfig::gist("b", GistProvider::Github, "tok", None),
            RemoteTargetConfig::gist("a", GistProvider::Gitee, "tok", None),
        ];

        storage.save_targets(&targets).unwrap();
        let loaded = storage.load_targets().unwrap();

        assert_eq!(loaded, targets);
    }

    #[test]
    fn test_append_result_evicts_oldest() {
        let storage = LocalStorage::open_in_memory().unwrap();
        for i in 0..5 {
            storage.append_result(&entry("a", &format!("run {i}")), 3).unwrap();
        }
        storage.append_result(&entry("b", "other"), 3).unwrap();

        let loaded = storage.load_results().unwrap();
        let messages: Vec<_> = loaded
            .iter()
            .filter(|e| e.target_id == "a")
            .map(|e| e.message.as_str())
            .collect();

        assert_eq!(messages, vec!["run 2", "run 3", "run 4"]);
        assert_eq!(loaded.iter().filter(|e| e.target_id == "b").count(), 1);
    }

    #[test]
    fn test_clear_results_by_target() {
        let storage = LocalStorage::open_in_memory().unwrap();
        storage.append_result(&entry("a", "1"), 10).unwrap();
        storage.append_result(&entry("b", "2"), 10).unwrap();

        storage.clear_results(Some(RemoteKind::Gist), Some("a")).unwrap();

        let loaded = storage.load_results().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].target_id, "b");
    }

    #[test]
    fn test_load_results_skips_unreadable_rows() {
        let storage = LocalStorage::open_in_memory().unwrap();
        storage.append_result(&entry("a", "kept"), 10).unwrap();
        storage
            .conn()
            .execute(
                "INSERT INTO sync_results (kind, target_id, direction, outcome, message, created_at)
                 VALUES ('ftp', 'x', 'push', 'success', 'bad kind', '2024-10-01T10:00:00Z')",
                [],
            )
            .unwrap();

        let loaded = storage.load_results().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message, "kept");
    }

    #[test]
    fn test_document_roundtrip() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let doc = TabGroupDocument::new(vec![TabGroup::new("Work")]);

        {
            let storage = LocalStorage::open(&db_path).unwrap();
            assert!(storage.load_document().unwrap().is_none());
            storage.save_document(7, &doc).unwrap();
        }

        let storage = LocalStorage::open(&db_path).unwrap();
        let (revision, loaded) = storage.load_document().unwrap().unwrap();
        assert_eq!(revision, 7);
        assert_eq!(loaded, doc);
    }
}
