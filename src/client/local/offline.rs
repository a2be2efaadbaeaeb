use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, Transaction, params};
use serde::{Deserialize, Serialize};

use super::LocalDb;
use super::sync_status::{CommitSyncStatus, PlaygroundSyncStatus, SyncEvent};
use crate::error::Result;
use crate::types::{FileEntry, Privacy};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS local_playgrounds (
    hash TEXT PRIMARY KEY,
    server_hash TEXT,
    name TEXT,
    description TEXT,
    privacy TEXT NOT NULL,
    base_commit_id TEXT,
    sync_status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_local_playgrounds_server_hash
    ON local_playgrounds(server_hash);

CREATE TABLE IF NOT EXISTS local_commits (
    id TEXT PRIMARY KEY,
    playground_hash TEXT NOT NULL,
    parent_id TEXT,
    message TEXT NOT NULL,
    files TEXT NOT NULL,
    active_file TEXT,
    timestamp INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    sync_status TEXT NOT NULL,
    server_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_local_commits_playground
    ON local_commits(playground_hash);
";

const PLAYGROUND_COLUMNS: &str = "hash, server_hash, name, description, privacy, base_commit_id, \
     sync_status, created_at, updated_at";
const COMMIT_COLUMNS: &str = "id, playground_hash, parent_id, message, files, active_file, \
     timestamp, created_at, sync_status, server_id";

/// A playground as known on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlayground {
    /// Local key. Equal to `server_hash` for playgrounds first seen on the server.
    pub hash: String,
    pub server_hash: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub privacy: Privacy,
    /// Server commit the local lineage was built on.
    pub base_commit_id: Option<String>,
    pub sync_status: PlaygroundSyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCommit {
    pub id: String,
    pub playground_hash: String,
    pub parent_id: Option<String>,
    pub message: String,
    pub files: Vec<FileEntry>,
    pub active_file: Option<String>,
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
    pub sync_status: CommitSyncStatus,
    /// Id the server assigned once this commit was pushed.
    pub server_id: Option<String>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPlaygroundUpdate {
    pub server_hash: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<Privacy>,
    pub base_commit_id: Option<String>,
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_playground(row: &Row<'_>) -> rusqlite::Result<LocalPlayground> {
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(LocalPlayground {
        hash: row.get(0)?,
        server_hash: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        privacy: row.get(4)?,
        base_commit_id: row.get(5)?,
        sync_status: row.get(6)?,
        created_at: parse_datetime(7, &created_at)?,
        updated_at: parse_datetime(8, &updated_at)?,
    })
}

fn row_to_commit(row: &Row<'_>) -> rusqlite::Result<LocalCommit> {
    let files: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(LocalCommit {
        id: row.get(0)?,
        playground_hash: row.get(1)?,
        parent_id: row.get(2)?,
        message: row.get(3)?,
        files: serde_json::from_str(&files)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        active_file: row.get(5)?,
        timestamp: row.get(6)?,
        created_at: parse_datetime(7, &created_at)?,
        sync_status: row.get(8)?,
        server_id: row.get(9)?,
    })
}

/// `verb` is `INSERT OR IGNORE` for new records and `INSERT OR REPLACE`
/// for read-modify-write updates. Returns the number of rows written.
fn write_playground(tx: &Transaction<'_>, verb: &str, pg: &LocalPlayground) -> rusqlite::Result<usize> {
    tx.execute(
        &format!("{verb} INTO local_playgrounds ({PLAYGROUND_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            pg.hash,
            pg.server_hash,
            pg.name,
            pg.description,
            pg.privacy,
            pg.base_commit_id,
            pg.sync_status,
            pg.created_at.to_rfc3339(),
            pg.updated_at.to_rfc3339(),
        ],
    )
}

fn read_playground(tx: &Transaction<'_>, hash: &str) -> rusqlite::Result<Option<LocalPlayground>> {
    tx.query_row(
        &format!("SELECT {PLAYGROUND_COLUMNS} FROM local_playgrounds WHERE hash = ?1"),
        params![hash],
        row_to_playground,
    )
    .optional()
}

fn read_commit(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<Option<LocalCommit>> {
    tx.query_row(
        &format!("SELECT {COMMIT_COLUMNS} FROM local_commits WHERE id = ?1"),
        params![id],
        row_to_commit,
    )
    .optional()
}

/// Queue of playgrounds and commits that exist on this device, including
/// work made while offline.
pub struct LocalOfflineStore {
    db: LocalDb,
}

impl LocalOfflineStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: LocalDb::open("offline", path, SCHEMA)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: LocalDb::open_in_memory("offline", SCHEMA)?,
        })
    }

    pub fn close(&self) {
        self.db.close();
    }

    /// Records a new playground. An existing record is left untouched so its
    /// sync status can only move through `apply_event`.
    pub fn save_playground(&self, playground: &LocalPlayground) -> bool {
        let Some(rows) = self.db.transact("save_playground", |tx| {
            write_playground(tx, "INSERT OR IGNORE", playground)
        }) else {
            return false;
        };
        if rows == 0 {
            tracing::warn!(playground = %playground.hash, "local playground already recorded");
        }
        rows > 0
    }

    /// Deletes a playground together with its queued commits.
    pub fn delete_playground(&self, hash: &str) -> bool {
        self.db
            .transact("delete_playground", |tx| {
                tx.execute(
                    "DELETE FROM local_commits WHERE playground_hash = ?1",
                    params![hash],
                )?;
                tx.execute("DELETE FROM local_playgrounds WHERE hash = ?1", params![hash])
            })
            .is_some_and(|rows| rows > 0)
    }

    pub fn get_playground(&self, hash: &str) -> Option<LocalPlayground> {
        self.db
            .transact("get_playground", |tx| read_playground(tx, hash))
            .flatten()
    }

    pub fn get_by_server_hash(&self, server_hash: &str) -> Option<LocalPlayground> {
        self.db
            .transact("get_by_server_hash", |tx| {
                tx.query_row(
                    &format!(
                        "SELECT {PLAYGROUND_COLUMNS} FROM local_playgrounds WHERE server_hash = ?1 \
                         ORDER BY updated_at DESC LIMIT 1"
                    ),
                    params![server_hash],
                    row_to_playground,
                )
                .optional()
            })
            .flatten()
    }

    /// Merges `update` into the stored record in one transaction.
    pub fn update_playground(
        &self,
        hash: &str,
        update: LocalPlaygroundUpdate,
    ) -> Option<LocalPlayground> {
        self.db
            .transact("update_playground", |tx| {
                let Some(mut pg) = read_playground(tx, hash)? else {
                    return Ok(None);
                };
                if let Some(server_hash) = update.server_hash {
                    pg.server_hash = Some(server_hash);
                }
                if let Some(name) = update.name {
                    pg.name = Some(name);
                }
                if let Some(description) = update.description {
                    pg.description = Some(description);
                }
                if let Some(privacy) = update.privacy {
                    pg.privacy = privacy;
                }
                if let Some(base) = update.base_commit_id {
                    pg.base_commit_id = Some(base);
                }
                pg.updated_at = Utc::now();
                write_playground(tx, "INSERT OR REPLACE", &pg)?;
                Ok(Some(pg))
            })
            .flatten()
    }

    /// Applies a sync event. Illegal transitions leave the record untouched.
    pub fn apply_event(&self, hash: &str, event: SyncEvent) -> Option<PlaygroundSyncStatus> {
        self.db
            .transact("apply_event", |tx| {
                let Some(pg) = read_playground(tx, hash)? else {
                    return Ok(None);
                };
                let Some(next) = pg.sync_status.apply(event) else {
                    tracing::warn!(
                        playground = hash,
                        from = %pg.sync_status,
                        ?event,
                        "ignoring illegal sync transition"
                    );
                    return Ok(None);
                };
                tx.execute(
                    "UPDATE local_playgrounds SET sync_status = ?1, updated_at = ?2 WHERE hash = ?3",
                    params![next, now_string(), hash],
                )?;
                Ok(Some(next))
            })
            .flatten()
    }

    /// Playgrounds with work the server has not accepted, oldest first.
    pub fn list_pending(&self) -> Vec<LocalPlayground> {
        self.db
            .transact("list_pending", |tx| {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {PLAYGROUND_COLUMNS} FROM local_playgrounds \
                     WHERE sync_status != 'synced' ORDER BY created_at ASC, hash ASC"
                ))?;
                let rows = stmt.query_map([], row_to_playground)?;
                rows.collect()
            })
            .unwrap_or_default()
    }

    pub fn save_commit(&self, commit: &LocalCommit) -> bool {
        self.db
            .transact("save_commit", |tx| {
                let files = serde_json::to_string(&commit.files)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                tx.execute(
                    &format!("INSERT OR REPLACE INTO local_commits ({COMMIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                    params![
                        commit.id,
                        commit.playground_hash,
                        commit.parent_id,
                        commit.message,
                        files,
                        commit.active_file,
                        commit.timestamp,
                        commit.created_at.to_rfc3339(),
                        commit.sync_status,
                        commit.server_id,
                    ],
                )
            })
            .is_some()
    }

    pub fn delete_commit(&self, id: &str) -> bool {
        self.db
            .transact("delete_commit", |tx| {
                tx.execute("DELETE FROM local_commits WHERE id = ?1", params![id])
            })
            .is_some_and(|rows| rows > 0)
    }

    pub fn get_commit(&self, id: &str) -> Option<LocalCommit> {
        self.db
            .transact("get_commit", |tx| read_commit(tx, id))
            .flatten()
    }

    /// All commits of a playground in the order they were made.
    pub fn list_by_playground(&self, playground_hash: &str) -> Vec<LocalCommit> {
        self.db
            .transact("list_by_playground", |tx| {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COMMIT_COLUMNS} FROM local_commits WHERE playground_hash = ?1"
                ))?;
                let rows = stmt.query_map(params![playground_hash], row_to_commit)?;
                let mut commits = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                commits.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
                Ok(commits)
            })
            .unwrap_or_default()
    }

    /// Newest commit by timestamp; ties go to the larger id.
    pub fn get_latest_by_playground(&self, playground_hash: &str) -> Option<LocalCommit> {
        self.list_by_playground(playground_hash)
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)))
    }

    /// Marks a commit as accepted by the server. Already-synced commits are left as they are.
    pub fn mark_commit_synced(&self, id: &str, server_id: &str) -> bool {
        self.db
            .transact("mark_commit_synced", |tx| {
                let Some(commit) = read_commit(tx, id)? else {
                    return Ok(false);
                };
                if commit.sync_status == CommitSyncStatus::Synced {
                    return Ok(true);
                }
                tx.execute(
                    "UPDATE local_commits SET sync_status = ?1, server_id = ?2 WHERE id = ?3",
                    params![commit.sync_status.accept(), server_id, id],
                )?;
                Ok(true)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalOfflineStore {
        LocalOfflineStore::open_in_memory().unwrap()
    }

    fn playground(hash: &str, status: PlaygroundSyncStatus) -> LocalPlayground {
        let now = Utc::now();
        LocalPlayground {
            hash: hash.to_string(),
            server_hash: None,
            name: Some("draft".to_string()),
            description: None,
            privacy: Privacy::Public,
            base_commit_id: None,
            sync_status: status,
            created_at: now,
            updated_at: now,
        }
    }

    fn commit(id: &str, playground_hash: &str, timestamp: i64) -> LocalCommit {
        LocalCommit {
            id: id.to_string(),
            playground_hash: playground_hash.to_string(),
            parent_id: None,
            message: format!("commit {id}"),
            files: vec![FileEntry::new("a.sql", format!("select {timestamp};"))],
            active_file: Some("a.sql".to_string()),
            timestamp,
            created_at: Utc::now(),
            sync_status: CommitSyncStatus::LocalOnly,
            server_id: None,
        }
    }

    #[test]
    fn test_commit_round_trip() {
        let store = store();
        let c = commit("c1", "local-1", 100);
        assert!(store.save_commit(&c));
        assert_eq!(store.get_commit("c1"), Some(c));
        assert_eq!(store.get_commit("missing"), None);
    }

    #[test]
    fn test_playground_found_by_server_hash_once_set() {
        let store = store();
        let pg = playground("local-1", PlaygroundSyncStatus::LocalOnly);
        assert!(store.save_playground(&pg));
        assert!(store.get_by_server_hash("srv-1").is_none());

        let updated = store
            .update_playground(
                "local-1",
                LocalPlaygroundUpdate {
                    server_hash: Some("srv-1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("draft"));

        let found = store.get_by_server_hash("srv-1").unwrap();
        assert_eq!(found, updated);
    }

    #[test]
    fn test_update_missing_playground_is_none() {
        let store = store();
        assert!(store
            .update_playground("ghost", LocalPlaygroundUpdate::default())
            .is_none());
    }

    #[test]
    fn test_latest_by_timestamp_with_id_tie_break() {
        let store = store();
        store.save_commit(&commit("b", "p", 200));
        store.save_commit(&commit("a", "p", 300));
        store.save_commit(&commit("c", "p", 300));
        store.save_commit(&commit("z", "other", 900));

        let listed: Vec<String> = store
            .list_by_playground("p")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(listed, vec!["b", "a", "c"]);
        assert_eq!(store.get_latest_by_playground("p").unwrap().id, "c");
        assert!(store.get_latest_by_playground("empty").is_none());
    }

    #[test]
    fn test_mark_commit_synced_is_idempotent() {
        let store = store();
        store.save_commit(&commit("c1", "p", 1));

        assert!(store.mark_commit_synced("c1", "srv-c1"));
        assert!(store.mark_commit_synced("c1", "other"));

        let synced = store.get_commit("c1").unwrap();
        assert_eq!(synced.sync_status, CommitSyncStatus::Synced);
        assert_eq!(synced.server_id.as_deref(), Some("srv-c1"));
        assert!(!store.mark_commit_synced("missing", "x"));
    }

    #[test]
    fn test_apply_event_follows_table() {
        let store = store();
        store.save_playground(&playground("p", PlaygroundSyncStatus::Synced));

        assert_eq!(
            store.apply_event("p", SyncEvent::Edited),
            Some(PlaygroundSyncStatus::Modified)
        );
        assert_eq!(
            store.apply_event("p", SyncEvent::Diverged),
            Some(PlaygroundSyncStatus::Conflict)
        );
        assert_eq!(store.apply_event("p", SyncEvent::Accepted), None);
        assert_eq!(
            store.get_playground("p").unwrap().sync_status,
            PlaygroundSyncStatus::Conflict
        );
        assert_eq!(
            store.apply_event("p", SyncEvent::Resolved),
            Some(PlaygroundSyncStatus::Modified)
        );
    }

    #[test]
    fn test_resave_cannot_leave_conflict() {
        let store = store();
        assert!(store.save_playground(&playground("p", PlaygroundSyncStatus::Synced)));
        store.apply_event("p", SyncEvent::Diverged);

        assert!(!store.save_playground(&playground("p", PlaygroundSyncStatus::LocalOnly)));
        assert_eq!(
            store.get_playground("p").unwrap().sync_status,
            PlaygroundSyncStatus::Conflict
        );
    }

    #[test]
    fn test_pending_excludes_synced() {
        let store = store();
        store.save_playground(&playground("a", PlaygroundSyncStatus::Synced));
        store.save_playground(&playground("b", PlaygroundSyncStatus::LocalOnly));
        store.save_playground(&playground("c", PlaygroundSyncStatus::Modified));

        let pending: Vec<String> = store.list_pending().into_iter().map(|p| p.hash).collect();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&"b".to_string()));
        assert!(pending.contains(&"c".to_string()));
    }

    #[test]
    fn test_delete_playground_drops_commits() {
        let store = store();
        store.save_playground(&playground("p", PlaygroundSyncStatus::LocalOnly));
        store.save_commit(&commit("c1", "p", 1));

        assert!(store.delete_playground("p"));
        assert!(store.get_playground("p").is_none());
        assert!(store.get_commit("c1").is_none());
        assert!(!store.delete_playground("p"));
    }

    #[test]
    fn test_closed_store_degrades() {
        let store = store();
        store.close();
        assert!(!store.save_commit(&commit("c1", "p", 1)));
        assert!(store.get_commit("c1").is_none());
        assert!(store.list_pending().is_empty());
    }
}
