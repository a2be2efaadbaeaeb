use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::local::LocalDb;
use super::reconcile::InitialData;
use super::route::Route;
use crate::error::Result;
use crate::types::{Commit, User};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS hydration_cache (
    key TEXT PRIMARY KEY,
    playground_hash TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hydration_cache_playground
    ON hydration_cache(playground_hash);
";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Commit(String),
    PlaygroundLatest(String),
}

impl CacheKey {
    /// Key for the commit a route pins, or the playground's latest.
    #[must_use]
    pub fn for_route(route: &Route) -> Option<Self> {
        match route {
            Route::Commit { commit_id, .. } => Some(CacheKey::Commit(commit_id.clone())),
            Route::Playground { playground_id } => {
                Some(CacheKey::PlaygroundLatest(playground_id.clone()))
            }
            Route::Home | Route::Shared { .. } => None,
        }
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            CacheKey::Commit(id) => format!("commit:{id}"),
            CacheKey::PlaygroundLatest(hash) => format!("playground:{hash}:latest"),
        }
    }
}

/// The last commit shown for a route, with the identity seen at the time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCommitEntry {
    pub cached_at: DateTime<Utc>,
    pub commit: Commit,
    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub user: Option<User>,
}

impl From<CachedCommitEntry> for InitialData {
    fn from(entry: CachedCommitEntry) -> Self {
        InitialData {
            route: entry.route,
            user: entry.user,
            commit: Some(entry.commit),
        }
    }
}

/// Advisory cache that lets a reload show the last content without a fetch.
pub struct HydrationCache {
    db: LocalDb,
}

impl HydrationCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: LocalDb::open("hydration", path, SCHEMA)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: LocalDb::open_in_memory("hydration", SCHEMA)?,
        })
    }

    pub fn close(&self) {
        self.db.close();
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedCommitEntry> {
        let storage_key = key.storage_key();
        let raw: String = self
            .db
            .transact("hydration_get", |tx| {
                tx.query_row(
                    "SELECT value FROM hydration_cache WHERE key = ?1",
                    params![storage_key],
                    |row| row.get(0),
                )
                .optional()
            })
            .flatten()?;

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "discarding unreadable cache entry");
                self.remove(key);
                None
            }
        }
    }

    pub fn get_for_route(&self, route: &Route) -> Option<CachedCommitEntry> {
        let key = CacheKey::for_route(route)?;
        self.get(&key)
    }

    /// Caches `commit` under its own key and, when `latest` is set, as its
    /// playground's latest.
    pub fn put_commit(
        &self,
        commit: &Commit,
        route: Option<&Route>,
        user: Option<&User>,
        latest: bool,
    ) -> bool {
        let entry = CachedCommitEntry {
            cached_at: Utc::now(),
            commit: commit.clone(),
            route: route.cloned(),
            user: user.cloned(),
        };
        let value = match serde_json::to_string(&entry) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(commit = %commit.id, error = %e, "failed to encode cache entry");
                return false;
            }
        };

        let mut keys = vec![CacheKey::Commit(commit.id.clone())];
        if latest {
            keys.push(CacheKey::PlaygroundLatest(commit.playground_hash.clone()));
        }

        self.db
            .transact("hydration_put", |tx| {
                for key in &keys {
                    tx.execute(
                        "INSERT OR REPLACE INTO hydration_cache (key, playground_hash, cached_at, value) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            key.storage_key(),
                            commit.playground_hash,
                            entry.cached_at.to_rfc3339(),
                            value
                        ],
                    )?;
                }
                Ok(())
            })
            .is_some()
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let storage_key = key.storage_key();
        self.db
            .transact("hydration_remove", |tx| {
                tx.execute(
                    "DELETE FROM hydration_cache WHERE key = ?1",
                    params![storage_key],
                )
            })
            .is_some_and(|rows| rows > 0)
    }

    /// Drops every entry belonging to a playground.
    pub fn clear_playground(&self, playground_hash: &str) -> bool {
        self.db
            .transact("hydration_clear_playground", |tx| {
                tx.execute(
                    "DELETE FROM hydration_cache WHERE playground_hash = ?1",
                    params![playground_hash],
                )
            })
            .is_some()
    }
}
