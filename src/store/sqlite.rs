use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "id, username, role, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";
const PLAYGROUND_COLUMNS: &str = "p.hash, p.user_id, p.fork_hash, p.privacy, p.name, p.description, \
     p.created_at, p.updated_at, p.expires_at";
const COMMIT_COLUMNS: &str =
    "id, playground_hash, parent_id, message, files, active_file, created_at, timestamp, user_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database, mostly useful for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: opt_datetime(row, 5)?,
        last_used_at: opt_datetime(row, 6)?,
    })
}

fn row_to_playground(row: &Row<'_>) -> rusqlite::Result<Playground> {
    Ok(Playground {
        hash: row.get(0)?,
        user_id: row.get(1)?,
        fork_hash: row.get(2)?,
        privacy: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
        expires_at: opt_datetime(row, 8)?,
    })
}

fn row_to_commit(row: &Row<'_>) -> rusqlite::Result<Commit> {
    let files_json: String = row.get(4)?;
    let files: Vec<FileEntry> = serde_json::from_str(&files_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Commit {
        id: row.get(0)?,
        playground_hash: row.get(1)?,
        parent_id: row.get(2)?,
        message: row.get(3)?,
        files,
        active_file: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        timestamp: row.get(7)?,
        user_id: row.get(8)?,
    })
}

fn insert_commit(conn: &Connection, commit: &Commit) -> Result<()> {
    let files = serde_json::to_string(&commit.files)?;
    conn.execute(
        "INSERT INTO commits (id, playground_hash, parent_id, message, files, active_file, created_at, timestamp, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            commit.id,
            commit.playground_hash,
            commit.parent_id,
            commit.message,
            files,
            commit.active_file,
            format_datetime(&commit.created_at),
            commit.timestamp,
            commit.user_id,
        ],
    )?;
    Ok(())
}

fn latest_commit(conn: &Connection, hash: &str) -> Result<Option<Commit>> {
    conn.query_row(
        &format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE playground_hash = ?1
             ORDER BY timestamp DESC, seq DESC LIMIT 1"
        ),
        params![hash],
        row_to_commit,
    )
    .optional()
    .map_err(Error::from)
}

/// Escapes LIKE wildcards so user search terms match literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn sort_column(sort: PlaygroundSort) -> &'static str {
    match sort {
        PlaygroundSort::CreatedAt => "p.created_at",
        PlaygroundSort::UpdatedAt => "p.updated_at",
        PlaygroundSort::Stars => "star_count",
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.username,
                user.role,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET username = ?1, role = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                user.username,
                user.role,
                format_datetime(&user.updated_at),
                user.id
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn has_users(&self) -> Result<bool> {
        let exists: bool =
            self.conn()
                .query_row("SELECT EXISTS(SELECT 1 FROM users)", [], |row| row.get(0))?;
        Ok(exists)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO sessions (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.token_hash,
                session.token_lookup,
                session.user_id,
                format_datetime(&session.created_at),
                session.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::SessionLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_lookup = ?1"),
                params![lookup],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_session_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Playground operations

    fn create_playground(&self, playground: &Playground, initial: &Commit) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            "INSERT INTO playgrounds (hash, user_id, fork_hash, privacy, name, description, created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                playground.hash,
                playground.user_id,
                playground.fork_hash,
                playground.privacy,
                playground.name,
                playground.description,
                format_datetime(&playground.created_at),
                format_datetime(&playground.updated_at),
                playground.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::AlreadyExists);
            }
            Err(e) => return Err(Error::from(e)),
        }

        insert_commit(&tx, initial)?;

        tx.commit()?;
        Ok(())
    }

    fn get_playground(&self, hash: &str) -> Result<Option<Playground>> {
        self.conn()
            .query_row(
                &format!("SELECT {PLAYGROUND_COLUMNS} FROM playgrounds p WHERE p.hash = ?1"),
                params![hash],
                row_to_playground,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_playground(&self, playground: &Playground) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE playgrounds SET name = ?1, description = ?2, privacy = ?3, updated_at = ?4, expires_at = ?5
             WHERE hash = ?6",
            params![
                playground.name,
                playground.description,
                playground.privacy,
                format_datetime(&playground.updated_at),
                playground.expires_at.as_ref().map(format_datetime),
                playground.hash,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_playground(&self, hash: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM playgrounds WHERE hash = ?1", params![hash])?;
        Ok(rows > 0)
    }

    fn list_playgrounds(
        &self,
        scope: &ListScope,
        sort: PlaygroundSort,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<PlaygroundSummary>> {
        let (filter, args): (&str, Vec<Box<dyn ToSql>>) = match scope {
            ListScope::Public { query: None } => ("p.privacy = 'public'", vec![]),
            ListScope::Public { query: Some(q) } => (
                "p.privacy = 'public'
                 AND (p.name LIKE ?3 ESCAPE '\\' OR p.description LIKE ?3 ESCAPE '\\')",
                vec![Box::new(like_pattern(q))],
            ),
            ListScope::Owner {
                user_id,
                include_hidden,
            } => (
                "p.user_id = ?3 AND (?4 OR p.privacy = 'public')",
                vec![Box::new(user_id.clone()), Box::new(*include_hidden)],
            ),
        };

        let sql = format!(
            "SELECT {PLAYGROUND_COLUMNS},
                    (SELECT COUNT(*) FROM stars s WHERE s.playground_hash = p.hash) AS star_count,
                    u.username
             FROM playgrounds p
             LEFT JOIN users u ON u.id = p.user_id
             WHERE {filter}
             ORDER BY {} DESC, p.hash
             LIMIT ?1 OFFSET ?2",
            sort_column(sort)
        );

        let mut bound: Vec<&dyn ToSql> = vec![&limit, &offset];
        bound.extend(args.iter().map(|a| a.as_ref()));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bound.as_slice(), |row| {
            Ok(PlaygroundSummary {
                playground: row_to_playground(row)?,
                stars: row.get::<_, i64>(9)?.to_string(),
                username: row.get(10)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Star operations

    fn count_stars(&self, hash: &str) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM stars WHERE playground_hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn has_starred(&self, user_id: &str, hash: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM stars WHERE user_id = ?1 AND playground_hash = ?2)",
            params![user_id, hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn toggle_star(&self, user_id: &str, hash: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM stars WHERE user_id = ?1 AND playground_hash = ?2)",
            params![user_id, hash],
            |row| row.get(0),
        )?;

        if exists {
            tx.execute(
                "DELETE FROM stars WHERE user_id = ?1 AND playground_hash = ?2",
                params![user_id, hash],
            )?;
        } else {
            tx.execute(
                "INSERT INTO stars (user_id, playground_hash, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, hash, format_datetime(&Utc::now())],
            )?;
        }

        tx.commit()?;
        Ok(!exists)
    }

    // Commit operations

    fn append_commit(&self, mut commit: Commit) -> Result<Commit> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM playgrounds WHERE hash = ?1)",
            params![commit.playground_hash],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound);
        }

        let latest = latest_commit(&tx, &commit.playground_hash)?;
        commit.parent_id = latest.as_ref().map(|c| c.id.clone());
        if let Some(latest) = &latest {
            // Keep timestamps strictly increasing along the chain.
            commit.timestamp = commit.timestamp.max(latest.timestamp + 1);
        }

        insert_commit(&tx, &commit)?;
        tx.execute(
            "UPDATE playgrounds SET updated_at = ?1 WHERE hash = ?2",
            params![format_datetime(&commit.created_at), commit.playground_hash],
        )?;

        tx.commit()?;
        Ok(commit)
    }

    fn get_commit(&self, id: &str) -> Result<Option<Commit>> {
        self.conn()
            .query_row(
                &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"),
                params![id],
                row_to_commit,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_latest_commit(&self, hash: &str) -> Result<Option<Commit>> {
        latest_commit(&self.conn(), hash)
    }

    fn list_commits(&self, hash: &str) -> Result<Vec<CommitSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.message, c.timestamp, c.parent_id, c.user_id, u.username
             FROM commits c
             LEFT JOIN users u ON u.id = c.user_id
             WHERE c.playground_hash = ?1
             ORDER BY c.timestamp DESC, c.seq DESC",
        )?;

        let rows = stmt.query_map(params![hash], |row| {
            Ok(CommitSummary {
                id: row.get(0)?,
                message: row.get(1)?,
                timestamp: row.get(2)?,
                parent_id: row.get(3)?,
                user_id: row.get(4)?,
                username: row.get(5)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
