mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn has_users(&self) -> Result<bool>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn update_session_last_used(&self, id: &str) -> Result<()>;

    // Playground operations
    /// Inserts a playground together with its first commit, atomically.
    fn create_playground(&self, playground: &Playground, initial: &Commit) -> Result<()>;
    fn get_playground(&self, hash: &str) -> Result<Option<Playground>>;
    fn update_playground(&self, playground: &Playground) -> Result<()>;
    fn delete_playground(&self, hash: &str) -> Result<bool>;
    fn list_playgrounds(
        &self,
        scope: &ListScope,
        sort: PlaygroundSort,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<PlaygroundSummary>>;

    // Star operations
    fn count_stars(&self, hash: &str) -> Result<i64>;
    fn has_starred(&self, user_id: &str, hash: &str) -> Result<bool>;
    /// Flips the caller's star and returns the new state.
    fn toggle_star(&self, user_id: &str, hash: &str) -> Result<bool>;

    // Commit operations
    /// Appends `commit` after the playground's current latest commit.
    /// `parent_id` is assigned inside the same transaction that inserts the
    /// row, so concurrent appends form a linear chain.
    fn append_commit(&self, commit: Commit) -> Result<Commit>;
    fn get_commit(&self, id: &str) -> Result<Option<Commit>>;
    fn get_latest_commit(&self, hash: &str) -> Result<Option<Commit>>;
    /// Newest first.
    fn list_commits(&self, hash: &str) -> Result<Vec<CommitSummary>>;
}
