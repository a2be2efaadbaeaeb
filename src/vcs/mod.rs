//! Server-side playground versioning: commit chains, diffs, forks and the
//! privacy rules around them. Every operation takes the acting user (if any)
//! and enforces visibility before touching data, so HTTP handlers stay thin.

pub mod commits;
pub mod diff;
pub mod fork;
pub mod playgrounds;
pub mod validation;

pub use commits::{CommitCreated, CommitHistory, NewCommit};
pub use diff::{CommitDiff, FileDiff, ModifiedFile, diff_files};
pub use fork::{ForkCreated, ForkRequest};
pub use playgrounds::{
    ForkOrigin, ListParams, NewPlayground, PlaygroundDetail, StarToggled, UpdatePlayground,
};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Playground, User};

const HASH_BYTES: usize = 9;

/// Generates a fresh public playground identifier (12 URL-safe characters).
#[must_use]
pub fn generate_hash() -> String {
    let mut bytes = [0u8; HASH_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Loads a playground, hiding private ones from everyone but their owner.
pub(crate) fn visible_playground(
    store: &dyn Store,
    hash: &str,
    viewer: Option<&User>,
) -> Result<Playground> {
    store
        .get_playground(hash)?
        .filter(|pg| pg.is_visible_to(viewer))
        .ok_or(Error::NotFound)
}

pub(crate) fn require_user(user: Option<&User>) -> Result<&User> {
    user.ok_or(Error::Unauthorized)
}

pub(crate) fn millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;

    use crate::store::{SqliteStore, Store};
    use crate::types::{FileEntry, Role, User};

    pub fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    pub fn user(store: &dyn Store, name: &str, role: Role) -> User {
        let user = User {
            id: format!("{name}-id"),
            username: name.to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&user).unwrap();
        user
    }

    pub fn files(entries: &[(&str, &str)]) -> Vec<FileEntry> {
        entries
            .iter()
            .map(|(path, content)| FileEntry::new(*path, *content))
            .collect()
    }
}
