use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Privacy, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playground {
    pub hash: String,
    pub user_id: Option<String>,
    pub fork_hash: Option<String>,
    pub privacy: Privacy,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Playground {
    #[must_use]
    pub fn is_owned_by(&self, user: Option<&User>) -> bool {
        match (&self.user_id, user) {
            (Some(owner), Some(user)) => owner == &user.id,
            _ => false,
        }
    }

    /// Private playgrounds are only visible to their owner. Secret and public
    /// ones are visible to anyone holding the hash.
    #[must_use]
    pub fn is_visible_to(&self, viewer: Option<&User>) -> bool {
        self.privacy != Privacy::Private || self.is_owned_by(viewer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Immutable snapshot of a playground's files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub playground_hash: String,
    pub parent_id: Option<String>,
    pub message: String,
    pub files: Vec<FileEntry>,
    #[serde(rename = "activeFile", default)]
    pub active_file: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Milliseconds since the Unix epoch; ordering key for client-side tie-breaks.
    pub timestamp: i64,
    pub user_id: Option<String>,
}

impl Commit {
    #[must_use]
    pub fn digest(&self) -> String {
        files_digest(&self.files)
    }
}

/// Lightweight commit listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub message: String,
    pub timestamp: i64,
    pub parent_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl From<&Commit> for CommitSummary {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            message: commit.message.clone(),
            timestamp: commit.timestamp,
            parent_id: commit.parent_id.clone(),
            user_id: commit.user_id.clone(),
            username: None,
        }
    }
}

/// Playground row joined with its derived star count and owner name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundSummary {
    #[serde(flatten)]
    pub playground: Playground,
    /// String-encoded so large counts survive JSON number handling.
    pub stars: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Sort order for playground listings. Always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaygroundSort {
    CreatedAt,
    #[default]
    UpdatedAt,
    Stars,
}

/// Which playgrounds a listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Public playgrounds, optionally filtered by a search term.
    Public { query: Option<String> },
    /// Playgrounds owned by one user. `include_hidden` adds secret and private ones.
    Owner { user_id: String, include_hidden: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub offset: i64,
    pub limit: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Builds a page from a query that fetched `limit + 1` rows.
    pub fn from_overfetch(mut items: Vec<T>, offset: i64, limit: i64) -> Self {
        let keep = usize::try_from(limit).unwrap_or(0);
        let has_more = items.len() > keep;
        items.truncate(keep);
        Self {
            data: items,
            offset,
            limit,
            has_more,
        }
    }
}

/// Order-insensitive SHA-256 fingerprint of a file set.
#[must_use]
pub fn files_digest(files: &[FileEntry]) -> String {
    let mut sorted: Vec<&FileEntry> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(file.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playground(owner: Option<&str>, privacy: Privacy) -> Playground {
        let now = Utc::now();
        Playground {
            hash: "h1".to_string(),
            user_id: owner.map(str::to_string),
            fork_hash: None,
            privacy,
            name: None,
            description: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    fn user(id: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            username: id.to_string(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_private_visible_to_owner_only() {
        let pg = playground(Some("u1"), Privacy::Private);
        assert!(pg.is_visible_to(Some(&user("u1"))));
        assert!(!pg.is_visible_to(Some(&user("u2"))));
        assert!(!pg.is_visible_to(None));
    }

    #[test]
    fn test_secret_visible_by_hash() {
        let pg = playground(Some("u1"), Privacy::Secret);
        assert!(pg.is_visible_to(None));
    }

    #[test]
    fn test_anonymous_playground_has_no_owner() {
        let pg = playground(None, Privacy::Public);
        assert!(!pg.is_owned_by(Some(&user("u1"))));
        assert!(!pg.is_owned_by(None));
    }

    #[test]
    fn test_digest_ignores_order_but_not_content() {
        let a = vec![FileEntry::new("a.sql", "select 1;"), FileEntry::new("b.sql", "select 2;")];
        let b = vec![FileEntry::new("b.sql", "select 2;"), FileEntry::new("a.sql", "select 1;")];
        let c = vec![FileEntry::new("a.sql", "select 1;"), FileEntry::new("b.sql", "select 3;")];
        assert_eq!(files_digest(&a), files_digest(&b));
        assert_ne!(files_digest(&a), files_digest(&c));
    }

    #[test]
    fn test_page_from_overfetch() {
        let page = Page::from_overfetch(vec![1, 2, 3], 0, 2);
        assert_eq!(page.data, vec![1, 2]);
        assert!(page.has_more);

        let page = Page::from_overfetch(vec![1, 2], 4, 2);
        assert!(!page.has_more);
        assert_eq!(page.offset, 4);
    }

    #[test]
    fn test_commit_wire_uses_active_file_camel_case() {
        let commit = Commit {
            id: "c1".to_string(),
            playground_hash: "h1".to_string(),
            parent_id: None,
            message: "init".to_string(),
            files: vec![FileEntry::new("a.sql", "select 1;")],
            active_file: Some("a.sql".to_string()),
            created_at: Utc::now(),
            timestamp: 1,
            user_id: None,
        };
        let json = serde_json::to_value(&commit).unwrap();
        assert_eq!(json["activeFile"], "a.sql");
    }
}
