use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{validate_files, validate_message};
use super::{millis, require_user, visible_playground};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Commit, CommitSummary, FileEntry, User};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommit {
    pub message: String,
    pub files: Vec<FileEntry>,
    #[serde(rename = "activeFile", default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,
}

impl NewCommit {
    pub fn validate(&self) -> Result<()> {
        validate_message(&self.message)?;
        validate_files(&self.files, self.active_file.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitCreated {
    pub commit_id: String,
    pub playground_hash: String,
    pub parent_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Commit> for CommitCreated {
    fn from(commit: &Commit) -> Self {
        Self {
            commit_id: commit.id.clone(),
            playground_hash: commit.playground_hash.clone(),
            parent_id: commit.parent_id.clone(),
            message: commit.message.clone(),
            created_at: commit.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitHistory {
    pub history: Vec<CommitSummary>,
    /// True only when the walk reached a commit without a parent.
    #[serde(rename = "isComplete")]
    pub is_complete: bool,
}

/// Builds an unsaved root commit; the store assigns `parent_id` on append.
pub(crate) fn draft_commit(hash: &str, user_id: Option<&str>, req: NewCommit) -> Commit {
    let now = Utc::now();
    Commit {
        id: Uuid::new_v4().to_string(),
        playground_hash: hash.to_string(),
        parent_id: None,
        message: req.message.trim().to_string(),
        files: req.files,
        active_file: req.active_file,
        created_at: now,
        timestamp: millis(&now),
        user_id: user_id.map(str::to_string),
    }
}

/// Appends a commit after the playground's latest one.
pub fn create_commit(
    store: &dyn Store,
    hash: &str,
    user: Option<&User>,
    req: NewCommit,
) -> Result<CommitCreated> {
    let playground = visible_playground(store, hash, user)?;
    let user = require_user(user)?;
    req.validate()?;

    let commit = store.append_commit(draft_commit(&playground.hash, Some(&user.id), req))?;

    tracing::info!(
        playground = %playground.hash,
        commit = %commit.id,
        parent = ?commit.parent_id,
        "commit created"
    );

    Ok(CommitCreated::from(&commit))
}

pub fn list_commits(
    store: &dyn Store,
    hash: &str,
    viewer: Option<&User>,
) -> Result<Vec<CommitSummary>> {
    let playground = visible_playground(store, hash, viewer)?;
    store.list_commits(&playground.hash)
}

/// Fetches a full snapshot. Commits of other playgrounds are reported as missing.
pub fn get_commit(
    store: &dyn Store,
    hash: &str,
    commit_id: &str,
    viewer: Option<&User>,
) -> Result<Commit> {
    let playground = visible_playground(store, hash, viewer)?;
    store
        .get_commit(commit_id)?
        .filter(|c| c.playground_hash == playground.hash)
        .ok_or(Error::NotFound)
}

/// Walks `parent_id` links backwards from `commit_id`, newest first.
pub fn commit_history(
    store: &dyn Store,
    hash: &str,
    commit_id: &str,
    limit: Option<usize>,
    viewer: Option<&User>,
) -> Result<CommitHistory> {
    let start = get_commit(store, hash, commit_id, viewer)?;
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let mut history = vec![CommitSummary::from(&start)];
    let mut next = start.parent_id;

    while history.len() < limit {
        let Some(parent_id) = next.take() else {
            break;
        };
        match store.get_commit(&parent_id)? {
            Some(parent) if parent.playground_hash == start.playground_hash => {
                history.push(CommitSummary::from(&parent));
                next = parent.parent_id;
            }
            _ => {
                tracing::warn!(
                    playground = %start.playground_hash,
                    commit = %parent_id,
                    "history walk hit a missing parent"
                );
                next = Some(parent_id);
                break;
            }
        }
    }

    Ok(CommitHistory {
        history,
        is_complete: next.is_none(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Privacy, Role};
    use crate::vcs::playgrounds::{NewPlayground, create_playground};
    use crate::vcs::testing::{files, store, user};

    fn new_commit(message: &str, entries: &[(&str, &str)]) -> NewCommit {
        NewCommit {
            message: message.to_string(),
            files: files(entries),
            active_file: None,
        }
    }

    fn seed(store: &dyn Store, owner: &User, privacy: Privacy) -> CommitCreated {
        create_playground(
            store,
            Some(owner),
            NewPlayground {
                name: Some("demo".to_string()),
                description: None,
                message: "init".to_string(),
                files: files(&[("a.sql", "select 1;")]),
                active_file: Some("a.sql".to_string()),
                privacy: Some(privacy),
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_commit_chains_to_latest() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let c1 = seed(&store, &alice, Privacy::Public);

        let c2 = create_commit(
            &store,
            &c1.playground_hash,
            Some(&alice),
            new_commit("second", &[("a.sql", "select 2;")]),
        )
        .unwrap();

        assert_eq!(c2.parent_id.as_deref(), Some(c1.commit_id.as_str()));
        assert_eq!(c2.playground_hash, c1.playground_hash);
    }

    #[test]
    fn test_create_commit_requires_session() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let c1 = seed(&store, &alice, Privacy::Public);

        let result = create_commit(
            &store,
            &c1.playground_hash,
            None,
            new_commit("anon", &[("a.sql", "x")]),
        );
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[test]
    fn test_create_commit_missing_playground() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let result = create_commit(&store, "nope", Some(&alice), new_commit("x", &[]));
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_private_commits_hidden_from_others() {
        let store = store();
        let owner = user(&store, "owner", Role::Pro);
        let other = user(&store, "other", Role::User);
        let c1 = seed(&store, &owner, Privacy::Private);

        let result = get_commit(&store, &c1.playground_hash, &c1.commit_id, Some(&other));
        assert!(matches!(result, Err(Error::NotFound)));
        assert!(get_commit(&store, &c1.playground_hash, &c1.commit_id, Some(&owner)).is_ok());
    }

    #[test]
    fn test_get_commit_of_other_playground_is_not_found() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let first = seed(&store, &alice, Privacy::Public);
        let second = seed(&store, &alice, Privacy::Public);

        let result = get_commit(&store, &first.playground_hash, &second.commit_id, None);
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_list_commits_newest_first() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let c1 = seed(&store, &alice, Privacy::Public);
        let c2 = create_commit(
            &store,
            &c1.playground_hash,
            Some(&alice),
            new_commit("two", &[("a.sql", "2")]),
        )
        .unwrap();

        let listed = list_commits(&store, &c1.playground_hash, None).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, c2.commit_id);
        assert_eq!(listed[0].username.as_deref(), Some("alice"));
        assert_eq!(listed[1].id, c1.commit_id);
        assert!(listed[0].timestamp > listed[1].timestamp);
    }

    #[test]
    fn test_history_respects_limit_and_completeness() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let c1 = seed(&store, &alice, Privacy::Public);
        let hash = c1.playground_hash.clone();

        let mut last = c1.commit_id.clone();
        for i in 0..3 {
            last = create_commit(
                &store,
                &hash,
                Some(&alice),
                new_commit(&format!("edit {i}"), &[("a.sql", i.to_string().as_str())]),
            )
            .unwrap()
            .commit_id;
        }

        let partial = commit_history(&store, &hash, &last, Some(2), None).unwrap();
        assert_eq!(partial.history.len(), 2);
        assert!(!partial.is_complete);
        assert_eq!(partial.history[0].id, last);

        let full = commit_history(&store, &hash, &last, None, None).unwrap();
        assert_eq!(full.history.len(), 4);
        assert!(full.is_complete);
        assert_eq!(full.history[3].id, c1.commit_id);
        assert!(full.history[3].parent_id.is_none());

        let exact = commit_history(&store, &hash, &last, Some(4), None).unwrap();
        assert!(exact.is_complete);
    }

    #[test]
    fn test_invalid_active_file_rejected() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let c1 = seed(&store, &alice, Privacy::Public);

        let mut req = new_commit("bad", &[("a.sql", "1")]);
        req.active_file = Some("missing.sql".to_string());
        let result = create_commit(&store, &c1.playground_hash, Some(&alice), req);
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }
}
