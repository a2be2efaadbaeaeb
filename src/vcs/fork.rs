use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commits::NewCommit;
use super::playgrounds::insert_with_fresh_hash;
use super::{require_user, visible_playground};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Playground, Privacy, User};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForkRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkCreated {
    pub commit_id: String,
    pub playground_id: String,
    pub parent_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Starts a new lineage from the source's latest commit. The fork shares no
/// history with its source: its only commit has no parent.
pub fn fork_playground(
    store: &dyn Store,
    user: Option<&User>,
    source_hash: &str,
    req: ForkRequest,
) -> Result<ForkCreated> {
    let source = visible_playground(store, source_hash, user)?;
    let user = require_user(user)?;

    let latest = store
        .get_latest_commit(&source.hash)?
        .ok_or(Error::NotFound)?;

    let name = match super::validation::normalize_name(req.name)? {
        Some(name) => Some(name),
        None => source.name.clone(),
    };
    let privacy = if source.privacy == Privacy::Public {
        Privacy::Public
    } else {
        Privacy::Secret
    };

    let now = Utc::now();
    let playground = Playground {
        hash: String::new(),
        user_id: Some(user.id.clone()),
        fork_hash: Some(source.hash.clone()),
        privacy,
        name,
        description: source.description.clone(),
        created_at: now,
        updated_at: now,
        expires_at: None,
    };
    let initial = NewCommit {
        message: format!("Forked from {}", source.hash),
        files: latest.files,
        active_file: latest.active_file,
    };

    let (fork, commit) = insert_with_fresh_hash(store, playground, initial, Some(&user.id))?;

    tracing::info!(
        source = %source.hash,
        fork = %fork.hash,
        user = %user.username,
        "playground forked"
    );

    Ok(ForkCreated {
        commit_id: commit.id,
        playground_id: fork.hash,
        parent_id: commit.parent_id,
        message: commit.message,
        created_at: commit.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use crate::vcs::commits::{NewCommit, commit_history, create_commit};
    use crate::vcs::playgrounds::{NewPlayground, create_playground};
    use crate::vcs::testing::{files, store, user};

    fn seed(store: &dyn Store, owner: &User, privacy: Privacy) -> String {
        let created = create_playground(
            store,
            Some(owner),
            NewPlayground {
                name: Some("source".to_string()),
                description: None,
                message: "init".to_string(),
                files: files(&[("a.sql", "select 1;")]),
                active_file: Some("a.sql".to_string()),
                privacy: Some(privacy),
            },
            None,
        )
        .unwrap();
        create_commit(
            store,
            &created.playground_hash,
            Some(owner),
            NewCommit {
                message: "edit".to_string(),
                files: files(&[("a.sql", "select 2;"), ("b.sql", "select 3;")]),
                active_file: Some("b.sql".to_string()),
            },
        )
        .unwrap();
        created.playground_hash
    }

    #[test]
    fn test_fork_copies_latest_files_into_new_lineage() {
        let store = store();
        let owner = user(&store, "owner", Role::User);
        let forker = user(&store, "forker", Role::User);
        let h1 = seed(&store, &owner, Privacy::Public);

        let fork = fork_playground(&store, Some(&forker), &h1, ForkRequest::default()).unwrap();
        assert_ne!(fork.playground_id, h1);
        assert!(fork.parent_id.is_none());

        let pg = store.get_playground(&fork.playground_id).unwrap().unwrap();
        assert_eq!(pg.fork_hash.as_deref(), Some(h1.as_str()));
        assert_eq!(pg.user_id.as_deref(), Some("forker-id"));
        assert_eq!(pg.name.as_deref(), Some("source"));
        assert_eq!(pg.privacy, Privacy::Public);

        let source_latest = store.get_latest_commit(&h1).unwrap().unwrap();
        let fork_commit = store.get_commit(&fork.commit_id).unwrap().unwrap();
        assert_eq!(fork_commit.files, source_latest.files);
        assert_eq!(fork_commit.active_file.as_deref(), Some("b.sql"));
    }

    #[test]
    fn test_fork_history_has_single_root_entry() {
        let store = store();
        let owner = user(&store, "owner", Role::User);
        let h1 = seed(&store, &owner, Privacy::Public);

        let fork = fork_playground(
            &store,
            Some(&owner),
            &h1,
            ForkRequest {
                name: Some("my fork".to_string()),
            },
        )
        .unwrap();

        let history =
            commit_history(&store, &fork.playground_id, &fork.commit_id, None, None).unwrap();
        assert_eq!(history.history.len(), 1);
        assert!(history.history[0].parent_id.is_none());
        assert!(history.is_complete);
    }

    #[test]
    fn test_fork_of_secret_source_stays_secret() {
        let store = store();
        let owner = user(&store, "owner", Role::User);
        let h1 = seed(&store, &owner, Privacy::Secret);

        let fork = fork_playground(&store, Some(&owner), &h1, ForkRequest::default()).unwrap();
        let pg = store.get_playground(&fork.playground_id).unwrap().unwrap();
        assert_eq!(pg.privacy, Privacy::Secret);
    }

    #[test]
    fn test_fork_requires_session() {
        let store = store();
        let owner = user(&store, "owner", Role::User);
        let h1 = seed(&store, &owner, Privacy::Public);

        let result = fork_playground(&store, None, &h1, ForkRequest::default());
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[test]
    fn test_fork_of_hidden_source_is_not_found() {
        let store = store();
        let owner = user(&store, "owner", Role::Pro);
        let other = user(&store, "other", Role::User);
        let h1 = seed(&store, &owner, Privacy::Private);

        assert!(matches!(
            fork_playground(&store, Some(&other), &h1, ForkRequest::default()),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            fork_playground(&store, Some(&other), "missing", ForkRequest::default()),
            Err(Error::NotFound)
        ));
    }
}
