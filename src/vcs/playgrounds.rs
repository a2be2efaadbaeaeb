use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::commits::{CommitCreated, NewCommit, draft_commit};
use super::validation::{normalize_description, normalize_name};
use super::{generate_hash, require_user, visible_playground};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    ListScope, Page, Playground, PlaygroundSort, PlaygroundSummary, Privacy, User,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
const HASH_ATTEMPTS: usize = 3;

const PRIVATE_TIER_REQUIRED: &str =
    "Private playgrounds require a sponsor, pro or admin account";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlayground {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub message: String,
    pub files: Vec<crate::types::FileEntry>,
    #[serde(rename = "activeFile", default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlayground {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkOrigin {
    pub hash: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundDetail {
    #[serde(flatten)]
    pub playground: Playground,
    pub stars: String,
    pub is_starred: bool,
    #[serde(default)]
    pub fork_of: Option<ForkOrigin>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarToggled {
    pub starred: bool,
    #[serde(with = "count_string")]
    pub stars: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort: Option<PlaygroundSort>,
    #[serde(default)]
    pub q: Option<String>,
}

impl ListParams {
    fn window(&self) -> (i64, i64) {
        let offset = self.offset.unwrap_or(0).max(0);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (offset, limit)
    }
}

/// Star counts travel as strings on the wire.
mod count_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

fn require_private_tier(user: Option<&User>, privacy: Privacy) -> Result<()> {
    if privacy == Privacy::Private && !user.is_some_and(|u| u.role.can_use_private()) {
        return Err(Error::Forbidden(PRIVATE_TIER_REQUIRED.to_string()));
    }
    Ok(())
}

/// Inserts a playground and its first commit, retrying on the rare hash collision.
pub(crate) fn insert_with_fresh_hash(
    store: &dyn Store,
    mut playground: Playground,
    initial: NewCommit,
    author: Option<&str>,
) -> Result<(Playground, crate::types::Commit)> {
    for _ in 0..HASH_ATTEMPTS {
        playground.hash = generate_hash();
        let commit = draft_commit(&playground.hash, author, initial.clone());
        match store.create_playground(&playground, &commit) {
            Ok(()) => return Ok((playground, commit)),
            Err(Error::AlreadyExists) => {
                tracing::warn!(hash = %playground.hash, "playground hash collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Conflict("could not allocate a playground hash".to_string()))
}

/// Creates a playground with its initial commit. Anonymous playgrounds are
/// allowed and get an `expires_at` when `anonymous_ttl` is set.
pub fn create_playground(
    store: &dyn Store,
    user: Option<&User>,
    req: NewPlayground,
    anonymous_ttl: Option<Duration>,
) -> Result<CommitCreated> {
    let privacy = req.privacy.unwrap_or_default();
    require_private_tier(user, privacy)?;

    let initial = NewCommit {
        message: req.message,
        files: req.files,
        active_file: req.active_file,
    };
    initial.validate()?;

    let now = Utc::now();
    let expires_at: Option<DateTime<Utc>> = match user {
        Some(_) => None,
        None => anonymous_ttl.map(|ttl| now + ttl),
    };

    let playground = Playground {
        hash: String::new(),
        user_id: user.map(|u| u.id.clone()),
        fork_hash: None,
        privacy,
        name: normalize_name(req.name)?,
        description: normalize_description(req.description)?,
        created_at: now,
        updated_at: now,
        expires_at,
    };

    let (playground, commit) =
        insert_with_fresh_hash(store, playground, initial, user.map(|u| u.id.as_str()))?;

    tracing::info!(
        playground = %playground.hash,
        owner = ?playground.user_id,
        "playground created"
    );

    Ok(CommitCreated::from(&commit))
}

pub fn get_playground(
    store: &dyn Store,
    hash: &str,
    viewer: Option<&User>,
) -> Result<PlaygroundDetail> {
    let playground = visible_playground(store, hash, viewer)?;

    let stars = store.count_stars(&playground.hash)?;
    let is_starred = match viewer {
        Some(user) => store.has_starred(&user.id, &playground.hash)?,
        None => false,
    };

    let fork_of = match &playground.fork_hash {
        Some(source_hash) => Some(ForkOrigin {
            hash: source_hash.clone(),
            name: store
                .get_playground(source_hash)?
                .filter(|source| source.is_visible_to(viewer))
                .and_then(|source| source.name),
        }),
        None => None,
    };

    let username = match &playground.user_id {
        Some(owner_id) => store.get_user(owner_id)?.map(|u| u.username),
        None => None,
    };

    Ok(PlaygroundDetail {
        playground,
        stars: stars.to_string(),
        is_starred,
        fork_of,
        username,
    })
}

/// Owner-only metadata update. All fields apply or none do.
pub fn update_playground(
    store: &dyn Store,
    user: Option<&User>,
    hash: &str,
    req: UpdatePlayground,
) -> Result<Playground> {
    let user = require_user(user)?;
    let mut playground = visible_playground(store, hash, Some(user))?;

    if !playground.is_owned_by(Some(user)) {
        return Err(Error::Forbidden(
            "Only the owner can update this playground".to_string(),
        ));
    }

    // A private playground may only be kept private by an elevated tier too.
    let privacy = req.privacy.unwrap_or(playground.privacy);
    require_private_tier(Some(user), privacy)?;

    let name = match req.name {
        Some(name) => normalize_name(Some(name))?,
        None => playground.name.clone(),
    };
    let description = match req.description {
        Some(description) => normalize_description(Some(description))?,
        None => playground.description.clone(),
    };

    playground.name = name;
    playground.description = description;
    playground.privacy = privacy;
    playground.updated_at = Utc::now();

    store.update_playground(&playground)?;
    Ok(playground)
}

pub fn delete_playground(store: &dyn Store, user: Option<&User>, hash: &str) -> Result<()> {
    let user = require_user(user)?;
    let playground = visible_playground(store, hash, Some(user))?;

    if !playground.is_owned_by(Some(user)) {
        return Err(Error::Forbidden(
            "Only the owner can delete this playground".to_string(),
        ));
    }

    if !store.delete_playground(&playground.hash)? {
        return Err(Error::NotFound);
    }
    tracing::info!(playground = %playground.hash, "playground deleted");
    Ok(())
}

pub fn toggle_star(store: &dyn Store, user: Option<&User>, hash: &str) -> Result<StarToggled> {
    let user = require_user(user)?;
    let playground = visible_playground(store, hash, Some(user))?;

    let starred = store.toggle_star(&user.id, &playground.hash)?;
    let stars = store.count_stars(&playground.hash)?;

    Ok(StarToggled { starred, stars })
}

fn page(
    store: &dyn Store,
    scope: ListScope,
    params: &ListParams,
) -> Result<Page<PlaygroundSummary>> {
    let (offset, limit) = params.window();
    let items = store.list_playgrounds(&scope, params.sort.unwrap_or_default(), offset, limit + 1)?;
    Ok(Page::from_overfetch(items, offset, limit))
}

/// Public playgrounds only.
pub fn list_playgrounds(store: &dyn Store, params: &ListParams) -> Result<Page<PlaygroundSummary>> {
    page(store, ListScope::Public { query: None }, params)
}

/// Public playgrounds whose name or description contains `q`.
pub fn search_playgrounds(
    store: &dyn Store,
    params: &ListParams,
) -> Result<Page<PlaygroundSummary>> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::BadRequest("Search query is required".to_string()))?;

    page(
        store,
        ListScope::Public {
            query: Some(query.to_string()),
        },
        params,
    )
}

/// A user's playgrounds. Owners see everything they own; others see public ones.
pub fn list_user_playgrounds(
    store: &dyn Store,
    viewer: Option<&User>,
    username: &str,
    params: &ListParams,
) -> Result<Page<PlaygroundSummary>> {
    let owner = store
        .get_user_by_username(username)?
        .ok_or(Error::NotFound)?;
    let include_hidden = viewer.is_some_and(|v| v.id == owner.id);

    page(
        store,
        ListScope::Owner {
            user_id: owner.id,
            include_hidden,
        },
        params,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use crate::vcs::testing::{files, store, user};

    fn new_playground(name: &str, privacy: Privacy) -> NewPlayground {
        NewPlayground {
            name: Some(name.to_string()),
            description: Some(format!("{name} description")),
            message: "init".to_string(),
            files: files(&[("a.sql", "select 1;")]),
            active_file: Some("a.sql".to_string()),
            privacy: Some(privacy),
        }
    }

    #[test]
    fn test_private_gate_rejects_basic_user() {
        let store = store();
        let basic = user(&store, "basic", Role::User);
        let created =
            create_playground(&store, Some(&basic), new_playground("demo", Privacy::Public), None)
                .unwrap();

        let result = update_playground(
            &store,
            Some(&basic),
            &created.playground_hash,
            UpdatePlayground {
                name: Some("renamed".to_string()),
                description: None,
                privacy: Some(Privacy::Private),
            },
        );
        assert!(matches!(result, Err(Error::Forbidden(_))));

        // Nothing from the rejected request was applied.
        let pg = store.get_playground(&created.playground_hash).unwrap().unwrap();
        assert_eq!(pg.name.as_deref(), Some("demo"));
        assert_eq!(pg.privacy, Privacy::Public);
    }

    #[test]
    fn test_private_gate_allows_sponsor_and_applies_all_fields() {
        let store = store();
        let sponsor = user(&store, "sponsor", Role::Sponsor);
        let created =
            create_playground(&store, Some(&sponsor), new_playground("demo", Privacy::Public), None)
                .unwrap();

        let updated = update_playground(
            &store,
            Some(&sponsor),
            &created.playground_hash,
            UpdatePlayground {
                name: Some("renamed".to_string()),
                description: Some("new description".to_string()),
                privacy: Some(Privacy::Private),
            },
        )
        .unwrap();

        assert_eq!(updated.privacy, Privacy::Private);
        assert_eq!(updated.name.as_deref(), Some("renamed"));
        assert_eq!(updated.description.as_deref(), Some("new description"));
    }

    #[test]
    fn test_downgraded_user_cannot_keep_private() {
        let store = store();
        let mut owner = user(&store, "owner", Role::Pro);
        let created =
            create_playground(&store, Some(&owner), new_playground("demo", Privacy::Private), None)
                .unwrap();

        owner.role = Role::User;
        store.update_user(&owner).unwrap();

        let result = update_playground(
            &store,
            Some(&owner),
            &created.playground_hash,
            UpdatePlayground {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::Forbidden(_))));

        let lowered = update_playground(
            &store,
            Some(&owner),
            &created.playground_hash,
            UpdatePlayground {
                privacy: Some(Privacy::Secret),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(lowered.privacy, Privacy::Secret);
    }

    #[test]
    fn test_update_by_non_owner() {
        let store = store();
        let owner = user(&store, "owner", Role::Pro);
        let other = user(&store, "other", Role::Admin);

        let public =
            create_playground(&store, Some(&owner), new_playground("pub", Privacy::Public), None)
                .unwrap();
        let private =
            create_playground(&store, Some(&owner), new_playground("prv", Privacy::Private), None)
                .unwrap();

        let req = UpdatePlayground {
            name: Some("stolen".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            update_playground(&store, Some(&other), &public.playground_hash, req.clone()),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            update_playground(&store, Some(&other), &private.playground_hash, req),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_anonymous_create_sets_expiry() {
        let store = store();
        let created = create_playground(
            &store,
            None,
            new_playground("anon", Privacy::Public),
            Some(Duration::days(30)),
        )
        .unwrap();

        let pg = store.get_playground(&created.playground_hash).unwrap().unwrap();
        assert!(pg.user_id.is_none());
        assert!(pg.expires_at.is_some());
        assert!(created.parent_id.is_none());
    }

    #[test]
    fn test_anonymous_cannot_create_private() {
        let store = store();
        let result = create_playground(&store, None, new_playground("x", Privacy::Private), None);
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_toggle_star_round_trip() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        let created =
            create_playground(&store, Some(&alice), new_playground("demo", Privacy::Public), None)
                .unwrap();
        let hash = created.playground_hash;

        let on = toggle_star(&store, Some(&alice), &hash).unwrap();
        assert_eq!(on, StarToggled { starred: true, stars: 1 });

        let detail = get_playground(&store, &hash, Some(&alice)).unwrap();
        assert_eq!(detail.stars, "1");
        assert!(detail.is_starred);

        let off = toggle_star(&store, Some(&alice), &hash).unwrap();
        assert_eq!(off, StarToggled { starred: false, stars: 0 });
        assert!(matches!(toggle_star(&store, None, &hash), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_star_count_is_string_on_wire() {
        let json = serde_json::to_value(StarToggled {
            starred: true,
            stars: 3,
        })
        .unwrap();
        assert_eq!(json["stars"], "3");
    }

    #[test]
    fn test_listing_visibility() {
        let store = store();
        let owner = user(&store, "owner", Role::Pro);
        let other = user(&store, "other", Role::User);
        for (name, privacy) in [
            ("alpha", Privacy::Public),
            ("beta", Privacy::Secret),
            ("gamma", Privacy::Private),
        ] {
            create_playground(&store, Some(&owner), new_playground(name, privacy), None).unwrap();
        }

        let public = list_playgrounds(&store, &ListParams::default()).unwrap();
        assert_eq!(public.data.len(), 1);

        let search = search_playgrounds(
            &store,
            &ListParams {
                q: Some("beta".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(search.data.is_empty());

        let own = list_user_playgrounds(&store, Some(&owner), "owner", &ListParams::default())
            .unwrap();
        assert_eq!(own.data.len(), 3);

        let theirs = list_user_playgrounds(&store, Some(&other), "owner", &ListParams::default())
            .unwrap();
        assert_eq!(theirs.data.len(), 1);

        assert!(matches!(
            list_user_playgrounds(&store, None, "ghost", &ListParams::default()),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_pagination_window() {
        let store = store();
        let alice = user(&store, "alice", Role::User);
        for i in 0..5 {
            create_playground(
                &store,
                Some(&alice),
                new_playground(&format!("pg{i}"), Privacy::Public),
                None,
            )
            .unwrap();
        }

        let first = list_playgrounds(
            &store,
            &ListParams {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(first.data.len(), 2);
        assert!(first.has_more);

        let last = list_playgrounds(
            &store,
            &ListParams {
                offset: Some(4),
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(last.data.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn test_search_requires_query() {
        let store = store();
        assert!(matches!(
            search_playgrounds(&store, &ListParams::default()),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_delete_requires_owner() {
        let store = store();
        let owner = user(&store, "owner", Role::User);
        let other = user(&store, "other", Role::User);
        let created =
            create_playground(&store, Some(&owner), new_playground("demo", Privacy::Public), None)
                .unwrap();

        assert!(matches!(
            delete_playground(&store, Some(&other), &created.playground_hash),
            Err(Error::Forbidden(_))
        ));
        delete_playground(&store, Some(&owner), &created.playground_hash).unwrap();
        assert!(matches!(
            get_playground(&store, &created.playground_hash, None),
            Err(Error::NotFound)
        ));
    }
}
