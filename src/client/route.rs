use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::types::Commit;

/// Base that bare paths are resolved against.
const PATH_BASE: &str = "http://localhost/";

/// Which page a URL points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    Home,
    Shared { id: String },
    Playground { playground_id: String },
    Commit { playground_id: String, commit_id: String },
}

impl Route {
    #[must_use]
    pub fn playground_id(&self) -> Option<&str> {
        match self {
            Route::Playground { playground_id } | Route::Commit { playground_id, .. } => {
                Some(playground_id.as_str())
            }
            Route::Home | Route::Shared { .. } => None,
        }
    }

    #[must_use]
    pub fn commit_id(&self) -> Option<&str> {
        match self {
            Route::Commit { commit_id, .. } => Some(commit_id.as_str()),
            _ => None,
        }
    }

    /// Whether `commit` is a valid candidate to show on this route.
    #[must_use]
    pub fn matches(&self, commit: &Commit) -> bool {
        match self {
            Route::Home | Route::Shared { .. } => false,
            Route::Playground { playground_id } => commit.playground_hash == *playground_id,
            Route::Commit {
                playground_id,
                commit_id,
            } => commit.playground_hash == *playground_id && commit.id == *commit_id,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        let enc = |s: &str| urlencoding::encode(s).into_owned();
        match self {
            Route::Home => "/".to_string(),
            Route::Shared { id } => format!("/shared/{}", enc(id)),
            Route::Playground { playground_id } => format!("/p/{}", enc(playground_id)),
            Route::Commit {
                playground_id,
                commit_id,
            } => format!("/p/{}/commits/{}", enc(playground_id), enc(commit_id)),
        }
    }
}

/// Resolves a full URL or bare path to a route. Scheme, host, query and
/// fragment are ignored. Unknown paths yield `None`.
#[must_use]
pub fn route_from_url(url: &str) -> Option<Route> {
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(PATH_BASE).and_then(|base| base.join(url)))
        .ok()?;

    let segments = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).ok().map(|d| d.into_owned()))
        .collect::<Option<Vec<String>>>()?;

    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
    match parts.as_slice() {
        [] => Some(Route::Home),
        ["shared", id] => Some(Route::Shared { id: id.to_string() }),
        ["p", hash] => Some(Route::Playground {
            playground_id: hash.to_string(),
        }),
        ["p", hash, "commits", commit] => Some(Route::Commit {
            playground_id: hash.to_string(),
            commit_id: commit.to_string(),
        }),
        _ => None,
    }
}
