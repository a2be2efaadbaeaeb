use serde::{Deserialize, Serialize};

use super::route::Route;
use crate::types::{Commit, User};

/// What one source knows about the page being loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    pub route: Option<Route>,
    pub user: Option<User>,
    pub commit: Option<Commit>,
}

/// Picks the commit to show for `route`. Candidates that do not match the
/// route are discarded; of two matches the newer timestamp wins and a tie
/// goes to `current`.
#[must_use]
pub fn select_commit<'a>(
    route: &Route,
    cached: Option<&'a Commit>,
    current: Option<&'a Commit>,
) -> Option<&'a Commit> {
    if matches!(route, Route::Home | Route::Shared { .. }) {
        return None;
    }

    let cached = cached.filter(|c| route.matches(c));
    let current = current.filter(|c| route.matches(c));

    match (cached, current) {
        (Some(cached), Some(current)) => {
            if cached.timestamp > current.timestamp {
                Some(cached)
            } else {
                Some(current)
            }
        }
        (only, None) | (None, only) => only,
    }
}

/// Combines the URL, the server-provided payload and the local cache. The URL
/// decides the route, the server decides the user, and `select_commit`
/// decides the commit.
#[must_use]
pub fn merge_initial_data(
    route_from_url: Option<Route>,
    current: Option<InitialData>,
    cached: Option<InitialData>,
) -> InitialData {
    let current = current.unwrap_or_default();
    let cached = cached.unwrap_or_default();

    let route = route_from_url.or(current.route).or(cached.route);
    let user = current.user.or(cached.user);
    let commit = route
        .as_ref()
        .and_then(|r| select_commit(r, cached.commit.as_ref(), current.commit.as_ref()))
        .cloned();

    InitialData {
        route,
        user,
        commit,
    }
}
