use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};
use chrono::Duration;

use super::{commits, playgrounds};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Lifetime recorded on playgrounds created without a session.
    pub anonymous_ttl: Option<Duration>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, anonymous_ttl: Option<Duration>) -> Self {
        Self {
            store,
            anonymous_ttl,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Playgrounds
        .route(
            "/playgrounds",
            get(playgrounds::list_playgrounds).post(playgrounds::create_playground),
        )
        .route("/playgrounds/search", get(playgrounds::search_playgrounds))
        .route(
            "/playgrounds/{hash}",
            get(playgrounds::get_playground)
                .put(playgrounds::update_playground)
                .delete(playgrounds::delete_playground),
        )
        .route("/playgrounds/{hash}/star", post(playgrounds::toggle_star))
        .route("/playgrounds/{hash}/fork", post(playgrounds::fork_playground))
        .route("/user/{username}", get(playgrounds::list_user_playgrounds))
        // Commits
        .route(
            "/playgrounds/{hash}/commits",
            get(commits::list_commits).post(commits::create_commit),
        )
        .route(
            "/playgrounds/{hash}/commits/{commit_id}",
            get(commits::get_commit),
        )
        .route(
            "/playgrounds/{hash}/commits/{commit_id}/history",
            get(commits::commit_history),
        )
        .route(
            "/playgrounds/{hash}/commits/{commit_id}/diff",
            get(commits::commit_diff),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
