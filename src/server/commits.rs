use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::OptionalSession;
use crate::server::AppState;
use crate::server::dto::{HistoryParams, NewCommit};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::vcs::{commits, diff};

pub async fn list_commits(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let listed = commits::list_commits(state.store.as_ref(), &hash, viewer.user())
        .api_err("List commits")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(listed)))
}

/// Visibility is checked before the session so hidden playgrounds stay 404.
pub async fn create_commit(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    payload: Result<Json<NewCommit>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let created = commits::create_commit(state.store.as_ref(), &hash, viewer.user(), req)
        .api_err("Create commit")?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_commit(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path((hash, commit_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let commit = commits::get_commit(state.store.as_ref(), &hash, &commit_id, viewer.user())
        .api_err("Get commit")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(commit)))
}

pub async fn commit_history(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path((hash, commit_id)): Path<(String, String)>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let history = commits::commit_history(
        state.store.as_ref(),
        &hash,
        &commit_id,
        params.limit,
        viewer.user(),
    )
    .api_err("Get commit history")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(history)))
}

pub async fn commit_diff(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path((hash, commit_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let diff = diff::diff_commit(state.store.as_ref(), &hash, &commit_id, viewer.user())
        .api_err("Diff commit")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(diff)))
}
