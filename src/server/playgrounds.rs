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

use crate::auth::{OptionalSession, RequireSession};
use crate::server::AppState;
use crate::server::dto::{ForkRequest, ListParams, NewPlayground, UpdatePlayground};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::vcs::{fork, playgrounds};

pub async fn list_playgrounds(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let page = playgrounds::list_playgrounds(state.store.as_ref(), &params)
        .api_err("List playgrounds")?;
    Ok::<_, ApiError>(Json(page))
}

pub async fn search_playgrounds(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let page = playgrounds::search_playgrounds(state.store.as_ref(), &params)
        .api_err("Search playgrounds")?;
    Ok::<_, ApiError>(Json(page))
}

pub async fn list_user_playgrounds(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let page = playgrounds::list_user_playgrounds(
        state.store.as_ref(),
        viewer.user(),
        &username,
        &params,
    )
    .api_err("List user playgrounds")?;
    Ok::<_, ApiError>(Json(page))
}

pub async fn create_playground(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewPlayground>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let created = playgrounds::create_playground(
        state.store.as_ref(),
        viewer.user(),
        req,
        state.anonymous_ttl,
    )
    .api_err("Create playground")?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_playground(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let detail = playgrounds::get_playground(state.store.as_ref(), &hash, viewer.user())
        .api_err("Get playground")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

pub async fn update_playground(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    payload: Result<Json<UpdatePlayground>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let playground =
        playgrounds::update_playground(state.store.as_ref(), Some(&auth.user), &hash, req)
            .api_err("Update playground")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(playground)))
}

pub async fn delete_playground(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    playgrounds::delete_playground(state.store.as_ref(), Some(&auth.user), &hash)
        .api_err("Delete playground")?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn toggle_star(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let toggled = playgrounds::toggle_star(state.store.as_ref(), Some(&auth.user), &hash)
        .api_err("Toggle star")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(toggled)))
}

/// Body is optional; an empty request forks under the source's name.
pub async fn fork_playground(
    viewer: OptionalSession,
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    payload: Result<Json<ForkRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => ForkRequest::default(),
        Err(rejection) => return Err(ApiError::from(rejection)),
    };
    let created = fork::fork_playground(state.store.as_ref(), viewer.user(), &hash, req)
        .api_err("Fork playground")?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}
