use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use courier_types::api::{Claims, FriendRequestBody, RespondFriendRequest};
use courier_types::models::{FriendEntry, PendingRequest};

use crate::{ApiError, AppState};

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FriendEntry>>, ApiError> {
    Ok(Json(state.friends.list_friends(claims.sub).await?))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PendingRequest>>, ApiError> {
    Ok(Json(state.friends.list_pending(claims.sub).await?))
}

pub async fn request_friendship(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<FriendRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let friendship = state
        .friends
        .request_friendship(claims.sub, &req.username)
        .await?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RespondFriendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(request_id) = request_id?;
    let Json(req) = payload?;
    let friendship = state
        .friends
        .respond(request_id, claims.sub, req.decision)
        .await?;
    Ok(Json(friendship))
}
