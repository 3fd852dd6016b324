use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};

use courier_types::api::{Claims, SearchQuery};
use courier_types::models::User;

use crate::{ApiError, AppState};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let mut user = state.accounts.profile(claims.sub).await?;
    user.online = state.registry.is_online(claims.sub).await;
    Ok(Json(user))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<User>>, ApiError> {
    let Query(query) = query?;
    let users = state.accounts.search(claims.sub, &query.q).await?;
    Ok(Json(users))
}
