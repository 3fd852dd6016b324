use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use courier_types::api::{Claims, ConversationQuery, SendMessageRequest};
use courier_types::models::Message;

use crate::{ApiError, AppState};

/// Same path as a gateway `SendMessage`: the receiver gets a live event if
/// connected, otherwise the offline hook runs.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let message = state
        .delivery
        .send(claims.sub, req.receiver_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    message_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Message>, ApiError> {
    let Path(message_id) = message_id?;
    Ok(Json(state.delivery.mark_read(message_id, claims.sub).await?))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    message_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Message>, ApiError> {
    let Path(message_id) = message_id?;
    Ok(Json(
        state.delivery.mark_delivered(message_id, claims.sub).await?,
    ))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    partner_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ConversationQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Path(partner_id) = partner_id?;
    let Query(query) = query?;
    let messages = state
        .delivery
        .get_conversation(claims.sub, partner_id, query.limit, query.offset)
        .await?;
    Ok(Json(messages))
}
