pub mod connection;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use courier_core::ChatServices;

pub fn router(services: ChatServices) -> Router {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(services)
}

async fn ws_upgrade(State(services): State<ChatServices>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, services))
}
