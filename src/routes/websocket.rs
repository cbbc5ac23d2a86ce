use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    dto::quiz::WsQuery, error::AppError, services::websocket_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/{code}",
    tag = "events",
    params(
        ("code" = String, Path, description = "Session code, case-insensitive"),
        WsQuery
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Unknown session or participant")
    )
)]
/// Upgrade the HTTP connection into a session event stream.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let code =
        websocket_service::ensure_attachable(&state, &code, query.participant_id.as_deref())
            .await?;

    let shared_state = state.clone();
    Ok(ws
        .on_upgrade(move |socket| {
            websocket_service::handle_socket(shared_state, socket, code, query.participant_id)
        })
        .into_response())
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/{code}", get(ws_handler))
}
