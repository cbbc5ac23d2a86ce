use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ServerMessage,
    error::ServiceError,
    state::{SharedState, connections::ClientConnection, store::normalize_code},
};

/// Check that a socket may be opened for `code`, before upgrading.
///
/// Returns the canonical session code.
pub async fn ensure_attachable(
    state: &SharedState,
    code: &str,
    participant_id: Option<&str>,
) -> Result<String, ServiceError> {
    let snapshot = state.sessions().get_session(code).await?;
    if let Some(id) = participant_id {
        if snapshot.participant(id).is_none() {
            return Err(ServiceError::NotFound(format!(
                "participant `{id}` not found in session `{}`",
                snapshot.code
            )));
        }
    }
    Ok(snapshot.code)
}

/// Handle the full lifecycle of a client WebSocket attached to a session.
///
/// The socket only receives events; inbound text frames are ignored.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    code: String,
    participant_id: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id =
        match attach_connection(&state, &code, participant_id.clone(), outbound_tx.clone()).await {
            Ok(id) => id,
            Err(err) => {
                warn!(code = %code, error = %err, "cannot attach websocket");
                let _ = outbound_tx.send(Message::Close(None));
                finalize(writer_task, outbound_tx).await;
                return;
            }
        };
    info!(code = %code, connection = %connection_id, participant = ?participant_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(code = %code, connection = %connection_id, payload = %text, "ignoring client message");
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(code = %code, connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().unregister(&code, connection_id).await;
    info!(code = %code, connection = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Register `tx` under `code` and bring it up to date.
///
/// When a question is open, the new connection alone receives a `question`
/// event carrying the time actually left.
pub async fn attach_connection(
    state: &SharedState,
    code: &str,
    participant_id: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
) -> Result<Uuid, ServiceError> {
    let code = normalize_code(code);
    let connection = ClientConnection::new(participant_id, tx);
    let connection_id = connection.id;
    state.connections().register(&code, connection).await;

    // Read after registering so no broadcast falls between the snapshot and the registration.
    let snapshot = match state.sessions().get_session(&code).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            state.connections().unregister(&code, connection_id).await;
            return Err(err.into());
        }
    };

    if let Some(view) = snapshot.question_view(OffsetDateTime::now_utc()) {
        let question_number = view.question_number;
        if state
            .connections()
            .send_to(&code, connection_id, &ServerMessage::Question(view))
            .await
        {
            debug!(code = %code, connection = %connection_id, question = question_number, "late joiner synchronized");
        }
    }

    Ok(connection_id)
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
