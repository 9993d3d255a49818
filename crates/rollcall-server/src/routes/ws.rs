//! Live attendance socket.
//!
//! Text frames carry `{"event": ..., "data": ...}`. Faculty join their own
//! room and receive `attendance` events as students mark themselves present;
//! students send `attendance` events and get an `attendance_ack` or `error`.

use super::attendance::{mark_attendance, AttendanceForm};
use crate::auth::CurrentUser;
use crate::rooms::WsEvent;
use crate::state::{AppState, SharedState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use rollcall_store::{Role, User};
use tokio::sync::broadcast::{self, error::RecvError};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState, user: User) {
    tracing::info!(reg_id = %user.reg_id, role = %user.role, "socket connected");
    let mut room: Option<broadcast::Receiver<WsEvent>> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "socket receive failed");
                        break;
                    }
                };
                let reply = handle_event(&state, &user, &mut room, text.as_str()).await;
                if send_event(&mut socket, &reply).await.is_err() {
                    break;
                }
            }
            event = next_room_event(&mut room) => match event {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(reg_id = %user.reg_id, skipped, "socket lagging behind room");
                }
                Err(RecvError::Closed) => room = None,
            },
        }
    }

    tracing::info!(reg_id = %user.reg_id, "socket disconnected");
}

async fn next_room_event(room: &mut Option<broadcast::Receiver<WsEvent>>) -> Result<WsEvent, RecvError> {
    match room {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_else(|_| r#"{"event":"error","data":null}"#.to_string());
    socket.send(Message::Text(text.into())).await
}

fn error_event(message: impl Into<String>) -> WsEvent {
    WsEvent::new("error", message.into())
}

/// Handle one client event and produce the reply for the sender.
async fn handle_event(
    state: &AppState,
    user: &User,
    room: &mut Option<broadcast::Receiver<WsEvent>>,
    raw: &str,
) -> WsEvent {
    let event: WsEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(_) => return error_event("Malformed event"),
    };

    match event.event.as_str() {
        "join_room" => {
            let Some(target) = event.data.as_str().map(str::trim).filter(|t| !t.is_empty()) else {
                return error_event("Missing room");
            };
            if user.role != Role::Faculty || user.reg_id != target {
                tracing::info!(reg_id = %user.reg_id, room = target, "join refused");
                return error_event("You can only join your own room");
            }
            *room = Some(state.rooms.join(target));
            tracing::info!(room = target, "faculty joined room");
            WsEvent::new("joined", target)
        }
        "attendance" => {
            let form: AttendanceForm = match serde_json::from_value(event.data) {
                Ok(form) => form,
                Err(_) => return error_event("Malformed attendance"),
            };
            match mark_attendance(state, user, form).await {
                Ok(ack) => WsEvent::new("attendance_ack", ack),
                Err(e) => {
                    if e.status().is_server_error() {
                        tracing::error!(error = %e, "socket attendance failed");
                    }
                    error_event(e.public_message())
                }
            }
        }
        other => error_event(format!("Unknown event: {other}")),
    }
}
