/// WebSocket endpoint
///
/// `GET /v1/ws?token=<access token>` - the token is validated before the
/// upgrade; a bad token is rejected with 401 and no socket is opened. On
/// upgrade the connection is bound to the user's personal room for its
/// whole lifetime, then the client drives team room membership with text
/// frames:
///
/// ```json
/// { "action": "join_team", "teamId": "..." }
/// { "action": "leave_team", "teamId": "..." }
/// ```
///
/// Every join re-verifies team membership against the database, so a user
/// removed from a team cannot rejoin its room with an old token. The server
/// acks with `room:joined` / `room:left` frames and reports bad frames or
/// denied joins with an `error` frame; a protocol error never closes the
/// socket.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use teamflow_shared::auth::authorization::require_member;
use teamflow_shared::auth::jwt::validate_access_token;
use teamflow_shared::models::team::Team;

use crate::app::AppState;
use crate::error::ApiError;

use super::hub::{team_room, user_room, RealtimeHub};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Client-to-server room control frame
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientFrame {
    JoinTeam {
        #[serde(rename = "teamId")]
        team_id: Uuid,
    },
    LeaveTeam {
        #[serde(rename = "teamId")]
        team_id: Uuid,
    },
}

/// Handles `GET /v1/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Reject before upgrading; an invalid token never gets a socket.
    let claims = match validate_access_token(&query.token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!("WebSocket auth failed: {}", err);
            return ApiError::Unauthorized("Invalid or expired token".to_string()).into_response();
        }
    };

    let user_id = claims.sub;
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Personal room binding lasts for the life of the connection.
    state.hub.join(&user_room(user_id), conn_id, tx.clone());
    tracing::info!(%user_id, %conn_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Forward hub broadcasts to the client.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let hub = state.hub.clone();
    let db = state.db.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    handle_client_frame(&db, &hub, user_id, conn_id, &tx, &text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either half ending tears down the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.remove_connection(conn_id);
    tracing::info!(%user_id, %conn_id, "WebSocket disconnected");
}

async fn handle_client_frame(
    db: &PgPool,
    hub: &RealtimeHub,
    user_id: Uuid,
    conn_id: Uuid,
    tx: &UnboundedSender<String>,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            send_error(tx, "Unrecognized frame");
            return;
        }
    };

    match frame {
        ClientFrame::JoinTeam { team_id } => {
            match Team::load_snapshot(db, team_id).await {
                Ok(Some(snapshot)) => {
                    if require_member(&snapshot, user_id).is_ok() {
                        hub.join(&team_room(team_id), conn_id, tx.clone());
                        send_ack(tx, "room:joined", team_id);
                    } else {
                        send_error(tx, "Not a member of this team");
                    }
                }
                Ok(None) => send_error(tx, "Team not found"),
                Err(err) => {
                    tracing::error!(%team_id, "Join check failed: {}", err);
                    send_error(tx, "Unable to join team room");
                }
            }
        }
        ClientFrame::LeaveTeam { team_id } => {
            hub.leave(&team_room(team_id), conn_id);
            send_ack(tx, "room:left", team_id);
        }
    }
}

fn send_ack(tx: &UnboundedSender<String>, event: &str, team_id: Uuid) {
    let frame = json!({ "event": event, "data": { "teamId": team_id } }).to_string();
    let _ = tx.send(frame);
}

fn send_error(tx: &UnboundedSender<String>, message: &str) {
    let frame = json!({ "event": "error", "data": { "message": message } }).to_string();
    let _ = tx.send(frame);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parsing() {
        let team_id = Uuid::new_v4();
        let text = format!(r#"{{"action": "join_team", "teamId": "{}"}}"#, team_id);

        match serde_json::from_str::<ClientFrame>(&text).unwrap() {
            ClientFrame::JoinTeam { team_id: parsed } => assert_eq!(parsed, team_id),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let text = r#"{"action": "subscribe_all"}"#;
        assert!(serde_json::from_str::<ClientFrame>(text).is_err());
    }
}
