use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::{ErrorResponse, ServerEvent, SyncError};
use crate::services::auth_service::get_auth_token_or_query;
use crate::state::AppState;
use crate::ws::{SessionGuard, SessionHandle};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// WebSocket handler. The credential is checked before the upgrade so an
/// unauthenticated client never gets a session.
pub async fn websocket_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt");

    let token = match get_auth_token_or_query(&headers, query.token.as_deref()) {
        Ok(token) => token,
        Err(e) => {
            warn!("WebSocket connection refused: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };
    let user_id = match app_state.gateway.authenticate(&token) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("WebSocket connection refused: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let (session, outbox) = app_state.gateway.open_session(user_id);
        handle_socket(socket, app_state, session, outbox).await
    })
}

/// Pump one connection until either side goes away
async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    session: Arc<SessionHandle>,
    mut outbox: mpsc::Receiver<Arc<ServerEvent>>,
) {
    // Room cleanup runs when this guard drops, however the tasks end
    let _guard = SessionGuard::new(app_state.gateway.clone(), session.clone());
    let idle_timeout = app_state.config.session_idle_timeout();
    let gateway = app_state.gateway.clone();

    info!("WebSocket connection established for session {} (user {})", session.id, session.user_id);

    let (mut sender, mut receiver) = socket.split();

    // Drain the session outbox into the socket. An evicted session gets
    // what was already queued, then a close frame so the client resyncs.
    let send_session = session.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                event = outbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = send_session.evicted() => {
                    while let Ok(event) = outbox.try_recv() {
                        if send_event(&mut sender, &send_session, &event).await.is_err() {
                            return;
                        }
                    }
                    let frame = CloseFrame { code: close_code::AGAIN, reason: "lagging".into() };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    return;
                }
            };
            if send_event(&mut sender, &send_session, &event).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Read client frames until close, error or idle timeout
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let frame = match tokio::time::timeout(idle_timeout, receiver.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    debug!("WebSocket read error on session {}: {}", recv_session.id, e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    info!("Session {} idle for {:?}, closing", recv_session.id, idle_timeout);
                    break;
                }
            };

            match frame {
                Message::Text(text) => {
                    // Rejections are already reported to the client
                    let _ = gateway.handle_text(&recv_session, &text).await;
                }
                Message::Binary(_) => {
                    let error = SyncError::InvalidPayload("Binary frames are not supported".to_string());
                    let _ = gateway.reject_frame(&recv_session, error);
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection terminated for session {}", session.id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &SessionHandle,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            error!("Failed to serialize event for session {}: {}", session.id, e);
            Ok(())
        }
    }
}
