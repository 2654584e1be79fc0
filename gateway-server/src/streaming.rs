use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use gateway_core::SubscriptionId;
use serde_json::json;
use uuid::Uuid;

use crate::dispatch::auth::{validate_ws_token, TokenQuery};
use crate::lifecycle::AppState;
use crate::subscription_manager::{next_frame, FrameWait};

const CLOSE_POLICY_VIOLATION: u16 = 4404;
const CLOSE_NORMAL: u16 = 1000;

/// `GET /ws/quote/{subscription_id}`. Binds the socket to an existing
/// subscription; closing the socket never unsubscribes.
pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
    Query(token): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !validate_ws_token(&state.config.security, &Query(token)) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }

    let Ok(uuid) = Uuid::parse_str(&subscription_id) else {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    };
    let id = SubscriptionId(uuid);

    let Some(mut consumer) = state.data_service.subscriptions().consumer(id) else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };
    let manager = state.data_service.subscriptions().clone();

    ws.on_upgrade(move |socket| async move {
        run_socket(socket, manager, id, &mut consumer).await;
    })
    .into_response()
}

async fn run_socket(
    socket: WebSocket,
    manager: crate::subscription_manager::SubscriptionManager,
    id: SubscriptionId,
    consumer: &mut tokio::sync::broadcast::Receiver<gateway_core::TickFrame>,
) {
    let (mut sender, mut receiver) = socket.split();

    let greeting = json!({
        "type": "connected",
        "subscription_id": id.to_string(),
        "ts": Utc::now(),
    });
    if sender.send(Message::Text(greeting.to_string())).await.is_err() {
        return;
    }

    let reader_manager = manager.clone();
    let reader = async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                        if value.get("type").and_then(|t| t.as_str()) == Some("ping") {
                            reader_manager.touch(id);
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    let writer_manager = manager.clone();
    let writer = async move {
        loop {
            if !writer_manager.is_active(id) {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_POLICY_VIOLATION,
                        reason: "subscription no longer exists".into(),
                    })))
                    .await;
                return;
            }
            match next_frame(&writer_manager, id, consumer).await {
                FrameWait::Frame(frame) => {
                    let payload = json!({"type": "quote", "data": frame, "ts": Utc::now()});
                    if sender.send(Message::Text(payload.to_string())).await.is_err() {
                        return;
                    }
                }
                FrameWait::Dropped(_) => continue,
                FrameWait::Ended => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_NORMAL,
                            reason: "subscription ended".into(),
                        })))
                        .await;
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = writer => {}
    }
}
