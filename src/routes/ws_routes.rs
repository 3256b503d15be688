use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{ChatState, WsAskRequest, WsEvent};
use crate::service::chat_service::ChatService;

/// GET `/ws/chat` — upgrades to a WebSocket for streaming answers.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(svc): State<ChatService>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, svc))
}

/// Handles a single WebSocket connection.
///
/// Protocol:
/// - Client sends JSON `{ "chat_id": "...", "query": "..." }`
/// - Server streams back:
///   1. `{ "type": "stream_start", "chat_id": "..." }`
///   2. `{ "type": "stream_chunk", "content": "..." }` (answer text deltas, repeated)
///   3. `{ "type": "stream_end", "full_content": "...", "chat_state": "message|error" }`
///   or `{ "type": "error", "message": "..." }` when the request is rejected.
///
/// One answer streams at a time per connection: a query sent before
/// `stream_end` gets an `error` event and is not run. Closing the socket
/// mid-answer cancels the ingestion.
async fn handle_socket(socket: WebSocket, svc: ChatService) {
    info!("WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
        };

        // Only handle text messages
        let text = match &msg {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let request: WsAskRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                send_event(&mut sender, &WsEvent::Error {
                    message: format!("Invalid request: {e}"),
                }).await;
                continue;
            }
        };

        let cancel = CancellationToken::new();
        let pending = match svc.start_ask(&request.chat_id, request.query, cancel.clone()).await {
            Ok(pending) => pending,
            Err(e) => {
                send_event(&mut sender, &WsEvent::Error { message: e.to_string() }).await;
                continue;
            }
        };

        send_event(&mut sender, &WsEvent::StreamStart {
            chat_id: request.chat_id.clone(),
        }).await;

        // ── Relay answer deltas until the ingestion task finishes ────────
        let mut progress = pending.progress;
        let mut task = pending.task;
        let mut sent = 0usize;
        let mut client_gone = false;
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                changed = progress.changed() => {
                    if changed.is_err() {
                        break (&mut task).await;
                    }
                    let delta = {
                        let snapshot = progress.borrow_and_update();
                        if snapshot.state != ChatState::Loading {
                            continue;
                        }
                        let start = if snapshot.answer.len() < sent { 0 } else { sent };
                        sent = snapshot.answer.len();
                        snapshot.answer[start..].to_string()
                    };
                    if !delta.is_empty() {
                        send_event(&mut sender, &WsEvent::StreamChunk { content: delta }).await;
                    }
                }
                incoming = receiver.next(), if !client_gone => match mid_stream_frame(&incoming) {
                    MidStream::Gone => {
                        info!("Client left chat {}; cancelling ingestion", request.chat_id);
                        client_gone = true;
                        cancel.cancel();
                    }
                    MidStream::Query => {
                        warn!("Rejected query on chat {}: answer still streaming", request.chat_id);
                        send_event(&mut sender, &in_flight_event(&request.chat_id)).await;
                    }
                    MidStream::Ignored => {}
                },
            }
        };

        if client_gone {
            break;
        }

        match joined {
            Ok(Ok(answered)) => {
                send_event(&mut sender, &WsEvent::StreamEnd {
                    full_content: answered.reply.message.content,
                    chat_state: answered.reply.outcome,
                }).await;
            }
            Ok(Err(e)) => {
                send_event(&mut sender, &WsEvent::Error { message: e.to_string() }).await;
            }
            Err(e) => {
                error!("Ingestion task panicked: {e}");
                send_event(&mut sender, &WsEvent::Error {
                    message: "Internal error during streaming".to_string(),
                }).await;
            }
        }
    }

    info!("WebSocket client disconnected");
}

/// What a frame received while an answer streams means for that answer.
#[derive(Debug, PartialEq, Eq)]
enum MidStream {
    Gone,
    Query,
    Ignored,
}

fn mid_stream_frame(frame: &Option<Result<WsMessage, axum::Error>>) -> MidStream {
    match frame {
        None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => MidStream::Gone,
        Some(Ok(WsMessage::Text(_))) => MidStream::Query,
        Some(Ok(_)) => MidStream::Ignored,
    }
}

fn in_flight_event(chat_id: &str) -> WsEvent {
    WsEvent::Error {
        message: AppError::IngestionInFlight { chat_id: chat_id.to_string() }.to_string(),
    }
}

/// Helper: serialize a `WsEvent` and send it over the socket.
async fn send_event(sender: &mut SplitSink<WebSocket, WsMessage>, event: &WsEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = sender.send(WsMessage::Text(json.into())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_mid_stream_is_a_query() {
        let frame = Some(Ok(WsMessage::Text(r#"{"chat_id":"c","query":"again"}"#.into())));
        assert_eq!(mid_stream_frame(&frame), MidStream::Query);
    }

    #[test]
    fn closed_or_broken_socket_is_gone() {
        assert_eq!(mid_stream_frame(&None), MidStream::Gone);
        assert_eq!(mid_stream_frame(&Some(Ok(WsMessage::Close(None)))), MidStream::Gone);
        let broken = Some(Err(axum::Error::new(std::io::Error::other("reset"))));
        assert_eq!(mid_stream_frame(&broken), MidStream::Gone);
    }

    #[test]
    fn control_frames_are_ignored() {
        let ping = Some(Ok(WsMessage::Ping(Vec::new().into())));
        assert_eq!(mid_stream_frame(&ping), MidStream::Ignored);
    }

    #[test]
    fn rejected_query_reports_busy_chat() {
        let json = serde_json::to_value(in_flight_event("c-1")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(
            json["message"],
            AppError::IngestionInFlight { chat_id: "c-1".to_string() }.to_string()
        );
    }
}
