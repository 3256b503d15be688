use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::models::{AskRequest, CreateChatRequest, RenameChatRequest, ReplaceMessagesRequest};
use crate::service::chat_service::ChatService;

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET `/api/chats` — newest first
pub async fn list_chats_handler(State(svc): State<ChatService>) -> Response {
    match svc.get_chats().await {
        Ok(chats) => Json(chats).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/api/chats`
pub async fn create_chat_handler(
    State(svc): State<ChatService>,
    Json(request): Json<CreateChatRequest>,
) -> Response {
    match svc.create_chat(request).await {
        Ok(chat) => (StatusCode::CREATED, Json(chat)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats/{id}`
pub async fn get_chat_handler(Path(id): Path<String>, State(svc): State<ChatService>) -> Response {
    match svc.get_chat(&id).await {
        Ok(chat) => Json(chat).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PATCH `/api/chats/{id}`
pub async fn rename_chat_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
    Json(request): Json<RenameChatRequest>,
) -> Response {
    match svc.rename_chat(&id, &request.title).await {
        Ok(chat) => Json(chat).into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE `/api/chats/{id}`
pub async fn delete_chat_handler(Path(id): Path<String>, State(svc): State<ChatService>) -> Response {
    match svc.delete_chat(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/api/chats/{id}/messages` — replaces the whole message list
pub async fn replace_messages_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
    Json(request): Json<ReplaceMessagesRequest>,
) -> Response {
    match svc.overwrite_messages(&id, request.messages).await {
        Ok(chat) => Json(chat).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/api/chats/{id}/ask` — waits for the whole answer, returns the transcript
pub async fn ask_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
    Json(request): Json<AskRequest>,
) -> Response {
    match svc.ask(&id, request.query).await {
        Ok(answered) => Json(answered.transcript).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Helper ────────────────────────────────────────────────────────────────────

pub fn status_for(err: &AppError) -> StatusCode {
    if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_conflict() {
        StatusCode::CONFLICT
    } else if err.is_transport() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(err: &AppError) -> Response {
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            status_for(&AppError::EmptyField { field_name: "query".into() }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&AppError::ChatNotFound { id: "x".into() }), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AppError::IngestionInFlight { chat_id: "x".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&AppError::UpstreamStatus { status: 503 }), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&AppError::SessionClosed), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
