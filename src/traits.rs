//! Seams between the ingestion state machine and the outside world.
//!
//! The production implementations are [`QueryServiceClient`] (upstream
//! stream) and [`ChatService`] (persistence). Tests substitute in-memory
//! versions.
//!
//! [`QueryServiceClient`]: crate::agent::QueryServiceClient
//! [`ChatService`]: crate::service::chat_service::ChatService

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::Message;

/// Sequential reader over one streamed response body.
#[async_trait]
pub trait ChunkReader: Send {
    /// Returns `Ok(None)` once the body is complete.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, AppError>;
}

/// Opens an answer stream for a transcript.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn open(&self, messages: &[Message]) -> Result<Box<dyn ChunkReader>, AppError>;
}

/// Durable store for a chat's message list.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Full overwrite of the stored list, never a merge.
    async fn replace_messages(&self, chat_id: &str, messages: &[Message]) -> Result<(), AppError>;
}
