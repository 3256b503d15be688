use async_trait::async_trait;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::agent::QueryServiceClient;
use crate::db::chat_repository::ChatRepository;
use crate::db::message_repository::MessageRepository;
use crate::errors::AppError;
use crate::ingest::{ChatSession, Progress, Reply, SessionRegistry};
use crate::models::{Chat, ChatDetail, ChatTranscript, CreateChatRequest, Message};
use crate::traits::TranscriptStore;

const MAX_TITLE_LENGTH: usize = 200;

/// Outcome of a finished ask: the reply and the transcript it ended in.
#[derive(Debug, Clone)]
pub struct Answered {
    pub reply: Reply,
    pub transcript: ChatTranscript,
}

/// An ingestion running on its own task.
///
/// The task owns the session lock, so dropping this handle (a client going
/// away) does not abandon the session half-way.
pub struct PendingAnswer {
    pub progress: watch::Receiver<Progress>,
    pub task: JoinHandle<Result<Answered, AppError>>,
}

impl PendingAnswer {
    pub async fn finish(self) -> Result<Answered, AppError> {
        self.task.await.map_err(|e| {
            error!("Ingestion task failed to complete: {e}");
            AppError::Unexpected("Ingestion task aborted".to_string())
        })?
    }
}

#[derive(Clone)]
pub struct ChatService {
    chat_repo: ChatRepository,
    message_repo: MessageRepository,
    agent: QueryServiceClient,
    sessions: SessionRegistry,
}

impl ChatService {
    pub fn new(
        chat_repo: ChatRepository,
        message_repo: MessageRepository,
        agent: QueryServiceClient,
        sessions: SessionRegistry,
    ) -> Self {
        Self { chat_repo, message_repo, agent, sessions }
    }

    // ── Persistence collaborator ──────────────────────────────────────────────

    pub async fn get_chats(&self) -> Result<Vec<Chat>, AppError> {
        self.chat_repo.find_all().await
    }

    pub async fn get_chat(&self, id: &str) -> Result<ChatDetail, AppError> {
        let chat = self.find_chat(id).await?;
        let messages = self.message_repo.find_by_chat_id(id).await?;
        Ok(ChatDetail { chat, messages })
    }

    pub async fn create_chat(&self, request: CreateChatRequest) -> Result<ChatDetail, AppError> {
        let title = validate_title(&request.title)?;
        let chat = self.chat_repo.save(&Chat::new(title)).await?;
        if !request.messages.is_empty() {
            self.message_repo.replace_all(&chat.id, &request.messages).await?;
        }
        info!("Created chat {} with {} messages", chat.id, request.messages.len());
        self.get_chat(&chat.id).await
    }

    pub async fn rename_chat(&self, id: &str, title: &str) -> Result<Chat, AppError> {
        let title = validate_title(title)?;
        self.chat_repo
            .rename(id, &title)
            .await?
            .ok_or_else(|| AppError::ChatNotFound { id: id.to_string() })
    }

    /// Refused while an answer for the chat is still streaming.
    pub async fn delete_chat(&self, id: &str) -> Result<(), AppError> {
        let session = self.sessions.acquire(id).await?;
        let deleted = self.chat_repo.delete(id).await?;
        drop(session);
        if !deleted {
            return Err(AppError::ChatNotFound { id: id.to_string() });
        }
        info!("Deleted chat {id}");
        Ok(())
    }

    /// Full overwrite of the stored list. Refused while an answer streams.
    pub async fn overwrite_messages(
        &self,
        id: &str,
        messages: Vec<Message>,
    ) -> Result<ChatDetail, AppError> {
        let mut session = self.sessions.acquire(id).await?;
        let chat = self.find_chat(id).await?;
        self.message_repo.replace_all(id, &messages).await?;
        session.load(id, messages.clone())?;
        Ok(ChatDetail { chat, messages })
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    /// Locks the chat's session and refreshes it from the database.
    /// On failure the guard is dropped, which releases the session entry.
    pub async fn acquire_session(&self, id: &str) -> Result<OwnedMutexGuard<ChatSession>, AppError> {
        let mut session = self.sessions.acquire(id).await?;
        let messages = self.get_chat(id).await?.messages;
        session.load(id, messages)?;
        Ok(session)
    }

    /// Starts an ingestion for `query` on a background task.
    pub async fn start_ask(
        &self,
        id: &str,
        query: String,
        cancel: CancellationToken,
    ) -> Result<PendingAnswer, AppError> {
        let mut session = self.acquire_session(id).await?;
        let progress = session.subscribe();
        let svc = self.clone();
        let task = tokio::spawn(async move {
            let reply = session.send_message(&query, &svc.agent, &svc, &cancel).await?;
            Ok(Answered { reply, transcript: session.transcript().clone() })
        });
        Ok(PendingAnswer { progress, task })
    }

    pub async fn ask(&self, id: &str, query: String) -> Result<Answered, AppError> {
        self.start_ask(id, query, CancellationToken::new()).await?.finish().await
    }

    async fn find_chat(&self, id: &str) -> Result<Chat, AppError> {
        self.chat_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ChatNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl TranscriptStore for ChatService {
    async fn replace_messages(&self, chat_id: &str, messages: &[Message]) -> Result<(), AppError> {
        self.message_repo.replace_all(chat_id, messages).await
    }
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::EmptyField { field_name: "title".to_string() });
    }
    let length = title.chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "title".to_string(),
            max_length: MAX_TITLE_LENGTH,
            actual_length: length,
        });
    }
    Ok(title.to_string())
}
