use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::AppError;
use crate::models::{ChatState, ChatTranscript, Message};
use crate::traits::{AnswerSource, TranscriptStore};

use super::assembler::{Ingested, IngestionSession};

/// Content of the assistant message recorded when the upstream stream fails.
pub const TRANSPORT_ERROR_MESSAGE: &str = "Sorry, there was an error processing your message.";

const MAX_QUERY_LENGTH: usize = 8000;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Longest wait for the stream to open or for the next chunk.
    pub chunk_timeout: Duration,
    /// Tries per persistence hand-off; 1 means no retry.
    pub persist_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { chunk_timeout: Duration::from_secs(60), persist_attempts: 1 }
    }
}

/// Snapshot published to observers while an answer streams in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub state: ChatState,
    /// Plain answer text received so far in the current ingestion.
    pub answer: String,
}

/// Result of one accepted `send_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: Message,
    /// `Error` when the stream failed and `message` is the fixed error text,
    /// `Message` otherwise.
    pub outcome: ChatState,
}

/// One chat's transcript plus the state machine that appends to it.
///
/// `idle → loading → {message | error} → idle`. Every path ends in `idle`,
/// so another `send_message` is always possible afterwards.
#[derive(Debug)]
pub struct ChatSession {
    chat_id: Option<String>,
    transcript: ChatTranscript,
    progress: watch::Sender<Progress>,
    config: IngestConfig,
}

impl ChatSession {
    pub fn new(chat_id: Option<String>, config: IngestConfig) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self { chat_id, transcript: ChatTranscript::default(), progress, config }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.transcript.chat_state
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Replaces the transcript with a persisted message list.
    pub fn load(&mut self, chat_id: impl Into<String>, messages: Vec<Message>) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.chat_id = Some(chat_id.into());
        self.transcript = ChatTranscript { messages, chat_state: ChatState::Idle };
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.transcript = ChatTranscript::default();
        self.progress.send_replace(Progress::default());
        Ok(())
    }

    /// Sends `query` upstream and appends the assembled answer.
    ///
    /// Transport failures do not surface as `Err`: they end in the fixed
    /// error message being appended. `Err` is reserved for a rejected call
    /// (session busy, invalid query), in which case nothing is appended.
    pub async fn send_message(
        &mut self,
        query: &str,
        source: &dyn AnswerSource,
        store: &dyn TranscriptStore,
        cancel: &CancellationToken,
    ) -> Result<Reply, AppError> {
        self.ensure_idle()?;
        validate_query(query)?;

        info!("Sending query for chat {}", self.chat_label());
        self.transcript.messages.push(Message::user(query));
        self.transcript.chat_state = ChatState::Loading;
        self.progress.send_replace(Progress { state: ChatState::Loading, answer: String::new() });
        self.persist(store).await;

        let mut session = IngestionSession::new();
        let outcome = self.stream_answer(&mut session, source, cancel).await;
        let (message, state) = match outcome.and_then(|()| session.finalize()) {
            Ok(message) => (message, ChatState::Message),
            Err(e) => {
                error!("Ingestion failed for chat {}: {e}", self.chat_label());
                (Message::assistant(TRANSPORT_ERROR_MESSAGE), ChatState::Error)
            }
        };
        drop(session);

        self.transcript.messages.push(message.clone());
        self.set_state(state);
        self.persist(store).await;
        self.set_state(ChatState::Idle);
        info!(
            "Chat {} back to idle with {} messages",
            self.chat_label(),
            self.transcript.messages.len()
        );
        Ok(Reply { message, outcome: state })
    }

    /// Reads the body to completion, one chunk at a time.
    async fn stream_answer(
        &self,
        session: &mut IngestionSession,
        source: &dyn AnswerSource,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let timeout = self.config.chunk_timeout;
        let timed_out = || AppError::StreamTimeout { seconds: timeout.as_secs() };

        let mut reader = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            opened = tokio::time::timeout(timeout, source.open(&self.transcript.messages)) => {
                opened.map_err(|_| timed_out())??
            }
        };

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                read = tokio::time::timeout(timeout, reader.next_chunk()) => {
                    read.map_err(|_| timed_out())??
                }
            };

            let terminated = chunk.is_none();
            match session.ingest_chunk(chunk.as_deref().unwrap_or_default(), terminated)? {
                Ingested::Plain(text) if !text.is_empty() => {
                    self.progress.send_modify(|p| p.answer.push_str(&text));
                }
                Ingested::Plain(_) => {}
                Ingested::Source(descriptor) => debug!("Deferred source {}", descriptor.url),
                Ingested::Dropped => debug!("Dropped citation fragment"),
            }

            if terminated {
                debug!("Stream completed for chat {}", self.chat_label());
                return Ok(());
            }
        }
    }

    /// Best-effort: failures are logged, never propagated.
    async fn persist(&self, store: &dyn TranscriptStore) {
        let Some(chat_id) = self.chat_id.as_deref() else {
            debug!("No active chat; transcript kept in memory only");
            return;
        };
        let attempts = self.config.persist_attempts.max(1);
        for attempt in 1..=attempts {
            match store.replace_messages(chat_id, &self.transcript.messages).await {
                Ok(()) => return,
                Err(e) => {
                    error!("Failed to persist chat {chat_id} (attempt {attempt}/{attempts}): {e}")
                }
            }
        }
    }

    fn set_state(&mut self, state: ChatState) {
        self.transcript.chat_state = state;
        self.progress.send_modify(|p| p.state = state);
    }

    fn ensure_idle(&self) -> Result<(), AppError> {
        if self.transcript.chat_state != ChatState::Idle {
            return Err(AppError::IngestionInFlight { chat_id: self.chat_label().to_string() });
        }
        Ok(())
    }

    fn chat_label(&self) -> &str {
        self.chat_id.as_deref().unwrap_or("<unsaved>")
    }
}

/// Lengths are counted in characters, like every other text field.
fn validate_query(query: &str) -> Result<(), AppError> {
    if query.trim().is_empty() {
        return Err(AppError::EmptyField { field_name: "query".to_string() });
    }
    let length = query.chars().count();
    if length > MAX_QUERY_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "query".to_string(),
            max_length: MAX_QUERY_LENGTH,
            actual_length: length,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_replaces_transcript_and_binds_chat() {
        let mut session = ChatSession::new(None, IngestConfig::default());
        session
            .load("c-9", vec![Message::user("q"), Message::assistant("a")])
            .unwrap();
        assert_eq!(session.chat_id(), Some("c-9"));
        assert_eq!(session.transcript().messages.len(), 2);
        assert_eq!(session.state(), ChatState::Idle);
    }

    #[test]
    fn reset_clears_messages_and_progress() {
        let mut session = ChatSession::new(Some("c".into()), IngestConfig::default());
        session.load("c", vec![Message::user("q")]).unwrap();
        let progress = session.subscribe();
        session.reset().unwrap();
        assert!(session.transcript().messages.is_empty());
        assert_eq!(*progress.borrow(), Progress::default());
    }

    #[test]
    fn busy_session_refuses_load() {
        let mut session = ChatSession::new(Some("c".into()), IngestConfig::default());
        session.set_state(ChatState::Loading);
        assert!(session.load("c", Vec::new()).unwrap_err().is_conflict());
        assert!(session.reset().unwrap_err().is_conflict());
    }

    #[test]
    fn query_length_is_counted_in_characters() {
        let at_limit = "é".repeat(MAX_QUERY_LENGTH);
        assert!(at_limit.len() > MAX_QUERY_LENGTH);
        assert!(validate_query(&at_limit).is_ok());

        let err = validate_query(&"é".repeat(MAX_QUERY_LENGTH + 1)).unwrap_err();
        assert!(matches!(
            err,
            AppError::FieldTooLong { actual_length, .. } if actual_length == MAX_QUERY_LENGTH + 1
        ));
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(validate_query(" \n ").unwrap_err().is_validation());
    }
}
