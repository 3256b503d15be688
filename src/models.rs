use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(title: String) -> Self {
        let now = Utc::now();
        Self { id: uuid::Uuid::new_v4().to_string(), title, created_at: now, updated_at: now }
    }
}

/// A chat together with its ordered message list.
#[derive(Debug, Clone, Serialize)]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// One transcript entry, as exchanged with the query service and stored per chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    #[default]
    Idle,
    Loading,
    Error,
    Message,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub messages: Vec<Message>,
    #[serde(rename = "chatState")]
    pub chat_state: ChatState,
}

/// A normalized citation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub url: String,
}

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct RenameChatRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceMessagesRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Body POSTed to the upstream query service.
#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub messages: &'a [Message],
}

// ── WebSocket protocol ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WsAskRequest {
    pub chat_id: String,
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    StreamStart { chat_id: String },
    StreamChunk { content: String },
    StreamEnd { full_content: String, chat_state: ChatState },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_serializes_with_camel_case_state() {
        let transcript = ChatTranscript {
            messages: vec![Message::user("hi")],
            chat_state: ChatState::Loading,
        };
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{ "role": "user", "content": "hi" }],
                "chatState": "loading"
            })
        );
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!(MessageRole::try_from("ASSISTANT".to_string()), Ok(MessageRole::Assistant));
        assert!(MessageRole::try_from("tool".to_string()).is_err());
    }

    #[test]
    fn ws_events_are_internally_tagged() {
        let json = serde_json::to_value(WsEvent::StreamChunk { content: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "stream_chunk", "content": "x" }));
    }
}
