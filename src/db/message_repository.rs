use chrono::Utc;
use sqlx::PgPool;
use tracing::error;

use crate::errors::AppError;
use crate::models::{Message, MessageRole};

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_chat_id(&self, chat_id: &str) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query(
            "SELECT role, content
             FROM messages
             WHERE chat_id = $1
             ORDER BY position ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch messages for chat {chat_id}: {e}");
            AppError::db_query(format!("Failed to fetch messages for chat {chat_id}"), e)
        })?;

        rows.into_iter()
            .map(|row: sqlx::postgres::PgRow| {
                use sqlx::Row;
                let role_str: String = row.try_get("role")
                    .map_err(|e| AppError::db_query("Failed to read role", e))?;
                let role = MessageRole::try_from(role_str)
                    .map_err(|e| AppError::Unexpected(format!("Unknown message role: {e}")))?;
                Ok(Message {
                    role,
                    content: row.try_get("content")
                        .map_err(|e| AppError::db_query("Failed to read content", e))?,
                })
            })
            .collect()
    }

    /// Overwrites the chat's messages and bumps its `updated_at`, atomically.
    /// Replaying the same list leaves the same rows behind.
    pub async fn replace_all(&self, chat_id: &str, messages: &[Message]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open transaction for chat {chat_id}: {e}");
            AppError::db_query("Failed to begin transaction", e)
        })?;

        let now = Utc::now();
        let touched = sqlx::query("UPDATE chats SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::db_query("Failed to update chat", e))?;
        if touched.rows_affected() == 0 {
            return Err(AppError::ChatNotFound { id: chat_id.to_string() });
        }

        sqlx::query("DELETE FROM messages WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to clear messages for chat {chat_id}: {e}");
                AppError::db_query("Failed to clear messages", e)
            })?;

        for (position, message) in messages.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| AppError::Unexpected(format!("Chat {chat_id} has too many messages")))?;
            sqlx::query(
                "INSERT INTO messages (id, chat_id, position, role, content, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(chat_id)
            .bind(position)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert message {position} for chat {chat_id}: {e}");
                AppError::db_query("Failed to save message", e)
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit messages for chat {chat_id}: {e}");
            AppError::db_query("Failed to commit messages", e)
        })
    }
}
