use chrono::Utc;
use sqlx::PgPool;
use tracing::error;

use crate::errors::AppError;
use crate::models::Chat;

#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<Chat>, AppError> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, title, created_at, updated_at FROM chats ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch all chats: {e}");
            AppError::db_query("Failed to fetch chats", e)
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Chat>, AppError> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, title, created_at, updated_at FROM chats WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find chat {id}: {e}");
            AppError::db_query(format!("Failed to find chat {id}"), e)
        })
    }

    pub async fn save(&self, chat: &Chat) -> Result<Chat, AppError> {
        sqlx::query(
            "INSERT INTO chats (id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&chat.id)
        .bind(&chat.title)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save chat {}: {e}", chat.id);
            AppError::db_query("Failed to save chat", e)
        })?;
        Ok(chat.clone())
    }

    pub async fn rename(&self, id: &str, title: &str) -> Result<Option<Chat>, AppError> {
        sqlx::query_as::<_, Chat>(
            "UPDATE chats SET title = $1, updated_at = $2 WHERE id = $3
             RETURNING id, title, created_at, updated_at",
        )
        .bind(title)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to rename chat {id}: {e}");
            AppError::db_query("Failed to rename chat", e)
        })
    }

    /// Messages go with the chat (`ON DELETE CASCADE`).
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete chat {id}: {e}");
                AppError::db_query("Failed to delete chat", e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}
