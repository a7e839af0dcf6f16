use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};

use crate::domain::entities::{Conversation, ConversationMessage, MessageAuthor};
use crate::domain::ports::conversation_repository::ConversationRepository;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::{get_enum, get_opt_ts, get_ts, ts, Database};

const CONVERSATION_COLUMNS: &str = "c.id, c.agent_id, c.customer_name, c.customer_phone, \
     c.message_count, c.last_message_at, c.last_customer_message_at, c.created_at";

fn conversation_from_row(row: &AnyRow) -> ApiResult<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        message_count: row.try_get("message_count")?,
        last_message_at: get_opt_ts(row, "last_message_at")?,
        last_customer_message_at: get_opt_ts(row, "last_customer_message_at")?,
        created_at: get_ts(row, "created_at")?,
    })
}

#[async_trait]
impl ConversationRepository for Database {
    async fn get_conversation(&self, id: i64) -> ApiResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations c WHERE c.id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn upsert_conversation(
        &self,
        id: i64,
        agent_id: i64,
        customer_name: &str,
        customer_phone: &str,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO conversations (id, agent_id, customer_name, customer_phone, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                customer_name = excluded.customer_name,
                customer_phone = excluded.customer_phone",
        )
        .bind(id)
        .bind(agent_id)
        .bind(customer_name)
        .bind(customer_phone)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_message(&self, message: &ConversationMessage) -> ApiResult<bool> {
        let mut tx = self.pool.begin().await?;
        let created_at = ts(message.created_at);

        let inserted = sqlx::query(
            "INSERT INTO conversation_messages (id, conversation_id, author, content, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.author.as_str())
        .bind(&message.content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await?;
            return Ok(false);
        }

        // Watermarks only move forward, so late deliveries do not rewind them
        let customer_at = match message.author {
            MessageAuthor::Customer => Some(created_at.clone()),
            MessageAuthor::Agent => None,
        };
        sqlx::query(
            "UPDATE conversations SET
                message_count = message_count + 1,
                last_message_at = CASE
                    WHEN last_message_at IS NULL OR last_message_at < ? THEN ?
                    ELSE last_message_at END,
                last_customer_message_at = CASE
                    WHEN ? IS NULL THEN last_customer_message_at
                    WHEN last_customer_message_at IS NULL OR last_customer_message_at < ? THEN ?
                    ELSE last_customer_message_at END
             WHERE id = ?",
        )
        .bind(&created_at)
        .bind(&created_at)
        .bind(&customer_at)
        .bind(&customer_at)
        .bind(&customer_at)
        .bind(message.conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> ApiResult<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, author, content, created_at
             FROM conversation_messages
             WHERE conversation_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(|row| {
                Ok(ConversationMessage {
                    id: row.try_get("id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    author: get_enum(row, "author")?,
                    content: row.try_get("content")?,
                    created_at: get_ts(row, "created_at")?,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn find_summary_candidates(
        &self,
        agent_id: i64,
        idle_before: DateTime<Utc>,
        min_messages: i64,
    ) -> ApiResult<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversations c
             WHERE c.agent_id = ?
               AND c.last_customer_message_at IS NOT NULL
               AND c.last_message_at <= ?
               AND c.message_count >= ?
               AND NOT EXISTS (
                   SELECT 1 FROM summary_jobs s
                   WHERE s.conversation_id = c.id
                     AND s.episode_anchor = c.last_customer_message_at
               )
             ORDER BY c.last_message_at ASC",
            CONVERSATION_COLUMNS
        ))
        .bind(agent_id)
        .bind(ts(idle_before))
        .bind(min_messages)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }

    async fn delete_conversation(&self, id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
