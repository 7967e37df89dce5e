//! PostgreSQL-based notification store.
//!
//! Expects a `notifications` table:
//!
//! ```sql
//! CREATE TABLE notifications (
//!     id                UUID PRIMARY KEY,
//!     title             TEXT NOT NULL,
//!     message           TEXT NOT NULL,
//!     recipient_email   TEXT NOT NULL,
//!     notification_type TEXT NOT NULL,
//!     is_read           BOOLEAN NOT NULL DEFAULT FALSE,
//!     status            TEXT NOT NULL,
//!     created_at        TIMESTAMPTZ NOT NULL,
//!     updated_at        TIMESTAMPTZ NOT NULL,
//!     template_name     TEXT,
//!     template_data     TEXT,
//!     user_id           UUID
//! );
//! CREATE INDEX idx_notifications_recipient ON notifications (recipient_email, created_at DESC);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::notification::{Notification, NotificationStatus};

use super::backend::{NotificationStore, StoreError};

const SELECT_COLUMNS: &str = "id, title, message, recipient_email, notification_type, is_read, \
     status, created_at, updated_at, template_name, template_data, user_id";

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    title: String,
    message: String,
    recipient_email: String,
    notification_type: String,
    is_read: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    template_name: Option<String>,
    template_data: Option<String>,
    user_id: Option<Uuid>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let status: NotificationStatus = row.status.parse().map_err(|e| StoreError::Corrupt {
            id: row.id,
            reason: format!("{}", e),
        })?;

        Ok(Notification {
            id: row.id,
            title: row.title,
            message: row.message,
            recipient_email: row.recipient_email,
            notification_type: row.notification_type,
            read: row.is_read,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            template_name: row.template_name,
            template_data: row.template_data,
            associated_user: row.user_id,
        })
    }
}

fn decode_rows(rows: Vec<NotificationRow>) -> Vec<Notification> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Notification::try_from(row) {
                Ok(notification) => Some(notification),
                Err(e) => {
                    tracing::warn!(
                        notification_id = %id,
                        error = %e,
                        "Failed to decode notification row, skipping"
                    );
                    None
                }
            }
        })
        .collect()
}

/// PostgreSQL-based notification store.
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn save(&self, notification: Notification) -> Result<Notification, StoreError> {
        // created_at is never overwritten on conflict
        let row: NotificationRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO notifications (
                id, title, message, recipient_email, notification_type, is_read,
                status, created_at, updated_at, template_name, template_data, user_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                message = EXCLUDED.message,
                recipient_email = EXCLUDED.recipient_email,
                notification_type = EXCLUDED.notification_type,
                is_read = EXCLUDED.is_read,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                template_name = EXCLUDED.template_name,
                template_data = EXCLUDED.template_data,
                user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(notification.id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.recipient_email)
        .bind(&notification.notification_type)
        .bind(notification.read)
        .bind(notification.status.as_str())
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .bind(&notification.template_name)
        .bind(&notification.template_data)
        .bind(notification.associated_user)
        .fetch_one(&self.pool)
        .await?;

        tracing::trace!(
            notification_id = %notification.id,
            status = %notification.status,
            "Notification saved to PostgreSQL"
        );

        Notification::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> =
            sqlx::query_as(&format!("SELECT {} FROM notifications", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        Ok(decode_rows(rows))
    }

    async fn delete_all(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        if notifications.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = notifications.iter().map(|n| n.id).collect();
        let result = sqlx::query("DELETE FROM notifications WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: NotificationStatus,
        status: NotificationStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $3, is_read = is_read OR $4, updated_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(status == NotificationStatus::Read)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(&self, recipient_email: &str) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, status = $2, updated_at = $3
            WHERE recipient_email = $1 AND NOT is_read
            "#,
        )
        .bind(recipient_email)
        .bind(NotificationStatus::Read.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn update_status_by_recipient(
        &self,
        recipient_email: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $3, is_read = is_read OR $4, updated_at = $5
            WHERE recipient_email = $1 AND status = $2
            "#,
        )
        .bind(recipient_email)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(to == NotificationStatus::Read)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn find_by_recipient(&self, recipient_email: &str) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE recipient_email = $1",
            SELECT_COLUMNS
        ))
        .bind(recipient_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }
}
