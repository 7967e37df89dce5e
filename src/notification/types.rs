use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a notification record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    /// Created, delivery not (yet) confirmed
    #[default]
    Pending,
    /// Delivered to the mail transport
    Sent,
    /// Acknowledged by the recipient
    Read,
    /// Soft-deleted, awaiting purge
    Deleted,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Read => "READ",
            NotificationStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid notification status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for NotificationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "READ" => Ok(NotificationStatus::Read),
            "DELETED" => Ok(NotificationStatus::Deleted),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A single addressed notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier, assigned at creation
    pub id: Uuid,
    pub title: String,
    pub message: String,
    /// Delivery address and query key
    pub recipient_email: String,
    /// Free-text category, e.g. "COURSE_UPDATE"
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Legacy read flag, kept in sync with `status == Read`
    pub read: bool,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Serialized JSON object of template variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_data: Option<String>,
    /// Lookup key of the originating/target user; never owning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associated_user: Option<Uuid>,
}

impl Notification {
    /// Build a fresh `PENDING` record from a creation request
    pub fn from_request(request: NewNotification) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: request.title,
            message: request.message,
            recipient_email: request.recipient_email,
            notification_type: request.notification_type,
            read: false,
            status: NotificationStatus::Pending,
            created_at: now,
            updated_at: now,
            template_name: request.template_name,
            template_data: request.template_data,
            associated_user: request.associated_user,
        }
    }

    /// Whether a named template was requested
    pub fn is_template(&self) -> bool {
        self.template_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    /// Title and recipient must both be present for a delivery attempt
    pub fn is_deliverable(&self) -> bool {
        !self.title.is_empty() && !self.recipient_email.is_empty()
    }

    /// Unread under either the legacy flag or the status field
    pub fn is_unread(&self) -> bool {
        !self.read || self.status == NotificationStatus::Pending
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_read(&mut self) {
        self.read = true;
        self.status = NotificationStatus::Read;
        self.touch();
    }

    /// Set the status; `Read` also raises the legacy flag
    pub fn set_status(&mut self, status: NotificationStatus) {
        self.status = status;
        if status == NotificationStatus::Read {
            self.read = true;
        }
        self.touch();
    }
}

/// Request to create a notification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub recipient_email: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub associated_user: Option<Uuid>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub template_data: Option<String>,
}

impl NewNotification {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        recipient_email: impl Into<String>,
        notification_type: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            recipient_email: recipient_email.into(),
            notification_type: notification_type.into(),
            ..Default::default()
        }
    }

    pub fn associated_user(mut self, user_id: Uuid) -> Self {
        self.associated_user = Some(user_id);
        self
    }

    pub fn template_name(mut self, name: impl Into<String>) -> Self {
        self.template_name = Some(name.into());
        self
    }

    /// Set raw serialized template data
    pub fn template_data(mut self, data: impl Into<String>) -> Self {
        self.template_data = Some(data.into());
        self
    }

    /// Serialize a value as the template data
    pub fn template_data_from<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.template_data = Some(serde_json::to_string(data)?);
        Ok(self)
    }
}

/// Unread and total counts for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationCounts {
    pub unread: usize,
    pub total: usize,
}
