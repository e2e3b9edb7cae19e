//! Notification models: persisted entities, delivery status, and the
//! request/response DTOs accepted by the queue/send endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Status Enum
// =============================================================================

/// Delivery status of a notification.
///
/// `Queued -> Processing -> {Sent | Retrying | Failed | FakeMail | Invalid}`,
/// with `Retrying -> Processing` on re-dispatch bounded by the configured
/// retry limit. `FakeMail` is a terminal non-error state used when the owning
/// application has mail delivery switched off. Once `Sent`, callers never
/// move an entity backwards (already-sent filtering, not entity enforcement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Processing,
    Sent,
    Retrying,
    Failed,
    FakeMail,
    Invalid,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Queued => write!(f, "queued"),
            NotificationStatus::Processing => write!(f, "processing"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Retrying => write!(f, "retrying"),
            NotificationStatus::Failed => write!(f, "failed"),
            NotificationStatus::FakeMail => write!(f, "fakemail"),
            NotificationStatus::Invalid => write!(f, "invalid"),
        }
    }
}

// =============================================================================
// Kind Enum
// =============================================================================

/// Kind of notification (plain email or meeting invite)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Email,
    Meeting,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Email => write!(f, "email"),
            NotificationKind::Meeting => write!(f, "meeting"),
        }
    }
}

// =============================================================================
// Notification Entity
// =============================================================================

/// Persisted notification record. Email and meeting invites share one table;
/// the meeting-only columns are null for plain email.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationEntity {
    pub id: Uuid,
    pub notification_id: String,
    pub application: String,
    pub kind: NotificationKind,
    /// Recipients; required attendees for meetings
    pub to_addresses: Vec<String>,
    /// CC recipients; optional attendees for meetings
    pub cc_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub reply_to_addresses: Vec<String>,
    pub from_address: Option<String>,
    pub subject: String,
    /// Literal body; mutually exclusive with the template reference
    pub body: Option<String>,
    pub template_id: Option<String>,
    /// Merge payload for the template (JSON object as text)
    pub template_data: Option<String>,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub try_count: i32,
    pub account_used: Option<String>,
    pub tracking_id: Option<String>,
    /// JSON list of `{file_name, file_base64, is_inline}`
    pub attachments: serde_json::Value,
    pub send_on_utc: Option<DateTime<Utc>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// JSON recurrence descriptor (see `MeetingRecurrence`)
    pub recurrence: Option<serde_json::Value>,
    pub is_cancel: bool,
    pub is_online_meeting: bool,
    pub sequence_number: i32,
    pub ical_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationEntity {
    /// Parses the stored attachment list
    pub fn attachment_list(&self) -> Vec<Attachment> {
        serde_json::from_value(self.attachments.clone()).unwrap_or_default()
    }

    /// Parses the stored recurrence descriptor, if any
    pub fn recurrence_rule(&self) -> Option<MeetingRecurrence> {
        self.recurrence
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// A single mail attachment, carried inline as base64
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_base64: String,
    #[serde(default)]
    pub is_inline: bool,
}

// =============================================================================
// Meeting Recurrence
// =============================================================================

/// Recurrence frequency for meeting invites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
}

/// Recurrence descriptor for a meeting series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecurrence {
    pub pattern: RecurrencePattern,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Day names for weekly patterns ("monday".."sunday")
    #[serde(default)]
    pub days_of_week: Vec<String>,
    /// End after N occurrences
    #[serde(default)]
    pub occurrences: Option<u32>,
    /// End by date
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

fn default_interval() -> u32 {
    1
}

// =============================================================================
// Request DTOs
// =============================================================================

/// Inbound email notification item
#[derive(Debug, Clone, Deserialize)]
pub struct EmailNotificationItem {
    #[serde(default)]
    pub notification_id: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_data: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub send_on_utc: Option<DateTime<Utc>>,
}

/// Inbound meeting invite item
#[derive(Debug, Clone, Deserialize)]
pub struct MeetingNotificationItem {
    #[serde(default)]
    pub notification_id: Option<String>,
    pub required_attendees: Vec<String>,
    #[serde(default)]
    pub optional_attendees: Vec<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_data: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Option<MeetingRecurrence>,
    #[serde(default)]
    pub is_cancel: bool,
    #[serde(default)]
    pub is_online_meeting: bool,
    #[serde(default)]
    pub sequence_number: i32,
    #[serde(default)]
    pub ical_uid: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub send_on_utc: Option<DateTime<Utc>>,
}

// =============================================================================
// Response DTOs
// =============================================================================

/// Per-item receipt returned by the queue/send endpoints
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReceipt {
    pub notification_id: String,
    pub status: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&NotificationEntity> for NotificationReceipt {
    fn from(entity: &NotificationEntity) -> Self {
        Self {
            notification_id: entity.notification_id.clone(),
            status: entity.status,
            error_message: entity.error_message.clone(),
        }
    }
}

// =============================================================================
// Queue wire contract
// =============================================================================

/// One element of the JSON array written per queue chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    pub notification_id: String,
    pub application: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub ignore_already_sent: bool,
}

/// Re-hydration payload assembled from one queue chunk
#[derive(Debug, Clone)]
pub struct QueueNotificationItem {
    pub notification_ids: Vec<String>,
    pub ignore_already_sent: bool,
}

impl QueueNotificationItem {
    /// Collapses a chunk of envelopes into the ids to re-load.
    /// `ignore_already_sent` is set if any envelope requests it.
    pub fn from_envelopes(envelopes: &[QueueEnvelope]) -> Self {
        Self {
            notification_ids: envelopes
                .iter()
                .map(|e| e.notification_id.clone())
                .collect(),
            ignore_already_sent: envelopes.iter().any(|e| e.ignore_already_sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_roundtrip() {
        assert_eq!(NotificationStatus::FakeMail.to_string(), "fakemail");
        assert_eq!(NotificationStatus::Retrying.to_string(), "retrying");
    }

    #[test]
    fn test_queue_item_from_envelopes() {
        let envelopes = vec![
            QueueEnvelope {
                notification_id: "a".to_string(),
                application: "app1".to_string(),
                kind: NotificationKind::Email,
                ignore_already_sent: false,
            },
            QueueEnvelope {
                notification_id: "b".to_string(),
                application: "app1".to_string(),
                kind: NotificationKind::Email,
                ignore_already_sent: true,
            },
        ];

        let item = QueueNotificationItem::from_envelopes(&envelopes);
        assert_eq!(item.notification_ids, vec!["a", "b"]);
        assert!(item.ignore_already_sent);
    }

    #[test]
    fn test_email_item_defaults() {
        let item: EmailNotificationItem = serde_json::from_value(serde_json::json!({
            "to": ["user@example.com"],
            "subject": "hello"
        }))
        .unwrap();

        assert!(item.notification_id.is_none());
        assert!(item.cc.is_empty());
        assert!(item.attachments.is_empty());
    }

    #[test]
    fn test_recurrence_deserializes_with_defaults() {
        let rec: MeetingRecurrence = serde_json::from_value(serde_json::json!({
            "pattern": "weekly",
            "days_of_week": ["monday", "wednesday"]
        }))
        .unwrap();

        assert_eq!(rec.pattern, RecurrencePattern::Weekly);
        assert_eq!(rec.interval, 1);
        assert!(rec.occurrences.is_none());
    }
}
