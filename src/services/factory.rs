//! Notification entity factory: converts inbound request items into
//! persistable entities with generated identifiers, default status, and UTC
//! timestamps. Template bodies are NOT resolved here; that happens on the
//! dispatch hot path.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Attachment, EmailNotificationItem, MeetingNotificationItem, NotificationEntity,
    NotificationKind, NotificationStatus,
};
use crate::services::protect::ContentProtector;

pub struct NotificationFactory {
    protector: Arc<dyn ContentProtector>,
}

impl NotificationFactory {
    pub fn new(protector: Arc<dyn ContentProtector>) -> Self {
        Self { protector }
    }

    /// Creates email entities from inbound items
    pub fn create_email_entities(
        &self,
        application: &str,
        items: &[EmailNotificationItem],
        initial_status: NotificationStatus,
    ) -> AppResult<Vec<NotificationEntity>> {
        validate_batch(application, items.len())?;

        items
            .iter()
            .map(|item| {
                validate_content(item.body.as_deref(), item.template_id.as_deref())?;

                let mut entity = self.base_entity(
                    application,
                    NotificationKind::Email,
                    item.notification_id.as_deref(),
                    initial_status,
                )?;

                entity.to_addresses = item.to.clone();
                entity.cc_addresses = item.cc.clone();
                entity.bcc_addresses = item.bcc.clone();
                entity.reply_to_addresses = item.reply_to.clone();
                entity.from_address = item.from.clone();
                entity.subject = item.subject.clone();
                entity.body = self.protect_opt(item.body.as_deref())?;
                entity.template_id = item.template_id.clone();
                entity.template_data = self.protect_opt(item.template_data.as_deref())?;
                entity.tracking_id = item.tracking_id.clone();
                entity.send_on_utc = item.send_on_utc;
                entity.attachments = attachments_json(&item.attachments)?;

                Ok(entity)
            })
            .collect()
    }

    /// Creates meeting-invite entities from inbound items
    pub fn create_meeting_entities(
        &self,
        application: &str,
        items: &[MeetingNotificationItem],
        initial_status: NotificationStatus,
    ) -> AppResult<Vec<NotificationEntity>> {
        validate_batch(application, items.len())?;

        items
            .iter()
            .map(|item| {
                validate_content(item.body.as_deref(), item.template_id.as_deref())?;

                let mut entity = self.base_entity(
                    application,
                    NotificationKind::Meeting,
                    item.notification_id.as_deref(),
                    initial_status,
                )?;

                entity.to_addresses = item.required_attendees.clone();
                entity.cc_addresses = item.optional_attendees.clone();
                entity.from_address = item.from.clone();
                entity.subject = item.subject.clone();
                entity.body = self.protect_opt(item.body.as_deref())?;
                entity.template_id = item.template_id.clone();
                entity.template_data = self.protect_opt(item.template_data.as_deref())?;
                entity.tracking_id = item.tracking_id.clone();
                entity.send_on_utc = item.send_on_utc;
                entity.attachments = attachments_json(&item.attachments)?;
                entity.starts_at = Some(item.starts_at);
                entity.ends_at = Some(item.ends_at);
                entity.recurrence = item
                    .recurrence
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()
                    .map_err(|e| AppError::Internal(format!("Invalid recurrence: {}", e)))?;
                entity.is_cancel = item.is_cancel;
                entity.is_online_meeting = item.is_online_meeting;
                entity.sequence_number = item.sequence_number;
                entity.ical_uid = item.ical_uid.clone();

                Ok(entity)
            })
            .collect()
    }

    fn base_entity(
        &self,
        application: &str,
        kind: NotificationKind,
        notification_id: Option<&str>,
        initial_status: NotificationStatus,
    ) -> AppResult<NotificationEntity> {
        let now = Utc::now();

        // Keep a non-blank caller-supplied id verbatim, else generate one
        let notification_id = match notification_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        Ok(NotificationEntity {
            id: Uuid::new_v4(),
            notification_id,
            application: application.to_string(),
            kind,
            to_addresses: Vec::new(),
            cc_addresses: Vec::new(),
            bcc_addresses: Vec::new(),
            reply_to_addresses: Vec::new(),
            from_address: None,
            subject: String::new(),
            body: None,
            template_id: None,
            template_data: None,
            status: initial_status,
            error_message: None,
            try_count: 0,
            account_used: None,
            tracking_id: None,
            attachments: serde_json::Value::Array(Vec::new()),
            send_on_utc: None,
            starts_at: None,
            ends_at: None,
            recurrence: None,
            is_cancel: false,
            is_online_meeting: false,
            sequence_number: 0,
            ical_uid: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn protect_opt(&self, content: Option<&str>) -> AppResult<Option<String>> {
        content
            .filter(|c| !c.is_empty())
            .map(|c| self.protector.protect(c))
            .transpose()
    }
}

fn validate_batch(application: &str, item_count: usize) -> AppResult<()> {
    if application.trim().is_empty() {
        return Err(AppError::Validation(
            "Application name must not be blank".to_string(),
        ));
    }
    if item_count == 0 {
        return Err(AppError::Validation(
            "Notification item list must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_content(body: Option<&str>, template_id: Option<&str>) -> AppResult<()> {
    let has_body = body.map(|b| !b.trim().is_empty()).unwrap_or(false);
    let has_template = template_id.map(|t| !t.trim().is_empty()).unwrap_or(false);

    if !has_body && !has_template {
        return Err(AppError::Validation(
            "Either a body or a template reference is required".to_string(),
        ));
    }

    Ok(())
}

fn attachments_json(attachments: &[Attachment]) -> AppResult<serde_json::Value> {
    serde_json::to_value(attachments)
        .map_err(|e| AppError::Internal(format!("Invalid attachments: {}", e)))
}
