//! Delivery providers using the Strategy pattern.
//!
//! One implementation per channel (Graph, SMTP, DirectSend) behind a common
//! trait, selected once at startup by the configured provider type.
//!
//! Providers never throw for per-item failures: every entity in the batch
//! gets a `DeliveryOutcome`, and an `Err` out of `process` is reserved for
//! invariant violations (an empty entity list).

pub mod direct_send;
pub mod graph;
pub mod ics;
pub mod smtp;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::models::{MailSettings, NotificationEntity, NotificationStatus, ProviderType};
use crate::services::accounts::AccountSelector;
use crate::services::body::MessageBodyResolver;

pub use direct_send::DirectSendProvider;
pub use graph::{
    GraphHttpSender, GraphProvider, PasswordGrantTokenProvider, ReqwestGraphSender, TokenProvider,
};
pub use smtp::SmtpProvider;

// =============================================================================
// Delivery Outcome
// =============================================================================

/// Result record for one entity's delivery attempt, merged back into the
/// entity by the orchestrator. Providers never mutate entities directly.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub notification_id: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub account_used: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(notification_id: &str, account_used: Option<&str>) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            status: NotificationStatus::Sent,
            error_message: None,
            account_used: account_used.map(String::from),
        }
    }

    pub fn retrying(notification_id: &str, error: String, account_used: Option<&str>) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            status: NotificationStatus::Retrying,
            error_message: Some(error),
            account_used: account_used.map(String::from),
        }
    }

    pub fn failed(notification_id: &str, error: String, account_used: Option<&str>) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            status: NotificationStatus::Failed,
            error_message: Some(error),
            account_used: account_used.map(String::from),
        }
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Delivery channel implementation
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Attempts delivery for one application's entity batch, producing one
    /// outcome per entity.
    async fn process(
        &self,
        application: &str,
        entities: &[NotificationEntity],
    ) -> AppResult<Vec<DeliveryOutcome>>;

    /// Whether the orchestrator should apply the application's configured
    /// from-override before dispatch. DirectSend uses a fixed relay identity
    /// and leaves the submitted sender untouched.
    fn applies_from_override(&self) -> bool {
        true
    }
}

// =============================================================================
// Provider Factory
// =============================================================================

/// Creates the provider selected by the settings snapshot
pub fn create_provider(
    settings: Arc<AppSettings>,
    selector: Arc<AccountSelector>,
    resolver: Arc<MessageBodyResolver>,
) -> AppResult<Arc<dyn NotificationProvider>> {
    match settings.provider {
        ProviderType::Graph => {
            let graph = settings.graph.clone().ok_or_else(|| {
                AppError::Configuration("Graph settings are not configured".to_string())
            })?;
            let tokens: Arc<dyn TokenProvider> =
                Arc::new(PasswordGrantTokenProvider::new(graph));
            Ok(Arc::new(GraphProvider::new(
                settings, selector, resolver, tokens,
            )))
        }
        ProviderType::Smtp => Ok(Arc::new(SmtpProvider::new(settings, selector, resolver))),
        ProviderType::DirectSend => Ok(Arc::new(DirectSendProvider::new(settings, resolver)?)),
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Recipient lists after applying the send-for-real policy
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRecipients {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
}

/// When `send_for_real` is off, all mail is redirected to the configured
/// override address(es) and CC/BCC/reply-to are cleared.
pub(crate) fn resolve_recipients(
    entity: &NotificationEntity,
    mail: &MailSettings,
) -> ResolvedRecipients {
    if mail.send_for_real {
        ResolvedRecipients {
            to: entity.to_addresses.clone(),
            cc: entity.cc_addresses.clone(),
            bcc: entity.bcc_addresses.clone(),
            reply_to: entity.reply_to_addresses.clone(),
        }
    } else {
        ResolvedRecipients {
            to: mail
                .to_override
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
        }
    }
}

/// Invariant shared by all providers: an empty batch is a caller bug
pub(crate) fn validate_batch(entities: &[NotificationEntity]) -> AppResult<()> {
    if entities.is_empty() {
        return Err(AppError::Validation(
            "Entity list must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, NotificationStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn entity() -> NotificationEntity {
        let now = Utc::now();
        NotificationEntity {
            id: Uuid::new_v4(),
            notification_id: "n-1".to_string(),
            application: "crm".to_string(),
            kind: NotificationKind::Email,
            to_addresses: vec!["real@example.com".to_string()],
            cc_addresses: vec!["cc@example.com".to_string()],
            bcc_addresses: vec!["bcc@example.com".to_string()],
            reply_to_addresses: vec!["reply@example.com".to_string()],
            from_address: None,
            subject: "s".to_string(),
            body: Some("b".to_string()),
            template_id: None,
            template_data: None,
            status: NotificationStatus::Processing,
            error_message: None,
            try_count: 1,
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
        }
    }

    fn mail(send_for_real: bool, to_override: &str) -> MailSettings {
        MailSettings {
            application: "crm".to_string(),
            mail_on: true,
            send_for_real,
            to_override: to_override.to_string(),
            save_to_sent: false,
        }
    }

    #[test]
    fn test_send_for_real_keeps_recipients() {
        let recipients = resolve_recipients(&entity(), &mail(true, "test@example.com"));
        assert_eq!(recipients.to, vec!["real@example.com"]);
        assert_eq!(recipients.cc, vec!["cc@example.com"]);
    }

    #[test]
    fn test_override_redirects_and_clears() {
        let recipients =
            resolve_recipients(&entity(), &mail(false, "test1@example.com; test2@example.com"));
        assert_eq!(recipients.to, vec!["test1@example.com", "test2@example.com"]);
        assert!(recipients.cc.is_empty());
        assert!(recipients.bcc.is_empty());
        assert!(recipients.reply_to.is_empty());
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(validate_batch(&[]).is_err());
        assert!(validate_batch(&[entity()]).is_ok());
    }
}
