//! Message body resolver: resolves the outgoing body either from the literal
//! payload stored on the entity or by merging a named template with per-item
//! data.
//!
//! Resolution happens on the hot path of every dispatch attempt and is never
//! cached; retries re-fetch and re-merge.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{MessageBody, NotificationEntity, TemplateType};
use crate::repository::TemplateStore;
use crate::services::protect::ContentProtector;

// =============================================================================
// Merge Engine
// =============================================================================

/// Injectable template merge engine
pub trait MergeEngine: Send + Sync {
    /// Merges template content with a JSON data payload
    fn merge(&self, template: &str, data: &str) -> AppResult<String>;
}

/// Default merge engine: replaces `{{key}}` tokens with values from a flat
/// JSON object. Non-string values are rendered with their JSON form.
#[derive(Default)]
pub struct TokenMergeEngine;

impl MergeEngine for TokenMergeEngine {
    fn merge(&self, template: &str, data: &str) -> AppResult<String> {
        let values: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| AppError::Validation(format!("Template data is not valid JSON: {}", e)))?;

        let object = values.as_object().ok_or_else(|| {
            AppError::Validation("Template data must be a JSON object".to_string())
        })?;

        let mut merged = template.to_string();
        for (key, value) in object {
            let token = format!("{{{{{}}}}}", key);
            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            merged = merged.replace(&token, &replacement);
        }

        Ok(merged)
    }
}

// =============================================================================
// Body Resolver
// =============================================================================

pub struct MessageBodyResolver {
    templates: Arc<dyn TemplateStore>,
    merge: Arc<dyn MergeEngine>,
    protector: Arc<dyn ContentProtector>,
}

impl MessageBodyResolver {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        merge: Arc<dyn MergeEngine>,
        protector: Arc<dyn ContentProtector>,
    ) -> Self {
        Self {
            templates,
            merge,
            protector,
        }
    }

    /// Resolves the outgoing body for one entity.
    ///
    /// A literal body wins; otherwise the template reference must be complete
    /// (id AND data), the template must exist, and the merge must succeed.
    pub async fn get_message_body(
        &self,
        application: &str,
        entity: &NotificationEntity,
    ) -> AppResult<MessageBody> {
        if let Some(body) = entity.body.as_deref().filter(|b| !b.is_empty()) {
            return Ok(MessageBody {
                content: self.protector.reveal(body)?,
                content_type: TemplateType::Html,
            });
        }

        let template_id = entity
            .template_id
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Notification '{}' has neither a body nor a template reference",
                    entity.notification_id
                ))
            })?;

        let template_data = entity
            .template_data
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Template data is required when template '{}' is set",
                    template_id
                ))
            })?;

        let template = self
            .templates
            .get_template(application, template_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Template '{}' not found for application '{}'",
                    template_id, application
                ))
            })?;

        let data = self.protector.reveal(template_data)?;
        let content = self.merge.merge(&template.content, &data)?;

        Ok(MessageBody {
            content,
            content_type: template.template_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MailTemplate, NotificationKind, NotificationStatus};
    use crate::services::protect::NoopProtector;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    struct FakeTemplateStore {
        template: Option<MailTemplate>,
    }

    #[async_trait]
    impl TemplateStore for FakeTemplateStore {
        async fn get_template(
            &self,
            _application: &str,
            _template_id: &str,
        ) -> AppResult<Option<MailTemplate>> {
            Ok(self.template.clone())
        }
    }

    fn entity(
        body: Option<&str>,
        template_id: Option<&str>,
        template_data: Option<&str>,
    ) -> NotificationEntity {
        let now = Utc::now();
        NotificationEntity {
            id: Uuid::new_v4(),
            notification_id: "n-1".to_string(),
            application: "crm".to_string(),
            kind: NotificationKind::Email,
            to_addresses: vec!["user@example.com".to_string()],
            cc_addresses: Vec::new(),
            bcc_addresses: Vec::new(),
            reply_to_addresses: Vec::new(),
            from_address: None,
            subject: "s".to_string(),
            body: body.map(String::from),
            template_id: template_id.map(String::from),
            template_data: template_data.map(String::from),
            status: NotificationStatus::Processing,
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
        }
    }

    fn resolver(template: Option<MailTemplate>) -> MessageBodyResolver {
        MessageBodyResolver::new(
            Arc::new(FakeTemplateStore { template }),
            Arc::new(TokenMergeEngine),
            Arc::new(NoopProtector),
        )
    }

    fn stored_template(content: &str) -> MailTemplate {
        let now = Utc::now();
        MailTemplate {
            application: "crm".to_string(),
            template_id: "T1".to_string(),
            content: content.to_string(),
            template_type: TemplateType::Html,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_merge_replaces_tokens() {
        let merged = TokenMergeEngine
            .merge(
                "Hello {{name}}, order {{order}} total {{total}}",
                r#"{"name": "Ada", "order": "A-1", "total": 42}"#,
            )
            .unwrap();

        assert_eq!(merged, "Hello Ada, order A-1 total 42");
    }

    #[test]
    fn test_token_merge_rejects_non_object_data() {
        let result = TokenMergeEngine.merge("Hello {{name}}", r#"["not", "an", "object"]"#);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_literal_body_wins() {
        let resolver = resolver(None);
        let entity = entity(Some("<p>literal</p>"), Some("T1"), Some("{}"));

        let body = resolver.get_message_body("crm", &entity).await.unwrap();
        assert_eq!(body.content, "<p>literal</p>");
    }

    #[tokio::test]
    async fn test_template_merge_path() {
        let resolver = resolver(Some(stored_template("Hi {{name}}")));
        let entity = entity(None, Some("T1"), Some(r#"{"name": "Ada"}"#));

        let body = resolver.get_message_body("crm", &entity).await.unwrap();
        assert_eq!(body.content, "Hi Ada");
        assert_eq!(body.content_type, TemplateType::Html);
    }

    #[tokio::test]
    async fn test_missing_template_data_is_validation_error() {
        let resolver = resolver(Some(stored_template("Hi {{name}}")));
        let entity = entity(None, Some("T1"), None);

        let result = resolver.get_message_body("crm", &entity).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_template_not_found_is_validation_error() {
        let resolver = resolver(None);
        let entity = entity(None, Some("T1"), Some("{}"));

        let err = resolver.get_message_body("crm", &entity).await.unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("T1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
