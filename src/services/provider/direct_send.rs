//! DirectSend delivery provider.
//!
//! Submits each entity to a fixed relay endpoint under one tenant identity.
//! No account pool is involved and the application's from-override is never
//! applied; the relay stamps its configured sender on every message.

use async_trait::async_trait;
use std::sync::Arc;

use super::{resolve_recipients, validate_batch, DeliveryOutcome, NotificationProvider};
use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::models::{DirectSendSetting, MailSettings, NotificationEntity, TemplateType};
use crate::services::body::MessageBodyResolver;

pub struct DirectSendProvider {
    client: reqwest::Client,
    setting: DirectSendSetting,
    settings: Arc<AppSettings>,
    resolver: Arc<MessageBodyResolver>,
}

impl DirectSendProvider {
    pub fn new(settings: Arc<AppSettings>, resolver: Arc<MessageBodyResolver>) -> AppResult<Self> {
        let setting = settings.direct_send.clone().ok_or_else(|| {
            AppError::Configuration("DirectSend settings are not configured".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            setting,
            settings,
            resolver,
        })
    }

    async fn build_payload(
        &self,
        application: &str,
        entity: &NotificationEntity,
        mail: &MailSettings,
    ) -> AppResult<serde_json::Value> {
        let body = self.resolver.get_message_body(application, entity).await?;
        let recipients = resolve_recipients(entity, mail);

        let content_type = match body.content_type {
            TemplateType::Html => "html",
            TemplateType::Text => "text",
        };

        let attachments: Vec<serde_json::Value> = entity
            .attachment_list()
            .iter()
            .map(|a| {
                serde_json::json!({
                    "fileName": a.file_name,
                    "contentBase64": a.file_base64,
                    "isInline": a.is_inline,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "from": self.setting.from_address,
            "to": recipients.to,
            "cc": recipients.cc,
            "bcc": recipients.bcc,
            "replyTo": recipients.reply_to,
            "subject": entity.subject,
            "body": {"content": body.content, "contentType": content_type},
            "attachments": attachments,
        }))
    }
}

#[async_trait]
impl NotificationProvider for DirectSendProvider {
    async fn process(
        &self,
        application: &str,
        entities: &[NotificationEntity],
    ) -> AppResult<Vec<DeliveryOutcome>> {
        validate_batch(entities)?;

        let mail = self.settings.mail_settings_for(application).ok_or_else(|| {
            AppError::Configuration(format!(
                "Application '{}' has no mail settings",
                application
            ))
        })?;

        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            let payload = match self.build_payload(application, entity, mail).await {
                Ok(payload) => payload,
                Err(e) => {
                    outcomes.push(DeliveryOutcome::failed(
                        &entity.notification_id,
                        e.to_string(),
                        Some(&self.setting.from_address),
                    ));
                    continue;
                }
            };

            let outcome = match self
                .client
                .post(&self.setting.relay_url)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => DeliveryOutcome::sent(
                    &entity.notification_id,
                    Some(&self.setting.from_address),
                ),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    DeliveryOutcome::failed(
                        &entity.notification_id,
                        format!("Relay returned HTTP {}: {}", status, text),
                        Some(&self.setting.from_address),
                    )
                }
                Err(e) => DeliveryOutcome::failed(
                    &entity.notification_id,
                    format!("Relay request failed: {}", e),
                    Some(&self.setting.from_address),
                ),
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    // The relay identity is fixed; the submitted sender stays untouched
    fn applies_from_override(&self) -> bool {
        false
    }
}
