//! SMTP delivery provider.
//!
//! Delivers sequentially over one authenticated connection pool per batch.
//! SMTP gives no transient-error signal we can trust, so every delivery error
//! is terminal: this provider never produces a retrying outcome.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimePart, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use super::{ics, resolve_recipients, validate_batch, DeliveryOutcome, NotificationProvider};
use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    AccountCredential, MailSettings, NotificationEntity, NotificationKind, SmtpSetting,
    TemplateType,
};
use crate::services::accounts::AccountSelector;
use crate::services::body::MessageBodyResolver;

pub struct SmtpProvider {
    settings: Arc<AppSettings>,
    selector: Arc<AccountSelector>,
    resolver: Arc<MessageBodyResolver>,
}

impl SmtpProvider {
    pub fn new(
        settings: Arc<AppSettings>,
        selector: Arc<AccountSelector>,
        resolver: Arc<MessageBodyResolver>,
    ) -> Self {
        Self {
            settings,
            selector,
            resolver,
        }
    }

    fn smtp(&self) -> AppResult<&SmtpSetting> {
        self.settings
            .smtp
            .as_ref()
            .ok_or_else(|| AppError::Configuration("SMTP settings are not configured".to_string()))
    }

    fn build_transport(
        &self,
        account: &AccountCredential,
    ) -> AppResult<AsyncSmtpTransport<Tokio1Executor>> {
        let smtp = self.smtp()?;
        let credentials = Credentials::new(
            account.account_name.clone(),
            account.password.clone(),
        );

        // 465 is implicit TLS; anything else negotiates STARTTLS
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| {
            AppError::Configuration(format!("Invalid SMTP relay '{}': {}", smtp.host, e))
        })?;

        Ok(builder.port(smtp.port).credentials(credentials).build())
    }

    async fn build_message(
        &self,
        application: &str,
        entity: &NotificationEntity,
        mail: &MailSettings,
        account: &AccountCredential,
    ) -> AppResult<Message> {
        let body = self.resolver.get_message_body(application, entity).await?;
        let recipients = resolve_recipients(entity, mail);

        let from = entity
            .from_address
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(&account.account_name);

        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .subject(&entity.subject);

        for to in &recipients.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        for cc in &recipients.cc {
            builder = builder.cc(parse_mailbox(cc)?);
        }
        for bcc in &recipients.bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }
        for reply_to in &recipients.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        let body_part = match body.content_type {
            TemplateType::Html => SinglePart::html(body.content.clone()),
            TemplateType::Text => SinglePart::plain(body.content.clone()),
        };

        let mut multipart = MultiPart::mixed().singlepart(body_part);

        if entity.kind == NotificationKind::Meeting {
            let calendar = ics::build_invite(entity, from, &recipients)?;
            let method = if entity.is_cancel { "CANCEL" } else { "REQUEST" };
            let calendar_type =
                ContentType::parse(&format!("text/calendar; method={}; charset=utf-8", method))
                    .map_err(|e| AppError::Internal(format!("Invalid calendar MIME type: {}", e)))?;
            multipart = multipart.singlepart(
                SinglePart::builder()
                    .header(calendar_type)
                    .body(calendar),
            );
        }

        for attachment in entity.attachment_list() {
            let content = STANDARD.decode(&attachment.file_base64).map_err(|e| {
                AppError::Validation(format!(
                    "Attachment '{}' is not valid base64: {}",
                    attachment.file_name, e
                ))
            })?;
            let part = MimePart::new(attachment.file_name.clone())
                .body(content, ContentType::parse("application/octet-stream").unwrap());
            multipart = multipart.singlepart(part);
        }

        builder
            .multipart(multipart)
            .map_err(|e| AppError::Internal(format!("Failed to build message: {}", e)))
    }
}

fn parse_mailbox(address: &str) -> AppResult<Mailbox> {
    address
        .parse()
        .map_err(|e| AppError::Validation(format!("Invalid address '{}': {}", address, e)))
}

#[async_trait]
impl NotificationProvider for SmtpProvider {
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

        let Some(pool) = self.settings.accounts_for(application) else {
            return Ok(fail_all(
                entities,
                format!("No accounts configured for application '{}'", application),
            ));
        };

        let Some(account) = self.selector.fetch_account(pool) else {
            return Ok(fail_all(
                entities,
                format!(
                    "No enabled accounts available for application '{}'",
                    application
                ),
            ));
        };

        let transport = match self.build_transport(&account) {
            Ok(transport) => transport,
            Err(e) => {
                return Ok(entities
                    .iter()
                    .map(|entity| {
                        DeliveryOutcome::failed(
                            &entity.notification_id,
                            e.to_string(),
                            Some(&account.account_name),
                        )
                    })
                    .collect());
            }
        };

        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            let message = match self
                .build_message(application, entity, mail, &account)
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    outcomes.push(DeliveryOutcome::failed(
                        &entity.notification_id,
                        e.to_string(),
                        Some(&account.account_name),
                    ));
                    continue;
                }
            };

            let outcome = match transport.send(message).await {
                Ok(_) => DeliveryOutcome::sent(&entity.notification_id, Some(&account.account_name)),
                Err(e) => DeliveryOutcome::failed(
                    &entity.notification_id,
                    format!("SMTP delivery failed: {}", e),
                    Some(&account.account_name),
                ),
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

fn fail_all(entities: &[NotificationEntity], error: String) -> Vec<DeliveryOutcome> {
    entities
        .iter()
        .map(|e| DeliveryOutcome::failed(&e.notification_id, error.clone(), None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mailbox_accepts_plain_address() {
        assert!(parse_mailbox("user@example.com").is_ok());
        assert!(parse_mailbox("Named User <user@example.com>").is_ok());
    }

    #[test]
    fn test_parse_mailbox_rejects_garbage() {
        assert!(parse_mailbox("not an address").is_err());
    }
}
