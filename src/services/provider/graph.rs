//! Microsoft Graph delivery provider.
//!
//! Selects one sending account per batch, acquires a bearer token for it,
//! and delivers either one HTTP call per entity or one `$batch` call per
//! chunk depending on the batching flag. Responses are matched back to their
//! entities by notification id. A quota-exceeded error anywhere in a run
//! rotates the account cursor exactly once so the next cycle uses a
//! different mailbox.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{resolve_recipients, validate_batch, DeliveryOutcome, NotificationProvider};
use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    AccountCredential, GraphSetting, MailSettings, NotificationEntity, NotificationKind,
    NotificationStatus, TemplateType,
};
use crate::services::accounts::AccountSelector;
use crate::services::body::MessageBodyResolver;
use crate::services::chunk::split_list;

/// Marker the Graph API puts in errors when a mailbox's sending quota is
/// exhausted
pub(crate) const QUOTA_EXCEEDED_MARKER: &str = "quota was exceeded";

// =============================================================================
// Token Provider
// =============================================================================

/// Auth token source for a sending account
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire(&self, account: &AccountCredential) -> AppResult<String>;
}

/// Resource-owner password grant against the configured token endpoint
pub struct PasswordGrantTokenProvider {
    client: reqwest::Client,
    setting: GraphSetting,
}

impl PasswordGrantTokenProvider {
    pub fn new(setting: GraphSetting) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, setting }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenProvider for PasswordGrantTokenProvider {
    async fn acquire(&self, account: &AccountCredential) -> AppResult<String> {
        let params = [
            ("client_id", self.setting.client_id.as_str()),
            ("scope", self.setting.scope.as_str()),
            ("username", account.account_name.as_str()),
            ("password", account.password.as_str()),
            ("grant_type", "password"),
        ];

        let response = self
            .client
            .post(&self.setting.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Token endpoint returned HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid token response: {}", e)))?;

        Ok(token.access_token)
    }
}

// =============================================================================
// Status Mapping
// =============================================================================

/// Maps one HTTP outcome to a notification status. 429/408 are the only
/// transient signals; they retry while the attempt budget lasts.
pub(crate) fn status_for_response(
    http_status: u16,
    try_count: i32,
    max_retries: i32,
) -> NotificationStatus {
    if (200..300).contains(&http_status) {
        NotificationStatus::Sent
    } else if (http_status == 429 || http_status == 408) && try_count <= max_retries {
        NotificationStatus::Retrying
    } else {
        NotificationStatus::Failed
    }
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// One Graph reply reduced to what the status mapping needs
#[derive(Debug)]
pub struct GraphHttpReply {
    pub status: u16,
    pub body: String,
}

/// HTTP transport for Graph delivery calls (same seam shape as
/// `TokenProvider`, so tests can count and script calls)
#[async_trait]
pub trait GraphHttpSender: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        payload: &serde_json::Value,
    ) -> AppResult<GraphHttpReply>;
}

pub struct ReqwestGraphSender {
    client: reqwest::Client,
}

impl ReqwestGraphSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for ReqwestGraphSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphHttpSender for ReqwestGraphSender {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        payload: &serde_json::Value,
    ) -> AppResult<GraphHttpReply> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Graph request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(GraphHttpReply { status, body })
    }
}

// =============================================================================
// Batch Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct GraphBatchResponse {
    pub responses: Vec<GraphBatchItemResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphBatchItemResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl GraphBatchItemResponse {
    /// Human-readable error text from a failed batch item
    pub(crate) fn error_text(&self) -> String {
        self.body
            .as_ref()
            .and_then(|b| b.pointer("/error/message"))
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

// =============================================================================
// Graph Provider
// =============================================================================

pub struct GraphProvider {
    http: Arc<dyn GraphHttpSender>,
    settings: Arc<AppSettings>,
    selector: Arc<AccountSelector>,
    resolver: Arc<MessageBodyResolver>,
    tokens: Arc<dyn TokenProvider>,
}

impl GraphProvider {
    pub fn new(
        settings: Arc<AppSettings>,
        selector: Arc<AccountSelector>,
        resolver: Arc<MessageBodyResolver>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::with_http_sender(
            settings,
            selector,
            resolver,
            tokens,
            Arc::new(ReqwestGraphSender::new()),
        )
    }

    pub fn with_http_sender(
        settings: Arc<AppSettings>,
        selector: Arc<AccountSelector>,
        resolver: Arc<MessageBodyResolver>,
        tokens: Arc<dyn TokenProvider>,
        http: Arc<dyn GraphHttpSender>,
    ) -> Self {
        Self {
            http,
            settings,
            selector,
            resolver,
            tokens,
        }
    }

    fn graph(&self) -> AppResult<&GraphSetting> {
        self.settings
            .graph
            .as_ref()
            .ok_or_else(|| AppError::Configuration("Graph settings are not configured".to_string()))
    }

    /// Relative request path for one entity (used as-is in batch items,
    /// prefixed with the base URL for individual sends)
    fn request_path(&self, entity: &NotificationEntity, account: &str) -> AppResult<String> {
        let graph = self.graph()?;
        Ok(match entity.kind {
            NotificationKind::Email => graph.send_mail_url.replace("{account}", account),
            NotificationKind::Meeting => format!("/users/{}/events", account),
        })
    }

    /// Builds the Graph request payload for one entity
    async fn build_payload(
        &self,
        application: &str,
        entity: &NotificationEntity,
        mail: &MailSettings,
    ) -> AppResult<serde_json::Value> {
        let body = self.resolver.get_message_body(application, entity).await?;
        let recipients = resolve_recipients(entity, mail);

        let content_type = match body.content_type {
            TemplateType::Html => "HTML",
            TemplateType::Text => "Text",
        };

        match entity.kind {
            NotificationKind::Email => {
                let attachments: Vec<serde_json::Value> = entity
                    .attachment_list()
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "@odata.type": "#microsoft.graph.fileAttachment",
                            "name": a.file_name,
                            "contentBytes": a.file_base64,
                            "isInline": a.is_inline,
                        })
                    })
                    .collect();

                let mut message = serde_json::json!({
                    "subject": entity.subject,
                    "body": {"contentType": content_type, "content": body.content},
                    "toRecipients": email_addresses(&recipients.to),
                    "ccRecipients": email_addresses(&recipients.cc),
                    "bccRecipients": email_addresses(&recipients.bcc),
                    "replyTo": email_addresses(&recipients.reply_to),
                    "attachments": attachments,
                });

                if let Some(from) = entity.from_address.as_deref().filter(|f| !f.is_empty()) {
                    message["from"] = serde_json::json!({"emailAddress": {"address": from}});
                }

                Ok(serde_json::json!({
                    "message": message,
                    "saveToSentItems": mail.save_to_sent,
                }))
            }
            NotificationKind::Meeting => {
                let mut attendees: Vec<serde_json::Value> = recipients
                    .to
                    .iter()
                    .map(|a| attendee(a, "required"))
                    .collect();
                attendees.extend(recipients.cc.iter().map(|a| attendee(a, "optional")));

                let mut event = serde_json::json!({
                    "subject": entity.subject,
                    "body": {"contentType": content_type, "content": body.content},
                    "start": graph_datetime(entity.starts_at),
                    "end": graph_datetime(entity.ends_at),
                    "attendees": attendees,
                    "isOnlineMeeting": entity.is_online_meeting,
                });

                if let Some(uid) = entity.ical_uid.as_deref().filter(|u| !u.is_empty()) {
                    event["iCalUId"] = serde_json::json!(uid);
                }
                if let Some(recurrence) = build_graph_recurrence(entity) {
                    event["recurrence"] = recurrence;
                }

                Ok(event)
            }
        }
    }

    async fn process_individual(
        &self,
        application: &str,
        entities: &[NotificationEntity],
        mail: &MailSettings,
        account: &AccountCredential,
        token: &str,
    ) -> AppResult<Vec<DeliveryOutcome>> {
        let graph = self.graph()?;
        let max_retries = self.settings.retry.max_retries;
        let mut outcomes = Vec::with_capacity(entities.len());

        for entity in entities {
            let payload = match self.build_payload(application, entity, mail).await {
                Ok(payload) => payload,
                Err(e) => {
                    outcomes.push(DeliveryOutcome::failed(
                        &entity.notification_id,
                        e.to_string(),
                        Some(&account.account_name),
                    ));
                    continue;
                }
            };

            let url = format!(
                "{}{}",
                graph.base_url,
                self.request_path(entity, &account.account_name)?
            );

            let outcome = match self.http.post_json(&url, token, &payload).await {
                Ok(reply) => {
                    match status_for_response(reply.status, entity.try_count, max_retries) {
                        NotificationStatus::Sent => DeliveryOutcome::sent(
                            &entity.notification_id,
                            Some(&account.account_name),
                        ),
                        NotificationStatus::Retrying => DeliveryOutcome::retrying(
                            &entity.notification_id,
                            format!("HTTP {}", reply.status),
                            Some(&account.account_name),
                        ),
                        _ => {
                            let error = if reply.body.is_empty() {
                                format!("HTTP {}", reply.status)
                            } else {
                                format!("HTTP {}: {}", reply.status, reply.body)
                            };
                            DeliveryOutcome::failed(
                                &entity.notification_id,
                                error,
                                Some(&account.account_name),
                            )
                        }
                    }
                }
                Err(e) => DeliveryOutcome::failed(
                    &entity.notification_id,
                    e.to_string(),
                    Some(&account.account_name),
                ),
            };

            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn process_batched(
        &self,
        application: &str,
        entities: &[NotificationEntity],
        mail: &MailSettings,
        account: &AccountCredential,
        token: &str,
    ) -> AppResult<(Vec<DeliveryOutcome>, bool)> {
        let graph = self.graph()?;
        let max_retries = self.settings.retry.max_retries;
        let batch_url = format!("{}/$batch", graph.base_url);

        let mut outcomes = Vec::with_capacity(entities.len());
        let mut quota_hit = false;

        let chunks = split_list(entities.iter().collect(), graph.batch_request_limit);
        for chunk in chunks {
            let mut requests = Vec::with_capacity(chunk.len());
            let mut chunk_entities: Vec<&NotificationEntity> = Vec::with_capacity(chunk.len());

            for entity in chunk {
                match self.build_payload(application, entity, mail).await {
                    Ok(payload) => {
                        requests.push(serde_json::json!({
                            "id": entity.notification_id,
                            "method": "POST",
                            "url": self.request_path(entity, &account.account_name)?,
                            "headers": {"Content-Type": "application/json"},
                            "body": payload,
                        }));
                        chunk_entities.push(entity);
                    }
                    Err(e) => outcomes.push(DeliveryOutcome::failed(
                        &entity.notification_id,
                        e.to_string(),
                        Some(&account.account_name),
                    )),
                }
            }

            if chunk_entities.is_empty() {
                continue;
            }

            let reply = match self
                .http
                .post_json(&batch_url, token, &serde_json::json!({"requests": requests}))
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    for entity in &chunk_entities {
                        outcomes.push(DeliveryOutcome::failed(
                            &entity.notification_id,
                            format!("Batch request failed: {}", e),
                            Some(&account.account_name),
                        ));
                    }
                    continue;
                }
            };

            if !(200..300).contains(&reply.status) {
                for entity in &chunk_entities {
                    outcomes.push(DeliveryOutcome::failed(
                        &entity.notification_id,
                        format!("Batch call returned HTTP {}: {}", reply.status, reply.body),
                        Some(&account.account_name),
                    ));
                }
                continue;
            }

            let batch: GraphBatchResponse = match serde_json::from_str(&reply.body) {
                Ok(batch) => batch,
                Err(e) => {
                    for entity in &chunk_entities {
                        outcomes.push(DeliveryOutcome::failed(
                            &entity.notification_id,
                            format!("Invalid batch response: {}", e),
                            Some(&account.account_name),
                        ));
                    }
                    continue;
                }
            };

            let (chunk_outcomes, chunk_quota) = match_batch_responses(
                &chunk_entities,
                &batch,
                &account.account_name,
                max_retries,
            );
            quota_hit |= chunk_quota;
            outcomes.extend(chunk_outcomes);
        }

        Ok((outcomes, quota_hit))
    }
}

/// Matches batch item responses back to their entities by notification id
pub(crate) fn match_batch_responses(
    entities: &[&NotificationEntity],
    batch: &GraphBatchResponse,
    account_name: &str,
    max_retries: i32,
) -> (Vec<DeliveryOutcome>, bool) {
    let mut outcomes = Vec::with_capacity(entities.len());
    let mut quota_hit = false;

    for entity in entities {
        let item = batch
            .responses
            .iter()
            .find(|r| r.id == entity.notification_id);

        let outcome = match item {
            Some(item) => match status_for_response(item.status, entity.try_count, max_retries) {
                NotificationStatus::Sent => {
                    DeliveryOutcome::sent(&entity.notification_id, Some(account_name))
                }
                status => {
                    // Quota exhaustion surfaces as a throttled (429) reply as
                    // well as a hard failure, so the marker is checked before
                    // branching on the mapped status
                    let error = item.error_text();
                    if error.to_lowercase().contains(QUOTA_EXCEEDED_MARKER) {
                        quota_hit = true;
                    }
                    if status == NotificationStatus::Retrying {
                        DeliveryOutcome::retrying(&entity.notification_id, error, Some(account_name))
                    } else {
                        DeliveryOutcome::failed(&entity.notification_id, error, Some(account_name))
                    }
                }
            },
            None => DeliveryOutcome::failed(
                &entity.notification_id,
                "No response matched this item in the batch reply".to_string(),
                Some(account_name),
            ),
        };

        outcomes.push(outcome);
    }

    (outcomes, quota_hit)
}

fn email_addresses(addresses: &[String]) -> Vec<serde_json::Value> {
    addresses
        .iter()
        .map(|a| serde_json::json!({"emailAddress": {"address": a}}))
        .collect()
}

fn attendee(address: &str, kind: &str) -> serde_json::Value {
    serde_json::json!({
        "emailAddress": {"address": address},
        "type": kind,
    })
}

fn graph_datetime(value: Option<chrono::DateTime<chrono::Utc>>) -> serde_json::Value {
    match value {
        Some(dt) => serde_json::json!({
            "dateTime": dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "timeZone": "UTC",
        }),
        None => serde_json::Value::Null,
    }
}

fn build_graph_recurrence(entity: &NotificationEntity) -> Option<serde_json::Value> {
    let recurrence = entity.recurrence_rule()?;
    let starts_at = entity.starts_at?;

    let pattern_type = match recurrence.pattern {
        crate::models::RecurrencePattern::Daily => "daily",
        crate::models::RecurrencePattern::Weekly => "weekly",
        crate::models::RecurrencePattern::Monthly => "absoluteMonthly",
    };

    let mut pattern = serde_json::json!({
        "type": pattern_type,
        "interval": recurrence.interval,
    });
    if !recurrence.days_of_week.is_empty() {
        pattern["daysOfWeek"] = serde_json::json!(recurrence.days_of_week);
    }

    let range = if let Some(occurrences) = recurrence.occurrences {
        serde_json::json!({
            "type": "numbered",
            "startDate": starts_at.format("%Y-%m-%d").to_string(),
            "numberOfOccurrences": occurrences,
        })
    } else if let Some(until) = recurrence.until {
        serde_json::json!({
            "type": "endDate",
            "startDate": starts_at.format("%Y-%m-%d").to_string(),
            "endDate": until.format("%Y-%m-%d").to_string(),
        })
    } else {
        serde_json::json!({
            "type": "noEnd",
            "startDate": starts_at.format("%Y-%m-%d").to_string(),
        })
    };

    Some(serde_json::json!({"pattern": pattern, "range": range}))
}

#[async_trait]
impl NotificationProvider for GraphProvider {
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

        // Token failure fails the whole batch without attempting delivery
        let token = match self.tokens.acquire(&account).await {
            Ok(token) => token,
            Err(e) => {
                log::error!(
                    "Token acquisition failed for account {}: {}",
                    account.account_name,
                    e
                );
                return Ok(entities
                    .iter()
                    .map(|entity| {
                        DeliveryOutcome::failed(
                            &entity.notification_id,
                            format!(
                                "Failed to acquire token for account '{}': {}",
                                account.account_name, e
                            ),
                            Some(&account.account_name),
                        )
                    })
                    .collect());
            }
        };

        let enable_batching = self.graph()?.enable_batching;
        if enable_batching {
            let (outcomes, quota_hit) = self
                .process_batched(application, entities, mail, &account, &token)
                .await?;

            // One rotation per batch run, not one per offending item
            if quota_hit {
                log::warn!(
                    "Mailbox quota exhausted for account {}; rotating account for {}",
                    account.account_name,
                    application
                );
                self.selector.advance(application);
            }

            Ok(outcomes)
        } else {
            self.process_individual(application, entities, mail, &account, &token)
                .await
        }
    }
}

fn fail_all(entities: &[NotificationEntity], error: String) -> Vec<DeliveryOutcome> {
    entities
        .iter()
        .map(|e| DeliveryOutcome::failed(&e.notification_id, error.clone(), None))
        .collect()
}
