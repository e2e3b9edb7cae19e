//! Dispatch orchestrator: the state machine between inbound requests, the
//! queue, the delivery provider, and the repository.
//!
//! Policy is evaluated per application before any provider work:
//!   1. no mail settings entry          -> all Failed
//!   2. mail_on = false                 -> all FakeMail, provider not invoked
//!   3. send_for_real off, no override  -> all Failed, provider not invoked
//!   4. otherwise                       -> provider invoked for the full batch
//!
//! Results are persisted in one repository update call, then entities left in
//! Retrying are re-chunked and pushed back onto the queue unconditionally.

use std::sync::Arc;

use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    EmailNotificationItem, MeetingNotificationItem, NotificationEntity, NotificationKind,
    NotificationReceipt, NotificationStatus, QueueEnvelope, QueueNotificationItem,
};
use crate::queue::QueueGateway;
use crate::repository::NotificationRepository;
use crate::services::chunk::split_list;
use crate::services::factory::NotificationFactory;
use crate::services::provider::NotificationProvider;

pub struct DispatchOrchestrator {
    repository: Arc<dyn NotificationRepository>,
    queue: Arc<dyn QueueGateway>,
    provider: Arc<dyn NotificationProvider>,
    settings: Arc<AppSettings>,
    factory: Arc<NotificationFactory>,
}

impl DispatchOrchestrator {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        queue: Arc<dyn QueueGateway>,
        provider: Arc<dyn NotificationProvider>,
        settings: Arc<AppSettings>,
        factory: Arc<NotificationFactory>,
    ) -> Self {
        Self {
            repository,
            queue,
            provider,
            settings,
            factory,
        }
    }

    // =========================================================================
    // Enqueue (async delivery)
    // =========================================================================

    /// Persists email items and queues them for asynchronous delivery
    pub async fn enqueue_email(
        &self,
        application: &str,
        items: &[EmailNotificationItem],
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities =
            self.factory
                .create_email_entities(application, items, NotificationStatus::Queued)?;
        self.persist_and_publish(application, entities, NotificationKind::Email)
            .await
    }

    /// Persists meeting items and queues them for asynchronous delivery
    pub async fn enqueue_meeting(
        &self,
        application: &str,
        items: &[MeetingNotificationItem],
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities = self.factory.create_meeting_entities(
            application,
            items,
            NotificationStatus::Queued,
        )?;
        self.persist_and_publish(application, entities, NotificationKind::Meeting)
            .await
    }

    async fn persist_and_publish(
        &self,
        application: &str,
        entities: Vec<NotificationEntity>,
        kind: NotificationKind,
    ) -> AppResult<Vec<NotificationReceipt>> {
        self.repository.create_entities(&entities).await?;

        let ids: Vec<String> = entities.iter().map(|e| e.notification_id.clone()).collect();
        self.publish_chunks(application, &ids, kind, false).await?;

        log::info!(
            "Queued {} {:?} notification(s) for application {}",
            entities.len(),
            kind,
            application
        );

        Ok(entities.iter().map(NotificationReceipt::from).collect())
    }

    // =========================================================================
    // Synchronous send
    // =========================================================================

    /// Persists email items and dispatches them within the request
    pub async fn send_email(
        &self,
        application: &str,
        items: &[EmailNotificationItem],
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities =
            self.factory
                .create_email_entities(application, items, NotificationStatus::Queued)?;
        self.repository.create_entities(&entities).await?;

        let processed = self.dispatch(application, entities, false).await?;
        Ok(processed.iter().map(NotificationReceipt::from).collect())
    }

    /// Persists meeting items and dispatches them within the request
    pub async fn send_meeting(
        &self,
        application: &str,
        items: &[MeetingNotificationItem],
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities = self.factory.create_meeting_entities(
            application,
            items,
            NotificationStatus::Queued,
        )?;
        self.repository.create_entities(&entities).await?;

        let processed = self.dispatch(application, entities, false).await?;
        Ok(processed.iter().map(NotificationReceipt::from).collect())
    }

    // =========================================================================
    // Queue consumer entry points
    // =========================================================================

    /// Re-hydrates and dispatches one email chunk pulled off the queue
    pub async fn process_email_notifications(
        &self,
        application: &str,
        item: &QueueNotificationItem,
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities = self
            .repository
            .get_entities_by_ids(application, &item.notification_ids)
            .await?;

        let processed = self.dispatch(application, entities, false).await?;
        Ok(processed.iter().map(NotificationReceipt::from).collect())
    }

    /// Re-hydrates and dispatches one meeting chunk pulled off the queue.
    /// Entities already `Sent` are excluded from provider work when the chunk
    /// requests it, and returned unmodified.
    pub async fn process_meeting_notifications(
        &self,
        application: &str,
        item: &QueueNotificationItem,
    ) -> AppResult<Vec<NotificationReceipt>> {
        let entities = self
            .repository
            .get_entities_by_ids(application, &item.notification_ids)
            .await?;

        let processed = self
            .dispatch(application, entities, item.ignore_already_sent)
            .await?;
        Ok(processed.iter().map(NotificationReceipt::from).collect())
    }

    // =========================================================================
    // Core state machine
    // =========================================================================

    /// Applies policy, invokes the provider, persists the outcome, and
    /// requeues entities left in `Retrying`. Returns the full entity list,
    /// already-sent pass-throughs included.
    async fn dispatch(
        &self,
        application: &str,
        entities: Vec<NotificationEntity>,
        ignore_already_sent: bool,
    ) -> AppResult<Vec<NotificationEntity>> {
        let (mut pending, already_sent): (Vec<_>, Vec<_>) = if ignore_already_sent {
            entities
                .into_iter()
                .partition(|e| e.status != NotificationStatus::Sent)
        } else {
            (entities, Vec::new())
        };

        // All items already delivered: nothing to send, nothing to persist
        if pending.is_empty() {
            return Ok(already_sent);
        }

        match self.settings.mail_settings_for(application) {
            None => {
                for entity in &mut pending {
                    entity.status = NotificationStatus::Failed;
                    entity.error_message = Some(format!(
                        "Application '{}' is not configured for mail delivery",
                        application
                    ));
                }
            }
            Some(mail) if !mail.mail_on => {
                for entity in &mut pending {
                    entity.status = NotificationStatus::FakeMail;
                    entity.error_message = Some(format!(
                        "Mail sending is disabled for application '{}'",
                        application
                    ));
                }
            }
            Some(mail) if !mail.send_for_real && mail.to_override.trim().is_empty() => {
                for entity in &mut pending {
                    entity.status = NotificationStatus::Failed;
                    entity.error_message = Some(format!(
                        "Application '{}' has send-for-real disabled but no override address",
                        application
                    ));
                }
            }
            Some(_) => {
                self.prepare_for_dispatch(application, &mut pending);

                match self.provider.process(application, &pending).await {
                    Ok(outcomes) => merge_outcomes(&mut pending, &outcomes),
                    // Only validation errors are absorbed here; anything else
                    // aborts the cycle and propagates to the caller
                    Err(AppError::Validation(message)) => {
                        for entity in &mut pending {
                            entity.status = NotificationStatus::Failed;
                            entity.error_message = Some(message.clone());
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        self.repository.update_entities(&pending).await?;

        self.requeue_retrying(application, &pending, ignore_already_sent)
            .await?;

        pending.extend(already_sent);
        Ok(pending)
    }

    /// Per-entity preamble applied before any provider sees the batch
    fn prepare_for_dispatch(&self, application: &str, entities: &mut [NotificationEntity]) {
        let from_override = if self.provider.applies_from_override() {
            self.settings
                .accounts_for(application)
                .and_then(|a| a.from_override.clone())
                .filter(|f| !f.trim().is_empty())
        } else {
            None
        };

        for entity in entities {
            entity.status = NotificationStatus::Processing;
            entity.try_count += 1;
            entity.error_message = None;
            if let Some(from) = &from_override {
                entity.from_address = Some(from.clone());
            }
        }
    }

    async fn requeue_retrying(
        &self,
        application: &str,
        entities: &[NotificationEntity],
        ignore_already_sent: bool,
    ) -> AppResult<()> {
        let retrying: Vec<(String, NotificationKind)> = entities
            .iter()
            .filter(|e| e.status == NotificationStatus::Retrying)
            .map(|e| (e.notification_id.clone(), e.kind))
            .collect();

        if retrying.is_empty() {
            return Ok(());
        }

        log::info!(
            "Requeueing {} retrying notification(s) for application {}",
            retrying.len(),
            application
        );

        for chunk in split_list(retrying, self.settings.batch_limit()) {
            let envelopes: Vec<QueueEnvelope> = chunk
                .into_iter()
                .map(|(notification_id, kind)| QueueEnvelope {
                    notification_id,
                    application: application.to_string(),
                    kind,
                    ignore_already_sent,
                })
                .collect();
            self.queue.publish(&envelopes).await?;
        }

        Ok(())
    }

    async fn publish_chunks(
        &self,
        application: &str,
        ids: &[String],
        kind: NotificationKind,
        ignore_already_sent: bool,
    ) -> AppResult<()> {
        for chunk in split_list(ids.to_vec(), self.settings.batch_limit()) {
            let envelopes: Vec<QueueEnvelope> = chunk
                .into_iter()
                .map(|notification_id| QueueEnvelope {
                    notification_id,
                    application: application.to_string(),
                    kind,
                    ignore_already_sent,
                })
                .collect();
            self.queue.publish(&envelopes).await?;
        }
        Ok(())
    }
}

/// Merges provider outcome records back into the entities by notification id.
/// An entity with no matching outcome is a provider contract violation and is
/// marked failed rather than silently left in `Processing`.
fn merge_outcomes(
    entities: &mut [NotificationEntity],
    outcomes: &[crate::services::provider::DeliveryOutcome],
) {
    for entity in entities {
        match outcomes
            .iter()
            .find(|o| o.notification_id == entity.notification_id)
        {
            Some(outcome) => {
                entity.status = outcome.status;
                entity.error_message = outcome.error_message.clone();
                if outcome.account_used.is_some() {
                    entity.account_used = outcome.account_used.clone();
                }
            }
            None => {
                entity.status = NotificationStatus::Failed;
                entity.error_message =
                    Some("Provider returned no outcome for this notification".to_string());
            }
        }
    }
}
