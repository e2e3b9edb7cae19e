//! End-to-end tests for the dispatch orchestrator with mock collaborators.
//!
//! Covers policy precedence, status transitions, requeue of transient
//! failures, and the already-sent pass-through.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mailrelay::config::AppSettings;
use mailrelay::error::{AppError, AppResult};
use mailrelay::models::{
    EmailNotificationItem, NotificationEntity, NotificationReportFilter, NotificationStatus,
    QueueEnvelope, QueueNotificationItem,
};
use mailrelay::pagination::ReportCursor;
use mailrelay::queue::{QueueGateway, QueueMessage};
use mailrelay::repository::NotificationRepository;
use mailrelay::services::{
    DeliveryOutcome, DispatchOrchestrator, NoopProtector, NotificationFactory,
    NotificationProvider,
};

// =============================================================================
// Mocks
// =============================================================================

#[derive(Default)]
struct MockRepository {
    stored: Mutex<Vec<NotificationEntity>>,
    update_calls: Mutex<Vec<Vec<NotificationEntity>>>,
}

#[async_trait]
impl NotificationRepository for MockRepository {
    async fn create_entities(&self, entities: &[NotificationEntity]) -> AppResult<()> {
        self.stored.lock().unwrap().extend_from_slice(entities);
        Ok(())
    }

    async fn get_entities_by_ids(
        &self,
        application: &str,
        notification_ids: &[String],
    ) -> AppResult<Vec<NotificationEntity>> {
        let stored = self.stored.lock().unwrap();
        let found: Vec<NotificationEntity> = notification_ids
            .iter()
            .filter_map(|id| {
                stored
                    .iter()
                    .find(|e| &e.notification_id == id && e.application == application)
                    .cloned()
            })
            .collect();

        if found.is_empty() {
            return Err(AppError::Validation(format!(
                "No records found for the given notification ids in application '{}'",
                application
            )));
        }
        Ok(found)
    }

    async fn get_entity(
        &self,
        application: &str,
        notification_id: &str,
    ) -> AppResult<NotificationEntity> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.notification_id == notification_id && e.application == application)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    async fn update_entities(&self, entities: &[NotificationEntity]) -> AppResult<()> {
        self.update_calls.lock().unwrap().push(entities.to_vec());
        Ok(())
    }

    async fn query_entities(
        &self,
        _filter: &NotificationReportFilter,
        _cursor: Option<ReportCursor>,
        _page_size: i64,
    ) -> AppResult<(Vec<NotificationEntity>, Option<ReportCursor>)> {
        Ok((Vec::new(), None))
    }
}

#[derive(Default)]
struct MockQueue {
    published: Mutex<Vec<Vec<QueueEnvelope>>>,
}

#[async_trait]
impl QueueGateway for MockQueue {
    async fn publish(&self, envelopes: &[QueueEnvelope]) -> AppResult<()> {
        self.published.lock().unwrap().push(envelopes.to_vec());
        Ok(())
    }

    async fn pull(&self, _max: usize) -> AppResult<Vec<QueueMessage>> {
        Ok(Vec::new())
    }

    async fn ack(&self, _message: &QueueMessage) -> AppResult<()> {
        Ok(())
    }
}

/// Provider returning scripted outcomes keyed by notification id; entities
/// without a script entry are marked sent.
#[derive(Default)]
struct ScriptedProvider {
    outcomes: Mutex<HashMap<String, DeliveryOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn script(&self, outcome: DeliveryOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(outcome.notification_id.clone(), outcome);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationProvider for ScriptedProvider {
    async fn process(
        &self,
        _application: &str,
        entities: &[NotificationEntity],
    ) -> AppResult<Vec<DeliveryOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcomes = self.outcomes.lock().unwrap();
        Ok(entities
            .iter()
            .map(|e| {
                outcomes
                    .get(&e.notification_id)
                    .cloned()
                    .unwrap_or_else(|| {
                        DeliveryOutcome::sent(&e.notification_id, Some("sender@example.com"))
                    })
            })
            .collect())
    }
}

/// Provider that always errors with a validation failure
struct ValidationErrorProvider;

#[async_trait]
impl NotificationProvider for ValidationErrorProvider {
    async fn process(
        &self,
        _application: &str,
        _entities: &[NotificationEntity],
    ) -> AppResult<Vec<DeliveryOutcome>> {
        Err(AppError::Validation(
            "provider rejected the batch".to_string(),
        ))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn graph_settings(mail_on: bool, send_for_real: bool, to_override: &str) -> Arc<AppSettings> {
    let raw = format!(
        r#"{{
            "provider": "graph",
            "mail_settings": [{{
                "application": "crm",
                "mail_on": {mail_on},
                "send_for_real": {send_for_real},
                "to_override": "{to_override}"
            }}],
            "application_accounts": [{{
                "application": "crm",
                "from_override": "noreply@example.com",
                "accounts": [{{"account_name": "sender@example.com", "password": "pw"}}]
            }}],
            "retry": {{"max_retries": 3}},
            "graph": {{
                "enable_batching": true,
                "batch_request_limit": 20,
                "base_url": "https://graph.example.com/v1.0",
                "token_url": "https://login.example.com/token",
                "client_id": "client"
            }}
        }}"#
    );
    Arc::new(AppSettings::from_json(&raw).unwrap())
}

fn email_item(subject: &str) -> EmailNotificationItem {
    serde_json::from_value(serde_json::json!({
        "to": ["user@example.com"],
        "subject": subject,
        "body": "<p>hello</p>"
    }))
    .unwrap()
}

struct Harness {
    repository: Arc<MockRepository>,
    queue: Arc<MockQueue>,
    provider: Arc<ScriptedProvider>,
    orchestrator: DispatchOrchestrator,
}

impl Harness {
    fn new(settings: Arc<AppSettings>) -> Self {
        let repository = Arc::new(MockRepository::default());
        let queue = Arc::new(MockQueue::default());
        let provider = Arc::new(ScriptedProvider::default());
        let orchestrator = DispatchOrchestrator::new(
            repository.clone(),
            queue.clone(),
            provider.clone(),
            settings,
            Arc::new(NotificationFactory::new(Arc::new(NoopProtector))),
        );
        Self {
            repository,
            queue,
            provider,
            orchestrator,
        }
    }

    /// Enqueues `count` email items and returns their generated ids with the
    /// publish log cleared, ready for a dispatch-cycle assertion.
    async fn seed(&self, count: usize) -> Vec<String> {
        let items: Vec<EmailNotificationItem> = (0..count)
            .map(|i| email_item(&format!("mail {i}")))
            .collect();
        let receipts = self.orchestrator.enqueue_email("crm", &items).await.unwrap();
        self.queue.published.lock().unwrap().clear();
        receipts.into_iter().map(|r| r.notification_id).collect()
    }
}

fn queue_item(ids: &[String]) -> QueueNotificationItem {
    QueueNotificationItem {
        notification_ids: ids.to_vec(),
        ignore_already_sent: false,
    }
}

// =============================================================================
// Enqueue
// =============================================================================

#[tokio::test]
async fn test_enqueue_persists_and_publishes() {
    let h = Harness::new(graph_settings(true, true, ""));

    let items = vec![email_item("a"), email_item("b")];
    let receipts = h.orchestrator.enqueue_email("crm", &items).await.unwrap();

    assert_eq!(receipts.len(), 2);
    assert!(receipts
        .iter()
        .all(|r| r.status == NotificationStatus::Queued));

    assert_eq!(h.repository.stored.lock().unwrap().len(), 2);

    let published = h.queue.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].len(), 2);
    assert_eq!(published[0][0].application, "crm");
}

#[tokio::test]
async fn test_enqueue_chunks_at_batch_limit() {
    let mut settings = (*graph_settings(true, true, "")).clone();
    settings.graph.as_mut().unwrap().batch_request_limit = 2;
    let h = Harness::new(Arc::new(settings));

    let items: Vec<EmailNotificationItem> = (0..5).map(|i| email_item(&format!("{i}"))).collect();
    h.orchestrator.enqueue_email("crm", &items).await.unwrap();

    let published = h.queue.published.lock().unwrap();
    let sizes: Vec<usize> = published.iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

// =============================================================================
// Policy precedence
// =============================================================================

#[tokio::test]
async fn test_unconfigured_application_fails_without_provider() {
    let h = Harness::new(graph_settings(true, true, ""));

    // Entities exist but dispatch targets an application with no settings
    let ids = h.seed(1).await;
    for entity in h.repository.stored.lock().unwrap().iter_mut() {
        entity.application = "unknown".to_string();
    }

    let receipts = h
        .orchestrator
        .process_email_notifications("unknown", &queue_item(&ids))
        .await
        .unwrap();

    assert_eq!(receipts[0].status, NotificationStatus::Failed);
    assert!(receipts[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("not configured"));
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_mail_off_yields_fakemail_without_provider() {
    let h = Harness::new(graph_settings(false, true, ""));

    let ids = h.seed(2).await;
    let receipts = h
        .orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert!(receipts
        .iter()
        .all(|r| r.status == NotificationStatus::FakeMail));
    assert_eq!(h.provider.call_count(), 0);

    // The terminal state is still persisted
    assert_eq!(h.repository.update_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_override_fails_without_provider() {
    let h = Harness::new(graph_settings(true, false, "  "));

    let ids = h.seed(1).await;
    let receipts = h
        .orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert_eq!(receipts[0].status, NotificationStatus::Failed);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_override_address_allows_dispatch() {
    let h = Harness::new(graph_settings(true, false, "test@example.com"));

    let ids = h.seed(1).await;
    let receipts = h
        .orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert_eq!(receipts[0].status, NotificationStatus::Sent);
    assert_eq!(h.provider.call_count(), 1);
}

// =============================================================================
// Provider outcomes and requeue
// =============================================================================

#[tokio::test]
async fn test_transient_failures_requeued_once() {
    let h = Harness::new(graph_settings(true, true, ""));
    let ids = h.seed(3).await;

    h.provider.script(DeliveryOutcome::retrying(
        &ids[0],
        "HTTP 429".to_string(),
        Some("sender@example.com"),
    ));
    h.provider.script(DeliveryOutcome::retrying(
        &ids[1],
        "HTTP 408".to_string(),
        Some("sender@example.com"),
    ));

    let receipts = h
        .orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert_eq!(receipts[0].status, NotificationStatus::Retrying);
    assert_eq!(receipts[1].status, NotificationStatus::Retrying);
    assert_eq!(receipts[2].status, NotificationStatus::Sent);
    assert_eq!(h.provider.call_count(), 1);

    // One persistence call covering the whole batch
    let updates = h.repository.update_calls.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 3);

    // Preamble applied before the provider ran
    assert!(updates[0].iter().all(|e| e.try_count == 1));
    assert!(updates[0]
        .iter()
        .all(|e| e.from_address.as_deref() == Some("noreply@example.com")));

    // Only the two retrying ids went back on the queue, in one chunk
    let published = h.queue.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let requeued: Vec<&str> = published[0]
        .iter()
        .map(|e| e.notification_id.as_str())
        .collect();
    assert_eq!(requeued, vec![ids[0].as_str(), ids[1].as_str()]);
}

#[tokio::test]
async fn test_all_sent_means_no_requeue() {
    let h = Harness::new(graph_settings(true, true, ""));
    let ids = h.seed(2).await;

    h.orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert!(h.queue.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_error_from_provider_fails_batch() {
    let h = Harness::new(graph_settings(true, true, ""));
    let ids = h.seed(2).await;

    let orchestrator = DispatchOrchestrator::new(
        h.repository.clone(),
        h.queue.clone(),
        Arc::new(ValidationErrorProvider),
        graph_settings(true, true, ""),
        Arc::new(NotificationFactory::new(Arc::new(NoopProtector))),
    );

    let receipts = orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert!(receipts
        .iter()
        .all(|r| r.status == NotificationStatus::Failed));
    assert!(receipts[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("rejected"));
}

#[tokio::test]
async fn test_unknown_ids_are_a_hard_failure() {
    let h = Harness::new(graph_settings(true, true, ""));

    let result = h
        .orchestrator
        .process_email_notifications("crm", &queue_item(&["missing".to_string()]))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

// =============================================================================
// Already-sent pass-through (meeting flow)
// =============================================================================

#[tokio::test]
async fn test_ignore_already_sent_skips_provider_and_persistence() {
    let h = Harness::new(graph_settings(true, true, ""));

    let ids = h.seed(2).await;
    for entity in h.repository.stored.lock().unwrap().iter_mut() {
        entity.status = NotificationStatus::Sent;
    }

    let item = QueueNotificationItem {
        notification_ids: ids.clone(),
        ignore_already_sent: true,
    };
    let receipts = h
        .orchestrator
        .process_meeting_notifications("crm", &item)
        .await
        .unwrap();

    // Everything was already delivered: no provider work, no update call
    assert_eq!(receipts.len(), 2);
    assert!(receipts.iter().all(|r| r.status == NotificationStatus::Sent));
    assert_eq!(h.provider.call_count(), 0);
    assert_eq!(h.repository.update_calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn test_ignore_already_sent_processes_only_pending() {
    let h = Harness::new(graph_settings(true, true, ""));
    let ids = h.seed(2).await;
    h.repository.stored.lock().unwrap()[0].status = NotificationStatus::Sent;

    let item = QueueNotificationItem {
        notification_ids: ids.clone(),
        ignore_already_sent: true,
    };
    let receipts = h
        .orchestrator
        .process_meeting_notifications("crm", &item)
        .await
        .unwrap();

    assert_eq!(receipts.len(), 2);
    assert_eq!(h.provider.call_count(), 1);

    // Only the pending entity was persisted
    let updates = h.repository.update_calls.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 1);
    assert_eq!(updates[0][0].notification_id, ids[1]);
}

#[tokio::test]
async fn test_email_flow_ignores_already_sent_flag() {
    // Email chunks carry the flag but the email pipeline reprocesses anyway
    let h = Harness::new(graph_settings(true, true, ""));
    let ids = h.seed(1).await;
    h.repository.stored.lock().unwrap()[0].status = NotificationStatus::Sent;

    h.orchestrator
        .process_email_notifications("crm", &queue_item(&ids))
        .await
        .unwrap();

    assert_eq!(h.provider.call_count(), 1);
}

// =============================================================================
// Synchronous send
// =============================================================================

#[tokio::test]
async fn test_send_returns_terminal_status() {
    let h = Harness::new(graph_settings(true, true, ""));

    let receipts = h
        .orchestrator
        .send_email("crm", &[email_item("now")])
        .await
        .unwrap();

    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].status, NotificationStatus::Sent);
    assert_eq!(receipts[0].error_message, None);

    // Created once, updated once, nothing queued
    assert_eq!(h.repository.stored.lock().unwrap().len(), 1);
    assert_eq!(h.repository.update_calls.lock().unwrap().len(), 1);
    assert!(h.queue.published.lock().unwrap().is_empty());
}
