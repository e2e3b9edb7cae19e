//! Queue consumer loop.
//!
//! Pulls published chunks off the queue gateway, re-hydrates them into
//! dispatch requests, and runs them through the orchestrator. A message is
//! acked only after its whole chunk processed without a cycle-level error;
//! unacked messages are redelivered on a later poll.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{NotificationKind, QueueEnvelope, QueueNotificationItem};
use crate::queue::{QueueGateway, QueueMessage};
use crate::services::DispatchOrchestrator;

const PULL_BATCH: usize = 16;

/// Runs the consumer loop until the process exits
pub async fn run_queue_worker(
    orchestrator: Arc<DispatchOrchestrator>,
    queue: Arc<dyn QueueGateway>,
    poll_interval: Duration,
) {
    log::info!(
        "Queue worker started (poll interval {:?})",
        poll_interval
    );

    loop {
        match queue.pull(PULL_BATCH).await {
            Ok(messages) => {
                for message in messages {
                    process_message(&orchestrator, queue.as_ref(), message).await;
                }
            }
            Err(e) => log::error!("Queue pull failed: {}", e),
        }

        // 10% jitter keeps replicas from polling in lockstep
        let jitter = poll_interval.mul_f64(0.1 * rand::random::<f64>());
        tokio::time::sleep(poll_interval + jitter).await;
    }
}

async fn process_message(
    orchestrator: &DispatchOrchestrator,
    queue: &dyn QueueGateway,
    message: QueueMessage,
) {
    if message.envelopes.is_empty() {
        let _ = queue.ack(&message).await;
        return;
    }

    let mut all_ok = true;
    for (application, kind, envelopes) in group_envelopes(&message.envelopes) {
        let item = QueueNotificationItem::from_envelopes(&envelopes);

        let result = match kind {
            NotificationKind::Email => {
                orchestrator
                    .process_email_notifications(&application, &item)
                    .await
            }
            NotificationKind::Meeting => {
                orchestrator
                    .process_meeting_notifications(&application, &item)
                    .await
            }
        };

        if let Err(e) = result {
            log::error!(
                "Dispatch cycle failed for application {} ({:?}): {}",
                application,
                kind,
                e
            );
            all_ok = false;
        }
    }

    if all_ok {
        if let Err(e) = queue.ack(&message).await {
            log::warn!("Failed to ack queue message: {}", e);
        }
    }
}

/// Groups a chunk's envelopes by (application, kind), preserving first-seen
/// order. Chunks are normally homogeneous; mixed chunks still dispatch
/// correctly, one cycle per group.
fn group_envelopes(
    envelopes: &[QueueEnvelope],
) -> Vec<(String, NotificationKind, Vec<QueueEnvelope>)> {
    let mut groups: Vec<(String, NotificationKind, Vec<QueueEnvelope>)> = Vec::new();

    for envelope in envelopes {
        match groups
            .iter_mut()
            .find(|(app, kind, _)| app == &envelope.application && *kind == envelope.kind)
        {
            Some((_, _, group)) => group.push(envelope.clone()),
            None => groups.push((
                envelope.application.clone(),
                envelope.kind,
                vec![envelope.clone()],
            )),
        }
    }

    groups
}
