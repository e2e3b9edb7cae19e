//! Reporting service: filtered history queries and resolved message bodies.

use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{MessageBody, NotificationReportFilter, NotificationReportPage};
use crate::pagination::ReportCursor;
use crate::repository::NotificationRepository;
use crate::services::body::MessageBodyResolver;

const MAX_PAGE_SIZE: i64 = 200;

pub struct ReportService {
    repository: Arc<dyn NotificationRepository>,
    resolver: Arc<MessageBodyResolver>,
}

impl ReportService {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        resolver: Arc<MessageBodyResolver>,
    ) -> Self {
        Self {
            repository,
            resolver,
        }
    }

    /// Runs one filtered report query, decoding and re-encoding the
    /// opaque continuation token around the keyset query.
    pub async fn query_notifications(
        &self,
        filter: &NotificationReportFilter,
    ) -> AppResult<NotificationReportPage> {
        let page_size = filter.page_size.clamp(1, MAX_PAGE_SIZE);

        let cursor = filter
            .continuation_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(ReportCursor::decode)
            .transpose()?;

        let (items, next) = self
            .repository
            .query_entities(filter, cursor, page_size)
            .await?;

        Ok(NotificationReportPage {
            items,
            continuation_token: next.map(|c| c.encode()).transpose()?,
        })
    }

    /// Resolves the message body for one stored notification, re-running the
    /// same literal-or-template resolution used at send time
    pub async fn get_notification_message(
        &self,
        application: &str,
        notification_id: &str,
    ) -> AppResult<MessageBody> {
        let entity = self
            .repository
            .get_entity(application, notification_id)
            .await?;
        self.resolver.get_message_body(application, &entity).await
    }
}
