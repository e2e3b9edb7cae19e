//! Persistence collaborators behind trait seams.
//!
//! The dispatch pipeline only ever talks to `NotificationRepository` and
//! `TemplateStore`; the Postgres implementations live in `postgres`. Tests
//! substitute in-memory implementations.

pub mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{MailTemplate, NotificationEntity, NotificationReportFilter};
use crate::pagination::ReportCursor;

pub use postgres::{PgNotificationRepository, PgTemplateStore};

/// CRUD + filtered query over notification entities
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persists freshly created entities
    async fn create_entities(&self, entities: &[NotificationEntity]) -> AppResult<()>;

    /// Loads entities by notification id for one application, preserving the
    /// requested id order. Zero matches is a validation error, not an empty
    /// result: a queue chunk referencing unknown ids aborts the cycle.
    async fn get_entities_by_ids(
        &self,
        application: &str,
        notification_ids: &[String],
    ) -> AppResult<Vec<NotificationEntity>>;

    /// Loads a single entity by notification id
    async fn get_entity(
        &self,
        application: &str,
        notification_id: &str,
    ) -> AppResult<NotificationEntity>;

    /// Commits the post-dispatch state of a batch in one call
    async fn update_entities(&self, entities: &[NotificationEntity]) -> AppResult<()>;

    /// Filtered, keyset-paginated report query
    async fn query_entities(
        &self,
        filter: &NotificationReportFilter,
        cursor: Option<ReportCursor>,
        page_size: i64,
    ) -> AppResult<(Vec<NotificationEntity>, Option<ReportCursor>)>;
}

/// Mail template lookup
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(
        &self,
        application: &str,
        template_id: &str,
    ) -> AppResult<Option<MailTemplate>>;
}
