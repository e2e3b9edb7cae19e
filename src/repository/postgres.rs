//! Postgres implementations of the persistence collaborators.

use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;

use super::{NotificationRepository, TemplateStore};
use crate::error::{AppError, AppResult};
use crate::models::{MailTemplate, NotificationEntity, NotificationReportFilter};
use crate::pagination::ReportCursor;

const ENTITY_COLUMNS: &str = r#"
    id, notification_id, application, kind,
    to_addresses, cc_addresses, bcc_addresses, reply_to_addresses, from_address,
    subject, body, template_id, template_data,
    status, error_message, try_count, account_used, tracking_id,
    attachments, send_on_utc, starts_at, ends_at, recurrence,
    is_cancel, is_online_meeting, sequence_number, ical_uid,
    created_at, updated_at
"#;

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create_entities(&self, entities: &[NotificationEntity]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for entity in entities {
            sqlx::query(
                r#"
                INSERT INTO notifications (
                    id, notification_id, application, kind,
                    to_addresses, cc_addresses, bcc_addresses, reply_to_addresses, from_address,
                    subject, body, template_id, template_data,
                    status, error_message, try_count, account_used, tracking_id,
                    attachments, send_on_utc, starts_at, ends_at, recurrence,
                    is_cancel, is_online_meeting, sequence_number, ical_uid,
                    created_at, updated_at
                )
                VALUES (
                    $1, $2, $3, $4::text::varchar,
                    $5, $6, $7, $8, $9,
                    $10, $11, $12, $13,
                    $14::text::varchar, $15, $16, $17, $18,
                    $19, $20, $21, $22, $23,
                    $24, $25, $26, $27,
                    $28, $29
                )
                "#,
            )
            .bind(entity.id)
            .bind(&entity.notification_id)
            .bind(&entity.application)
            .bind(entity.kind.to_string())
            .bind(&entity.to_addresses)
            .bind(&entity.cc_addresses)
            .bind(&entity.bcc_addresses)
            .bind(&entity.reply_to_addresses)
            .bind(&entity.from_address)
            .bind(&entity.subject)
            .bind(&entity.body)
            .bind(&entity.template_id)
            .bind(&entity.template_data)
            .bind(entity.status.to_string())
            .bind(&entity.error_message)
            .bind(entity.try_count)
            .bind(&entity.account_used)
            .bind(&entity.tracking_id)
            .bind(&entity.attachments)
            .bind(entity.send_on_utc)
            .bind(entity.starts_at)
            .bind(entity.ends_at)
            .bind(&entity.recurrence)
            .bind(entity.is_cancel)
            .bind(entity.is_online_meeting)
            .bind(entity.sequence_number)
            .bind(&entity.ical_uid)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.constraint() == Some("notifications_application_notification_id_key")
                    {
                        return AppError::Conflict(format!(
                            "Notification '{}' already exists for application '{}'",
                            entity.notification_id, entity.application
                        ));
                    }
                }
                AppError::Database(e)
            })?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn get_entities_by_ids(
        &self,
        application: &str,
        notification_ids: &[String],
    ) -> AppResult<Vec<NotificationEntity>> {
        let rows: Vec<NotificationEntity> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE application = $1 AND notification_id = ANY($2)",
            ENTITY_COLUMNS
        ))
        .bind(application)
        .bind(notification_ids)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(AppError::Validation(format!(
                "No records found for the given notification ids in application '{}'",
                application
            )));
        }

        // Re-order to match the requested ids
        let mut by_id: HashMap<String, NotificationEntity> = rows
            .into_iter()
            .map(|e| (e.notification_id.clone(), e))
            .collect();

        Ok(notification_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    async fn get_entity(
        &self,
        application: &str,
        notification_id: &str,
    ) -> AppResult<NotificationEntity> {
        sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE application = $1 AND notification_id = $2",
            ENTITY_COLUMNS
        ))
        .bind(application)
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Notification '{}' not found for application '{}'",
                notification_id, application
            ))
        })
    }

    async fn update_entities(&self, entities: &[NotificationEntity]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for entity in entities {
            sqlx::query(
                r#"
                UPDATE notifications
                SET status = $2::text::varchar,
                    error_message = $3,
                    try_count = $4,
                    account_used = $5,
                    from_address = $6,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(entity.id)
            .bind(entity.status.to_string())
            .bind(&entity.error_message)
            .bind(entity.try_count)
            .bind(&entity.account_used)
            .bind(&entity.from_address)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn query_entities(
        &self,
        filter: &NotificationReportFilter,
        cursor: Option<ReportCursor>,
        page_size: i64,
    ) -> AppResult<(Vec<NotificationEntity>, Option<ReportCursor>)> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM notifications WHERE TRUE",
            ENTITY_COLUMNS
        ));

        if !filter.applications.is_empty() {
            builder.push(" AND application = ANY(");
            builder.push_bind(&filter.applications);
            builder.push(")");
        }
        if !filter.statuses.is_empty() {
            let statuses: Vec<String> = filter.statuses.iter().map(|s| s.to_string()).collect();
            builder.push(" AND status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
        }
        if !filter.accounts_used.is_empty() {
            builder.push(" AND account_used = ANY(");
            builder.push_bind(&filter.accounts_used);
            builder.push(")");
        }
        if !filter.tracking_ids.is_empty() {
            builder.push(" AND tracking_id = ANY(");
            builder.push_bind(&filter.tracking_ids);
            builder.push(")");
        }
        if !filter.notification_ids.is_empty() {
            builder.push(" AND notification_id = ANY(");
            builder.push_bind(&filter.notification_ids);
            builder.push(")");
        }
        if let Some(from) = filter.created_from {
            builder.push(" AND created_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = filter.created_to {
            builder.push(" AND created_at <= ");
            builder.push_bind(to);
        }
        if let Some(ref cursor) = cursor {
            builder.push(" AND (created_at, id) < (");
            builder.push_bind(cursor.last_created_at);
            builder.push(", ");
            builder.push_bind(cursor.last_id);
            builder.push(")");
        }

        // Fetch one extra row to decide whether a next page exists
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(page_size + 1);

        let mut rows: Vec<NotificationEntity> =
            builder.build_query_as().fetch_all(&self.pool).await?;

        let next_cursor = if rows.len() as i64 > page_size {
            rows.truncate(page_size as usize);
            rows.last()
                .map(|last| ReportCursor::new(last.created_at, last.id))
        } else {
            None
        };

        Ok((rows, next_cursor))
    }
}

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn get_template(
        &self,
        application: &str,
        template_id: &str,
    ) -> AppResult<Option<MailTemplate>> {
        let template = sqlx::query_as::<_, MailTemplate>(
            r#"
            SELECT application, template_id, content, template_type, created_at, updated_at
            FROM mail_templates
            WHERE application = $1 AND template_id = $2
            "#,
        )
        .bind(application)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }
}
