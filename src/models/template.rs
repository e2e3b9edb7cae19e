//! Mail template models used by the message body resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Body type of a stored template / resolved message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Text,
    Html,
}

/// Stored mail template, keyed by (application, template_id)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MailTemplate {
    pub application: String,
    pub template_id: String,
    pub content: String,
    pub template_type: TemplateType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resolved message body returned by the resolver and the report API
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub content: String,
    pub content_type: TemplateType,
}
