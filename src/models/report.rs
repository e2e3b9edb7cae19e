//! Report query DTOs for the delivery-status API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NotificationEntity, NotificationStatus};

/// Filter body accepted by POST /v1/report/notifications.
/// Empty vectors mean "no filter on this dimension".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationReportFilter {
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<NotificationStatus>,
    #[serde(default)]
    pub accounts_used: Vec<String>,
    #[serde(default)]
    pub tracking_ids: Vec<String>,
    #[serde(default)]
    pub notification_ids: Vec<String>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Continuation token from a previous page
    #[serde(default)]
    pub continuation_token: Option<String>,
}

fn default_page_size() -> i64 {
    50
}

/// One page of report results
#[derive(Debug, Serialize)]
pub struct NotificationReportPage {
    pub items: Vec<NotificationEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}
