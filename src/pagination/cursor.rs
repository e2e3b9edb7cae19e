use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Keyset cursor for paginating notification report queries.
/// Pages are ordered by `(created_at DESC, id DESC)`; the cursor carries the
/// last row seen so the next page resumes strictly after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCursor {
    /// created_at of the last row on the previous page
    pub last_created_at: DateTime<Utc>,
    /// Tie-breaker id of the last row on the previous page
    pub last_id: Uuid,
}

impl ReportCursor {
    pub fn new(last_created_at: DateTime<Utc>, last_id: Uuid) -> Self {
        Self {
            last_created_at,
            last_id,
        }
    }

    pub fn encode(&self) -> AppResult<String> {
        let json = serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("Cursor serialization failed: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }

    pub fn decode(s: &str) -> AppResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| AppError::Validation("Invalid continuation token".to_string()))?;

        let json = String::from_utf8(bytes)
            .map_err(|_| AppError::Validation("Invalid continuation token".to_string()))?;

        serde_json::from_str(&json)
            .map_err(|_| AppError::Validation("Invalid continuation token".to_string()))
    }
}
