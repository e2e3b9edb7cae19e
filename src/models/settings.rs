//! Delivery settings models: per-application mail policy, account pools,
//! and provider configuration. Loaded once at startup into an immutable
//! snapshot (see `config::AppSettings`).

use serde::{Deserialize, Serialize};

// =============================================================================
// Provider Type Enum
// =============================================================================

/// Delivery channel selected for the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Graph,
    Smtp,
    DirectSend,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Graph => write!(f, "graph"),
            ProviderType::Smtp => write!(f, "smtp"),
            ProviderType::DirectSend => write!(f, "directsend"),
        }
    }
}

// =============================================================================
// Per-Application Mail Policy
// =============================================================================

/// Per-application delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    pub application: String,
    /// Kill switch: when false no mail leaves the system (entities end FakeMail)
    pub mail_on: bool,
    /// When false, all recipients are redirected to `to_override`
    pub send_for_real: bool,
    #[serde(default)]
    pub to_override: String,
    #[serde(default)]
    pub save_to_sent: bool,
}

// =============================================================================
// Account Pools
// =============================================================================

/// One sending account within an application's pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredential {
    pub account_name: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Per-application pool of sending accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationAccounts {
    pub application: String,
    #[serde(default)]
    pub from_override: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountCredential>,
}

// =============================================================================
// Provider Settings
// =============================================================================

/// Retry policy shared by all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySetting {
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_max_retries() -> i32 {
    3
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

/// Microsoft Graph provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSetting {
    #[serde(default)]
    pub enable_batching: bool,
    #[serde(default = "default_batch_limit")]
    pub batch_request_limit: usize,
    /// Base URL of the Graph API, e.g. https://graph.microsoft.com/v1.0
    pub base_url: String,
    /// sendMail path template; `{account}` is replaced with the sending account
    #[serde(default = "default_send_mail_url")]
    pub send_mail_url: String,
    /// OAuth token endpoint for the client-credential flow
    pub token_url: String,
    pub client_id: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_batch_limit() -> usize {
    20
}

fn default_send_mail_url() -> String {
    "/users/{account}/sendMail".to_string()
}

fn default_scope() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

/// SMTP provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSetting {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

fn default_smtp_port() -> u16 {
    587
}

/// DirectSend relay settings (single fixed tenant identity, no account pool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectSendSetting {
    pub relay_url: String,
    pub from_address: String,
}
