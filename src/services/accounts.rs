//! Round-robin selection of a sending account from a per-application pool.
//!
//! The cursor is keyed by application in a mutex-guarded map, so rotation in
//! one application never disturbs another and concurrent dispatch cycles see
//! consistent increments.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{AccountCredential, ApplicationAccounts};

#[derive(Default)]
pub struct AccountSelector {
    cursors: Mutex<HashMap<String, usize>>,
}

impl AccountSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the account the current cursor points at, considering only
    /// enabled accounts. Returns `None` when the application has no enabled
    /// accounts; callers turn that into a per-item failure, not a panic.
    pub fn fetch_account(&self, pool: &ApplicationAccounts) -> Option<AccountCredential> {
        let enabled: Vec<&AccountCredential> =
            pool.accounts.iter().filter(|a| a.is_enabled).collect();

        if enabled.is_empty() {
            return None;
        }

        let cursors = self.cursors.lock().expect("account cursor lock poisoned");
        let cursor = cursors.get(&pool.application).copied().unwrap_or(0);

        // The cursor counts selections monotonically; wrap over the
        // currently filtered list
        Some(enabled[cursor % enabled.len()].clone())
    }

    /// Advances the application's cursor so the next fetch lands on a
    /// different account. Called on mailbox-quota exhaustion, once per
    /// provider batch run.
    pub fn advance(&self, application: &str) {
        let mut cursors = self.cursors.lock().expect("account cursor lock poisoned");
        *cursors.entry(application.to_string()).or_insert(0) += 1;
    }
}
