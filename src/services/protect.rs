//! Content protection seam for sensitive message content.
//!
//! The factory protects `body` and `template_data` before persistence and the
//! body resolver reveals them at send time. The default implementation is a
//! pass-through; deployments wire an actual cipher behind the trait.

use crate::error::AppResult;

pub trait ContentProtector: Send + Sync {
    /// Applied before persistence
    fn protect(&self, content: &str) -> AppResult<String>;

    /// Applied at send time; must invert `protect`
    fn reveal(&self, content: &str) -> AppResult<String>;
}

/// Pass-through protector (no encryption configured)
#[derive(Default)]
pub struct NoopProtector;

impl ContentProtector for NoopProtector {
    fn protect(&self, content: &str) -> AppResult<String> {
        Ok(content.to_string())
    }

    fn reveal(&self, content: &str) -> AppResult<String> {
        Ok(content.to_string())
    }
}
