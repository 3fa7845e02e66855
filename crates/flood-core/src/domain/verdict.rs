use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a single flood check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    /// Window count after this request was recorded.
    pub count: u64,
    pub remaining: u64,
    pub reset_after: Duration,
    /// Whether this request opened a new window.
    pub new_window: bool,
}
