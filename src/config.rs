//! Editor session configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Status text attached to `System` ignores set by manual intervention.
pub const IGNORED_STATUS_MANUAL: &str = "from manual intervention.";

/// Tunables for one [`ConfigEditor`](crate::ConfigEditor) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of undo entries kept; oldest groups are dropped first.
    /// `None` keeps everything.
    pub max_undo_depth: Option<usize>,
    /// Re-run trigger reconciliation after every command.
    pub auto_reconcile: bool,
    /// Maximum number of parsed trigger value rules memoised per session.
    pub rule_cache_capacity: usize,
    /// Status text recorded when a user fixes an ignored-state error by hand.
    pub ignored_status_manual: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: None,
            auto_reconcile: true,
            rule_cache_capacity: 1024,
            ignored_status_manual: IGNORED_STATUS_MANUAL.to_string(),
        }
    }
}

impl EditorConfig {
    /// Validate configuration.
    ///
    /// Called by `ConfigEditor::load` before any state is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_undo_depth == Some(0) {
            return Err(ValidationError::InvalidConfig {
                reason: "max_undo_depth must be > 0 when set".to_string(),
            });
        }
        if self.rule_cache_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "rule_cache_capacity must be > 0".to_string(),
            });
        }
        if self.ignored_status_manual.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "ignored_status_manual cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
