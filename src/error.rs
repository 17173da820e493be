//! Error types for confedit.
//!
//! All errors are strongly typed using thiserror. Nothing in the editing core
//! is fatal: every variant here leaves the configuration in a flagged but
//! still-editable state.

use thiserror::Error;

use crate::id::SettingId;

/// Validation errors that occur before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid setting id '{raw}': {reason}")]
    InvalidSettingId {
        raw: String,
        reason: String,
    },

    #[error("Section name cannot be empty")]
    EmptySectionName,

    #[error("Section already exists: {section}")]
    SectionExists {
        section: String,
    },

    #[error("Setting already exists: {id}")]
    SettingExists {
        id: SettingId,
    },

    #[error("Invalid structural diff: {reason}")]
    InvalidDiff {
        reason: String,
    },

    #[error("Invalid configuration tree: {reason}")]
    InvalidTree {
        reason: String,
    },

    #[error("Invalid metadata schema: {reason}")]
    InvalidSchema {
        reason: String,
    },

    #[error("Invalid editor configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Policy violations rejected at the command boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Compulsory setting may not be user-ignored: {id}")]
    CompulsoryUserIgnore {
        id: SettingId,
    },

    #[error("Cannot enable {id}: still trigger-ignored by {parents}")]
    CannotEnable {
        id: SettingId,
        parents: String,
    },

    #[error("Section cannot be user-ignored: {section}")]
    SectionNotIgnorable {
        section: String,
    },
}

/// Execution errors that occur while running a command or an undo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Setting not found: {id}")]
    SettingNotFound {
        id: SettingId,
    },

    #[error("Section not found: {section}")]
    SectionNotFound {
        section: String,
    },

    #[error("An undo or redo is already in progress")]
    UndoInProgress,

    #[error("Nothing to {direction}")]
    EmptyStack {
        direction: &'static str,
    },

    #[error("Configuration has {count} unresolved consistency error(s)")]
    UnresolvedErrors {
        count: usize,
    },
}

/// Top-level error type for confedit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl EditError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a policy violation.
    #[must_use]
    pub const fn is_policy(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the caller can retry the same request later unchanged.
    ///
    /// Only a rejected nested undo qualifies; everything else depends on the
    /// request or the configuration changing first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::UndoInProgress))
    }
}

/// Result type alias for confedit operations.
pub type EditResult<T> = Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_setting_id() {
        let err = ValidationError::InvalidSettingId {
            raw: "=".to_string(),
            reason: "empty option".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Invalid setting id"));
        assert!(msg.contains("empty option"));
    }

    #[test]
    fn test_policy_error_cannot_enable() {
        let err = PolicyError::CannotEnable {
            id: SettingId::option("env", "FOO"),
            parents: "env=BAR".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("env=FOO"));
        assert!(msg.contains("env=BAR"));
    }

    #[test]
    fn test_execution_error_empty_stack() {
        let err = ExecutionError::EmptyStack { direction: "redo" };
        assert_eq!(err.to_string(), "Nothing to redo");
    }

    #[test]
    fn test_edit_error_from_validation() {
        let err: EditError = ValidationError::EmptySectionName.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_edit_error_from_policy() {
        let err: EditError = PolicyError::CompulsoryUserIgnore {
            id: SettingId::section("namelist:foo"),
        }
        .into();
        assert!(err.is_policy());
        assert!(!err.is_execution());
    }

    #[test]
    fn test_edit_error_retryable() {
        let err: EditError = ExecutionError::UndoInProgress.into();
        assert!(err.is_execution());
        assert!(err.is_retryable());

        let err: EditError = ExecutionError::UnresolvedErrors { count: 2 }.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_edit_error_internal() {
        let err = EditError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(err.to_string().contains("unexpected state"));
    }
}
