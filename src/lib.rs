//! # confedit - Metadata-aware configuration editing core
//!
//! confedit holds a sectioned `key=value` configuration in memory together
//! with its declared metadata, keeps the ignored state of every setting
//! consistent with the trigger relationships the metadata describes, and
//! makes every edit undoable.
//!
//! ## Core Concepts
//!
//! - **Setting**: a section or an option (variable), addressed by a [`SettingId`]
//! - **Latent setting**: declared by the metadata but absent from the configuration
//! - **Trigger**: a metadata rule enabling or ignoring other settings based on a value
//! - **Ignored reason**: why a setting is ignored (`User`, `System`, `Section`)
//! - **Command**: a reversible edit recorded on the undo stack, optionally grouped
//!
//! ## Usage
//!
//! ```rust
//! use confedit::{ConfigEditor, ConfigTree, EditorConfig, MetadataTree, SettingId};
//!
//! let schema = MetadataTree::new()
//!     .with("env=enable_flag", "trigger", "env=sub_option: true")
//!     .declare("env=sub_option");
//! let tree = ConfigTree::new()
//!     .with("env=enable_flag", "true")
//!     .with("env=sub_option", "1");
//!
//! let mut editor = ConfigEditor::load(tree, schema, EditorConfig::default())?;
//! let flag = SettingId::option("env", "enable_flag");
//! editor.set_value(&flag, "false")?;
//! assert_eq!(editor.get_errors().len(), 1);
//!
//! editor.fix_ignored(&SettingId::option("env", "sub_option"))?;
//! assert!(editor.get_errors().is_empty());
//!
//! editor.undo()?;
//! editor.undo()?;
//! assert!(editor.modified_ids().is_empty());
//! # Ok::<(), confedit::EditError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod id;
pub mod setting;
pub mod tree;

// Schema and storage
pub mod metadata;
pub mod storage;

// Consistency and editing
pub mod command;
pub mod diff;
pub mod editor;
pub mod trigger;

// Re-export primary types at crate root for convenience
pub use command::{Action, GroupTag, StackAction, StackItem};
pub use config::{EditorConfig, IGNORED_STATUS_MANUAL};
pub use diff::{DiffEntry, Modification, StructuralDiff};
pub use editor::{CommandOutcome, ConfigEditor, Problem};
pub use error::{EditError, EditResult, ExecutionError, PolicyError, ValidationError};
pub use id::SettingId;
pub use metadata::{MetadataResolver, MetadataTree};
pub use setting::{
    IgnoredReason, Metadata, ProblemKind, ProblemMap, ReasonMap, Section, SettingRef, Variable,
};
pub use storage::{SettingStore, SettingView};
pub use tree::{ConfigTree, NodeState, TreeNode, TreeSection};
pub use trigger::{
    ReconcileReport, SchemaError, SchemaProblem, TriggerVerdict, IGNORED_STATUS_CONFIG,
};
