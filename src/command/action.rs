//! Commands and undo stack entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::StructuralDiff;
use crate::id::SettingId;
use crate::setting::{ReasonMap, Section, Variable};

/// A fully specified call into the editor's command family.
///
/// Every stack entry stores the `Action` that reverses it, with all arguments
/// captured when the original command ran.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    AddVariable {
        variable: Variable,
    },
    /// Puts back a removed variable exactly as captured.
    RestoreVariable {
        variable: Variable,
    },
    RemoveVariable {
        id: SettingId,
    },
    SetValue {
        id: SettingId,
        value: String,
    },
    SetComments {
        id: SettingId,
        comments: Vec<String>,
    },
    /// `reasons` replaces every reason except `Section`.
    SetIgnored {
        id: SettingId,
        reasons: ReasonMap,
        #[serde(default)]
        override_policy: bool,
    },
    AddSection {
        section: Section,
        #[serde(default)]
        variables: Vec<Variable>,
    },
    /// Puts back a removed section and its variables exactly as captured.
    RestoreSection {
        section: Section,
        #[serde(default)]
        variables: Vec<Variable>,
    },
    RemoveSection {
        name: String,
    },
    /// Empty `reasons` enables the section.
    IgnoreSection {
        name: String,
        reasons: ReasonMap,
        #[serde(default)]
        override_policy: bool,
    },
    SetSectionComments {
        name: String,
        comments: Vec<String>,
    },
    ApplyDiff {
        diff: StructuralDiff,
        label: String,
        #[serde(default)]
        trigger_override: bool,
    },
}

impl Action {
    /// Setting the action targets; the root section for diffs.
    #[must_use]
    pub fn target(&self) -> SettingId {
        match self {
            Self::AddVariable { variable } | Self::RestoreVariable { variable } => {
                variable.id.clone()
            }
            Self::RemoveVariable { id }
            | Self::SetValue { id, .. }
            | Self::SetComments { id, .. }
            | Self::SetIgnored { id, .. } => id.clone(),
            Self::AddSection { section, .. } | Self::RestoreSection { section, .. } => section.id(),
            Self::RemoveSection { name }
            | Self::IgnoreSection { name, .. }
            | Self::SetSectionComments { name, .. } => SettingId::section(name.clone()),
            Self::ApplyDiff { .. } => SettingId::section(String::new()),
        }
    }
}

/// Kind of change a stack entry records, shown in undo/redo listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackAction {
    /// A setting was added.
    Added,
    /// A value changed.
    Changed,
    /// Comments changed.
    ChangedComments,
    /// A setting was enabled.
    Enabled,
    /// A setting was ignored.
    Ignored,
    /// A setting was removed.
    Removed,
    /// A diff was applied.
    Applied,
}

impl StackAction {
    /// Listing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Changed => "Changed",
            Self::ChangedComments => "Changed #",
            Self::Enabled => "Enabled",
            Self::Ignored => "Ignored",
            Self::Removed => "Removed",
            Self::Applied => "Applied",
        }
    }
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tag shared by stack entries that undo and redo together.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupTag(Uuid);

impl GroupTag {
    /// Create a new random tag.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for GroupTag {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the affected setting taken when the entry was recorded.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snapshot {
    Section { section: Section },
    Variable { variable: Variable },
    Diff { diff: StructuralDiff },
}

/// One undo or redo entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackItem {
    /// Namespace of the affected setting when the entry was recorded.
    pub namespace: String,
    /// What happened.
    pub action: StackAction,
    /// Display name: the setting id, or the origin label of a diff.
    pub name: String,
    /// The setting as it was after the change.
    pub snapshot: Snapshot,
    /// Call that reverses the change.
    pub inverse: Action,
    /// Group the entry belongs to.
    pub group: Option<GroupTag>,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

impl StackItem {
    /// Listing label, e.g. `Changed env=A`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.action, self.name)
    }
}
