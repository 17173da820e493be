//! Structural diffs between configuration trees.
//!
//! A [`StructuralDiff`] is a set of additions, modifications and removals keyed
//! by setting id. The editor applies one as a single undoable action; its
//! inverse is simply the reversed diff.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::SettingId;
use crate::setting::{Section, Variable};
use crate::tree::{ConfigTree, NodeState, TreeNode};

/// Content of one diff entry. Sections carry no value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffEntry {
    /// Value text for options, `None` for sections.
    pub value: Option<String>,
    /// Ignored state.
    pub state: NodeState,
    /// Comment lines.
    pub comments: Vec<String>,
}

impl DiffEntry {
    /// Entry for a section.
    #[must_use]
    pub fn section(state: NodeState) -> Self {
        Self {
            value: None,
            state,
            comments: Vec::new(),
        }
    }

    /// Entry for an option.
    #[must_use]
    pub fn option(value: impl Into<String>, state: NodeState) -> Self {
        Self {
            value: Some(value.into()),
            state,
            comments: Vec::new(),
        }
    }

    /// Entry describing a stored variable.
    #[must_use]
    pub fn of_variable(variable: &Variable) -> Self {
        Self {
            value: Some(variable.value.clone()),
            state: NodeState::from_reasons(&variable.ignored_reason),
            comments: variable.comments.clone(),
        }
    }

    /// Entry describing a stored section.
    #[must_use]
    pub fn of_section(section: &Section) -> Self {
        Self {
            value: None,
            state: NodeState::from_reasons(&section.ignored_reason),
            comments: section.comments.clone(),
        }
    }

    fn from_node(node: &TreeNode) -> Self {
        Self {
            value: Some(node.value.clone()),
            state: node.state,
            comments: node.comments.clone(),
        }
    }
}

/// Before/after pair of a modified setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// State before the change.
    pub before: DiffEntry,
    /// State after the change.
    pub after: DiffEntry,
}

/// Additions, modifications and removals keyed by setting id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralDiff {
    /// Settings to add.
    pub added: BTreeMap<SettingId, DiffEntry>,
    /// Settings to change in place.
    pub modified: BTreeMap<SettingId, Modification>,
    /// Settings to remove, with their content at removal time.
    pub removed: BTreeMap<SettingId, DiffEntry>,
}

impl StructuralDiff {
    /// Creates an empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style addition.
    #[must_use]
    pub fn add(mut self, id: SettingId, entry: DiffEntry) -> Self {
        self.added.insert(id, entry);
        self
    }

    /// Builder-style modification.
    #[must_use]
    pub fn modify(mut self, id: SettingId, before: DiffEntry, after: DiffEntry) -> Self {
        self.modified.insert(id, Modification { before, after });
        self
    }

    /// Builder-style removal.
    #[must_use]
    pub fn remove(mut self, id: SettingId, entry: DiffEntry) -> Self {
        self.removed.insert(id, entry);
        self
    }

    /// Returns true if the diff changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Diff that turns `old` into `new`.
    #[must_use]
    pub fn between(old: &ConfigTree, new: &ConfigTree) -> Self {
        let mut diff = Self::new();
        for (name, new_section) in &new.sections {
            let id = SettingId::section(name.clone());
            let after = DiffEntry {
                value: None,
                state: new_section.state,
                comments: new_section.comments.clone(),
            };
            match old.sections.get(name) {
                None => {
                    diff.added.insert(id, after);
                }
                Some(old_section) => {
                    let before = DiffEntry {
                        value: None,
                        state: old_section.state,
                        comments: old_section.comments.clone(),
                    };
                    if before != after {
                        diff.modified.insert(id, Modification { before, after });
                    }
                }
            }
            for (option, node) in &new_section.options {
                let id = SettingId::option(name.clone(), option.clone());
                let after = DiffEntry::from_node(node);
                match old.node(&id) {
                    None => {
                        diff.added.insert(id, after);
                    }
                    Some(old_node) => {
                        let before = DiffEntry::from_node(old_node);
                        if before != after {
                            diff.modified.insert(id, Modification { before, after });
                        }
                    }
                }
            }
        }
        for (name, old_section) in &old.sections {
            for (option, node) in &old_section.options {
                let id = SettingId::option(name.clone(), option.clone());
                if !new.contains(&id) {
                    diff.removed.insert(id, DiffEntry::from_node(node));
                }
            }
            if !new.sections.contains_key(name) {
                diff.removed.insert(
                    SettingId::section(name.clone()),
                    DiffEntry {
                        value: None,
                        state: old_section.state,
                        comments: old_section.comments.clone(),
                    },
                );
            }
        }
        diff
    }

    /// The inverse diff: additions become removals and vice versa, and each
    /// modification swaps its before/after.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            added: self.removed.clone(),
            modified: self
                .modified
                .iter()
                .map(|(id, m)| {
                    (
                        id.clone(),
                        Modification {
                            before: m.after.clone(),
                            after: m.before.clone(),
                        },
                    )
                })
                .collect(),
            removed: self.added.clone(),
        }
    }

    /// Checks the diff shape without looking at any configuration.
    ///
    /// Rejects ids listed in more than one class, entry values that do not
    /// match the id kind (sections carry no value, options must) and option
    /// additions inside a section the same diff removes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDiff`] describing the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = BTreeSet::new();
        let classes = self
            .added
            .keys()
            .chain(self.modified.keys())
            .chain(self.removed.keys());
        for id in classes {
            if !seen.insert(id) {
                return Err(invalid(format!("{id} appears in more than one class")));
            }
        }
        let entries = self
            .added
            .iter()
            .chain(self.removed.iter())
            .chain(self.modified.iter().map(|(id, m)| (id, &m.before)))
            .chain(self.modified.iter().map(|(id, m)| (id, &m.after)));
        for (id, entry) in entries {
            if id.is_section() != entry.value.is_none() {
                return Err(invalid(format!("{id} entry does not match its kind")));
            }
        }
        for id in self.added.keys().filter(|id| !id.is_section()) {
            if self.removed.contains_key(&id.section_id()) {
                return Err(invalid(format!(
                    "{id} is added to section '{}' which is removed",
                    id.section
                )));
            }
        }
        Ok(())
    }

    /// Additions, shallowest first (sections before options).
    #[must_use]
    pub fn ordered_additions(&self) -> Vec<(&SettingId, &DiffEntry)> {
        let mut items: Vec<_> = self.added.iter().collect();
        items.sort_by_key(|(id, _)| !id.is_section());
        items
    }

    /// Removals, deepest first (options before sections).
    #[must_use]
    pub fn ordered_removals(&self) -> Vec<(&SettingId, &DiffEntry)> {
        let mut items: Vec<_> = self.removed.iter().collect();
        items.sort_by_key(|(id, _)| id.is_section());
        items
    }

    /// Applies the diff to a plain tree.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDiff`] if the diff shape is invalid.
    pub fn apply_to(&self, tree: &mut ConfigTree) -> Result<(), ValidationError> {
        self.validate()?;
        let write = |tree: &mut ConfigTree, id: &SettingId, entry: &DiffEntry| match &entry.value {
            None => {
                let section = tree.sections.entry(id.section.clone()).or_default();
                section.state = entry.state;
                section.comments.clone_from(&entry.comments);
            }
            Some(value) => tree.set(
                id,
                TreeNode {
                    value: value.clone(),
                    state: entry.state,
                    comments: entry.comments.clone(),
                },
            ),
        };
        for (id, entry) in self.ordered_additions() {
            write(tree, id, entry);
        }
        for (id, m) in &self.modified {
            write(tree, id, &m.after);
        }
        for (id, _) in self.ordered_removals() {
            match &id.option {
                None => {
                    tree.sections.remove(&id.section);
                }
                Some(option) => {
                    if let Some(section) = tree.sections.get_mut(&id.section) {
                        section.options.remove(option);
                    }
                }
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidDiff { reason }
}
