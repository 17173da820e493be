//! Persisted configuration boundary.
//!
//! [`ConfigTree`] is what file collaborators hand to the editor on load and
//! receive back on dump. It carries values, ignored states and comments only;
//! metadata, problems and latent settings never cross this boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::SettingId;
use crate::setting::{IgnoredReason, ReasonMap};

/// Persisted ignored state of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Enabled.
    #[default]
    Normal,
    /// Ignored by the user (`!`).
    UserIgnored,
    /// Ignored by the trigger system (`!!`).
    SystemIgnored,
}

impl NodeState {
    /// Persisted state for a reason map. `User` wins over `System`; a
    /// section-only cause is not persisted on the variable itself.
    #[must_use]
    pub fn from_reasons(reasons: &ReasonMap) -> Self {
        if reasons.contains_key(&IgnoredReason::User) {
            Self::UserIgnored
        } else if reasons.contains_key(&IgnoredReason::System) {
            Self::SystemIgnored
        } else {
            Self::Normal
        }
    }

    /// Reason map for this state, tagging each reason with `status`.
    #[must_use]
    pub fn to_reasons(self, status: &str) -> ReasonMap {
        let mut reasons = ReasonMap::new();
        match self {
            Self::Normal => {}
            Self::UserIgnored => {
                reasons.insert(IgnoredReason::User, status.to_string());
            }
            Self::SystemIgnored => {
                reasons.insert(IgnoredReason::System, status.to_string());
            }
        }
        reasons
    }

    /// Returns true unless the state is [`NodeState::Normal`].
    #[must_use]
    pub const fn is_ignored(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// One persisted option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeNode {
    /// Raw value text.
    pub value: String,
    /// Ignored state.
    pub state: NodeState,
    /// Comment lines.
    pub comments: Vec<String>,
}

impl TreeNode {
    /// Creates an enabled node.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Builder-style state setter.
    #[must_use]
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }
}

/// One persisted section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSection {
    /// Ignored state.
    pub state: NodeState,
    /// Comment lines.
    pub comments: Vec<String>,
    /// Options keyed by name.
    pub options: BTreeMap<String, TreeNode>,
}

/// A whole persisted configuration. The root section is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTree {
    /// Sections keyed by name.
    pub sections: BTreeMap<String, TreeSection>,
}

impl ConfigTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) an option value, creating the section if needed.
    pub fn set(&mut self, id: &SettingId, node: TreeNode) {
        let section = self.sections.entry(id.section.clone()).or_default();
        if let Some(option) = &id.option {
            section.options.insert(option.clone(), node);
        }
    }

    /// Builder-style [`ConfigTree::set`].
    #[must_use]
    pub fn with(mut self, id: &str, value: &str) -> Self {
        if let Ok(id) = id.parse::<SettingId>() {
            self.set(&id, TreeNode::new(value));
        }
        self
    }

    /// Builder-style section state setter.
    #[must_use]
    pub fn with_section_state(mut self, section: &str, state: NodeState) -> Self {
        self.sections.entry(section.to_string()).or_default().state = state;
        self
    }

    /// Builder-style option state setter; the option must already exist.
    #[must_use]
    pub fn with_option_state(mut self, id: &str, state: NodeState) -> Self {
        if let Some(node) = id.parse::<SettingId>().ok().and_then(|id| self.node_mut(&id)) {
            node.state = state;
        }
        self
    }

    /// Parses a tree exchanged as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTree`] if the text does not describe
    /// a tree.
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::InvalidTree {
            reason: e.to_string(),
        })
    }

    /// JSON form of the tree.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Looks up a section.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&TreeSection> {
        self.sections.get(name)
    }

    /// Looks up an option node.
    #[must_use]
    pub fn node(&self, id: &SettingId) -> Option<&TreeNode> {
        let option = id.option.as_ref()?;
        self.sections.get(&id.section)?.options.get(option)
    }

    fn node_mut(&mut self, id: &SettingId) -> Option<&mut TreeNode> {
        let option = id.option.as_ref()?;
        self.sections.get_mut(&id.section)?.options.get_mut(option)
    }

    /// Returns true if the id (section or option) exists.
    #[must_use]
    pub fn contains(&self, id: &SettingId) -> bool {
        match &id.option {
            None => self.sections.contains_key(&id.section),
            Some(_) => self.node(id).is_some(),
        }
    }

    /// All setting ids, sections before their options.
    #[must_use]
    pub fn ids(&self) -> Vec<SettingId> {
        let mut ids = Vec::new();
        for (name, section) in &self.sections {
            ids.push(SettingId::section(name.clone()));
            ids.extend(
                section
                    .options
                    .keys()
                    .map(|option| SettingId::option(name.clone(), option.clone())),
            );
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_reasons() {
        let mut reasons = ReasonMap::new();
        assert_eq!(NodeState::from_reasons(&reasons), NodeState::Normal);
        reasons.insert(IgnoredReason::Section, String::new());
        assert_eq!(NodeState::from_reasons(&reasons), NodeState::Normal);
        reasons.insert(IgnoredReason::System, String::new());
        assert_eq!(NodeState::from_reasons(&reasons), NodeState::SystemIgnored);
        reasons.insert(IgnoredReason::User, String::new());
        assert_eq!(NodeState::from_reasons(&reasons), NodeState::UserIgnored);
    }

    #[test]
    fn test_tree_builder_and_lookup() {
        let tree = ConfigTree::new()
            .with("env=FOO", "1")
            .with("namelist:a=b", ".true.")
            .with_option_state("env=FOO", NodeState::UserIgnored)
            .with_section_state("namelist:c", NodeState::SystemIgnored);

        let foo = tree.node(&SettingId::option("env", "FOO")).unwrap();
        assert_eq!(foo.value, "1");
        assert_eq!(foo.state, NodeState::UserIgnored);
        assert!(tree.contains(&SettingId::section("namelist:c")));
        assert!(!tree.contains(&SettingId::option("namelist:c", "x")));
        assert_eq!(tree.ids().len(), 5);
    }

    #[test]
    fn test_tree_json_shape() {
        let tree = ConfigTree::new().with("env=FOO", "1");
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["sections"]["env"]["options"]["FOO"]["value"], "1");
        let back: ConfigTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(ConfigTree::from_json(&tree.to_json().unwrap()).unwrap(), tree);
        assert!(matches!(
            ConfigTree::from_json("[1, 2]"),
            Err(ValidationError::InvalidTree { .. })
        ));
    }
}
