//! Metadata schema and resolution.
//!
//! The [`MetadataTree`] is the declared schema: a map from setting id (possibly
//! a family id such as `namelist:foo=bar`, or the `file:*=prop` wildcard) to
//! its properties. The [`MetadataResolver`] turns it into concrete per-setting
//! metadata and display namespaces.

mod resolver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::SettingId;
use crate::setting::{Metadata, META_TRIGGER};

pub use resolver::MetadataResolver;

/// Prefix shared by file-installation sections.
pub const FILE_SECTION_PREFIX: &str = "file:";
/// Section used to declare properties for every `file:` section option.
pub const FILE_WILDCARD_SECTION: &str = "file:*";

/// Declared metadata, keyed by setting id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTree {
    entries: BTreeMap<SettingId, Metadata>,
}

impl MetadataTree {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one property on an id.
    pub fn set(&mut self, id: SettingId, property: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(id)
            .or_default()
            .insert(property.into(), value.into());
    }

    /// Builder-style [`MetadataTree::set`]; silently skips unparseable ids.
    #[must_use]
    pub fn with(mut self, id: &str, property: &str, value: &str) -> Self {
        if let Ok(id) = id.parse::<SettingId>() {
            self.set(id, property, value);
        }
        self
    }

    /// Declares an id with no properties.
    #[must_use]
    pub fn declare(mut self, id: &str) -> Self {
        if let Ok(id) = id.parse::<SettingId>() {
            self.entries.entry(id).or_default();
        }
        self
    }

    /// Parses a schema exchanged as JSON (`{"id": {"prop": "value"}}`).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchema`] if the text is not such a
    /// map or an id does not parse.
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::InvalidSchema {
            reason: e.to_string(),
        })
    }

    /// Declared properties for exactly this id.
    #[must_use]
    pub fn get(&self, id: &SettingId) -> Option<&Metadata> {
        self.entries.get(id)
    }

    /// Returns true if the id is declared.
    #[must_use]
    pub fn contains(&self, id: &SettingId) -> bool {
        self.entries.contains_key(id)
    }

    /// All declared ids.
    pub fn ids(&self) -> impl Iterator<Item = &SettingId> {
        self.entries.keys()
    }

    /// Ids declaring a trigger expression, with the raw expression.
    pub fn trigger_expressions(&self) -> impl Iterator<Item = (&SettingId, &str)> {
        self.entries
            .iter()
            .filter_map(|(id, meta)| meta.get(META_TRIGGER).map(|t| (id, t.as_str())))
    }

    /// Declared option ids of a (family) section.
    pub fn options_of<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a SettingId> + 'a {
        self.entries
            .keys()
            .filter(move |id| id.section == section && !id.is_section())
    }

    /// Number of declared ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_builder() {
        let tree = MetadataTree::new()
            .with("env=A", "trigger", "env=B: 1")
            .with("env=A", "title", "A")
            .declare("namelist:x");
        assert_eq!(tree.len(), 2);
        assert!(tree.contains(&SettingId::section("namelist:x")));
        let triggers: Vec<_> = tree.trigger_expressions().collect();
        assert_eq!(triggers, vec![(&SettingId::option("env", "A"), "env=B: 1")]);
        assert_eq!(tree.options_of("env").count(), 1);
    }

    #[test]
    fn test_tree_json_is_flat_map() {
        let tree = MetadataTree::new().with("env=A", "compulsory", "true");
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"env=A":{"compulsory":"true"}}"#);
        let back: MetadataTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(MetadataTree::from_json(&json).unwrap(), tree);
        assert!(MetadataTree::from_json(r#"{"env=":{}}"#).is_err());
    }
}
