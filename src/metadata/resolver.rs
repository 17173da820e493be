//! Concrete metadata and namespace resolution.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::id::SettingId;
use crate::setting::{
    is_compulsory, Metadata, META_DUPLICATE, META_ID, META_NS, META_TITLE, META_TRIGGER,
    META_TRUE,
};

use super::{MetadataTree, FILE_SECTION_PREFIX, FILE_WILDCARD_SECTION};

/// Resolves declared metadata for concrete setting ids.
///
/// Resolution is pure; results are memoised per resolver, so the cache lives
/// exactly as long as the editing session that owns it.
#[derive(Debug, Default)]
pub struct MetadataResolver {
    tree: MetadataTree,
    metadata_cache: RefCell<HashMap<SettingId, Metadata>>,
    namespace_cache: RefCell<HashMap<String, String>>,
}

impl MetadataResolver {
    /// Creates a resolver over a schema.
    #[must_use]
    pub fn new(tree: MetadataTree) -> Self {
        Self {
            tree,
            metadata_cache: RefCell::default(),
            namespace_cache: RefCell::default(),
        }
    }

    /// The underlying schema.
    #[must_use]
    pub fn tree(&self) -> &MetadataTree {
        &self.tree
    }

    /// Every id the schema declares, family ids included.
    pub fn declared_ids(&self) -> impl Iterator<Item = &SettingId> {
        self.tree.ids()
    }

    /// Declared trigger expressions, keyed by the (family) id declaring them.
    pub fn trigger_expressions(&self) -> impl Iterator<Item = (&SettingId, &str)> {
        self.tree.trigger_expressions()
    }

    /// Resolved metadata for a concrete id.
    ///
    /// Layers, lowest priority first: the `file:*` wildcard for `file:`
    /// sections, the unmodified family (`base` for `base{mod}`), then the
    /// family entry itself. Titles are adjusted for modified and duplicate
    /// instances and `id` is always set.
    ///
    /// An id nothing declares resolves to `{id}`, not to an empty map, and
    /// stays editable like any other setting.
    #[must_use]
    pub fn resolve(&self, id: &SettingId) -> Metadata {
        if let Some(cached) = self.metadata_cache.borrow().get(id) {
            return cached.clone();
        }
        let metadata = self.compute(id);
        self.metadata_cache
            .borrow_mut()
            .insert(id.clone(), metadata.clone());
        metadata
    }

    fn compute(&self, id: &SettingId) -> Metadata {
        let mut metadata = Metadata::new();
        if id.section.is_empty() && id.is_section() {
            metadata.insert(META_ID.to_string(), String::new());
            return metadata;
        }

        if let Some(file) = id.section.strip_prefix(FILE_SECTION_PREFIX) {
            if id.section != FILE_WILDCARD_SECTION {
                match &id.option {
                    None => {
                        metadata.insert(META_TITLE.to_string(), file.to_string());
                    }
                    Some(option) => {
                        let wildcard = SettingId::option(FILE_WILDCARD_SECTION, option.clone());
                        if let Some(props) = self.tree.get(&wildcard) {
                            metadata.extend(props.clone());
                        }
                    }
                }
            }
        }

        let search_id = id.family_id();
        let base_id = search_id.without_modifier();
        if base_id != search_id {
            if let Some(props) = self.tree.get(&base_id) {
                metadata.extend(props.clone());
                if id.is_section() {
                    if let Some(title) = metadata.get_mut(META_TITLE) {
                        let modifier = search_id.section.replacen(&base_id.section, "", 1);
                        title.push(' ');
                        title.push_str(&modifier);
                    }
                }
                if *id != search_id {
                    metadata.remove(META_DUPLICATE);
                }
            }
        }

        if let Some(props) = self.tree.get(&search_id) {
            metadata.extend(props.clone());
        }

        match (&id.option, &search_id.option) {
            (None, _) => {
                if search_id != *id {
                    metadata.remove(META_TITLE);
                }
            }
            (Some(option), Some(search_option)) if option != search_option => {
                if let Some(title) = metadata.get_mut(META_TITLE) {
                    let index = option.replacen(search_option.as_str(), "", 1);
                    title.push(' ');
                    title.push_str(&index);
                }
            }
            _ => {}
        }

        metadata.insert(META_ID.to_string(), id.to_string());
        metadata
    }

    /// Returns true if the section is an instance of a duplicate family.
    #[must_use]
    pub fn is_duplicate(&self, section: &str) -> bool {
        let family = SettingId::section(section.to_string()).family_id();
        self.tree
            .get(&family)
            .and_then(|m| m.get(META_DUPLICATE))
            .is_some_and(|v| v == META_TRUE)
    }

    /// Returns true if the resolved metadata marks the id compulsory.
    #[must_use]
    pub fn is_compulsory(&self, id: &SettingId) -> bool {
        is_compulsory(&self.resolve(id))
    }

    /// Resolved trigger expression for a concrete id, if any.
    #[must_use]
    pub fn trigger_of(&self, id: &SettingId) -> Option<String> {
        self.resolve(id).remove(META_TRIGGER)
    }

    /// Returns true if any metadata is declared for the id's family.
    #[must_use]
    pub fn is_declared(&self, id: &SettingId) -> bool {
        let family = id.family_id();
        self.tree.contains(&family) || self.tree.contains(&family.without_modifier())
    }

    /// Display namespace for a setting, given its resolved metadata.
    ///
    /// Options with an `ns` property use it; everything else shares the
    /// default namespace of its section.
    #[must_use]
    pub fn namespace_for(&self, id: &SettingId, metadata: &Metadata) -> String {
        if !id.is_section() {
            if let Some(ns) = metadata.get(META_NS) {
                return ns.trim_matches('/').to_string();
            }
        }
        self.section_namespace(&id.section)
    }

    /// Default namespace of a section.
    #[must_use]
    pub fn section_namespace(&self, section: &str) -> String {
        if let Some(ns) = self.namespace_cache.borrow().get(section) {
            return ns.clone();
        }
        let ns = self.compute_section_namespace(section);
        self.namespace_cache
            .borrow_mut()
            .insert(section.to_string(), ns.clone());
        ns
    }

    fn compute_section_namespace(&self, section: &str) -> String {
        let id = SettingId::section(section.to_string());
        let declared_ns = |id: &SettingId| self.tree.get(id).and_then(|m| m.get(META_NS)).cloned();
        let subspace = if let Some(ns) = declared_ns(&id) {
            ns
        } else if let Some(index) = id.duplicate_index() {
            match declared_ns(&id.family_id()) {
                Some(ns) => format!("{}/{index}", ns.trim_end_matches('/')),
                None => section.replace('(', "/").replace(')', "").replace(':', "/"),
            }
        } else if section.starts_with(FILE_SECTION_PREFIX) {
            section
                .trim_end_matches('/')
                .replace('/', ":")
                .replacen(':', "/", 1)
        } else {
            section.trim_end_matches('/').replace(':', "/")
        };
        subspace.trim_matches('/').to_string()
    }
}
