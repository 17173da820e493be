//! Partitioned settings store.

use std::collections::HashMap;

use crate::id::SettingId;
use crate::setting::{Fingerprint, Section, Variable};

use super::partition::{find, take, Partition, SectionMap, VariableMap};
use super::traits::SettingView;

/// Owns every section and variable of one configuration.
///
/// A setting lives in at most one of `now` and `latent`. Adding moves a latent
/// setting to `now`; removing demotes a real setting to `latent`.
#[derive(Debug, Clone, Default)]
pub struct SettingStore {
    sections: Partition<SectionMap>,
    variables: Partition<VariableMap>,
    saved: HashMap<SettingId, Fingerprint>,
}

fn merge_from_latent(incoming: &mut Variable, latent: Variable) {
    if incoming.metadata.is_empty() {
        incoming.metadata = latent.metadata;
    }
    if incoming.ignored_reason.is_empty() {
        incoming.ignored_reason = latent.ignored_reason;
    }
    if incoming.comments.is_empty() {
        incoming.comments = latent.comments;
    }
}

fn merge_section_from_latent(incoming: &mut Section, latent: Section) {
    if incoming.metadata.is_empty() {
        incoming.metadata = latent.metadata;
    }
    if incoming.ignored_reason.is_empty() {
        incoming.ignored_reason = latent.ignored_reason;
    }
    if incoming.comments.is_empty() {
        incoming.comments = latent.comments;
    }
}

impl SettingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a section real. Returns false if it already was.
    ///
    /// A latent copy fills in whatever `section` leaves empty.
    pub fn add_section(&mut self, section: Section) -> bool {
        self.promote_section(section, true)
    }

    /// Makes a section real exactly as given, discarding any latent copy.
    /// Returns false if it already was.
    pub fn restore_section(&mut self, section: Section) -> bool {
        self.promote_section(section, false)
    }

    fn promote_section(&mut self, mut section: Section, merge: bool) -> bool {
        if self.sections.now.contains_key(&section.name) {
            return false;
        }
        if let Some(latent) = self.sections.latent.remove(&section.name) {
            if merge {
                merge_section_from_latent(&mut section, latent);
            }
        }
        section.options = self
            .variables
            .now
            .get(&section.name)
            .map(|vars| vars.iter().map(|v| v.name().to_string()).collect())
            .unwrap_or_default();
        self.sections.now.insert(section.name.clone(), section);
        true
    }

    /// Makes a variable real. Returns false if it already was.
    ///
    /// A latent copy fills in whatever `variable` leaves empty.
    pub fn add_variable(&mut self, variable: Variable) -> bool {
        self.promote_variable(variable, true)
    }

    /// Makes a variable real exactly as given, discarding any latent copy.
    /// Returns false if it already was.
    pub fn restore_variable(&mut self, variable: Variable) -> bool {
        self.promote_variable(variable, false)
    }

    fn promote_variable(&mut self, mut variable: Variable, merge: bool) -> bool {
        if self.is_real(&variable.id) {
            return false;
        }
        let section = variable.section().to_string();
        if let Some(latent) = take(&mut self.variables.latent, &section, variable.name()) {
            if merge {
                merge_from_latent(&mut variable, latent);
            }
        }
        if let Some(sect) = self.sections.now.get_mut(&section) {
            let name = variable.name().to_string();
            if !sect.options.contains(&name) {
                sect.options.push(name);
            }
        }
        self.variables.now.entry(section).or_default().push(variable);
        true
    }

    /// Stores a latent section unless it is already known.
    pub fn add_latent_section(&mut self, section: Section) -> bool {
        if self.sections.now.contains_key(&section.name)
            || self.sections.latent.contains_key(&section.name)
        {
            return false;
        }
        self.sections.latent.insert(section.name.clone(), section);
        true
    }

    /// Stores a latent variable unless it is already known.
    pub fn add_latent_variable(&mut self, variable: Variable) -> bool {
        if self.is_real(&variable.id) || self.is_latent(&variable.id) {
            return false;
        }
        self.variables
            .latent
            .entry(variable.section().to_string())
            .or_default()
            .push(variable);
        true
    }

    /// Demotes a real section, and its real variables, to latent.
    ///
    /// Returns the section as it was together with the variables it held.
    pub fn remove_section(&mut self, name: &str) -> Option<(Section, Vec<Variable>)> {
        let section = self.sections.now.remove(name)?;
        let removed = self.variables.now.remove(name).unwrap_or_default();
        for var in &removed {
            if !var.name().is_empty() {
                let mut latent = var.clone();
                latent.error.clear();
                latent.warning.clear();
                self.variables
                    .latent
                    .entry(name.to_string())
                    .or_default()
                    .push(latent);
            }
        }
        let mut latent = section.clone();
        latent.options.clear();
        self.sections.latent.insert(name.to_string(), latent);
        Some((section, removed))
    }

    /// Removes a variable.
    ///
    /// A real variable is demoted to latent (or dropped if it has no name); a
    /// latent variable is dropped. Returns the removed variable.
    pub fn remove_variable(&mut self, id: &SettingId) -> Option<Variable> {
        let option = id.option.as_deref()?;
        if let Some(var) = take(&mut self.variables.now, &id.section, option) {
            if let Some(sect) = self.sections.now.get_mut(&id.section) {
                sect.options.retain(|o| o != option);
            }
            if !var.name().is_empty() {
                let mut latent = var.clone();
                latent.error.clear();
                latent.warning.clear();
                self.variables
                    .latent
                    .entry(id.section.clone())
                    .or_default()
                    .push(latent);
            }
            return Some(var);
        }
        take(&mut self.variables.latent, &id.section, option)
    }

    /// Looks up a section, real before latent.
    #[must_use]
    pub fn get_section(&self, name: &str, from_saved: bool, include_latent: bool) -> Option<&Section> {
        let (real, latent) = self.sections.live(from_saved);
        real.get(name)
            .or_else(|| include_latent.then(|| latent.get(name)).flatten())
    }

    /// Looks up a variable, real before latent.
    #[must_use]
    pub fn get_variable(
        &self,
        id: &SettingId,
        from_saved: bool,
        include_latent: bool,
    ) -> Option<&Variable> {
        let option = id.option.as_deref()?;
        let (real, latent) = self.variables.live(from_saved);
        find(real, &id.section, option).or_else(|| {
            include_latent
                .then(|| find(latent, &id.section, option))
                .flatten()
        })
    }

    /// Mutable access to a live (real or latent) variable.
    pub fn variable_mut(&mut self, id: &SettingId) -> Option<&mut Variable> {
        let option = id.option.as_deref()?;
        let in_now = find(&self.variables.now, &id.section, option).is_some();
        let map = if in_now {
            &mut self.variables.now
        } else {
            &mut self.variables.latent
        };
        map.get_mut(&id.section)?
            .iter_mut()
            .find(|v| v.name() == option)
    }

    /// Mutable access to a live (real or latent) section.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        if self.sections.now.contains_key(name) {
            self.sections.now.get_mut(name)
        } else {
            self.sections.latent.get_mut(name)
        }
    }

    /// Live sections, real ones first.
    #[must_use]
    pub fn sections(&self, include_latent: bool) -> Vec<&Section> {
        let mut out: Vec<&Section> = self.sections.now.values().collect();
        if include_latent {
            out.extend(self.sections.latent.values());
        }
        out
    }

    /// Live variables of one section, real ones first.
    #[must_use]
    pub fn variables(&self, section: &str, include_latent: bool) -> Vec<&Variable> {
        let mut out: Vec<&Variable> = self
            .variables
            .now
            .get(section)
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        if include_latent {
            if let Some(latent) = self.variables.latent.get(section) {
                out.extend(latent.iter());
            }
        }
        out
    }

    /// Every live variable, real ones first.
    #[must_use]
    pub fn all_variables(&self, include_latent: bool) -> Vec<&Variable> {
        let mut out: Vec<&Variable> = self.variables.now.values().flatten().collect();
        if include_latent {
            out.extend(self.variables.latent.values().flatten());
        }
        out
    }

    /// Ids of every live setting, sections first.
    #[must_use]
    pub fn all_ids(&self, include_latent: bool) -> Vec<SettingId> {
        let mut ids: Vec<SettingId> = self
            .sections(include_latent)
            .into_iter()
            .map(Section::id)
            .collect();
        ids.extend(
            self.all_variables(include_latent)
                .into_iter()
                .map(|v| v.id.clone()),
        );
        ids
    }

    /// Returns true if the setting is latent.
    #[must_use]
    pub fn is_latent(&self, id: &SettingId) -> bool {
        match id.option.as_deref() {
            None => self.sections.latent.contains_key(&id.section),
            Some(option) => find(&self.variables.latent, &id.section, option).is_some(),
        }
    }

    /// Copies the live partitions into the saved ones and records a
    /// fingerprint for every saved real setting.
    pub fn snapshot_for_save(&mut self) {
        self.sections.snapshot();
        self.variables.snapshot();
        self.saved = self
            .sections
            .save
            .values()
            .map(|s| (s.id(), s.fingerprint()))
            .chain(
                self.variables
                    .save
                    .values()
                    .flatten()
                    .map(|v| (v.id.clone(), v.fingerprint())),
            )
            .collect();
    }

    /// Fingerprint of a setting as of the last save.
    #[must_use]
    pub fn saved_fingerprint(&self, id: &SettingId) -> Option<Fingerprint> {
        self.saved.get(id).copied()
    }

    /// Ids that were real at last save.
    pub fn saved_ids(&self) -> impl Iterator<Item = &SettingId> {
        self.saved.keys()
    }
}

impl SettingView for SettingStore {
    fn section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sections.now.keys().cloned().collect();
        for section in self.variables.now.keys() {
            if !self.sections.now.contains_key(section) {
                names.push(section.clone());
            }
        }
        names
    }

    fn has_section(&self, section: &str) -> bool {
        self.sections.now.contains_key(section) || self.variables.now.contains_key(section)
    }

    fn is_real(&self, id: &SettingId) -> bool {
        match id.option.as_deref() {
            None => self.sections.now.contains_key(&id.section),
            Some(option) => find(&self.variables.now, &id.section, option).is_some(),
        }
    }

    fn value_of(&self, id: &SettingId) -> Option<&str> {
        let option = id.option.as_deref()?;
        find(&self.variables.now, &id.section, option).map(|v| v.value.as_str())
    }

    fn option_names(&self, section: &str) -> Vec<String> {
        self.variables
            .now
            .get(section)
            .map(|vars| vars.iter().map(|v| v.name().to_string()).collect())
            .unwrap_or_default()
    }
}
