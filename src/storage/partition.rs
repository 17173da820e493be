//! Four-way partitioning of settings.

use std::collections::BTreeMap;

use crate::setting::{Section, Variable};

/// One map per lifecycle stage.
///
/// `now` holds real settings and `latent` holds settings that are known from
/// metadata or were removed but kept for re-adding. `save` and `latent_save`
/// are the same two maps as of the last save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition<M> {
    /// Real settings.
    pub now: M,
    /// Latent settings.
    pub latent: M,
    /// Real settings at last save.
    pub save: M,
    /// Latent settings at last save.
    pub latent_save: M,
}

impl<M: Clone> Partition<M> {
    /// The live maps, `(real, latent)`, or their saved counterparts.
    pub fn live(&self, from_saved: bool) -> (&M, &M) {
        if from_saved {
            (&self.save, &self.latent_save)
        } else {
            (&self.now, &self.latent)
        }
    }

    /// Copies the live maps over the saved ones.
    pub fn snapshot(&mut self) {
        self.save.clone_from(&self.now);
        self.latent_save.clone_from(&self.latent);
    }
}

/// Variables keyed by section name, in insertion order within a section.
pub type VariableMap = BTreeMap<String, Vec<Variable>>;

/// Sections keyed by name.
pub type SectionMap = BTreeMap<String, Section>;

/// Finds a variable by option name.
pub(crate) fn find<'a>(map: &'a VariableMap, section: &str, option: &str) -> Option<&'a Variable> {
    map.get(section)?.iter().find(|v| v.name() == option)
}

/// Removes a variable by option name, dropping the section entry once empty.
pub(crate) fn take(map: &mut VariableMap, section: &str, option: &str) -> Option<Variable> {
    let vars = map.get_mut(section)?;
    let pos = vars.iter().position(|v| v.name() == option)?;
    let var = vars.remove(pos);
    if vars.is_empty() {
        map.remove(section);
    }
    Some(var)
}
