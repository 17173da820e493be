//! Read-only storage seam.
//!
//! The trigger engine never needs to mutate settings while it evaluates, so it
//! consumes this trait rather than the concrete store. Only real (non-latent)
//! settings are visible through it.

use crate::id::SettingId;

/// Read-only view over the real settings of one configuration.
pub trait SettingView {
    /// Names of every real section, including the root section if it holds
    /// options.
    fn section_names(&self) -> Vec<String>;

    /// Returns true if the section is real.
    fn has_section(&self, section: &str) -> bool;

    /// Returns true if the setting (section or option) is real.
    fn is_real(&self, id: &SettingId) -> bool;

    /// Value of a real option. Sections have no value.
    fn value_of(&self, id: &SettingId) -> Option<&str>;

    /// Option names of the real variables of a section.
    fn option_names(&self, section: &str) -> Vec<String>;

    /// Real instances of a duplicate family, e.g. `namelist:foo(1)` and
    /// `namelist:foo{bar}(2)` for `namelist:foo`.
    fn family_instances(&self, base_section: &str) -> Vec<String> {
        self.section_names()
            .into_iter()
            .filter(|name| {
                name != base_section
                    && SettingId::section(name.clone()).base_section() == base_section
            })
            .collect()
    }
}
