//! Section commands.

use crate::command::{Action, Snapshot, StackAction};
use crate::error::{EditError, EditResult, ExecutionError, PolicyError, ValidationError};
use crate::id::SettingId;
use crate::setting::{IgnoredReason, ReasonMap, Section, Variable};

use super::{own_reasons, Applied, CommandOutcome, ConfigEditor};

fn section_not_found(name: &str) -> EditError {
    ExecutionError::SectionNotFound {
        section: name.to_string(),
    }
    .into()
}

impl ConfigEditor {
    /// Adds an empty section.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or the section is already real.
    pub fn add_section(&mut self, name: &str) -> EditResult<CommandOutcome> {
        self.perform(Action::AddSection {
            section: Section::new(name),
            variables: Vec::new(),
        })
    }

    /// Removes a real section; it and its variables stay known as latent.
    ///
    /// # Errors
    ///
    /// Fails if the section is not real.
    pub fn remove_section(&mut self, name: &str) -> EditResult<CommandOutcome> {
        self.perform(Action::RemoveSection {
            name: name.to_string(),
        })
    }

    /// User-ignores or enables a section. Its variables gain or lose the
    /// `Section` reason.
    ///
    /// # Errors
    ///
    /// Without `override_policy`, ignoring a compulsory or already ignored
    /// section and enabling a trigger-ignored one are rejected.
    pub fn ignore_section(
        &mut self,
        name: &str,
        ignored: bool,
        override_policy: bool,
    ) -> EditResult<CommandOutcome> {
        let mut reasons = ReasonMap::new();
        if ignored {
            reasons.insert(IgnoredReason::User, self.config.ignored_status_manual.clone());
        }
        self.perform(Action::IgnoreSection {
            name: name.to_string(),
            reasons,
            override_policy,
        })
    }

    /// Replaces a real section's comments.
    ///
    /// # Errors
    ///
    /// Fails if the section is not real.
    pub fn set_section_comments(&mut self, name: &str, comments: Vec<String>) -> EditResult<CommandOutcome> {
        self.perform(Action::SetSectionComments {
            name: name.to_string(),
            comments,
        })
    }

    pub(super) fn exec_add_section(
        &mut self,
        mut section: Section,
        variables: Vec<Variable>,
        restore: bool,
    ) -> EditResult<Option<Applied>> {
        if section.name.is_empty() {
            return Err(ValidationError::EmptySectionName.into());
        }
        if self.store.get_section(&section.name, false, false).is_some() {
            return Err(ValidationError::SectionExists {
                section: section.name,
            }
            .into());
        }
        let id = section.id();
        if section.metadata.is_empty() {
            section.metadata = self.resolver.resolve(&id);
        }
        section.error.clear();
        section.warning.clear();
        let name = section.name.clone();
        if restore {
            self.store.restore_section(section);
        } else {
            self.store.add_section(section);
        }

        let mut ids = vec![id.clone()];
        for mut variable in variables {
            if variable.metadata.is_empty() {
                variable.metadata = self.resolver.resolve(&variable.id);
            }
            variable.error.clear();
            variable.warning.clear();
            ids.push(variable.id.clone());
            if restore {
                self.store.restore_variable(variable);
            } else {
                self.store.add_variable(variable);
            }
        }
        self.sync_section_reasons(&name);

        let snapshot = self
            .store
            .get_section(&name, false, false)
            .cloned()
            .ok_or_else(|| EditError::internal(format!("{name} missing after add")))?;
        let mut applied = Applied::new(
            StackAction::Added,
            id,
            Snapshot::Section { section: snapshot },
            Action::RemoveSection { name },
        );
        applied.ids = ids;
        Ok(Some(applied))
    }

    pub(super) fn exec_remove_section(&mut self, name: &str) -> EditResult<Option<Applied>> {
        let (mut section, mut variables) = self
            .store
            .remove_section(name)
            .ok_or_else(|| section_not_found(name))?;
        section.error.clear();
        section.warning.clear();
        for variable in &mut variables {
            variable.error.clear();
            variable.warning.clear();
        }
        let id = section.id();
        let mut ids = vec![id.clone()];
        ids.extend(variables.iter().map(|v| v.id.clone()));
        let mut applied = Applied::new(
            StackAction::Removed,
            id,
            Snapshot::Section {
                section: section.clone(),
            },
            Action::RestoreSection { section, variables },
        );
        applied.ids = ids;
        Ok(Some(applied))
    }

    pub(super) fn exec_ignore_section(
        &mut self,
        name: &str,
        reasons: &ReasonMap,
        override_policy: bool,
    ) -> EditResult<Option<Applied>> {
        let section = self
            .store
            .get_section(name, false, false)
            .ok_or_else(|| section_not_found(name))?;
        let id = section.id();
        let old = own_reasons(&section.ignored_reason);
        let new = own_reasons(reasons);
        let ignoring = !new.is_empty();
        if !override_policy {
            if ignoring && (section.is_compulsory() || !old.is_empty()) {
                return Err(PolicyError::SectionNotIgnorable {
                    section: name.to_string(),
                }
                .into());
            }
            if !ignoring && self.triggers.cannot_enable(&id) {
                return Err(PolicyError::CannotEnable {
                    parents: self.triggers.verdict().ignoring_parents(&id),
                    id,
                }
                .into());
            }
        }
        if new.keys().eq(old.keys()) {
            return Ok(None);
        }
        let section = self
            .store
            .section_mut(name)
            .ok_or_else(|| section_not_found(name))?;
        section.ignored_reason = new;
        let snapshot = section.clone();
        self.sync_section_reasons(name);

        let mut ids = vec![id.clone()];
        ids.extend(self.store.variables(name, false).iter().map(|v| v.id.clone()));
        let action = if ignoring {
            StackAction::Ignored
        } else {
            StackAction::Enabled
        };
        let mut applied = Applied::new(
            action,
            id,
            Snapshot::Section { section: snapshot },
            Action::IgnoreSection {
                name: name.to_string(),
                reasons: old,
                override_policy: true,
            },
        );
        applied.ids = ids;
        Ok(Some(applied))
    }

    pub(super) fn exec_set_section_comments(
        &mut self,
        name: &str,
        comments: &[String],
    ) -> EditResult<Option<Applied>> {
        if self.store.get_section(name, false, false).is_none() {
            return Err(section_not_found(name));
        }
        let section = self
            .store
            .section_mut(name)
            .ok_or_else(|| section_not_found(name))?;
        if section.comments == comments {
            return Ok(None);
        }
        let old = std::mem::replace(&mut section.comments, comments.to_vec());
        let snapshot = section.clone();
        Ok(Some(Applied::new(
            StackAction::ChangedComments,
            SettingId::section(name),
            Snapshot::Section { section: snapshot },
            Action::SetSectionComments {
                name: name.to_string(),
                comments: old,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::editor;
    use super::*;
    use crate::setting::ProblemKind;
    use crate::storage::SettingView;

    const FOO: &str = "namelist:foo(1)";

    #[test]
    fn add_section_validates_name() {
        let mut editor = editor();
        assert!(editor.add_section("").unwrap_err().is_validation());
        assert!(editor.add_section("env").unwrap_err().is_validation());
        let outcome = editor.add_section("namelist:bar").unwrap();
        assert!(outcome.namespaces.contains("namelist/bar"));
    }

    #[test]
    fn remove_section_and_undo_restores_variables() {
        let mut editor = editor();
        let before = editor.dump();
        editor.remove_section(FOO).unwrap();
        assert!(!editor.store().has_section(FOO));
        assert!(editor.store().is_latent(&SettingId::option(FOO, "x")));
        editor.undo().unwrap();
        assert_eq!(editor.dump(), before);
    }

    #[test]
    fn ignoring_section_layers_section_reason() {
        let mut editor = editor();
        let x = SettingId::option(FOO, "x");
        editor.ignore_section(FOO, true, false).unwrap();
        let reasons = editor.get_setting(&x).unwrap().ignored_reason().clone();
        assert_eq!(reasons.keys().copied().collect::<Vec<_>>(), vec![IgnoredReason::Section]);

        let again = editor.ignore_section(FOO, true, false).unwrap_err();
        assert!(matches!(
            again,
            EditError::Policy(PolicyError::SectionNotIgnorable { .. })
        ));

        editor.ignore_section(FOO, false, false).unwrap();
        assert!(editor.get_setting(&x).unwrap().ignored_reason().is_empty());
        assert_eq!(editor.undo_labels()[0], format!("Enabled {FOO}"));
    }

    #[test]
    fn enabling_trigger_ignored_section_is_rejected() {
        let schema = super::super::tests::schema()
            .with("env=A", "trigger", "env=B: 1; namelist:sub: on")
            .declare("namelist:sub");
        let tree = super::super::tests::tree()
            .with_section_state("namelist:sub", crate::tree::NodeState::SystemIgnored);
        let mut editor =
            ConfigEditor::load(tree, schema, crate::config::EditorConfig::default()).unwrap();
        let id = SettingId::section("namelist:sub");
        assert!(editor.get_setting(&id).unwrap().errors().is_empty());
        let err = editor.ignore_section("namelist:sub", false, false).unwrap_err();
        assert!(err.is_policy());

        editor.ignore_section("namelist:sub", false, true).unwrap();
        let errors = editor.get_setting(&id).unwrap().errors().clone();
        assert!(errors.contains_key(&ProblemKind::ShouldBeIgnored));
    }

    #[test]
    fn section_comments_round_trip() {
        let mut editor = editor();
        editor
            .set_section_comments("env", vec!["# environment".to_string()])
            .unwrap();
        assert!(editor.is_modified(&SettingId::section("env")));
        editor.undo().unwrap();
        assert!(!editor.is_modified(&SettingId::section("env")));
        assert!(editor
            .set_section_comments("nowhere", Vec::new())
            .unwrap_err()
            .is_execution());
    }
}
