//! Commands made of several grouped steps. Each undoes and redoes as one.

use std::collections::{BTreeMap, BTreeSet};

use crate::command::Action;
use crate::error::{EditResult, ExecutionError, ValidationError};
use crate::id::SettingId;
use crate::setting::{default_value, IgnoredReason, Metadata, ReasonMap, Section, Variable};

use super::{own_reasons, CommandOutcome, ConfigEditor};

impl ConfigEditor {
    /// Adds a section together with its compulsory options and the given
    /// values. Compulsory options without a given value start from their
    /// default.
    ///
    /// # Errors
    ///
    /// Fails if the section cannot be added.
    pub fn add_section_with_options(
        &mut self,
        name: &str,
        values: &[(&str, &str)],
    ) -> EditResult<CommandOutcome> {
        let given: BTreeMap<&str, &str> = values.iter().copied().collect();
        let family = SettingId::section(name).family_id();
        let mut actions = vec![Action::AddSection {
            section: Section::new(name),
            variables: Vec::new(),
        }];
        let declared: Vec<SettingId> = self
            .resolver
            .tree()
            .options_of(&family.section)
            .map(|id| id.with_section(name))
            .collect();
        for id in declared {
            if given.contains_key(id.name()) || !self.resolver.is_compulsory(&id) {
                continue;
            }
            let value = default_value(&self.resolver.resolve(&id));
            actions.push(Action::AddVariable {
                variable: Variable::new(id, value),
            });
        }
        for (option, value) in given {
            actions.push(Action::AddVariable {
                variable: Variable::new(SettingId::option(name, option), value),
            });
        }
        self.perform_group(actions)
    }

    /// Copies a real section to the next free duplicate index. Returns the
    /// new section name.
    ///
    /// # Errors
    ///
    /// Fails if the section is not real.
    pub fn copy_section(&mut self, name: &str) -> EditResult<(String, CommandOutcome)> {
        let new_name = self.next_duplicate_name(name);
        let actions = self.copy_actions(name, &new_name)?;
        let outcome = self.perform_group(actions)?;
        Ok((new_name, outcome))
    }

    /// Renames a real section: a copy followed by removal of the original.
    ///
    /// # Errors
    ///
    /// Fails if the old section is not real or the new name is empty or
    /// taken.
    pub fn rename_section(&mut self, old: &str, new: &str) -> EditResult<CommandOutcome> {
        if new.is_empty() {
            return Err(ValidationError::EmptySectionName.into());
        }
        if old == new {
            return Ok(CommandOutcome::default());
        }
        if self.store.get_section(new, false, false).is_some() {
            return Err(ValidationError::SectionExists {
                section: new.to_string(),
            }
            .into());
        }
        let mut actions = self.copy_actions(old, new)?;
        actions.extend(self.removal_actions(old)?);
        self.perform_group(actions)
    }

    /// Removes a section one variable at a time, then the section itself.
    ///
    /// # Errors
    ///
    /// Fails if the section is not real.
    pub fn remove_section_with_options(&mut self, name: &str) -> EditResult<CommandOutcome> {
        let actions = self.removal_actions(name)?;
        self.perform_group(actions)
    }

    /// Ignores or enables several sections as one step.
    ///
    /// # Errors
    ///
    /// Fails, changing nothing, if any section is rejected.
    pub fn ignore_sections(
        &mut self,
        names: &[&str],
        ignored: bool,
        override_policy: bool,
    ) -> EditResult<CommandOutcome> {
        let mut reasons = ReasonMap::new();
        if ignored {
            reasons.insert(IgnoredReason::User, self.config.ignored_status_manual.clone());
        }
        let actions = names
            .iter()
            .map(|name| Action::IgnoreSection {
                name: (*name).to_string(),
                reasons: reasons.clone(),
                override_policy,
            })
            .collect();
        self.perform_group(actions)
    }

    /// Removes several sections with their options as one step.
    ///
    /// # Errors
    ///
    /// Fails, changing nothing, if any section is not real.
    pub fn remove_sections(&mut self, names: &[&str]) -> EditResult<CommandOutcome> {
        let mut actions = Vec::new();
        for name in names {
            actions.extend(self.removal_actions(name)?);
        }
        self.perform_group(actions)
    }

    fn next_duplicate_name(&self, name: &str) -> String {
        let id = SettingId::section(name);
        let stem = match id.duplicate_index() {
            Some(index) => &name[..name.len() - index.len() - 2],
            None => name,
        };
        let taken: BTreeSet<&str> = self
            .store
            .sections(true)
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        let mut index = 1_usize;
        loop {
            let candidate = format!("{stem}({index})");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            index += 1;
        }
    }

    fn copy_actions(&self, from: &str, to: &str) -> EditResult<Vec<Action>> {
        let section = self
            .store
            .get_section(from, false, false)
            .ok_or_else(|| ExecutionError::SectionNotFound {
                section: from.to_string(),
            })?;
        let mut copy = Section::new(to);
        copy.ignored_reason = own_reasons(&section.ignored_reason);
        copy.comments.clone_from(&section.comments);
        let mut actions = vec![Action::AddSection {
            section: copy,
            variables: Vec::new(),
        }];
        for variable in self.store.variables(from, false) {
            let mut copied = Variable::new(variable.id.with_section(to), variable.value.clone());
            copied.metadata = Metadata::new();
            copied.ignored_reason = own_reasons(&variable.ignored_reason);
            copied.comments.clone_from(&variable.comments);
            actions.push(Action::AddVariable { variable: copied });
        }
        Ok(actions)
    }

    fn removal_actions(&self, name: &str) -> EditResult<Vec<Action>> {
        if self.store.get_section(name, false, false).is_none() {
            return Err(ExecutionError::SectionNotFound {
                section: name.to_string(),
            }
            .into());
        }
        let mut actions: Vec<Action> = self
            .store
            .variables(name, false)
            .into_iter()
            .map(|v| Action::RemoveVariable { id: v.id.clone() })
            .collect();
        actions.push(Action::RemoveSection {
            name: name.to_string(),
        });
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::editor;
    use super::*;
    use crate::config::EditorConfig;
    use crate::metadata::MetadataTree;
    use crate::storage::SettingView;
    use crate::tree::ConfigTree;

    #[test]
    fn copy_uses_next_free_index() {
        let mut editor = editor();
        editor
            .set_comments(
                &SettingId::option("namelist:foo(1)", "x"),
                vec!["# x".to_string()],
            )
            .unwrap();
        let (name, outcome) = editor.copy_section("namelist:foo(1)").unwrap();
        assert_eq!(name, "namelist:foo(2)");
        assert_eq!(outcome.ids[0], SettingId::section("namelist:foo(2)"));
        let copied = editor
            .get_setting(&SettingId::option("namelist:foo(2)", "x"))
            .unwrap();
        assert_eq!(copied.value(), Some("3"));
        assert_eq!(copied.metadata()["compulsory"], "true");
        assert_eq!(copied.comments().to_vec(), vec!["# x".to_string()]);
        assert_eq!(editor.undo_labels().len(), 3);
        editor.undo().unwrap();
        assert!(!editor.store().has_section("namelist:foo(2)"));
        let (again, _) = editor.copy_section("namelist:foo(1)").unwrap();
        assert_eq!(again, "namelist:foo(3)");
    }

    #[test]
    fn rename_section_moves_options() {
        let mut editor = editor();
        editor.rename_section("namelist:foo(1)", "namelist:foo(7)").unwrap();
        assert!(!editor.store().has_section("namelist:foo(1)"));
        assert!(editor
            .store()
            .is_real(&SettingId::option("namelist:foo(7)", "x")));
        assert!(editor
            .rename_section("namelist:foo(7)", "env")
            .unwrap_err()
            .is_validation());
        editor.undo().unwrap();
        assert!(editor.store().has_section("namelist:foo(1)"));
        assert!(!editor.store().has_section("namelist:foo(7)"));
    }

    #[test]
    fn compulsory_options_are_added_and_undone_together() {
        let schema = MetadataTree::new()
            .with("namelist:run=a", "compulsory", "true")
            .with("namelist:run=a", "values", "fast, slow")
            .with("namelist:run=b", "compulsory", "true")
            .with("namelist:run=c", "compulsory", "true")
            .declare("namelist:run=d");
        let mut editor =
            ConfigEditor::load(ConfigTree::new(), schema, EditorConfig::default()).unwrap();
        let before = editor.dump();
        let outcome = editor
            .add_section_with_options("namelist:run", &[("c", "given")])
            .unwrap();
        assert_eq!(outcome.ids.len(), 4);
        fn value(editor: &ConfigEditor, option: &str) -> Option<String> {
            editor
                .store()
                .value_of(&SettingId::option("namelist:run", option))
                .map(str::to_string)
        }
        assert_eq!(value(&editor, "a").as_deref(), Some("fast"));
        assert_eq!(value(&editor, "b").as_deref(), Some(""));
        assert_eq!(value(&editor, "c").as_deref(), Some("given"));
        assert_eq!(value(&editor, "d"), None);

        editor.undo().unwrap();
        assert_eq!(editor.dump(), before);
        assert!(editor.undo_labels().is_empty());
        editor.redo().unwrap();
        assert_eq!(value(&editor, "a").as_deref(), Some("fast"));
    }

    #[test]
    fn batch_ignore_is_all_or_nothing() {
        let mut editor = editor();
        editor.add_section("namelist:other").unwrap();
        editor.ignore_section("namelist:other", true, false).unwrap();
        let err = editor
            .ignore_sections(&["namelist:foo(1)", "namelist:other"], true, false)
            .unwrap_err();
        assert!(err.is_policy());
        let foo = editor
            .get_setting(&SettingId::section("namelist:foo(1)"))
            .unwrap();
        assert!(foo.ignored_reason().is_empty());

        editor
            .ignore_sections(&["namelist:foo(1)", "env"], true, false)
            .unwrap();
        let env = editor.get_setting(&SettingId::section("env")).unwrap();
        assert!(env.ignored_reason().contains_key(&IgnoredReason::User));
        editor.undo().unwrap();
        let env = editor.get_setting(&SettingId::section("env")).unwrap();
        assert!(env.ignored_reason().is_empty());
    }

    #[test]
    fn remove_sections_groups_every_step() {
        let mut editor = editor();
        let before = editor.dump();
        editor.remove_sections(&["env", "namelist:foo(1)"]).unwrap();
        assert!(editor.dump().sections.is_empty());
        assert_eq!(editor.undo_labels().len(), 5);
        editor.undo().unwrap();
        assert_eq!(editor.dump(), before);
        let b = editor.get_setting(&SettingId::option("env", "B")).unwrap();
        assert!(b.ignored_reason().is_empty());
        assert!(editor.get_errors().is_empty());
        assert!(editor.remove_sections(&["missing"]).unwrap_err().is_execution());
    }
}
