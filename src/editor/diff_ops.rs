//! Structural diff application.

use crate::command::{Action, Snapshot, StackAction};
use crate::diff::{DiffEntry, Modification, StructuralDiff};
use crate::error::{EditError, EditResult, PolicyError, ValidationError};
use crate::id::SettingId;
use crate::setting::{Section, Variable};
use crate::storage::SettingView;
use crate::tree::NodeState;

use super::{Applied, CommandOutcome, ConfigEditor};

fn invalid(reason: String) -> EditError {
    ValidationError::InvalidDiff { reason }.into()
}

impl ConfigEditor {
    /// Applies a diff as one undoable action labelled `label`.
    ///
    /// The whole diff is checked against the configuration before anything
    /// changes, so a rejected diff leaves no trace. An addition identical to
    /// the stored setting is skipped, which makes replaying a diff harmless.
    /// Added settings take exactly the state the diff gives them.
    ///
    /// # Errors
    ///
    /// Fails if the diff is malformed, does not fit the configuration, or
    /// (without `trigger_override`) user-ignores a compulsory setting or
    /// enables a trigger-ignored one.
    pub fn apply_diff(
        &mut self,
        diff: StructuralDiff,
        label: &str,
        trigger_override: bool,
    ) -> EditResult<CommandOutcome> {
        self.perform(Action::ApplyDiff {
            diff,
            label: label.to_string(),
            trigger_override,
        })
    }

    /// The changes that would bring stored ignored states in line with the
    /// current trigger verdict. User-ignored settings are left alone.
    #[must_use]
    pub fn trigger_fix_diff(&self) -> StructuralDiff {
        self.triggers.fix_diff(&self.store)
    }

    /// Applies [`Self::trigger_fix_diff`] as one undoable action.
    ///
    /// # Errors
    ///
    /// Fails only if the computed diff no longer fits the configuration.
    pub fn apply_trigger_fixes(&mut self) -> EditResult<CommandOutcome> {
        let diff = self.trigger_fix_diff();
        if diff.is_empty() {
            return Ok(CommandOutcome::default());
        }
        self.apply_diff(diff, "trigger fixes", true)
    }

    /// Checks a diff against the store and rewrites its `before` sides from
    /// what is actually stored.
    fn normalize_diff(
        &self,
        diff: &StructuralDiff,
        trigger_override: bool,
    ) -> EditResult<StructuralDiff> {
        let mut normal = StructuralDiff::new();
        for (id, entry) in &diff.added {
            if self.store.is_real(id) {
                if self.current_entry(id).as_ref() == Some(entry) {
                    continue;
                }
                return Err(if id.is_section() {
                    ValidationError::SectionExists {
                        section: id.section.clone(),
                    }
                    .into()
                } else {
                    ValidationError::SettingExists { id: id.clone() }.into()
                });
            }
            if !id.is_section()
                && !id.section.is_empty()
                && !self.store.is_real(&id.section_id())
                && !diff.added.contains_key(&id.section_id())
            {
                return Err(invalid(format!(
                    "{id} is added to section '{}' which does not exist",
                    id.section
                )));
            }
            normal.added.insert(id.clone(), entry.clone());
        }
        for (id, change) in &diff.modified {
            let before = self
                .current_entry(id)
                .ok_or_else(|| invalid(format!("{id} is modified but not present")))?;
            normal.modified.insert(
                id.clone(),
                Modification {
                    before,
                    after: change.after.clone(),
                },
            );
        }
        for id in diff.removed.keys() {
            let current = self
                .current_entry(id)
                .ok_or_else(|| invalid(format!("{id} is removed but not present")))?;
            if id.is_section() {
                let kept = self.store.option_names(&id.section).into_iter().find(|o| {
                    !diff
                        .removed
                        .contains_key(&SettingId::option(id.section.clone(), o.clone()))
                });
                if let Some(option) = kept {
                    return Err(invalid(format!(
                        "section '{}' is removed but keeps option '{option}'",
                        id.section
                    )));
                }
            }
            normal.removed.insert(id.clone(), current);
        }
        if !trigger_override {
            self.check_diff_policy(&normal)?;
        }
        Ok(normal)
    }

    fn current_entry(&self, id: &SettingId) -> Option<DiffEntry> {
        if id.is_section() {
            self.store
                .get_section(&id.section, false, false)
                .map(DiffEntry::of_section)
        } else {
            self.store
                .get_variable(id, false, false)
                .map(DiffEntry::of_variable)
        }
    }

    fn check_diff_policy(&self, diff: &StructuralDiff) -> EditResult<()> {
        let targets = diff
            .added
            .iter()
            .map(|(id, after)| (id, NodeState::Normal, after.state))
            .chain(
                diff.modified
                    .iter()
                    .map(|(id, m)| (id, m.before.state, m.after.state)),
            );
        for (id, before, after) in targets {
            if after == NodeState::UserIgnored
                && before != NodeState::UserIgnored
                && self.resolver.is_compulsory(id)
            {
                return Err(PolicyError::CompulsoryUserIgnore { id: id.clone() }.into());
            }
            if after == NodeState::Normal
                && before != NodeState::Normal
                && self.triggers.cannot_enable(id)
            {
                return Err(PolicyError::CannotEnable {
                    id: id.clone(),
                    parents: self.triggers.verdict().ignoring_parents(id),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Atomic actions that carry out a normalized diff: additions parents
    /// first, then modifications, then removals deepest first.
    fn diff_steps(&self, diff: &StructuralDiff) -> Vec<Action> {
        let mut steps = Vec::new();
        for (id, entry) in diff.ordered_additions() {
            let reasons = self.state_reasons(entry.state);
            let metadata = self.resolver.resolve(id);
            if id.is_section() {
                let mut section = Section::new(id.section.clone()).with_metadata(metadata);
                section.ignored_reason = reasons;
                section.comments.clone_from(&entry.comments);
                steps.push(Action::RestoreSection {
                    section,
                    variables: Vec::new(),
                });
            } else {
                let value = entry.value.clone().unwrap_or_default();
                let mut variable = Variable::new(id.clone(), value).with_metadata(metadata);
                variable.ignored_reason = reasons;
                variable.comments.clone_from(&entry.comments);
                steps.push(Action::RestoreVariable { variable });
            }
        }

        for (id, change) in &diff.modified {
            let after = &change.after;
            let reasons = (after.state != change.before.state).then(|| self.state_reasons(after.state));
            if id.is_section() {
                if let Some(reasons) = reasons {
                    steps.push(Action::IgnoreSection {
                        name: id.section.clone(),
                        reasons,
                        override_policy: true,
                    });
                }
                steps.push(Action::SetSectionComments {
                    name: id.section.clone(),
                    comments: after.comments.clone(),
                });
            } else {
                if let Some(value) = &after.value {
                    steps.push(Action::SetValue {
                        id: id.clone(),
                        value: value.clone(),
                    });
                }
                if let Some(reasons) = reasons {
                    steps.push(Action::SetIgnored {
                        id: id.clone(),
                        reasons,
                        override_policy: true,
                    });
                }
                steps.push(Action::SetComments {
                    id: id.clone(),
                    comments: after.comments.clone(),
                });
            }
        }

        for (id, _) in diff.ordered_removals() {
            steps.push(if id.is_section() {
                Action::RemoveSection {
                    name: id.section.clone(),
                }
            } else {
                Action::RemoveVariable { id: id.clone() }
            });
        }
        steps
    }

    pub(super) fn exec_apply_diff(
        &mut self,
        diff: &StructuralDiff,
        label: &str,
        trigger_override: bool,
    ) -> EditResult<Option<Applied>> {
        diff.validate()?;
        let diff = self.normalize_diff(diff, trigger_override)?;
        if diff.is_empty() {
            return Ok(None);
        }

        let mut inverses = Vec::new();
        for step in self.diff_steps(&diff) {
            match self.execute(&step) {
                Ok(Some(applied)) => inverses.push(applied.inverse),
                Ok(None) => {}
                Err(error) => {
                    self.roll_back(inverses.iter());
                    return Err(error);
                }
            }
        }

        let ids: Vec<SettingId> = diff
            .added
            .keys()
            .chain(diff.modified.keys())
            .chain(diff.removed.keys())
            .cloned()
            .collect();
        let mut applied = Applied::new(
            StackAction::Applied,
            SettingId::section(""),
            Snapshot::Diff { diff: diff.clone() },
            Action::ApplyDiff {
                diff: diff.reversed(),
                label: label.to_string(),
                trigger_override: true,
            },
        );
        applied.name = label.to_string();
        applied.ids = ids;
        Ok(Some(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{editor, tree};
    use super::*;
    use crate::setting::{IgnoredReason, ProblemKind};
    use crate::tree::ConfigTree;

    fn target() -> ConfigTree {
        ConfigTree::new()
            .with("env=A", "1")
            .with("env=B", "changed")
            .with("env=D", "new")
            .with("namelist:bar=y", "2")
            .with_option_state("env=D", NodeState::UserIgnored)
    }

    #[test]
    fn diff_between_trees_applies_and_reverts() {
        let mut editor = editor();
        let before = editor.dump();
        let diff = StructuralDiff::between(&before, &target());
        let outcome = editor.apply_diff(diff, "merge", false).unwrap();
        assert!(outcome.ids.contains(&SettingId::section("namelist:bar")));
        assert_eq!(editor.dump(), target());
        assert_eq!(editor.undo_labels(), vec!["Applied merge"]);

        editor.undo().unwrap();
        assert_eq!(editor.dump(), before);
        editor.redo().unwrap();
        assert_eq!(editor.dump(), target());
    }

    #[test]
    fn bad_diff_changes_nothing() {
        let mut editor = editor();
        let before = editor.dump();
        let diff = StructuralDiff::new()
            .add(
                SettingId::option("env", "Z"),
                DiffEntry::option("1", NodeState::Normal),
            )
            .add(
                SettingId::option("env", "A"),
                DiffEntry::option("9", NodeState::Normal),
            );
        let err = editor.apply_diff(diff, "bad", false).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(editor.dump(), before);
        assert!(!editor.can_undo());

        let orphan = StructuralDiff::new().add(
            SettingId::option("namelist:nowhere", "q"),
            DiffEntry::option("1", NodeState::Normal),
        );
        assert!(editor.apply_diff(orphan, "bad", false).unwrap_err().is_validation());

        let partial = StructuralDiff::new().remove(
            SettingId::section("env"),
            DiffEntry::section(NodeState::Normal),
        );
        assert!(editor.apply_diff(partial, "bad", false).unwrap_err().is_validation());
    }

    #[test]
    fn replaying_an_addition_is_a_no_op() {
        let mut editor = editor();
        let d = SettingId::option("env", "D");
        let add = StructuralDiff::new().add(d.clone(), DiffEntry::option("new", NodeState::Normal));
        editor.apply_diff(add.clone(), "import", false).unwrap();
        let after_first = editor.dump();

        let outcome = editor.apply_diff(add, "import", false).unwrap();
        assert!(outcome.is_empty());
        assert_eq!(editor.dump(), after_first);
        assert_eq!(editor.undo_labels(), vec!["Applied import"]);

        let conflicting =
            StructuralDiff::new().add(d.clone(), DiffEntry::option("other", NodeState::Normal));
        let err = editor.apply_diff(conflicting, "import", false).unwrap_err();
        assert_eq!(
            err,
            EditError::Validation(ValidationError::SettingExists { id: d })
        );
    }

    #[test]
    fn added_setting_takes_the_diff_state_over_its_latent_copy() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        let b = SettingId::option("env", "B");
        editor.remove_variable(&a).unwrap();
        editor.remove_variable(&b).unwrap();
        assert!(editor
            .get_setting(&b)
            .unwrap()
            .ignored_reason()
            .contains_key(&IgnoredReason::System));

        let diff = StructuralDiff::new()
            .add(a.clone(), DiffEntry::option("1", NodeState::Normal))
            .add(b.clone(), DiffEntry::option("b", NodeState::Normal));
        editor.apply_diff(diff, "restore", false).unwrap();
        assert!(editor.get_setting(&b).unwrap().ignored_reason().is_empty());
        assert!(editor.get_errors().is_empty());
        assert_eq!(editor.dump(), tree());
    }

    #[test]
    fn diff_respects_policy_unless_overridden() {
        let mut editor = editor();
        let b = SettingId::option("env", "B");
        let ignore_b = StructuralDiff::new().modify(
            b.clone(),
            DiffEntry::option("b", NodeState::Normal),
            DiffEntry::option("b", NodeState::UserIgnored),
        );
        let err = editor.apply_diff(ignore_b.clone(), "ignore", false).unwrap_err();
        assert!(err.is_policy());
        editor.apply_diff(ignore_b, "ignore", true).unwrap();
        let errors = editor.get_setting(&b).unwrap().errors().clone();
        assert!(errors.contains_key(&ProblemKind::UserIgnored));
    }

    #[test]
    fn trigger_fixes_apply_as_one_step() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        let b = SettingId::option("env", "B");
        editor.set_value(&a, "0").unwrap();
        assert!(editor
            .get_setting(&b)
            .unwrap()
            .errors()
            .contains_key(&ProblemKind::ShouldBeIgnored));

        let fixes = editor.trigger_fix_diff();
        assert_eq!(fixes.len(), 1);
        editor.apply_trigger_fixes().unwrap();
        let setting = editor.get_setting(&b).unwrap();
        assert!(setting.ignored_reason().contains_key(&IgnoredReason::System));
        assert!(setting.errors().is_empty());
        assert!(editor.trigger_fix_diff().is_empty());
        assert!(editor.apply_trigger_fixes().unwrap().is_empty());

        editor.undo().unwrap();
        assert!(editor.get_setting(&b).unwrap().ignored_reason().is_empty());
        assert_eq!(editor.dump(), tree().with("env=A", "0"));
    }
}
