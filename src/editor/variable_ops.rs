//! Variable commands.

use crate::command::{Action, Snapshot, StackAction};
use crate::error::{EditError, EditResult, ExecutionError, PolicyError, ValidationError};
use crate::id::SettingId;
use crate::setting::{IgnoredReason, Metadata, ProblemKind, ReasonMap, Section, Variable};
use crate::storage::SettingView;

use super::{own_reasons, Applied, CommandOutcome, ConfigEditor};

fn not_found(id: &SettingId) -> EditError {
    ExecutionError::SettingNotFound { id: id.clone() }.into()
}

impl ConfigEditor {
    /// Adds a variable, creating its section first if needed.
    ///
    /// Empty metadata is resolved from the schema. A latent copy, if any,
    /// contributes its reasons and comments.
    ///
    /// # Errors
    ///
    /// Fails if the variable is already real.
    pub fn add_variable(&mut self, variable: Variable) -> EditResult<CommandOutcome> {
        let mut actions = Vec::new();
        let section = variable.section();
        if !section.is_empty() && self.store.get_section(section, false, false).is_none() {
            actions.push(Action::AddSection {
                section: Section::new(section),
                variables: Vec::new(),
            });
        }
        actions.push(Action::AddVariable { variable });
        self.perform_group(actions)
    }

    /// Removes a real variable; it stays known as latent.
    ///
    /// # Errors
    ///
    /// Fails if the variable is not real.
    pub fn remove_variable(&mut self, id: &SettingId) -> EditResult<CommandOutcome> {
        self.perform(Action::RemoveVariable { id: id.clone() })
    }

    /// Changes a real variable's value.
    ///
    /// # Errors
    ///
    /// Fails if the variable is not real.
    pub fn set_value(&mut self, id: &SettingId, value: impl Into<String>) -> EditResult<CommandOutcome> {
        self.perform(Action::SetValue {
            id: id.clone(),
            value: value.into(),
        })
    }

    /// Replaces a real variable's comments.
    ///
    /// # Errors
    ///
    /// Fails if the variable is not real.
    pub fn set_comments(&mut self, id: &SettingId, comments: Vec<String>) -> EditResult<CommandOutcome> {
        self.perform(Action::SetComments {
            id: id.clone(),
            comments,
        })
    }

    /// Replaces a variable's `User`/`System` reasons. A `Section` reason is
    /// kept as it is. Nothing happens if the set of reason kinds stays the
    /// same.
    ///
    /// # Errors
    ///
    /// Without `override_policy`, user-ignoring a compulsory variable and
    /// enabling a trigger-ignored one are rejected.
    pub fn set_ignored(
        &mut self,
        id: &SettingId,
        reasons: ReasonMap,
        override_policy: bool,
    ) -> EditResult<CommandOutcome> {
        self.perform(Action::SetIgnored {
            id: id.clone(),
            reasons,
            override_policy,
        })
    }

    /// Resolves the ignore-related problems on one setting by switching its
    /// reasons to what the trigger verdict expects.
    ///
    /// # Errors
    ///
    /// Fails if the setting is not real.
    pub fn fix_ignored(&mut self, id: &SettingId) -> EditResult<CommandOutcome> {
        let setting = self.real_setting(id, false).ok_or_else(|| not_found(id))?;
        let errors = setting.errors();
        let current = own_reasons(setting.ignored_reason());
        let status = self.config.ignored_status_manual.clone();
        let mut fixed = current.clone();
        if errors.contains_key(&ProblemKind::ShouldBeIgnored) {
            fixed.insert(IgnoredReason::System, status.clone());
        }
        if errors.contains_key(&ProblemKind::ShouldBeEnabled)
            || errors.contains_key(&ProblemKind::NotTrigger)
        {
            fixed.remove(&IgnoredReason::System);
        }
        let wrong_kind = setting
            .warnings()
            .contains_key(&ProblemKind::WrongIgnoreKind);
        if errors.contains_key(&ProblemKind::UserIgnored) || wrong_kind {
            fixed.remove(&IgnoredReason::User);
            if self.triggers.cannot_enable(id) {
                fixed.insert(IgnoredReason::System, status);
            }
        }
        if fixed.keys().eq(current.keys()) {
            return Ok(CommandOutcome::default());
        }
        let action = if id.is_section() {
            Action::IgnoreSection {
                name: id.section.clone(),
                reasons: fixed,
                override_policy: true,
            }
        } else {
            Action::SetIgnored {
                id: id.clone(),
                reasons: fixed,
                override_policy: true,
            }
        };
        self.perform(action)
    }

    /// Renames a real variable within its section: a grouped remove and add.
    ///
    /// # Errors
    ///
    /// Fails if the variable is not real or the new id is taken.
    pub fn rename_variable(&mut self, id: &SettingId, new_name: &str) -> EditResult<CommandOutcome> {
        let variable = self
            .store
            .get_variable(id, false, false)
            .ok_or_else(|| not_found(id))?;
        let new_id = SettingId::option(id.section.clone(), new_name);
        if new_id == *id {
            return Ok(CommandOutcome::default());
        }
        if self.store.is_real(&new_id) {
            return Err(ValidationError::SettingExists { id: new_id }.into());
        }
        let mut renamed = variable.clone();
        renamed.id = new_id;
        renamed.metadata = Metadata::new();
        renamed.error.clear();
        renamed.warning.clear();
        self.perform_group(vec![
            Action::RemoveVariable { id: id.clone() },
            Action::AddVariable { variable: renamed },
        ])
    }

    /// With `restore`, the variable's reasons and comments are taken as
    /// given instead of being completed from its latent copy.
    pub(super) fn exec_add_variable(
        &mut self,
        mut variable: Variable,
        restore: bool,
    ) -> EditResult<Option<Applied>> {
        if self.store.is_real(&variable.id) {
            return Err(ValidationError::SettingExists {
                id: variable.id.clone(),
            }
            .into());
        }
        if variable.metadata.is_empty() {
            variable.metadata = self.resolver.resolve(&variable.id);
        }
        variable.error.clear();
        variable.warning.clear();
        let id = variable.id.clone();
        if restore {
            self.store.restore_variable(variable);
        } else {
            self.store.add_variable(variable);
        }
        self.sync_section_reasons(&id.section);
        let snapshot = self
            .store
            .get_variable(&id, false, false)
            .cloned()
            .ok_or_else(|| EditError::internal(format!("{id} missing after add")))?;
        Ok(Some(Applied::new(
            StackAction::Added,
            id.clone(),
            Snapshot::Variable { variable: snapshot },
            Action::RemoveVariable { id },
        )))
    }

    pub(super) fn exec_remove_variable(&mut self, id: &SettingId) -> EditResult<Option<Applied>> {
        if !self.store.is_real(id) {
            return Err(not_found(id));
        }
        let mut removed = self
            .store
            .remove_variable(id)
            .ok_or_else(|| not_found(id))?;
        removed.error.clear();
        removed.warning.clear();
        Ok(Some(Applied::new(
            StackAction::Removed,
            id.clone(),
            Snapshot::Variable {
                variable: removed.clone(),
            },
            Action::RestoreVariable { variable: removed },
        )))
    }

    fn real_variable_mut(&mut self, id: &SettingId) -> EditResult<&mut Variable> {
        if !self.store.is_real(id) {
            return Err(not_found(id));
        }
        self.store.variable_mut(id).ok_or_else(|| not_found(id))
    }

    pub(super) fn exec_set_value(&mut self, id: &SettingId, value: &str) -> EditResult<Option<Applied>> {
        let variable = self.real_variable_mut(id)?;
        if variable.value == value {
            return Ok(None);
        }
        let old = std::mem::replace(&mut variable.value, value.to_string());
        let snapshot = variable.clone();
        Ok(Some(Applied::new(
            StackAction::Changed,
            id.clone(),
            Snapshot::Variable { variable: snapshot },
            Action::SetValue {
                id: id.clone(),
                value: old,
            },
        )))
    }

    pub(super) fn exec_set_comments(
        &mut self,
        id: &SettingId,
        comments: &[String],
    ) -> EditResult<Option<Applied>> {
        let variable = self.real_variable_mut(id)?;
        if variable.comments == comments {
            return Ok(None);
        }
        let old = std::mem::replace(&mut variable.comments, comments.to_vec());
        let snapshot = variable.clone();
        Ok(Some(Applied::new(
            StackAction::ChangedComments,
            id.clone(),
            Snapshot::Variable { variable: snapshot },
            Action::SetComments {
                id: id.clone(),
                comments: old,
            },
        )))
    }

    /// Rejects ignore changes the trigger graph or the schema forbids.
    pub(super) fn check_ignore_policy(
        &self,
        id: &SettingId,
        compulsory: bool,
        old: &ReasonMap,
        new: &ReasonMap,
    ) -> Result<(), PolicyError> {
        if compulsory
            && new.contains_key(&IgnoredReason::User)
            && !old.contains_key(&IgnoredReason::User)
        {
            return Err(PolicyError::CompulsoryUserIgnore { id: id.clone() });
        }
        let enabling =
            !new.contains_key(&IgnoredReason::User) && !new.contains_key(&IgnoredReason::System);
        if enabling && self.triggers.cannot_enable(id) {
            return Err(PolicyError::CannotEnable {
                id: id.clone(),
                parents: self.triggers.verdict().ignoring_parents(id),
            });
        }
        Ok(())
    }

    pub(super) fn exec_set_ignored(
        &mut self,
        id: &SettingId,
        reasons: &ReasonMap,
        override_policy: bool,
    ) -> EditResult<Option<Applied>> {
        let variable = self
            .store
            .get_variable(id, false, false)
            .ok_or_else(|| not_found(id))?;
        let old = own_reasons(&variable.ignored_reason);
        let mut new = own_reasons(reasons);
        if new.keys().eq(old.keys()) {
            return Ok(None);
        }
        if !override_policy {
            self.check_ignore_policy(id, variable.is_compulsory(), &old, &new)?;
        }
        let action = if new.is_empty() {
            StackAction::Enabled
        } else {
            StackAction::Ignored
        };
        if let Some(status) = variable.ignored_reason.get(&IgnoredReason::Section) {
            new.insert(IgnoredReason::Section, status.clone());
        }
        let variable = self.real_variable_mut(id)?;
        variable.ignored_reason = new;
        let snapshot = variable.clone();
        Ok(Some(Applied::new(
            action,
            id.clone(),
            Snapshot::Variable { variable: snapshot },
            Action::SetIgnored {
                id: id.clone(),
                reasons: old,
                override_policy: true,
            },
        )))
    }
}
