//! Configuration editing session.
//!
//! [`ConfigEditor`] owns the store, the metadata resolver, the trigger engine
//! and the undo stack of one configuration. Every command runs to completion
//! (mutation, inverse capture, stack push, reconciliation) before returning.

mod diff_ops;
mod group_ops;
mod section_ops;
mod undo;
mod variable_ops;

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::{Action, GroupTag, Snapshot, StackAction, StackItem, UndoStack};
use crate::config::EditorConfig;
use crate::error::{EditResult, ExecutionError};
use crate::id::SettingId;
use crate::metadata::{MetadataResolver, MetadataTree, FILE_WILDCARD_SECTION};
use crate::setting::{
    default_value, IgnoredReason, ProblemKind, ReasonMap, Section, SettingRef, Variable,
};
use crate::storage::{SettingStore, SettingView};
use crate::tree::{ConfigTree, NodeState, TreeNode};
use crate::trigger::{
    ReconcileReport, SchemaError, SchemaProblem, TriggerEngine, TriggerVerdict,
    IGNORED_STATUS_CONFIG,
};

/// What a command touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Namespaces whose content or problems changed, including those touched
    /// by the reconciliation that followed.
    pub namespaces: BTreeSet<String>,
    /// Settings the command itself changed, in execution order.
    pub ids: Vec<SettingId>,
}

impl CommandOutcome {
    /// Returns true if the command changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One consistency problem on one setting.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: SettingId,
    pub kind: ProblemKind,
    pub message: String,
}

/// Result of executing one action, before it is turned into a stack entry.
struct Applied {
    action: StackAction,
    target: SettingId,
    name: String,
    snapshot: Snapshot,
    inverse: Action,
    ids: Vec<SettingId>,
}

impl Applied {
    fn new(action: StackAction, target: SettingId, snapshot: Snapshot, inverse: Action) -> Self {
        Self {
            action,
            name: target.to_string(),
            ids: vec![target.clone()],
            target,
            snapshot,
            inverse,
        }
    }
}

/// Adds or removes the `Section` reason.
fn set_section_reason(reasons: &mut ReasonMap, ignored: bool) {
    if ignored {
        reasons
            .entry(IgnoredReason::Section)
            .or_insert_with(|| IGNORED_STATUS_CONFIG.to_string());
    } else {
        reasons.remove(&IgnoredReason::Section);
    }
}

/// Reasons without the `Section` cause.
fn own_reasons(reasons: &ReasonMap) -> ReasonMap {
    reasons
        .iter()
        .filter(|(kind, _)| **kind != IgnoredReason::Section)
        .map(|(kind, status)| (*kind, status.clone()))
        .collect()
}

fn describe_reasons(reasons: &ReasonMap) -> String {
    if reasons.is_empty() {
        return "enabled".to_string();
    }
    reasons
        .keys()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An editing session over one configuration.
#[derive(Debug)]
pub struct ConfigEditor {
    store: SettingStore,
    resolver: MetadataResolver,
    triggers: TriggerEngine,
    stack: UndoStack,
    config: EditorConfig,
    performing_undo: bool,
}

impl ConfigEditor {
    /// Builds a session from a persisted tree and its schema.
    ///
    /// `!` and `!!` states become `User` and `System` reasons; variables of
    /// an ignored section also get `Section`. Every declared option that is
    /// not present is added as latent, then triggers are reconciled and the
    /// result becomes the saved state.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn load(tree: ConfigTree, metadata: MetadataTree, config: EditorConfig) -> EditResult<Self> {
        config.validate()?;
        let resolver = MetadataResolver::new(metadata);
        let triggers = TriggerEngine::new(&resolver, config.rule_cache_capacity);
        let mut editor = Self {
            store: SettingStore::new(),
            resolver,
            triggers,
            stack: UndoStack::new(config.max_undo_depth),
            config,
            performing_undo: false,
        };

        for (name, tree_section) in tree.sections {
            let section_id = SettingId::section(name.clone());
            let section_ignored = tree_section.state.is_ignored();
            let mut section =
                Section::new(name.clone()).with_metadata(editor.resolver.resolve(&section_id));
            section.ignored_reason = tree_section.state.to_reasons(IGNORED_STATUS_CONFIG);
            section.comments = tree_section.comments;
            editor.store.add_section(section);

            for (option, node) in tree_section.options {
                let id = SettingId::option(name.clone(), option);
                let metadata = editor.resolver.resolve(&id);
                let mut variable = Variable::new(id, node.value).with_metadata(metadata);
                variable.ignored_reason = node.state.to_reasons(IGNORED_STATUS_CONFIG);
                set_section_reason(&mut variable.ignored_reason, section_ignored);
                variable.comments = node.comments;
                editor.store.add_variable(variable);
            }
        }
        editor.add_latent_settings();

        let report = editor.triggers.refresh(&editor.resolver, &mut editor.store);
        editor.store.snapshot_for_save();
        debug!(
            sections = editor.store.sections(false).len(),
            variables = editor.store.all_variables(false).len(),
            latent = editor.store.all_variables(true).len() - editor.store.all_variables(false).len(),
            flagged = report.flagged.len(),
            "configuration loaded"
        );
        Ok(editor)
    }

    fn add_latent_settings(&mut self) {
        let declared: Vec<SettingId> = self.resolver.declared_ids().cloned().collect();
        for id in declared {
            if id.section == FILE_WILDCARD_SECTION || self.resolver.is_duplicate(&id.section) {
                continue;
            }
            if !self.store.has_section(&id.section) {
                let metadata = self.resolver.resolve(&id.section_id());
                self.store
                    .add_latent_section(Section::new(id.section.clone()).with_metadata(metadata));
            }
            if id.is_section() || self.store.is_real(&id) {
                continue;
            }
            let metadata = self.resolver.resolve(&id);
            let mut variable = Variable::new(id, default_value(&metadata)).with_metadata(metadata);
            let section_ignored = self.section_is_ignored(variable.section());
            set_section_reason(&mut variable.ignored_reason, section_ignored);
            self.store.add_latent_variable(variable);
        }
    }

    fn section_is_ignored(&self, name: &str) -> bool {
        self.store
            .get_section(name, false, false)
            .is_some_and(|s| !own_reasons(&s.ignored_reason).is_empty())
    }

    /// Layers or removes the `Section` reason on every live variable of a
    /// section to match the section's own state.
    fn sync_section_reasons(&mut self, name: &str) {
        let ignored = self.section_is_ignored(name);
        let ids: Vec<SettingId> = self
            .store
            .variables(name, true)
            .into_iter()
            .map(|v| v.id.clone())
            .collect();
        for id in ids {
            if let Some(variable) = self.store.variable_mut(&id) {
                set_section_reason(&mut variable.ignored_reason, ignored);
            }
        }
    }

    /// Reason map for a persisted state.
    fn state_reasons(&self, state: NodeState) -> ReasonMap {
        let mut reasons = ReasonMap::new();
        match state {
            NodeState::Normal => {}
            NodeState::UserIgnored => {
                reasons.insert(IgnoredReason::User, self.config.ignored_status_manual.clone());
            }
            NodeState::SystemIgnored => {
                reasons.insert(IgnoredReason::System, IGNORED_STATUS_CONFIG.to_string());
            }
        }
        reasons
    }

    // Execution

    fn execute(&mut self, action: &Action) -> EditResult<Option<Applied>> {
        match action {
            Action::AddVariable { variable } => self.exec_add_variable(variable.clone(), false),
            Action::RestoreVariable { variable } => self.exec_add_variable(variable.clone(), true),
            Action::RemoveVariable { id } => self.exec_remove_variable(id),
            Action::SetValue { id, value } => self.exec_set_value(id, value),
            Action::SetComments { id, comments } => self.exec_set_comments(id, comments),
            Action::SetIgnored {
                id,
                reasons,
                override_policy,
            } => self.exec_set_ignored(id, reasons, *override_policy),
            Action::AddSection { section, variables } => {
                self.exec_add_section(section.clone(), variables.clone(), false)
            }
            Action::RestoreSection { section, variables } => {
                self.exec_add_section(section.clone(), variables.clone(), true)
            }
            Action::RemoveSection { name } => self.exec_remove_section(name),
            Action::IgnoreSection {
                name,
                reasons,
                override_policy,
            } => self.exec_ignore_section(name, reasons, *override_policy),
            Action::SetSectionComments { name, comments } => {
                self.exec_set_section_comments(name, comments)
            }
            Action::ApplyDiff {
                diff,
                label,
                trigger_override,
            } => self.exec_apply_diff(diff, label, *trigger_override),
        }
    }

    fn record(&self, applied: Applied, group: Option<GroupTag>) -> StackItem {
        StackItem {
            namespace: self.namespace_of(&applied.target),
            action: applied.action,
            name: applied.name,
            snapshot: applied.snapshot,
            inverse: applied.inverse,
            group,
            at: Utc::now(),
        }
    }

    fn perform(&mut self, action: Action) -> EditResult<CommandOutcome> {
        self.perform_group(vec![action])
    }

    /// Runs actions as one undo group. If one fails, the ones already run
    /// are reversed and nothing is recorded.
    fn perform_group(&mut self, actions: Vec<Action>) -> EditResult<CommandOutcome> {
        let group = (actions.len() > 1).then(GroupTag::new);
        let mut done: Vec<StackItem> = Vec::new();
        let mut ids = Vec::new();
        for action in &actions {
            match self.execute(action) {
                Ok(Some(applied)) => {
                    debug!(action = %applied.action, name = %applied.name, "command applied");
                    ids.extend(applied.ids.iter().cloned());
                    done.push(self.record(applied, group));
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, target = %action.target(), "command rejected");
                    self.roll_back(done.iter().map(|item| &item.inverse));
                    return Err(error);
                }
            }
        }
        for item in done {
            self.stack.push(item);
        }
        Ok(self.finish(ids))
    }

    /// Runs the given inverses newest first, e.g. `inverses` of the steps
    /// that succeeded before a failure.
    fn roll_back<'a>(&mut self, inverses: impl DoubleEndedIterator<Item = &'a Action>) {
        for inverse in inverses.rev() {
            if let Err(error) = self.execute(inverse) {
                warn!(%error, target = %inverse.target(), "rollback step failed");
            }
        }
    }

    /// Reconciles (if enabled) and collects the affected namespaces.
    fn finish(&mut self, ids: Vec<SettingId>) -> CommandOutcome {
        let mut touched: Vec<SettingId> = ids.clone();
        if self.config.auto_reconcile {
            let report = self.triggers.refresh(&self.resolver, &mut self.store);
            touched.extend(report.flagged);
            touched.extend(report.fixed);
        }
        let namespaces = touched.iter().map(|id| self.namespace_of(id)).collect();
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        CommandOutcome { namespaces, ids }
    }

    // Queries

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Read access to the settings store.
    #[must_use]
    pub fn store(&self) -> &SettingStore {
        &self.store
    }

    /// The metadata resolver of this session.
    #[must_use]
    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    /// Trigger verdict of the last reconciliation.
    #[must_use]
    pub fn verdict(&self) -> &TriggerVerdict {
        self.triggers.verdict()
    }

    /// Re-runs trigger reconciliation by hand, e.g. when `auto_reconcile` is
    /// off.
    pub fn reconcile(&mut self) -> ReconcileReport {
        self.triggers.refresh(&self.resolver, &mut self.store)
    }

    /// A real or latent setting.
    #[must_use]
    pub fn get_setting(&self, id: &SettingId) -> Option<SettingRef<'_>> {
        if id.is_section() {
            self.store
                .get_section(&id.section, false, true)
                .map(SettingRef::Section)
        } else {
            self.store.get_variable(id, false, true).map(SettingRef::Variable)
        }
    }

    /// A section followed by its variables.
    #[must_use]
    pub fn get_all_settings(&self, section: &str, include_latent: bool) -> Vec<SettingRef<'_>> {
        let mut out: Vec<SettingRef<'_>> = self
            .store
            .get_section(section, false, include_latent)
            .map(SettingRef::Section)
            .into_iter()
            .collect();
        out.extend(
            self.store
                .variables(section, include_latent)
                .into_iter()
                .map(SettingRef::Variable),
        );
        out
    }

    fn real_settings(&self) -> impl Iterator<Item = SettingRef<'_>> {
        self.store
            .sections(false)
            .into_iter()
            .map(SettingRef::Section)
            .chain(
                self.store
                    .all_variables(false)
                    .into_iter()
                    .map(SettingRef::Variable),
            )
    }

    fn collect_problems(&self, warnings: bool) -> Vec<Problem> {
        let mut out = Vec::new();
        for setting in self.real_settings() {
            let map = if warnings {
                setting.warnings()
            } else {
                setting.errors()
            };
            out.extend(map.iter().map(|(kind, message)| Problem {
                id: setting.id(),
                kind: kind.clone(),
                message: message.clone(),
            }));
        }
        out
    }

    /// Errors on real settings.
    #[must_use]
    pub fn get_errors(&self) -> Vec<Problem> {
        self.collect_problems(false)
    }

    /// Warnings on real settings.
    #[must_use]
    pub fn get_warnings(&self) -> Vec<Problem> {
        self.collect_problems(true)
    }

    fn real_setting(&self, id: &SettingId, from_saved: bool) -> Option<SettingRef<'_>> {
        if id.is_section() {
            self.store
                .get_section(&id.section, from_saved, false)
                .map(SettingRef::Section)
        } else {
            self.store
                .get_variable(id, from_saved, false)
                .map(SettingRef::Variable)
        }
    }

    /// Returns true if the setting differs from the last saved state.
    #[must_use]
    pub fn is_modified(&self, id: &SettingId) -> bool {
        let current = self.real_setting(id, false).map(|s| s.fingerprint());
        current != self.store.saved_fingerprint(id)
    }

    /// Every setting that differs from the last saved state.
    #[must_use]
    pub fn modified_ids(&self) -> Vec<SettingId> {
        let mut ids: BTreeSet<SettingId> = self.store.all_ids(false).into_iter().collect();
        ids.extend(self.store.saved_ids().cloned());
        ids.into_iter().filter(|id| self.is_modified(id)).collect()
    }

    /// Why a setting counts as modified; empty if it does not.
    #[must_use]
    pub fn change_summary(&self, id: &SettingId) -> Vec<String> {
        match (self.real_setting(id, true), self.real_setting(id, false)) {
            (None, None) => Vec::new(),
            (None, Some(_)) => vec!["added".to_string()],
            (Some(_), None) => vec!["removed".to_string()],
            (Some(saved), Some(now)) => {
                let mut changes = Vec::new();
                if saved.value() != now.value() {
                    changes.push(format!(
                        "value: '{}' -> '{}'",
                        saved.value().unwrap_or_default(),
                        now.value().unwrap_or_default()
                    ));
                }
                let before = saved.ignored_reason();
                let after = now.ignored_reason();
                if !before.keys().eq(after.keys()) {
                    changes.push(format!(
                        "ignored state: {} -> {}",
                        describe_reasons(before),
                        describe_reasons(after)
                    ));
                }
                if saved.comments() != now.comments() {
                    changes.push("comments changed".to_string());
                }
                changes
            }
        }
    }

    /// Display namespace of a setting.
    #[must_use]
    pub fn namespace_of(&self, id: &SettingId) -> String {
        self.resolver.namespace_for(id, &self.resolver.resolve(id))
    }

    /// Configuration-wide trigger failure, if any.
    #[must_use]
    pub fn schema_error(&self) -> Option<&SchemaError> {
        self.triggers.schema_error()
    }

    /// Per-setting malformed trigger expressions.
    #[must_use]
    pub fn schema_problems(&self) -> &[SchemaProblem] {
        self.triggers.schema_problems()
    }

    // Persistence boundary

    /// Real settings as a persisted tree. Latent settings are left out.
    #[must_use]
    pub fn dump(&self) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for name in self.store.section_names() {
            let entry = tree.sections.entry(name.clone()).or_default();
            if let Some(section) = self.store.get_section(&name, false, false) {
                entry.state = NodeState::from_reasons(&section.ignored_reason);
                entry.comments.clone_from(&section.comments);
            }
            for variable in self.store.variables(&name, false) {
                entry.options.insert(
                    variable.name().to_string(),
                    TreeNode {
                        value: variable.value.clone(),
                        state: NodeState::from_reasons(&variable.ignored_reason),
                        comments: variable.comments.clone(),
                    },
                );
            }
        }
        tree
    }

    /// Dumps the configuration and makes it the saved state.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::UnresolvedErrors`] while real settings carry
    /// errors, unless `force` is set.
    pub fn save(&mut self, force: bool) -> EditResult<ConfigTree> {
        let count = self.get_errors().len();
        if count > 0 && !force {
            warn!(count, "save refused");
            return Err(ExecutionError::UnresolvedErrors { count }.into());
        }
        let tree = self.dump();
        self.store.snapshot_for_save();
        debug!(sections = tree.sections.len(), errors = count, "configuration saved");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn schema() -> MetadataTree {
        MetadataTree::new()
            .with("env=A", "trigger", "env=B: 1")
            .with("env=B", "compulsory", "true")
            .declare("env=C")
            .with("namelist:foo", "duplicate", "true")
            .with("namelist:foo=x", "compulsory", "true")
    }

    pub(super) fn tree() -> ConfigTree {
        ConfigTree::new()
            .with("env=A", "1")
            .with("env=B", "b")
            .with("namelist:foo(1)=x", "3")
    }

    pub(super) fn editor() -> ConfigEditor {
        ConfigEditor::load(tree(), schema(), EditorConfig::default()).unwrap()
    }

    #[test]
    fn load_adds_declared_options_as_latent() {
        let editor = editor();
        let c = SettingId::option("env", "C");
        assert!(editor.store().is_latent(&c));
        assert!(!editor.dump().contains(&c));
        assert!(editor.store().get_variable(&SettingId::option("namelist:foo", "x"), false, true).is_none());
        assert!(editor.get_errors().is_empty());
        assert!(editor.modified_ids().is_empty());
    }

    #[test]
    fn load_maps_states_to_reasons() {
        let tree = tree()
            .with_option_state("env=B", NodeState::SystemIgnored)
            .with_section_state("namelist:foo(1)", NodeState::UserIgnored);
        let editor = ConfigEditor::load(tree, schema(), EditorConfig::default()).unwrap();
        let b = editor.get_setting(&SettingId::option("env", "B")).unwrap();
        assert_eq!(b.ignored_reason()[&IgnoredReason::System], IGNORED_STATUS_CONFIG);
        let x = editor
            .get_setting(&SettingId::option("namelist:foo(1)", "x"))
            .unwrap();
        assert!(x.ignored_reason().contains_key(&IgnoredReason::Section));
        assert_eq!(editor.dump(), ConfigTree::new()
            .with("env=A", "1")
            .with("env=B", "b")
            .with("namelist:foo(1)=x", "3")
            .with_option_state("env=B", NodeState::SystemIgnored)
            .with_section_state("namelist:foo(1)", NodeState::UserIgnored));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EditorConfig {
            rule_cache_capacity: 0,
            ..EditorConfig::default()
        };
        let err = ConfigEditor::load(ConfigTree::new(), MetadataTree::new(), config).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn modification_tracking_and_summary() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        editor.set_value(&a, "2").unwrap();
        assert!(editor.is_modified(&a));
        assert_eq!(editor.change_summary(&a), vec!["value: '1' -> '2'"]);
        assert!(editor.modified_ids().contains(&a));
        assert!(editor.change_summary(&SettingId::option("env", "C")).is_empty());
    }

    #[test]
    fn save_refuses_with_errors_unless_forced() {
        let mut editor = editor();
        editor.set_value(&SettingId::option("env", "A"), "0").unwrap();
        assert_eq!(editor.get_errors().len(), 1);
        let err = editor.save(false).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EditError::Execution(ExecutionError::UnresolvedErrors { count: 1 })
        ));
        let saved = editor.save(true).unwrap();
        assert_eq!(saved, editor.dump());
        assert!(editor.modified_ids().is_empty());
    }

    #[test]
    fn nested_replay_is_rejected() {
        let mut editor = editor();
        editor.set_value(&SettingId::option("env", "A"), "2").unwrap();
        editor.performing_undo = true;
        let err = editor.undo().unwrap_err();
        assert!(err.is_retryable());
        editor.performing_undo = false;
        editor.undo().unwrap();
    }
}
