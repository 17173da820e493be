//! Trigger dependencies and ignored-state reconciliation.
//!
//! A setting's `trigger` metadata names the settings it controls and, for
//! each, the values that enable them. [`TriggerEngine`] turns the declared
//! expressions into a validated [`TriggerGraph`], evaluates it against the
//! store and reconciles every live setting with the resulting
//! [`TriggerVerdict`].

mod evaluate;
mod expression;
mod graph;
mod reconcile;

pub use evaluate::{evaluate, TriggerVerdict};
pub use expression::{
    contains_env_var, is_rule, parse_rule, parse_trigger, AllowedValues, RuleCache, RuleOp,
    TriggerExpression, ValueRule,
};
pub use graph::{EdgeMap, SchemaError, SchemaErrorKind, SchemaProblem, TriggerGraph};
pub use reconcile::{reconcile, ReconcileReport, IGNORED_STATUS_CONFIG};

use tracing::{debug, warn};

use crate::diff::{DiffEntry, StructuralDiff};
use crate::id::SettingId;
use crate::metadata::MetadataResolver;
use crate::storage::SettingStore;
use crate::tree::NodeState;

/// Trigger state of one editing session.
///
/// The family-level graph is built once from the schema; concrete edges are
/// expanded from the store on every [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct TriggerEngine {
    rules: RuleCache,
    graph: Result<TriggerGraph, SchemaError>,
    verdict: TriggerVerdict,
}

impl TriggerEngine {
    /// Builds the trigger graph for a schema.
    #[must_use]
    pub fn new(resolver: &MetadataResolver, rule_cache_capacity: usize) -> Self {
        let mut rules = RuleCache::new(rule_cache_capacity);
        let graph = TriggerGraph::build(resolver, &mut rules);
        match &graph {
            Ok(graph) => {
                for problem in graph.problems() {
                    warn!(id = %problem.id, message = %problem.message, "trigger expression skipped");
                }
            }
            Err(error) => {
                warn!(id = %error.id, kind = ?error.kind, message = %error.message, "trigger schema unusable");
            }
        }
        Self {
            rules,
            graph,
            verdict: TriggerVerdict::default(),
        }
    }

    /// Re-evaluates every trigger and reconciles the store.
    ///
    /// Does nothing while a [`SchemaError`] exists.
    pub fn refresh(&mut self, resolver: &MetadataResolver, store: &mut SettingStore) -> ReconcileReport {
        let edges = match &self.graph {
            Ok(graph) => graph.concrete_edges(resolver, store),
            Err(error) => {
                debug!(id = %error.id, "reconciliation skipped");
                return ReconcileReport::default();
            }
        };
        self.verdict = evaluate(&edges, store, &mut self.rules);
        let report = reconcile(store, &self.verdict);
        debug!(
            nodes = edges.len(),
            involved = self.verdict.involved.len(),
            flagged = report.flagged.len(),
            fixed = report.fixed.len(),
            "trigger states reconciled"
        );
        report
    }

    /// Verdict of the last refresh.
    #[must_use]
    pub fn verdict(&self) -> &TriggerVerdict {
        &self.verdict
    }

    /// Returns true if the trigger graph currently ignores the id, so it must
    /// not be enabled without an override.
    #[must_use]
    pub fn cannot_enable(&self, id: &SettingId) -> bool {
        self.verdict.is_ignored(id)
    }

    /// Configuration-wide failure, if the schema has one.
    #[must_use]
    pub fn schema_error(&self) -> Option<&SchemaError> {
        self.graph.as_ref().err()
    }

    /// Per-setting expression problems.
    #[must_use]
    pub fn schema_problems(&self) -> &[SchemaProblem] {
        match &self.graph {
            Ok(graph) => graph.problems(),
            Err(_) => &[],
        }
    }

    /// Diff that switches every real setting between enabled and
    /// trigger-ignored as the last verdict requires.
    ///
    /// User-ignored settings are left alone.
    #[must_use]
    pub fn fix_diff(&self, store: &SettingStore) -> StructuralDiff {
        let mut diff = StructuralDiff::new();
        if self.graph.is_err() {
            return diff;
        }
        let sections = store
            .sections(false)
            .into_iter()
            .map(|s| (s.id(), DiffEntry::of_section(s)));
        let variables = store
            .all_variables(false)
            .into_iter()
            .map(|v| (v.id.clone(), DiffEntry::of_variable(v)));
        for (id, before) in sections.chain(variables) {
            let ignored = self.verdict.is_ignored(&id);
            let state = match before.state {
                NodeState::Normal if ignored => NodeState::SystemIgnored,
                NodeState::SystemIgnored if !ignored => NodeState::Normal,
                _ => continue,
            };
            let after = DiffEntry {
                state,
                ..before.clone()
            };
            diff = diff.modify(id, before, after);
        }
        diff
    }
}
