//! Trigger dependency graph construction and validation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::SettingId;
use crate::metadata::MetadataResolver;
use crate::storage::SettingView;

use super::expression::{is_rule, parse_trigger, AllowedValues, RuleCache};

/// What made the trigger setup unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaErrorKind {
    /// A trigger chain loops back on itself.
    Cyclic,
    /// A trigger names a setting with no metadata.
    MissingMetadata,
    /// A trigger in a duplicate family controls a setting outside it.
    DuplicateOutsideFamily,
}

/// Configuration-wide trigger failure. While one exists, no setting is
/// reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{id}: {message}")]
pub struct SchemaError {
    /// Failure class.
    pub kind: SchemaErrorKind,
    /// Setting the failure was detected at.
    pub id: SettingId,
    /// Description.
    pub message: String,
}

/// Malformed trigger expression on one setting; only that setting's
/// triggers are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProblem {
    /// Setting declaring the expression.
    pub id: SettingId,
    /// Description.
    pub message: String,
}

/// Controlled ids with their allowed values, keyed by controlling id.
pub type EdgeMap = BTreeMap<SettingId, Vec<(SettingId, AllowedValues)>>;

/// Validated family-level trigger graph.
#[derive(Debug, Clone, Default)]
pub struct TriggerGraph {
    lookup: EdgeMap,
    problems: Vec<SchemaProblem>,
}

impl TriggerGraph {
    /// Parses every declared trigger and validates the result.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found. Malformed expressions are not
    /// errors; they are recorded as [`SchemaProblem`]s and skipped.
    pub fn build(resolver: &MetadataResolver, rules: &mut RuleCache) -> Result<Self, SchemaError> {
        let mut lookup = EdgeMap::new();
        let mut problems = Vec::new();
        for (id, expr) in resolver.trigger_expressions() {
            match parse_checked(expr, rules) {
                Ok(targets) => {
                    lookup.insert(id.clone(), targets);
                }
                Err(message) => problems.push(SchemaProblem {
                    id: id.clone(),
                    message,
                }),
            }
        }
        let graph = Self { lookup, problems };
        graph.validate(resolver)?;
        Ok(graph)
    }

    fn validate(&self, resolver: &MetadataResolver) -> Result<(), SchemaError> {
        for (parent, targets) in &self.lookup {
            let parent_dupl = resolver.is_duplicate(&parent.section);
            for (child, _) in targets {
                if !resolver.is_declared(child) {
                    return Err(SchemaError {
                        kind: SchemaErrorKind::MissingMetadata,
                        id: child.clone(),
                        message: "No metadata entry found".to_string(),
                    });
                }
                if parent_dupl && child.base_section() != parent.base_section() {
                    return Err(SchemaError {
                        kind: SchemaErrorKind::DuplicateOutsideFamily,
                        id: parent.clone(),
                        message: format!(
                            "Badly defined trigger - {} is 'duplicate'",
                            parent.section
                        ),
                    });
                }
            }
        }
        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), SchemaError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Active,
            Done,
        }
        let mut marks: BTreeMap<&SettingId, Mark> = BTreeMap::new();
        for start in self.lookup.keys() {
            if marks.contains_key(start) {
                continue;
            }
            let mut stack: Vec<(&SettingId, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::Active);
            while let Some((node, next)) = stack.pop() {
                let children = self.lookup.get(node).map_or(&[][..], Vec::as_slice);
                let Some((child, _)) = children.get(next) else {
                    marks.insert(node, Mark::Done);
                    continue;
                };
                stack.push((node, next + 1));
                match marks.get(child) {
                    Some(Mark::Active) => {
                        return Err(SchemaError {
                            kind: SchemaErrorKind::Cyclic,
                            id: node.clone(),
                            message: format!("Cyclic dependency detected: {child} to {node}"),
                        });
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::Active);
                        stack.push((child, 0));
                    }
                }
            }
        }
        Ok(())
    }

    /// Per-setting problems found while parsing.
    #[must_use]
    pub fn problems(&self) -> &[SchemaProblem] {
        &self.problems
    }

    /// Family-level edges.
    #[must_use]
    pub fn edges(&self) -> &EdgeMap {
        &self.lookup
    }

    /// Returns true if no triggers are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Family edges expanded to the duplicate instances present in `view`.
    ///
    /// A controlling id in a duplicate family yields one node per real
    /// instance, and its same-family targets map to that instance. Targets
    /// in a duplicate family controlled from outside it fan out to every
    /// real instance.
    #[must_use]
    pub fn concrete_edges(&self, resolver: &MetadataResolver, view: &dyn SettingView) -> EdgeMap {
        let mut concrete = EdgeMap::new();
        for (parent, targets) in &self.lookup {
            if resolver.is_duplicate(&parent.section) {
                for instance in view.family_instances(parent.base_section()) {
                    let node = parent.with_section(instance.clone());
                    let children = targets
                        .iter()
                        .map(|(child, allowed)| (child.with_section(instance.clone()), allowed.clone()))
                        .collect();
                    concrete.insert(node, children);
                }
                continue;
            }
            let mut children = Vec::new();
            for (child, allowed) in targets {
                if resolver.is_duplicate(&child.section) {
                    for instance in view.family_instances(child.base_section()) {
                        children.push((child.with_section(instance), allowed.clone()));
                    }
                } else {
                    children.push((child.clone(), allowed.clone()));
                }
            }
            concrete.insert(parent.clone(), children);
        }
        concrete
    }

    /// Every concrete id that controls or is controlled by another.
    #[must_use]
    pub fn involved_ids(edges: &EdgeMap) -> BTreeSet<SettingId> {
        let mut ids: BTreeSet<SettingId> = edges.keys().cloned().collect();
        for targets in edges.values() {
            ids.extend(targets.iter().map(|(child, _)| child.clone()));
        }
        ids
    }
}

fn parse_checked(expr: &str, rules: &mut RuleCache) -> Result<Vec<(SettingId, AllowedValues)>, String> {
    let parsed =
        parse_trigger(expr).map_err(|e| format!("Invalid trigger expression: {expr} ({e})"))?;
    for (_, allowed) in &parsed.targets {
        if let AllowedValues::OneOf(values) = allowed {
            for value in values.iter().filter(|v| is_rule(v)) {
                rules
                    .get(value)
                    .map_err(|e| format!("Invalid trigger expression: {value} ({e})"))?;
            }
        }
    }
    Ok(parsed.targets)
}
