//! Trigger evaluation.

use std::collections::{BTreeMap, BTreeSet};

use crate::id::SettingId;
use crate::storage::SettingView;

use super::expression::{AllowedValues, RuleCache};
use super::graph::{EdgeMap, TriggerGraph};

/// Computed trigger state of every involved setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerVerdict {
    /// Trigger-ignored ids, with each ignoring parent and its explanation.
    pub ignored: BTreeMap<SettingId, BTreeMap<SettingId, String>>,
    /// Ids enabled by a trigger, with the enabling parents.
    pub enabled: BTreeMap<SettingId, BTreeSet<SettingId>>,
    /// Every concrete id taking part in a trigger relationship.
    pub involved: BTreeSet<SettingId>,
}

impl TriggerVerdict {
    /// Returns true if any parent ignores the id.
    #[must_use]
    pub fn is_ignored(&self, id: &SettingId) -> bool {
        self.ignored.contains_key(id)
    }

    /// Returns true if the id is enabled by a trigger and ignored by none.
    #[must_use]
    pub fn is_enabled(&self, id: &SettingId) -> bool {
        self.enabled.contains_key(id) && !self.is_ignored(id)
    }

    /// Returns true if the id controls or is controlled by another.
    #[must_use]
    pub fn is_involved(&self, id: &SettingId) -> bool {
        self.involved.contains(id)
    }

    /// Ignoring parents, comma separated.
    #[must_use]
    pub fn ignoring_parents(&self, id: &SettingId) -> String {
        join(self.ignored.get(id).into_iter().flat_map(BTreeMap::keys))
    }

    /// Explanations from every ignoring parent, comma separated.
    #[must_use]
    pub fn ignore_help(&self, id: &SettingId) -> String {
        self.ignored
            .get(id)
            .map(|parents| parents.values().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default()
    }

    /// Enabling parents, comma separated.
    #[must_use]
    pub fn enabling_parents(&self, id: &SettingId) -> String {
        join(self.enabled.get(id).into_iter().flatten())
    }

    fn ignore(&mut self, child: &SettingId, parent: &SettingId, help: String) {
        self.ignored
            .entry(child.clone())
            .or_default()
            .insert(parent.clone(), help);
        if let Some(parents) = self.enabled.get_mut(child) {
            parents.remove(parent);
            if parents.is_empty() {
                self.enabled.remove(child);
            }
        }
    }

    fn enable(&mut self, child: &SettingId, parent: &SettingId) {
        self.enabled
            .entry(child.clone())
            .or_default()
            .insert(parent.clone());
        if let Some(parents) = self.ignored.get_mut(child) {
            parents.remove(parent);
            if parents.is_empty() {
                self.ignored.remove(child);
            }
        }
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a SettingId>) -> String {
    ids.map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn quoted(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
    format!("[{}]", items.join(", "))
}

/// Orders nodes so every controlling id comes before the ids it controls.
///
/// An option that controls others also waits for its own section, so a
/// trigger-ignored section passes its state to its trigger options. Nodes
/// left over by such implicit loops are appended in id order.
fn evaluation_order(edges: &EdgeMap, involved: &BTreeSet<SettingId>) -> Vec<SettingId> {
    let mut dependents: BTreeMap<&SettingId, Vec<&SettingId>> = BTreeMap::new();
    let mut indegree: BTreeMap<&SettingId, usize> = involved.iter().map(|id| (id, 0)).collect();
    let mut link = |from: &SettingId, to: &SettingId| {
        let (Some(from), Some(to)) = (involved.get(from), involved.get(to)) else {
            return;
        };
        dependents.entry(from).or_default().push(to);
        if let Some(d) = indegree.get_mut(to) {
            *d += 1;
        }
    };
    for (parent, targets) in edges {
        for (child, _) in targets {
            link(parent, child);
        }
        if !parent.is_section() {
            link(&parent.section_id(), parent);
        }
    }

    let mut ready: BTreeSet<&SettingId> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(involved.len());
    let mut seen = BTreeSet::new();
    while let Some(node) = ready.pop_first() {
        order.push(node.clone());
        seen.insert(node);
        for next in dependents.get(node).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    ready.insert(*next);
                }
            }
        }
    }
    order.extend(involved.iter().filter(|id| !seen.contains(id)).cloned());
    order
}

/// Evaluates concrete trigger edges against the real settings.
///
/// A child is ignored if any parent ignores it: the parent is itself
/// trigger-ignored, its section is, it is missing, or its value fails the
/// allowed values. A present section counts as having a value, but matches
/// only an unrestricted target.
pub fn evaluate(edges: &EdgeMap, view: &dyn SettingView, rules: &mut RuleCache) -> TriggerVerdict {
    let mut verdict = TriggerVerdict {
        involved: TriggerGraph::involved_ids(edges),
        ..TriggerVerdict::default()
    };
    for node in evaluation_order(edges, &verdict.involved) {
        let Some(targets) = edges.get(&node) else {
            continue;
        };
        let ignored_parent = verdict.is_ignored(&node)
            || (!node.is_section() && verdict.is_ignored(&node.section_id()))
            || !view.is_real(&node);
        let value = view.value_of(&node).map(str::to_string);
        for (child, allowed) in targets {
            if ignored_parent {
                verdict.ignore(child, &node, format!("from state of parent: {node}"));
                continue;
            }
            match allowed {
                AllowedValues::Any => verdict.enable(child, &node),
                AllowedValues::OneOf(values) => {
                    let ok = value
                        .as_deref()
                        .is_some_and(|v| rules.value_allowed(v, values));
                    if ok {
                        verdict.enable(child, &node);
                        continue;
                    }
                    let shown = value.as_deref().unwrap_or("None");
                    let help = if let [single] = values.as_slice() {
                        format!("from parent value: {node} is not '{single}' (value {shown})")
                    } else {
                        format!(
                            "from parent value: {node} with value {shown} is not in the allowed values: {}",
                            quoted(values)
                        )
                    };
                    verdict.ignore(child, &node, help);
                }
            }
        }
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataResolver, MetadataTree};
    use crate::setting::{Section, Variable};
    use crate::storage::SettingStore;

    fn opt(s: &str, o: &str) -> SettingId {
        SettingId::option(s, o)
    }

    fn run(tree: MetadataTree, store: &SettingStore) -> TriggerVerdict {
        let resolver = MetadataResolver::new(tree);
        let mut rules = RuleCache::new(16);
        let graph = TriggerGraph::build(&resolver, &mut rules).unwrap();
        let edges = graph.concrete_edges(&resolver, store);
        evaluate(&edges, store, &mut rules)
    }

    fn store_with(values: &[(&str, &str, &str)]) -> SettingStore {
        let mut store = SettingStore::new();
        for (section, option, value) in values {
            store.add_section(Section::new(*section));
            store.add_variable(Variable::new(opt(section, option), *value));
        }
        store
    }

    fn chain() -> MetadataTree {
        MetadataTree::new()
            .with("env=A", "trigger", "env=B: true")
            .with("env=B", "trigger", "env=C: 1, 2")
            .declare("env=C")
    }

    #[test]
    fn enabled_chain() {
        let store = store_with(&[("env", "A", "true"), ("env", "B", "2"), ("env", "C", "x")]);
        let verdict = run(chain(), &store);
        assert!(verdict.is_enabled(&opt("env", "B")));
        assert!(verdict.is_enabled(&opt("env", "C")));
        assert!(verdict.ignored.is_empty());
        assert_eq!(verdict.involved.len(), 3);
    }

    #[test]
    fn ignored_parent_propagates() {
        let store = store_with(&[("env", "A", "false"), ("env", "B", "2"), ("env", "C", "x")]);
        let verdict = run(chain(), &store);
        assert!(verdict.is_ignored(&opt("env", "B")));
        assert_eq!(
            verdict.ignore_help(&opt("env", "B")),
            "from parent value: env=A is not 'true' (value false)"
        );
        assert!(verdict.is_ignored(&opt("env", "C")));
        assert_eq!(
            verdict.ignore_help(&opt("env", "C")),
            "from state of parent: env=B"
        );
        assert_eq!(verdict.ignoring_parents(&opt("env", "C")), "env=B");
    }

    #[test]
    fn missing_parent_ignores_children() {
        let store = store_with(&[("env", "B", "1")]);
        let verdict = run(chain(), &store);
        assert!(verdict.is_ignored(&opt("env", "B")));
        assert!(verdict.is_ignored(&opt("env", "C")));
    }

    #[test]
    fn multiple_values_help() {
        let store = store_with(&[("env", "A", "true"), ("env", "B", "7")]);
        let verdict = run(chain(), &store);
        assert_eq!(
            verdict.ignore_help(&opt("env", "C")),
            "from parent value: env=B with value 7 is not in the allowed values: ['1', '2']"
        );
    }

    #[test]
    fn any_parent_ignoring_wins() {
        let tree = MetadataTree::new()
            .with("env=A", "trigger", "env=C")
            .with("env=B", "trigger", "env=C: 1")
            .declare("env=C");
        let store = store_with(&[("env", "A", "x"), ("env", "B", "0"), ("env", "C", "x")]);
        let verdict = run(tree, &store);
        assert!(verdict.is_ignored(&opt("env", "C")));
        assert!(!verdict.is_enabled(&opt("env", "C")));
        assert_eq!(verdict.enabling_parents(&opt("env", "C")), "env=A");
    }

    #[test]
    fn present_sections_trigger_their_targets() {
        let tree = MetadataTree::new()
            .with("namelist:a", "trigger", "env=X")
            .declare("env=X");
        let mut store = store_with(&[("env", "X", "1")]);
        store.add_section(Section::new("namelist:a"));
        let verdict = run(tree.clone(), &store);
        assert!(verdict.is_enabled(&opt("env", "X")));

        store.remove_section("namelist:a");
        let verdict = run(tree, &store);
        assert!(verdict.is_ignored(&opt("env", "X")));
    }

    #[test]
    fn ignored_section_passes_state_to_its_trigger_options() {
        let tree = MetadataTree::new()
            .with("env=S", "trigger", "namelist:a: 1")
            .with("namelist:a=b", "trigger", "env=Y")
            .declare("namelist:a")
            .declare("env=Y");
        let store = store_with(&[
            ("env", "S", "0"),
            ("namelist:a", "b", "x"),
            ("env", "Y", "1"),
        ]);
        let verdict = run(tree, &store);
        assert!(verdict.is_ignored(&SettingId::section("namelist:a")));
        assert!(verdict.is_ignored(&opt("env", "Y")));
    }

    #[test]
    fn env_var_values_satisfy_triggers() {
        let store = store_with(&[("env", "A", "$FLAG"), ("env", "B", "1")]);
        let verdict = run(chain(), &store);
        assert!(verdict.is_enabled(&opt("env", "B")));
    }

    #[test]
    fn duplicate_instances_are_independent() {
        let tree = MetadataTree::new()
            .with("namelist:d", "duplicate", "true")
            .with("namelist:d=on", "trigger", "namelist:d=val: yes")
            .declare("namelist:d=val");
        let store = store_with(&[
            ("namelist:d(1)", "on", "yes"),
            ("namelist:d(1)", "val", "1"),
            ("namelist:d(2)", "on", "no"),
            ("namelist:d(2)", "val", "1"),
        ]);
        let verdict = run(tree, &store);
        assert!(verdict.is_enabled(&opt("namelist:d(1)", "val")));
        assert!(verdict.is_ignored(&opt("namelist:d(2)", "val")));
    }
}
