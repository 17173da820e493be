//! Reconciliation of stored ignored states against a trigger verdict.
//!
//! | actual         | verdict            | outcome                                         |
//! |----------------|--------------------|-------------------------------------------------|
//! | user-ignored   | trigger-ignored    | warning, plus error if compulsory               |
//! | enabled        | trigger-ignored    | latent: add `System`; real: error               |
//! | trigger-ignored| enabled by trigger | latent: drop `System`; real: error              |
//! | trigger-ignored| not a target       | latent: drop `System`; real: error if compulsory|
//! | user-ignored   | otherwise          | error if compulsory                             |
//!
//! Real settings are only ever flagged, never changed.

use crate::id::SettingId;
use crate::setting::{is_compulsory, IgnoredReason, ProblemKind, ProblemMap, ReasonMap};
use crate::storage::{SettingStore, SettingView};

use super::evaluate::TriggerVerdict;

/// Status text for `System` reasons set while reconciling latent settings.
pub const IGNORED_STATUS_CONFIG: &str = "from configuration.";

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Settings whose problem maps changed.
    pub flagged: Vec<SettingId>,
    /// Latent settings whose ignored reasons were corrected.
    pub fixed: Vec<SettingId>,
}

impl ReconcileReport {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty() && self.fixed.is_empty()
    }
}

struct Outcome {
    errors: ProblemMap,
    warnings: ProblemMap,
    reasons: Option<ReasonMap>,
}

fn judge(
    id: &SettingId,
    reasons: &ReasonMap,
    compulsory: bool,
    is_latent: bool,
    verdict: &TriggerVerdict,
) -> Outcome {
    let mut out = Outcome {
        errors: ProblemMap::new(),
        warnings: ProblemMap::new(),
        reasons: None,
    };
    let user = reasons.contains_key(&IgnoredReason::User);
    let system = reasons.contains_key(&IgnoredReason::System);

    if verdict.is_ignored(id) {
        if system {
            return out;
        }
        let help = verdict.ignore_help(id);
        if user {
            out.warnings.insert(
                ProblemKind::WrongIgnoreKind,
                format!("User-ignored, but should be trigger-ignored: {help}"),
            );
            if compulsory {
                out.errors.insert(
                    ProblemKind::UserIgnored,
                    "Compulsory settings should not be user-ignored".to_string(),
                );
            }
        } else if is_latent {
            let mut fixed = reasons.clone();
            fixed.insert(IgnoredReason::System, IGNORED_STATUS_CONFIG.to_string());
            out.reasons = Some(fixed);
        } else {
            out.errors.insert(
                ProblemKind::ShouldBeIgnored,
                format!("Enabled, but should be trigger-ignored: {help}"),
            );
        }
        return out;
    }

    if system {
        let cleared = || {
            let mut r = reasons.clone();
            r.remove(&IgnoredReason::System);
            Some(r)
        };
        if verdict.is_enabled(id) {
            if is_latent {
                out.reasons = cleared();
            } else {
                out.errors.insert(
                    ProblemKind::ShouldBeEnabled,
                    format!(
                        "Trigger-ignored, but enabled by: {}",
                        verdict.enabling_parents(id)
                    ),
                );
            }
        } else if is_latent {
            out.reasons = cleared();
        } else if compulsory {
            out.errors.insert(
                ProblemKind::NotTrigger,
                "Trigger-ignored, but not triggered by anything".to_string(),
            );
        }
        return out;
    }

    if user && compulsory {
        out.errors.insert(
            ProblemKind::UserIgnored,
            "Compulsory settings should not be user-ignored".to_string(),
        );
    }
    out
}

fn replace_owned(map: &mut ProblemMap, fresh: ProblemMap) -> bool {
    let before = map.clone();
    map.retain(|kind, _| !kind.is_ignore_related());
    map.extend(fresh);
    *map != before
}

/// Applies a verdict to every live setting.
///
/// Stale ignore-related problems are cleared before the table is applied, so
/// running twice in a row changes nothing the second time.
pub fn reconcile(store: &mut SettingStore, verdict: &TriggerVerdict) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for id in store.all_ids(true) {
        let is_latent = !store.is_real(&id);
        let entry = if id.is_section() {
            store
                .section_mut(&id.section)
                .map(|s| (&mut s.ignored_reason, &mut s.error, &mut s.warning, is_compulsory(&s.metadata)))
        } else {
            store
                .variable_mut(&id)
                .map(|v| (&mut v.ignored_reason, &mut v.error, &mut v.warning, is_compulsory(&v.metadata)))
        };
        let Some((reasons, errors, warnings, compulsory)) = entry else {
            continue;
        };
        let outcome = judge(&id, reasons, compulsory, is_latent, verdict);
        let mut changed = replace_owned(errors, outcome.errors);
        changed |= replace_owned(warnings, outcome.warnings);
        if changed {
            report.flagged.push(id.clone());
        }
        if let Some(fixed) = outcome.reasons {
            if fixed != *reasons {
                *reasons = fixed;
                report.fixed.push(id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use crate::setting::{Metadata, Section, Variable, META_COMPULSORY, META_TRUE};

    fn opt(o: &str) -> SettingId {
        SettingId::option("env", o)
    }

    fn verdict_ignoring(ids: &[&str]) -> TriggerVerdict {
        let mut verdict = TriggerVerdict::default();
        for id in ids {
            let mut parents = BTreeMap::new();
            parents.insert(opt("P"), "from state of parent: env=P".to_string());
            verdict.ignored.insert(opt(id), parents);
        }
        verdict
    }

    fn compulsory() -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(META_COMPULSORY.to_string(), META_TRUE.to_string());
        meta
    }

    fn base_store() -> SettingStore {
        let mut store = SettingStore::new();
        store.add_section(Section::new("env"));
        store
    }

    fn get(store: &SettingStore, o: &str) -> Variable {
        store.get_variable(&opt(o), false, true).unwrap().clone()
    }

    #[test]
    fn enabled_real_setting_is_flagged_not_changed() {
        let mut store = base_store();
        store.add_variable(Variable::new(opt("A"), "1"));
        let report = reconcile(&mut store, &verdict_ignoring(&["A"]));
        let a = get(&store, "A");
        assert!(a.ignored_reason.is_empty());
        assert!(a.error[&ProblemKind::ShouldBeIgnored].contains("env=P"));
        assert_eq!(report.flagged, vec![opt("A")]);
    }

    #[test]
    fn enabled_latent_setting_is_fixed() {
        let mut store = base_store();
        store.add_latent_variable(Variable::new(opt("A"), "1"));
        let report = reconcile(&mut store, &verdict_ignoring(&["A"]));
        let a = get(&store, "A");
        assert_eq!(a.ignored_reason[&IgnoredReason::System], IGNORED_STATUS_CONFIG);
        assert!(a.error.is_empty());
        assert_eq!(report.fixed, vec![opt("A")]);
    }

    #[test]
    fn user_ignored_but_trigger_ignored_warns() {
        let mut store = base_store();
        store.add_variable(Variable::new(opt("A"), "1").with_reason(IgnoredReason::User, ""));
        store.add_variable(
            Variable::new(opt("B"), "1")
                .with_metadata(compulsory())
                .with_reason(IgnoredReason::User, ""),
        );
        reconcile(&mut store, &verdict_ignoring(&["A", "B"]));
        let a = get(&store, "A");
        assert!(a.warning.contains_key(&ProblemKind::WrongIgnoreKind));
        assert!(a.error.is_empty());
        let b = get(&store, "B");
        assert!(b.warning.contains_key(&ProblemKind::WrongIgnoreKind));
        assert!(b.error.contains_key(&ProblemKind::UserIgnored));
    }

    #[test]
    fn trigger_ignored_but_enabled_is_flagged() {
        let mut store = base_store();
        store.add_variable(Variable::new(opt("A"), "1").with_reason(IgnoredReason::System, ""));
        let mut verdict = TriggerVerdict::default();
        verdict
            .enabled
            .insert(opt("A"), BTreeSet::from([opt("P")]));
        reconcile(&mut store, &verdict);
        let a = get(&store, "A");
        assert_eq!(
            a.error[&ProblemKind::ShouldBeEnabled],
            "Trigger-ignored, but enabled by: env=P"
        );
    }

    #[test]
    fn trigger_ignored_non_target() {
        let mut store = base_store();
        store.add_variable(Variable::new(opt("A"), "1").with_reason(IgnoredReason::System, ""));
        store.add_variable(
            Variable::new(opt("B"), "1")
                .with_metadata(compulsory())
                .with_reason(IgnoredReason::System, ""),
        );
        store.add_latent_variable(
            Variable::new(opt("C"), "1").with_reason(IgnoredReason::System, ""),
        );
        reconcile(&mut store, &TriggerVerdict::default());
        assert!(get(&store, "A").error.is_empty());
        assert!(get(&store, "B").error.contains_key(&ProblemKind::NotTrigger));
        assert!(get(&store, "C").ignored_reason.is_empty());
    }

    #[test]
    fn compulsory_user_ignored_is_error() {
        let mut store = base_store();
        store.add_variable(
            Variable::new(opt("A"), "1")
                .with_metadata(compulsory())
                .with_reason(IgnoredReason::User, ""),
        );
        reconcile(&mut store, &TriggerVerdict::default());
        assert!(get(&store, "A").error.contains_key(&ProblemKind::UserIgnored));
    }

    #[test]
    fn stale_problems_clear_and_second_pass_is_noop() {
        let mut store = base_store();
        store.add_variable(Variable::new(opt("A"), "1"));
        store.add_latent_variable(Variable::new(opt("B"), "1"));
        let verdict = verdict_ignoring(&["A", "B"]);
        reconcile(&mut store, &verdict);
        let second = reconcile(&mut store, &verdict);
        assert!(second.is_empty());

        store
            .variable_mut(&opt("A"))
            .unwrap()
            .error
            .insert(ProblemKind::Other("range".to_string()), "out of range".to_string());
        let cleared = reconcile(&mut store, &TriggerVerdict::default());
        let a = get(&store, "A");
        assert!(!a.error.contains_key(&ProblemKind::ShouldBeIgnored));
        assert!(a.error.contains_key(&ProblemKind::Other("range".to_string())));
        assert!(cleared.flagged.contains(&opt("A")));
    }
}
