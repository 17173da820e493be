//! Setting model: variables, sections, ignored reasons and problems.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::SettingId;

/// Resolved metadata properties for one setting (`property → value`).
pub type Metadata = BTreeMap<String, String>;

/// Metadata property holding the setting id.
pub const META_ID: &str = "id";
/// Metadata property marking a setting compulsory.
pub const META_COMPULSORY: &str = "compulsory";
/// Metadata property holding a trigger expression.
pub const META_TRIGGER: &str = "trigger";
/// Metadata property marking a section as a duplicate family.
pub const META_DUPLICATE: &str = "duplicate";
/// Metadata property overriding the display namespace.
pub const META_NS: &str = "ns";
/// Metadata property holding the display title.
pub const META_TITLE: &str = "title";
/// Metadata property listing allowed values, comma separated.
pub const META_VALUES: &str = "values";
/// Metadata boolean true literal.
pub const META_TRUE: &str = "true";

/// Why a setting is ignored.
///
/// Reasons are non-exclusive: a variable can be both user-ignored and inside
/// an ignored section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IgnoredReason {
    /// Ignored by an explicit user request.
    User,
    /// Ignored because the trigger graph says so.
    System,
    /// Ignored because the enclosing section is ignored.
    Section,
}

impl IgnoredReason {
    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User ignored",
            Self::System => "Trigger ignored",
            Self::Section => "Section ignored",
        }
    }
}

impl fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ignored reasons with their status texts.
pub type ReasonMap = BTreeMap<IgnoredReason, String>;

/// Kinds of consistency problem a setting can carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProblemKind {
    /// Enabled, but the trigger graph says it should be ignored.
    ShouldBeIgnored,
    /// Trigger-ignored, but the trigger graph enables it.
    ShouldBeEnabled,
    /// Trigger-ignored, but nothing triggers it.
    NotTrigger,
    /// Compulsory setting that is user-ignored.
    UserIgnored,
    /// User-ignored where the trigger graph would ignore it anyway.
    WrongIgnoreKind,
    /// Anything reported by an outside checker.
    Other(String),
}

impl ProblemKind {
    /// Returns true for the kinds owned by trigger reconciliation.
    #[must_use]
    pub const fn is_ignore_related(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Short label used in problem listings.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::ShouldBeIgnored => "should be ignored",
            Self::ShouldBeEnabled => "should be enabled",
            Self::NotTrigger => "not a trigger target",
            Self::UserIgnored => "compulsory but user ignored",
            Self::WrongIgnoreKind => "wrong ignore kind",
            Self::Other(label) => label,
        }
    }
}

/// Problems with their messages.
pub type ProblemMap = BTreeMap<ProblemKind, String>;

/// Content digest of a setting, used to decide whether it changed since save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    fn digest(parts: &[&str], reasons: &ReasonMap, comments: &[String]) -> Self {
        let mut hasher = blake3::Hasher::new();
        let mut feed = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        for part in parts {
            feed(part.as_bytes());
        }
        for reason in reasons.keys() {
            feed(reason.label().as_bytes());
        }
        for comment in comments {
            feed(comment.as_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", blake3::Hash::from(self.0).to_hex())
    }
}

/// A configuration option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Setting id (`section=option`).
    pub id: SettingId,
    /// Raw value text.
    pub value: String,
    /// Resolved metadata.
    pub metadata: Metadata,
    /// Why the variable is ignored, if at all.
    pub ignored_reason: ReasonMap,
    /// Consistency errors. Recomputed on reconciliation, never serialized.
    #[serde(skip)]
    pub error: ProblemMap,
    /// Consistency warnings.
    #[serde(skip)]
    pub warning: ProblemMap,
    /// Comment lines.
    pub comments: Vec<String>,
}

impl Variable {
    /// Creates an enabled variable with no metadata.
    #[must_use]
    pub fn new(id: SettingId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            metadata: Metadata::new(),
            ignored_reason: ReasonMap::new(),
            error: ProblemMap::new(),
            warning: ProblemMap::new(),
            comments: Vec::new(),
        }
    }

    /// Builder-style metadata setter.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder-style ignored reason setter.
    #[must_use]
    pub fn with_reason(mut self, reason: IgnoredReason, status: impl Into<String>) -> Self {
        self.ignored_reason.insert(reason, status.into());
        self
    }

    /// Option name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.option.as_deref().unwrap_or_default()
    }

    /// Section name.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.id.section
    }

    /// Returns true if any ignored reason is present.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        !self.ignored_reason.is_empty()
    }

    /// Returns true if the variable carries the given reason.
    #[must_use]
    pub fn has_reason(&self, reason: IgnoredReason) -> bool {
        self.ignored_reason.contains_key(&reason)
    }

    /// Returns true if metadata marks the variable compulsory.
    #[must_use]
    pub fn is_compulsory(&self) -> bool {
        is_compulsory(&self.metadata)
    }

    /// Set of reason kinds, ignoring status texts.
    #[must_use]
    pub fn reason_kinds(&self) -> BTreeSet<IgnoredReason> {
        self.ignored_reason.keys().copied().collect()
    }

    /// Content digest over id, value, reason kinds and comments.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let id = self.id.to_string();
        Fingerprint::digest(&[&id, &self.value], &self.ignored_reason, &self.comments)
    }
}

/// A configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section name.
    pub name: String,
    /// Option names of the real variables, in insertion order.
    pub options: Vec<String>,
    /// Resolved metadata.
    pub metadata: Metadata,
    /// Why the section is ignored, if at all.
    pub ignored_reason: ReasonMap,
    /// Consistency errors. Recomputed on reconciliation, never serialized.
    #[serde(skip)]
    pub error: ProblemMap,
    /// Consistency warnings.
    #[serde(skip)]
    pub warning: ProblemMap,
    /// Comment lines.
    pub comments: Vec<String>,
}

impl Section {
    /// Creates an enabled, empty section.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
            metadata: Metadata::new(),
            ignored_reason: ReasonMap::new(),
            error: ProblemMap::new(),
            warning: ProblemMap::new(),
            comments: Vec::new(),
        }
    }

    /// Builder-style metadata setter.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Section id.
    #[must_use]
    pub fn id(&self) -> SettingId {
        SettingId::section(self.name.clone())
    }

    /// Returns true if any ignored reason is present.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        !self.ignored_reason.is_empty()
    }

    /// Returns true if the section carries the given reason.
    #[must_use]
    pub fn has_reason(&self, reason: IgnoredReason) -> bool {
        self.ignored_reason.contains_key(&reason)
    }

    /// Returns true if metadata marks the section compulsory.
    #[must_use]
    pub fn is_compulsory(&self) -> bool {
        is_compulsory(&self.metadata)
    }

    /// Set of reason kinds, ignoring status texts.
    #[must_use]
    pub fn reason_kinds(&self) -> BTreeSet<IgnoredReason> {
        self.ignored_reason.keys().copied().collect()
    }

    /// Content digest over name, reason kinds and comments.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::digest(&[&self.name], &self.ignored_reason, &self.comments)
    }
}

/// Borrowed view of either kind of setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingRef<'a> {
    /// A section.
    Section(&'a Section),
    /// A variable.
    Variable(&'a Variable),
}

impl<'a> SettingRef<'a> {
    /// Setting id.
    #[must_use]
    pub fn id(&self) -> SettingId {
        match *self {
            Self::Section(section) => section.id(),
            Self::Variable(variable) => variable.id.clone(),
        }
    }

    /// Value text; sections have none.
    #[must_use]
    pub fn value(&self) -> Option<&'a str> {
        match *self {
            Self::Section(_) => None,
            Self::Variable(variable) => Some(&variable.value),
        }
    }

    /// Resolved metadata.
    #[must_use]
    pub fn metadata(&self) -> &'a Metadata {
        match *self {
            Self::Section(section) => &section.metadata,
            Self::Variable(variable) => &variable.metadata,
        }
    }

    /// Ignored reasons.
    #[must_use]
    pub fn ignored_reason(&self) -> &'a ReasonMap {
        match *self {
            Self::Section(section) => &section.ignored_reason,
            Self::Variable(variable) => &variable.ignored_reason,
        }
    }

    /// Consistency errors.
    #[must_use]
    pub fn errors(&self) -> &'a ProblemMap {
        match *self {
            Self::Section(section) => &section.error,
            Self::Variable(variable) => &variable.error,
        }
    }

    /// Consistency warnings.
    #[must_use]
    pub fn warnings(&self) -> &'a ProblemMap {
        match *self {
            Self::Section(section) => &section.warning,
            Self::Variable(variable) => &variable.warning,
        }
    }

    /// Comment lines.
    #[must_use]
    pub fn comments(&self) -> &'a [String] {
        match *self {
            Self::Section(section) => &section.comments,
            Self::Variable(variable) => &variable.comments,
        }
    }

    /// Content digest.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        match *self {
            Self::Section(section) => section.fingerprint(),
            Self::Variable(variable) => variable.fingerprint(),
        }
    }
}

/// Returns true if metadata marks a setting compulsory.
#[must_use]
pub fn is_compulsory(metadata: &Metadata) -> bool {
    metadata.get(META_COMPULSORY).is_some_and(|v| v == META_TRUE)
}

/// Value a newly created option starts with: the first allowed value, or
/// empty.
#[must_use]
pub fn default_value(metadata: &Metadata) -> String {
    metadata
        .get(META_VALUES)
        .and_then(|values| values.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_is_first_allowed() {
        let mut meta = Metadata::new();
        assert_eq!(default_value(&meta), "");
        meta.insert(META_VALUES.to_string(), " a, b ,c".to_string());
        assert_eq!(default_value(&meta), "a");
    }

    #[test]
    fn test_variable_basics() {
        let var = Variable::new(SettingId::option("env", "FOO"), "1")
            .with_reason(IgnoredReason::User, "");
        assert_eq!(var.name(), "FOO");
        assert_eq!(var.section(), "env");
        assert!(var.is_ignored());
        assert!(var.has_reason(IgnoredReason::User));
        assert!(!var.is_compulsory());
    }

    #[test]
    fn test_compulsory_from_metadata() {
        let mut meta = Metadata::new();
        meta.insert(META_COMPULSORY.to_string(), META_TRUE.to_string());
        let var = Variable::new(SettingId::option("env", "FOO"), "1").with_metadata(meta);
        assert!(var.is_compulsory());
    }

    #[test]
    fn test_fingerprint_ignores_status_text_and_metadata() {
        let a = Variable::new(SettingId::option("env", "FOO"), "1")
            .with_reason(IgnoredReason::System, "from configuration.");
        let mut b = a.clone();
        b.ignored_reason
            .insert(IgnoredReason::System, "from macro.".to_string());
        b.metadata.insert(META_TITLE.to_string(), "Foo".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.value = "2".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_boundaries() {
        let a = Variable::new(SettingId::option("a", "bc"), "");
        let b = Variable::new(SettingId::option("a", "b"), "c");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_section_fingerprint_tracks_comments() {
        let a = Section::new("namelist:foo");
        let mut b = a.clone();
        b.comments.push("# note".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().to_string().len(), 64);
    }

    #[test]
    fn test_problem_kind_ownership() {
        assert!(ProblemKind::ShouldBeIgnored.is_ignore_related());
        assert!(!ProblemKind::Other("range".to_string()).is_ignore_related());
        assert_eq!(ProblemKind::Other("range".to_string()).label(), "range");
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(IgnoredReason::System.to_string(), "Trigger ignored");
        assert_eq!(IgnoredReason::Section.label(), "Section ignored");
    }
}
