//! Setting identifiers.
//!
//! Every section and option in a configuration is addressed by a
//! [`SettingId`]. The string form is `section` for a section and
//! `section=option` for an option; the split happens at the first `=`, so
//! option names may not contain the delimiter but section names may contain
//! anything else (`namelist:foo(1)`, `file:bin/run`, the empty root section).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Delimiter between the section and option parts of a setting id.
pub const ID_DELIMITER: char = '=';

/// Identifier of a section (`option == None`) or an option within a section.
///
/// # Examples
///
/// ```
/// use confedit::SettingId;
///
/// let id: SettingId = "namelist:foo(2)=bar".parse().unwrap();
/// assert_eq!(id.section, "namelist:foo(2)");
/// assert_eq!(id.option.as_deref(), Some("bar"));
/// assert_eq!(id.duplicate_index(), Some("2"));
/// assert_eq!(id.family_id().to_string(), "namelist:foo=bar");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SettingId {
    /// Section name; empty for the root (unsectioned) namespace.
    pub section: String,
    /// Option name, or `None` when the id denotes the section itself.
    pub option: Option<String>,
}

impl SettingId {
    /// Creates a section id.
    #[must_use]
    pub fn section(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            option: None,
        }
    }

    /// Creates an option id.
    #[must_use]
    pub fn option(section: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            option: Some(option.into()),
        }
    }

    /// Returns true if this id denotes a section.
    #[must_use]
    pub const fn is_section(&self) -> bool {
        self.option.is_none()
    }

    /// The option name, or the section name for section ids.
    #[must_use]
    pub fn name(&self) -> &str {
        self.option.as_deref().unwrap_or(&self.section)
    }

    /// Id of the section this setting lives in (itself for sections).
    #[must_use]
    pub fn section_id(&self) -> Self {
        Self::section(self.section.clone())
    }

    /// Same option, relocated to another section.
    #[must_use]
    pub fn with_section(&self, section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            option: self.option.clone(),
        }
    }

    /// Index of a duplicate section instance, e.g. `2` for `namelist:foo(2)`.
    #[must_use]
    pub fn duplicate_index(&self) -> Option<&str> {
        trailing_index(&self.section)
    }

    /// The family section this one is an instance of.
    ///
    /// Strips a trailing `(index)` and then a trailing `{modifier}`, so both
    /// `namelist:foo(1)` and `namelist:foo{bar}(1)` map to `namelist:foo`.
    #[must_use]
    pub fn base_section(&self) -> &str {
        let mut section = self.section.as_str();
        if let Some(index) = trailing_index(section) {
            section = &section[..section.len() - index.len() - 2];
        }
        if let Some(modifier) = trailing_modifier(section) {
            section = &section[..section.len() - modifier.len() - 2];
        }
        section
    }

    /// The id with every `(index)` group removed from both parts.
    ///
    /// This is the key used to look up shared metadata for duplicate sections
    /// and array elements.
    #[must_use]
    pub fn family_id(&self) -> Self {
        Self {
            section: strip_indices(&self.section),
            option: self.option.as_deref().map(strip_indices),
        }
    }

    /// The id with a section `{modifier}` removed (indices kept).
    #[must_use]
    pub fn without_modifier(&self) -> Self {
        let stripped = strip_indices(&self.section);
        let Some(modifier) = trailing_modifier(&stripped) else {
            return self.clone();
        };
        let base = &stripped[..stripped.len() - modifier.len() - 2];
        let index = self
            .duplicate_index()
            .map(|i| format!("({i})"))
            .unwrap_or_default();
        Self {
            section: format!("{base}{index}"),
            option: self.option.clone(),
        }
    }

    /// Returns true if the section name carries a `{modifier}`.
    #[must_use]
    pub fn has_modifier(&self) -> bool {
        trailing_modifier(&strip_indices(&self.section)).is_some()
    }
}

fn trailing_index(s: &str) -> Option<&str> {
    let inner = s.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let index = &inner[open + 1..];
    if index.is_empty() || index.contains(')') {
        return None;
    }
    Some(index)
}

fn trailing_modifier(s: &str) -> Option<&str> {
    let inner = s.strip_suffix('}')?;
    let open = inner.find('{')?;
    let modifier = &inner[open + 1..];
    if modifier.is_empty() {
        return None;
    }
    Some(modifier)
}

fn strip_indices(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        match after.find(|c| c == '(' || c == ')') {
            Some(close) if after.as_bytes()[close] == b')' && close > 0 => {
                out.push_str(&rest[..open]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl fmt::Display for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.option {
            Some(option) => write!(f, "{}{ID_DELIMITER}{option}", self.section),
            None => write!(f, "{}", self.section),
        }
    }
}

impl FromStr for SettingId {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once(ID_DELIMITER) {
            None => Ok(Self::section(raw)),
            Some((section, option)) => {
                let option = option.trim();
                if option.is_empty() {
                    return Err(ValidationError::InvalidSettingId {
                        raw: raw.to_string(),
                        reason: "option name cannot be empty".to_string(),
                    });
                }
                Ok(Self::option(section.trim(), option))
            }
        }
    }
}

impl TryFrom<String> for SettingId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SettingId> for String {
    fn from(id: SettingId) -> Self {
        id.to_string()
    }
}
