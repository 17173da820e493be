//! Trigger expression and value rule parsing.
//!
//! A trigger expression lists the settings a setting controls, each with the
//! values that enable it:
//!
//! ```text
//! env=A: 1, 2; namelist:foo; env=B: this > 3
//! ```
//!
//! `": "` introduces the allowed values, `","` separates them and `";"` ends a
//! group. Single or double quotes and a backslash before a delimiter protect
//! it. A target with no values is enabled by any value.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::id::SettingId;

const KEY_DELIM: &str = ": ";
const VALUE_DELIM: &str = ",";
const GROUP_DELIM: &str = ";";
const ESCAPE: char = '\\';

/// Values that enable a trigger target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedValues {
    /// Any value of a present parent enables the target.
    Any,
    /// One of these values (literals or `this` rules) enables the target.
    OneOf(Vec<String>),
}

/// A parsed trigger expression: targets in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerExpression {
    /// Controlled ids with their allowed values.
    pub targets: Vec<(SettingId, AllowedValues)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Key,
    Value,
    GroupEnd,
}

fn scan(expr: &str) -> Vec<(String, Token)> {
    let delims = [
        (KEY_DELIM, Token::Key),
        (VALUE_DELIM, Token::Value),
        (GROUP_DELIM, Token::GroupEnd),
    ];
    let mut out = Vec::new();
    let mut item = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut rest = expr;
    while let Some(letter) = rest.chars().next() {
        if !escaped {
            match quote {
                Some(q) if q == letter => quote = None,
                None if letter == '"' || letter == '\'' => quote = Some(letter),
                _ => {}
            }
        }
        if quote.is_none() && !escaped {
            if let Some((delim, token)) = delims.iter().find(|(d, _)| rest.starts_with(d)) {
                out.push((item.trim().to_string(), *token));
                item.clear();
                rest = &rest[delim.len()..];
                continue;
            }
        }
        let escapes_delim = letter == ESCAPE
            && !escaped
            && quote.is_none()
            && delims.iter().any(|(d, _)| rest[1..].starts_with(d));
        escaped = letter == ESCAPE && !escaped;
        if !escapes_delim {
            item.push(letter);
        }
        rest = &rest[letter.len_utf8()..];
    }
    out.push((item.trim().to_string(), Token::GroupEnd));
    out
}

/// Parses a trigger expression.
///
/// # Errors
///
/// Returns a message if a target id is empty or invalid, or a quote is left
/// open.
pub fn parse_trigger(expr: &str) -> Result<TriggerExpression, String> {
    let flat: String = expr.chars().filter(|c| *c != '\n').collect();
    let open_quotes = flat.chars().filter(|c| *c == '"').count() % 2 == 1
        || flat.chars().filter(|c| *c == '\'').count() % 2 == 1;
    if open_quotes {
        return Err(format!("unbalanced quotes in '{flat}'"));
    }

    let mut targets: Vec<(SettingId, Vec<String>)> = Vec::new();
    let mut in_group = false;
    for (item, token) in scan(&flat) {
        match token {
            Token::Key => {
                targets.push((parse_target(&item)?, Vec::new()));
                in_group = true;
            }
            Token::GroupEnd if in_group => {
                if let Some((_, values)) = targets.last_mut() {
                    values.push(item);
                }
                in_group = false;
            }
            Token::GroupEnd => {
                if !item.is_empty() {
                    targets.push((parse_target(&item)?, Vec::new()));
                }
            }
            Token::Value if in_group => {
                if let Some((_, values)) = targets.last_mut() {
                    values.push(item);
                }
            }
            Token::Value => return Err(format!("value '{item}' has no target")),
        }
    }

    let targets = targets
        .into_iter()
        .map(|(id, values)| {
            let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
            if values.is_empty() {
                (id, AllowedValues::Any)
            } else {
                (id, AllowedValues::OneOf(values))
            }
        })
        .collect();
    Ok(TriggerExpression { targets })
}

fn parse_target(item: &str) -> Result<SettingId, String> {
    if item.is_empty() {
        return Err("empty trigger target".to_string());
    }
    item.parse::<SettingId>().map_err(|e| e.to_string())
}

/// Comparison operator of a `this` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// A parsed `this` rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRule {
    /// `this <op> literal`
    Compare(RuleOp, String),
    /// `this in (a, b)`
    In(Vec<String>),
    /// `this not in (a, b)`
    NotIn(Vec<String>),
}

fn this_rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\w:=])this(?:$|\W.*(?:[+*%<>=!-]|\bin\s|\bnot\s|\band\s|\bor\s))")
            .expect("static regex is valid")
    })
}

fn rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*this\s*(==|!=|<=|>=|<|>|not\s+in\b|in\b)\s*(.*?)\s*$")
            .expect("static regex is valid")
    })
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\\*)\$(?:\{[A-Za-z_]\w*\}|[A-Za-z_]\w*)").expect("static regex is valid")
    })
}

/// Returns true if an allowed value is a `this` rule rather than a literal.
#[must_use]
pub fn is_rule(value: &str) -> bool {
    this_rule_regex().is_match(value)
}

/// Returns true if the text references an unescaped environment variable.
#[must_use]
pub fn contains_env_var(text: &str) -> bool {
    env_var_regex()
        .captures_iter(text)
        .any(|caps| caps.get(1).map_or(0, |m| m.as_str().len()) % 2 == 0)
}

fn split_list(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses a `this` rule.
///
/// # Errors
///
/// Returns a message if the rule does not have one of the supported shapes.
pub fn parse_rule(rule: &str) -> Result<ValueRule, String> {
    let caps = rule_regex()
        .captures(rule)
        .ok_or_else(|| format!("unsupported rule '{rule}'"))?;
    let op = caps.get(1).map_or("", |m| m.as_str());
    let operand = caps.get(2).map_or("", |m| m.as_str());
    if operand.is_empty() {
        return Err(format!("rule '{rule}' has no operand"));
    }
    let list = || {
        operand
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .map(split_list)
            .ok_or_else(|| format!("rule '{rule}' needs a parenthesised list"))
    };
    let rule = match op {
        "==" => ValueRule::Compare(RuleOp::Eq, operand.to_string()),
        "!=" => ValueRule::Compare(RuleOp::Ne, operand.to_string()),
        "<" => ValueRule::Compare(RuleOp::Lt, operand.to_string()),
        "<=" => ValueRule::Compare(RuleOp::Le, operand.to_string()),
        ">" => ValueRule::Compare(RuleOp::Gt, operand.to_string()),
        ">=" => ValueRule::Compare(RuleOp::Ge, operand.to_string()),
        "in" => ValueRule::In(list()?),
        _ => ValueRule::NotIn(list()?),
    };
    Ok(rule)
}

fn values_equal(a: &str, b: &str) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => (x - y).abs() < f64::EPSILON,
        _ => a.trim() == b.trim(),
    }
}

impl ValueRule {
    /// Evaluates the rule against a value.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Compare(op, operand) => {
                let ordering = match (value.trim().parse::<f64>(), operand.parse::<f64>()) {
                    (Ok(x), Ok(y)) => x.partial_cmp(&y),
                    _ => Some(value.trim().cmp(operand.as_str())),
                };
                let Some(ordering) = ordering else {
                    return false;
                };
                match op {
                    RuleOp::Eq => ordering.is_eq(),
                    RuleOp::Ne => ordering.is_ne(),
                    RuleOp::Lt => ordering.is_lt(),
                    RuleOp::Le => ordering.is_le(),
                    RuleOp::Gt => ordering.is_gt(),
                    RuleOp::Ge => ordering.is_ge(),
                }
            }
            Self::In(items) => items.iter().any(|item| values_equal(value, item)),
            Self::NotIn(items) => !items.iter().any(|item| values_equal(value, item)),
        }
    }
}

/// Per-session memo of parsed rules.
#[derive(Debug)]
pub struct RuleCache {
    capacity: usize,
    rules: HashMap<String, Result<ValueRule, String>>,
}

impl RuleCache {
    /// Creates a cache holding at most `capacity` rules.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rules: HashMap::new(),
        }
    }

    /// Parses (or recalls) a rule.
    ///
    /// # Errors
    ///
    /// Returns the parse message for malformed rules.
    pub fn get(&mut self, rule: &str) -> Result<ValueRule, String> {
        if let Some(cached) = self.rules.get(rule) {
            return cached.clone();
        }
        if self.rules.len() >= self.capacity {
            self.rules.clear();
        }
        let parsed = parse_rule(rule);
        self.rules.insert(rule.to_string(), parsed.clone());
        parsed
    }

    /// Number of memoised rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if nothing is memoised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if `value` satisfies any of the allowed values.
    ///
    /// Malformed rules never match. Values referencing an environment
    /// variable always match, since they cannot be judged statically.
    pub fn value_allowed(&mut self, value: &str, allowed: &[String]) -> bool {
        for candidate in allowed {
            if is_rule(candidate) {
                if self.get(candidate).is_ok_and(|rule| rule.matches(value)) {
                    return true;
                }
            } else if candidate == value {
                return true;
            }
        }
        contains_env_var(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(s: &str, o: &str) -> SettingId {
        SettingId::option(s, o)
    }

    #[test]
    fn parses_keys_values_and_groups() {
        let expr = parse_trigger("env=A: 1, 2; namelist:foo; env=B: this > 3").unwrap();
        assert_eq!(
            expr.targets,
            vec![
                (opt("env", "A"), AllowedValues::OneOf(vec!["1".into(), "2".into()])),
                (SettingId::section("namelist:foo"), AllowedValues::Any),
                (opt("env", "B"), AllowedValues::OneOf(vec!["this > 3".into()])),
            ]
        );
    }

    #[test]
    fn single_target_without_values() {
        let expr = parse_trigger("env=A").unwrap();
        assert_eq!(expr.targets, vec![(opt("env", "A"), AllowedValues::Any)]);
    }

    #[test]
    fn quotes_and_escapes_protect_delimiters() {
        let expr = parse_trigger(r#"env=A: 'a, b', c\,d"#).unwrap();
        assert_eq!(
            expr.targets[0].1,
            AllowedValues::OneOf(vec!["'a, b'".into(), "c,d".into()])
        );
    }

    #[test]
    fn newlines_are_ignored() {
        let expr = parse_trigger("env=A: 1;\n env=B").unwrap();
        assert_eq!(expr.targets.len(), 2);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(parse_trigger("env=A: 'open").is_err());
        assert!(parse_trigger("env=: 1").is_err());
    }

    #[test]
    fn detects_rules() {
        assert!(is_rule("this > 3"));
        assert!(is_rule("this in (1, 2)"));
        assert!(!is_rule("1"));
        assert!(!is_rule("'this'"));
    }

    #[test]
    fn evaluates_rules() {
        assert!(parse_rule("this > 3").unwrap().matches("4"));
        assert!(!parse_rule("this > 3").unwrap().matches("3"));
        assert!(parse_rule("this <= 3.5").unwrap().matches("3.5"));
        assert!(parse_rule("this != 'x'").unwrap().matches("'y'"));
        assert!(parse_rule("this in (1, 2)").unwrap().matches("2.0"));
        assert!(parse_rule("this not in (1, 2)").unwrap().matches("5"));
        assert!(parse_rule("this in 1").is_err());
        assert!(parse_rule("this ~ 1").is_err());
    }

    #[test]
    fn env_vars_always_allowed() {
        let mut cache = RuleCache::new(8);
        assert!(cache.value_allowed("$HOME/x", &["'a'".to_string()]));
        assert!(cache.value_allowed("${X}", &["'a'".to_string()]));
        assert!(!cache.value_allowed(r"\$HOME", &["'a'".to_string()]));
    }

    #[test]
    fn cache_is_bounded() {
        let mut cache = RuleCache::new(2);
        cache.get("this > 1").unwrap();
        cache.get("this > 2").unwrap();
        cache.get("this > 3").unwrap();
        assert!(cache.len() <= 2);
        assert!(cache.value_allowed("5", &["this > 4".to_string()]));
        assert!(!cache.value_allowed("1", &["this > 4".to_string(), "2".to_string()]));
    }
}
