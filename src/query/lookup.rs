use crate::error::{LocalizedError, Result};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison applied to an expression's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    In,
    IsNull,
    Regex,
    IRegex,
}

impl Lookup {
    pub const ALL: [Lookup; 12] = [
        Lookup::Exact,
        Lookup::IExact,
        Lookup::Contains,
        Lookup::IContains,
        Lookup::StartsWith,
        Lookup::IStartsWith,
        Lookup::EndsWith,
        Lookup::IEndsWith,
        Lookup::In,
        Lookup::IsNull,
        Lookup::Regex,
        Lookup::IRegex,
    ];

    pub fn parse(name: &str) -> Option<Lookup> {
        Self::ALL.into_iter().find(|lookup| lookup.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::Contains => "contains",
            Lookup::IContains => "icontains",
            Lookup::StartsWith => "startswith",
            Lookup::IStartsWith => "istartswith",
            Lookup::EndsWith => "endswith",
            Lookup::IEndsWith => "iendswith",
            Lookup::In => "in",
            Lookup::IsNull => "isnull",
            Lookup::Regex => "regex",
            Lookup::IRegex => "iregex",
        }
    }

    /// Reject right-hand sides the lookup cannot use.
    pub fn check(self, rhs: &Value) -> Result<()> {
        let ok = match self {
            Lookup::In => rhs.is_array(),
            Lookup::IsNull => rhs.is_boolean(),
            Lookup::Regex | Lookup::IRegex => return self.pattern(rhs).map(|_| ()),
            Lookup::Exact => true,
            _ => !rhs.is_null(),
        };
        if ok {
            Ok(())
        } else {
            Err(LocalizedError::Lookup(format!("{} {}", self.name(), rhs)))
        }
    }

    fn regex(self, pattern: &str) -> Result<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(self == Lookup::IRegex)
            .build()
            .map_err(|e| LocalizedError::Lookup(format!("{}: {}", self.name(), e)))
    }

    /// Compiled pattern for a regex lookup, `None` for every other lookup.
    pub fn pattern(self, rhs: &Value) -> Result<Option<Pattern>> {
        match self {
            Lookup::Regex | Lookup::IRegex => {
                let source = rhs
                    .as_str()
                    .ok_or_else(|| LocalizedError::Lookup(format!("{} {}", self.name(), rhs)))?;
                Ok(Some(Pattern(self.regex(source)?)))
            }
            _ => Ok(None),
        }
    }

    /// Whether `lhs` satisfies the lookup against `rhs`. Null never matches
    /// a text lookup.
    pub fn matches(self, lhs: &Value, rhs: &Value) -> Result<bool> {
        let pattern = self.pattern(rhs)?;
        Ok(self.matches_with(lhs, rhs, pattern.as_ref()))
    }

    /// Like `matches`, reusing a pattern compiled by `pattern`.
    pub fn matches_with(self, lhs: &Value, rhs: &Value, pattern: Option<&Pattern>) -> bool {
        match self {
            Lookup::Exact if rhs.is_null() => lhs.is_null(),
            Lookup::Exact => json_equal(lhs, rhs),
            Lookup::In => rhs
                .as_array()
                .map(|items| items.iter().any(|item| json_equal(lhs, item)))
                .unwrap_or(false),
            Lookup::IsNull => lhs.is_null() == rhs.as_bool().unwrap_or(true),
            Lookup::Regex | Lookup::IRegex => match (as_text(lhs), pattern) {
                (Some(text), Some(pattern)) => pattern.0.is_match(&text),
                _ => false,
            },
            text_lookup => match (as_text(lhs), as_text(rhs)) {
                (Some(l), Some(r)) => text_match(text_lookup, &l, &r),
                _ => false,
            },
        }
    }
}

/// Regex compiled once per query for `regex`/`iregex`.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

fn text_match(lookup: Lookup, lhs: &str, rhs: &str) -> bool {
    let (lhs, rhs) = match lookup {
        Lookup::IExact | Lookup::IContains | Lookup::IStartsWith | Lookup::IEndsWith => {
            (lhs.to_lowercase(), rhs.to_lowercase())
        }
        _ => (lhs.to_string(), rhs.to_string()),
    };
    match lookup {
        Lookup::IExact => lhs == rhs,
        Lookup::Contains | Lookup::IContains => lhs.contains(&rhs),
        Lookup::StartsWith | Lookup::IStartsWith => lhs.starts_with(&rhs),
        Lookup::EndsWith | Lookup::IEndsWith => lhs.ends_with(&rhs),
        _ => false,
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text form of a scalar, as the `#>> '{}'` operator renders it.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// JSON equality with numbers compared by value.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Ordering of non-null JSON values: strings < numbers < booleans < arrays <
/// objects, then by value within a type.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ if type_rank(a) == type_rank(b) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
