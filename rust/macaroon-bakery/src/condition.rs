//! Atomic caveat predicates.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while constructing or parsing a [Condition]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The key is empty or contains characters outside `[A-Za-z0-9_]`
    #[error("Invalid condition key: {0:?}")]
    InvalidKey(String),

    /// The operator symbol is not one of `=`, `!=`, `<`, `<=`, `>`, `>=`
    #[error("Unknown operator: {0:?}")]
    UnknownOperator(String),

    /// The string is not of the form `<key> <op> <value>`
    #[error("Malformed condition: {0:?}")]
    Malformed(String),
}

/// Comparison applied between a verifier's value and a caveat's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Values are equal
    Eq,
    /// Values differ
    Neq,
    /// Verifier value is less than the caveat value
    Lt,
    /// Verifier value is less than or equal to the caveat value
    Leq,
    /// Verifier value is greater than the caveat value
    Gt,
    /// Verifier value is greater than or equal to the caveat value
    Geq,
}

impl Operator {
    /// The symbol used in the serialized condition
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Leq => "<=",
            Operator::Gt => ">",
            Operator::Geq => ">=",
        }
    }

    /// Apply this operator to the result of comparing the verifier value
    /// (left) with the caveat value (right)
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Operator::Eq => ordering == Equal,
            Operator::Neq => ordering != Equal,
            Operator::Lt => ordering == Less,
            Operator::Leq => ordering != Greater,
            Operator::Gt => ordering == Greater,
            Operator::Geq => ordering != Less,
        }
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(symbol: &str) -> Result<Self, Self::Err> {
        Ok(match symbol {
            "=" => Operator::Eq,
            "!=" => Operator::Neq,
            "<" => Operator::Lt,
            "<=" => Operator::Leq,
            ">" => Operator::Gt,
            ">=" => Operator::Geq,
            other => return Err(ConditionError::UnknownOperator(other.to_string())),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A `(key, operator, value)` predicate.
///
/// The string form `"<key> <op> <value>"` is fed into the signature chain, so
/// [Condition::to_string] must stay byte-for-byte stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    key: String,
    operator: Operator,
    value: String,
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Condition {
    /// Build a condition, validating the key
    pub fn new<K, V>(key: K, operator: Operator, value: V) -> Result<Self, ConditionError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(ConditionError::InvalidKey(key));
        }
        Ok(Self {
            key,
            operator,
            value: value.into(),
        })
    }

    /// Shorthand for an equality condition
    pub fn equals<K, V>(key: K, value: V) -> Result<Self, ConditionError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(key, Operator::Eq, value)
    }

    /// The key this condition constrains
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The comparison operator
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The caveat-side value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.key, self.operator, self.value)
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || ConditionError::Malformed(input.to_string());

        let (key, rest) = input.split_once(' ').ok_or_else(malformed)?;
        let (operator, value) = rest.split_once(' ').ok_or_else(malformed)?;

        if !is_valid_key(key) {
            return Err(malformed());
        }

        Condition::new(key, operator.parse()?, value)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
