//! Per-source literal-to-null rules.
//!
//! Some exports encode "no value" as a placeholder code rather than an empty
//! cell. The rules are applied once, while a source is being read, so later
//! stages only ever see `None`.

use std::collections::BTreeSet;

/// Money-market placeholder code used by the metadata export.
pub const MONEY_MARKET_PLACEHOLDER: &str = "MIL";

/// A set of literal values that are read as null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullRules {
    literals: BTreeSet<String>,
}

impl NullRules {
    pub fn new<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            literals: literals.into_iter().map(Into::into).collect(),
        }
    }

    /// Rules for the fund metadata export.
    pub fn metadata_default() -> Self {
        Self::new([MONEY_MARKET_PLACEHOLDER])
    }

    /// Exact, case-sensitive match.
    pub fn is_null(&self, value: &str) -> bool {
        self.literals.contains(value)
    }

    pub fn apply(&self, value: Option<String>) -> Option<String> {
        value.filter(|v| !self.is_null(v))
    }
}
