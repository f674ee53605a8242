use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::constants;
use crate::domain::CheckStatus;
use crate::error::{PipelineError, Result};

/// How a flag finds its check columns. Matching is case-insensitive against
/// the normalized column identifier.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any keyword is a substring of the column name
    AnyOf(Vec<String>),
    /// Every keyword is a substring of the column name
    AllOf(Vec<String>),
    Pattern(Regex),
}

impl Matcher {
    pub fn pattern(pattern: &str) -> Result<Self> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Matcher::Pattern)
            .map_err(|e| PipelineError::Config(format!("invalid check flag pattern '{}': {}", pattern, e)))
    }

    pub fn matches(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        match self {
            Matcher::AnyOf(keywords) => keywords.iter().any(|k| lower.contains(&k.to_lowercase())),
            Matcher::AllOf(keywords) => {
                !keywords.is_empty() && keywords.iter().all(|k| lower.contains(&k.to_lowercase()))
            }
            Matcher::Pattern(regex) => regex.is_match(column),
        }
    }

    fn describe(&self) -> String {
        match self {
            Matcher::AnyOf(keywords) => format!("any of {}", keywords.join(", ")),
            Matcher::AllOf(keywords) => format!("all of {}", keywords.join(", ")),
            Matcher::Pattern(regex) => format!("pattern /{}/", regex.as_str()),
        }
    }
}

/// A named-check flag: 1 when any matched column holds `target` for the order.
#[derive(Debug, Clone)]
pub struct CheckFlagRule {
    pub feature: String,
    pub target: CheckStatus,
    pub matcher: Matcher,
}

impl CheckFlagRule {
    pub fn new(feature: &str, target: CheckStatus, matcher: Matcher) -> Self {
        Self {
            feature: feature.to_string(),
            target,
            matcher,
        }
    }
}

/// A rule together with the check columns it matched in this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFlag {
    pub feature: String,
    pub target: CheckStatus,
    /// Indices into the check column list
    #[serde(skip)]
    pub column_indices: Vec<usize>,
    pub matched_columns: Vec<String>,
}

/// Ordered registry of check flag rules. Output columns follow registration order.
#[derive(Debug, Clone)]
pub struct CheckFlagRegistry {
    rules: Vec<CheckFlagRule>,
}

impl CheckFlagRegistry {
    /// The five flags of the repair-order analysis.
    pub fn builtin() -> Self {
        let words = |ws: &[&str]| ws.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        let mut registry = Self { rules: Vec::new() };
        registry.register(CheckFlagRule::new(
            constants::FRAUD_CHECK_FAILED,
            CheckStatus::Failed,
            Matcher::AnyOf(words(&["fraud"])),
        ));
        registry.register(CheckFlagRule::new(
            constants::COSMETIC_CHECK_FAILED,
            CheckStatus::Failed,
            Matcher::AnyOf(words(&["scratches", "dents", "cosmetic"])),
        ));
        registry.register(CheckFlagRule::new(
            constants::REPAIRABLE_CHECK_FAILED,
            CheckStatus::Failed,
            Matcher::AnyOf(words(&["repairable"])),
        ));
        registry.register(CheckFlagRule::new(
            constants::WORKS_CHECK_PASSED,
            CheckStatus::Passed,
            Matcher::AllOf(words(&["work", "does"])),
        ));
        registry.register(CheckFlagRule::new(
            constants::FACTORY_SEALED_CHECK_PASSED,
            CheckStatus::Passed,
            Matcher::AllOf(words(&["factory", "sealed"])),
        ));
        registry
    }

    pub fn from_rules(rules: Vec<CheckFlagRule>) -> Self {
        let mut registry = Self { rules: Vec::new() };
        for rule in rules {
            registry.register(rule);
        }
        registry
    }

    /// Add a rule, replacing any existing rule for the same feature in place.
    pub fn register(&mut self, rule: CheckFlagRule) {
        match self.rules.iter_mut().find(|r| r.feature == rule.feature) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    /// Match every rule against the check columns of this run.
    pub fn resolve(&self, columns: &[String]) -> Vec<ResolvedFlag> {
        self.rules
            .iter()
            .map(|rule| {
                let column_indices: Vec<usize> = columns
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| rule.matcher.matches(c))
                    .map(|(i, _)| i)
                    .collect();
                ResolvedFlag {
                    feature: rule.feature.clone(),
                    target: rule.target,
                    matched_columns: column_indices.iter().map(|&i| columns[i].clone()).collect(),
                    column_indices,
                }
            })
            .collect()
    }

    /// Feature names in output order.
    pub fn list_features(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.feature.as_str()).collect()
    }

    /// One line per rule, for the `flags` command.
    pub fn describe(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|r| format!("{} = {} on {}", r.feature, r.target, r.matcher.describe()))
            .collect()
    }
}

impl Default for CheckFlagRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
