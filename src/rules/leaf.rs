//! Leaf rules: `SetRule`, `SuffixRule`, `CaseRule`.
//!
//! All three share the same firing protocol: test token
//! membership, then let the caller promote case properties, run property
//! inheritance, and build a leaf `ParseNode`. This module only implements
//! membership testing and scoring-table ownership; orchestration lives in
//! [`crate::model`] and [`crate::scheduler`].

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::category::Category;
use crate::scoring::ScoringTable;
use crate::symbol::Symbol;

/// The per-variant membership test a leaf rule carries.
#[derive(Debug, Clone)]
pub enum LeafRuleKind {
    /// Matches if the lowercased token is in the set.
    Set(BTreeSet<String>),
    /// Matches if the lowercased token ends with a listed suffix (with
    /// length strictly greater than `suffix.len() + 1`), with polarity.
    Suffix { suffixes: BTreeSet<String>, positive: bool },
    /// Matches if the token's discovered case includes the given property.
    Case(Symbol),
}

/// A leaf rule: a category plus a membership test plus a scoring table.
#[derive(Debug)]
pub struct LeafRule {
    pub category: Category,
    pub kind: LeafRuleKind,
    pub scoring: RwLock<ScoringTable>,
}

impl LeafRule {
    pub fn new_set(category: Category, tokens: impl IntoIterator<Item = String>) -> Self {
        LeafRule {
            category,
            kind: LeafRuleKind::Set(tokens.into_iter().map(|t| t.to_lowercase()).collect()),
            scoring: RwLock::new(ScoringTable::new()),
        }
    }

    pub fn new_suffix(category: Category, suffixes: impl IntoIterator<Item = String>, positive: bool) -> Self {
        LeafRule {
            category,
            kind: LeafRuleKind::Suffix {
                suffixes: suffixes.into_iter().map(|s| s.to_lowercase()).collect(),
                positive,
            },
            scoring: RwLock::new(ScoringTable::new()),
        }
    }

    pub fn new_case(category: Category, case_property: Symbol) -> Self {
        LeafRule {
            category,
            kind: LeafRuleKind::Case(case_property),
            scoring: RwLock::new(ScoringTable::new()),
        }
    }

    /// Does this rule match `token`? `positive_case_properties` is the
    /// token's discovered case properties, needed only by the `Case`
    /// variant.
    pub fn contains(&self, token: &str, positive_case_properties: &BTreeSet<Symbol>) -> bool {
        match &self.kind {
            LeafRuleKind::Set(tokens) => tokens.contains(&token.to_lowercase()),
            LeafRuleKind::Suffix { suffixes, positive } => {
                let lower = token.to_lowercase();
                let matched = suffixes
                    .iter()
                    .any(|suffix| lower.len() > suffix.len() + 1 && lower.ends_with(suffix.as_str()));
                if matched {
                    *positive
                } else {
                    !*positive
                }
            }
            LeafRuleKind::Case(case_property) => positive_case_properties.contains(case_property),
        }
    }
}
