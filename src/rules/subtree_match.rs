//! Subtree-match predicates used by conjunction rules' match and property
//! rules: `head`, `any_term`, `all_terms`, `one_term`, `last_term`, and
//! `compound`.

use std::collections::BTreeSet;

use crate::category::Category;
use crate::symbol::Symbol;

fn property_test(positive: &BTreeSet<Symbol>, negative: &BTreeSet<Symbol>, category: &Category) -> bool {
    positive.is_subset(category.positive_properties())
        && negative.is_disjoint(category.positive_properties())
}

/// A single subtree-match predicate, parameterized by a positive/negative
/// property filter.
#[derive(Debug, Clone)]
pub enum SubtreeMatchRule {
    /// Tests only the head position.
    Head {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
    /// True if *some* non-head position matches.
    AnyTerm {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
    /// True if *every* non-head position matches.
    AllTerms {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
    /// True if *exactly one* non-head position matches.
    OneTerm {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
    /// Tests only the last position.
    LastTerm {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
    /// Tests every position strictly before the immediate predecessor of
    /// the head (indices `0..head_index.saturating_sub(1)`).
    Compound {
        positive: BTreeSet<Symbol>,
        negative: BTreeSet<Symbol>,
    },
}

impl SubtreeMatchRule {
    pub fn matches(&self, categories: &[Category], head_index: usize) -> bool {
        match self {
            SubtreeMatchRule::Head { positive, negative } => {
                property_test(positive, negative, &categories[head_index])
            }
            SubtreeMatchRule::AnyTerm { positive, negative } => categories
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != head_index)
                .any(|(_, cat)| property_test(positive, negative, cat)),
            SubtreeMatchRule::AllTerms { positive, negative } => categories
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != head_index)
                .all(|(_, cat)| property_test(positive, negative, cat)),
            SubtreeMatchRule::OneTerm { positive, negative } => {
                let mut found = false;
                for (i, cat) in categories.iter().enumerate() {
                    if i == head_index {
                        continue;
                    }
                    if property_test(positive, negative, cat) {
                        if found {
                            return false;
                        }
                        found = true;
                    }
                }
                found
            }
            SubtreeMatchRule::LastTerm { positive, negative } => categories
                .last()
                .map(|cat| property_test(positive, negative, cat))
                .unwrap_or(false),
            SubtreeMatchRule::Compound { positive, negative } => {
                let bound = head_index.saturating_sub(1);
                categories[..bound.min(categories.len())]
                    .iter()
                    .all(|cat| property_test(positive, negative, cat))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Interner;

    fn cat(interner: &Interner, name: &str, pos: &[&str]) -> Category {
        Category::new(
            interner.intern(name),
            pos.iter().map(|p| interner.intern(p)).collect(),
            BTreeSet::new(),
        )
    }

    #[test]
    fn head_tests_only_head_position() {
        let interner = Interner::new();
        let plural = interner.intern("plural");
        let rule = SubtreeMatchRule::Head {
            positive: [plural].into_iter().collect(),
            negative: BTreeSet::new(),
        };
        let cats = vec![cat(&interner, "det", &[]), cat(&interner, "noun", &["plural"])];
        assert!(rule.matches(&cats, 1));
        assert!(!rule.matches(&cats, 0));
    }

    #[test]
    fn one_term_requires_uniqueness() {
        let interner = Interner::new();
        let plural = interner.intern("plural");
        let rule = SubtreeMatchRule::OneTerm {
            positive: [plural].into_iter().collect(),
            negative: BTreeSet::new(),
        };
        let cats = vec![
            cat(&interner, "a", &["plural"]),
            cat(&interner, "head", &[]),
            cat(&interner, "b", &["plural"]),
        ];
        assert!(!rule.matches(&cats, 1));
        let cats_unique = vec![
            cat(&interner, "a", &["plural"]),
            cat(&interner, "head", &[]),
            cat(&interner, "b", &[]),
        ];
        assert!(rule.matches(&cats_unique, 1));
    }

    #[test]
    fn compound_stops_before_head_predecessor() {
        let interner = Interner::new();
        let plural = interner.intern("plural");
        let rule = SubtreeMatchRule::Compound {
            positive: [plural].into_iter().collect(),
            negative: BTreeSet::new(),
        };
        // head_index = 3: compound checks indices 0 and 1, but not index 2
        // (the immediate predecessor of the head) or the head itself.
        let cats = vec![
            cat(&interner, "a", &["plural"]),
            cat(&interner, "b", &["plural"]),
            cat(&interner, "c", &[]), // would fail the test, but is never checked
            cat(&interner, "head", &[]),
        ];
        assert!(rule.matches(&cats, 3));
    }
}
