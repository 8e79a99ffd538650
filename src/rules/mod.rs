//! The tagged rule system: every grammar rule is one variant of [`Rule`],
//! dispatched by `match` rather than by virtual call.
pub mod conjunction;
pub mod leaf;
pub mod property_inheritance;
pub mod sequence;
pub mod subtree_match;

use std::sync::RwLockReadGuard;

use crate::category::Category;
use crate::error::Result;
use crate::scoring::{FeatureKey, ScoreEntry, ScoringTable};

pub use conjunction::ConjunctionRule;
pub use leaf::LeafRule;
pub use property_inheritance::PropertyInheritanceRule;
pub use sequence::{LinkType, SequenceRule};
pub use subtree_match::SubtreeMatchRule;

/// Every rule the grammar can fire. Leaf rules are unary (token → category);
/// sequence and conjunction rules are the two branch-rule shapes.
#[derive(Debug)]
pub enum Rule {
    Leaf(LeafRule),
    Sequence(SequenceRule),
    Conjunction(ConjunctionRule),
}

impl Rule {
    pub fn category(&self) -> &Category {
        match self {
            Rule::Leaf(r) => &r.category,
            Rule::Sequence(r) => &r.category,
            Rule::Conjunction(r) => &r.category,
        }
    }

    pub fn scoring(&self) -> RwLockReadGuard<'_, ScoringTable> {
        match self {
            Rule::Leaf(r) => r.scoring.read().expect("scoring lock poisoned"),
            Rule::Sequence(r) => r.scoring.read().expect("scoring lock poisoned"),
            Rule::Conjunction(r) => r.scoring.read().expect("scoring lock poisoned"),
        }
    }

    /// `adjust_score`: move this rule's scoring table toward `target` for
    /// every feature in `emitted`.    pub fn adjust_score(&self, emitted: &[FeatureKey], target: f64) -> Result<()> {
        match self {
            Rule::Leaf(r) => r.scoring.write().expect("scoring lock poisoned").adjust_score(emitted, target),
            Rule::Sequence(r) => r.scoring.write().expect("scoring lock poisoned").adjust_score(emitted, target),
            Rule::Conjunction(r) => r.scoring.write().expect("scoring lock poisoned").adjust_score(emitted, target),
        }
    }

    /// Directly set one stored scoring entry, bypassing the online-mean
    /// update -- used only by scoring-store load.    pub fn set_score(&self, key: Option<FeatureKey>, entry: ScoreEntry) -> Result<()> {
        match self {
            Rule::Leaf(r) => r.scoring.write().expect("scoring lock poisoned").set_score(key, entry),
            Rule::Sequence(r) => r.scoring.write().expect("scoring lock poisoned").set_score(key, entry),
            Rule::Conjunction(r) => r.scoring.write().expect("scoring lock poisoned").set_score(key, entry),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafRule> {
        match self {
            Rule::Leaf(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceRule> {
        match self {
            Rule::Sequence(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_conjunction(&self) -> Option<&ConjunctionRule> {
        match self {
            Rule::Conjunction(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Rule::Leaf(_))
    }

    /// A stable, human-readable identity used as the persisted scoring-store
    /// key. Distinct rules must render distinct identities.
    pub fn identity(&self, interner: &crate::symbol::Interner) -> String {
        match self {
            Rule::Leaf(r) => format!("leaf:{}", r.category.display(interner)),
            Rule::Sequence(r) => format!(
                "sequence:{}:{}",
                r.category.display(interner),
                r.subcategory_sets
                    .iter()
                    .map(|set| set.iter().map(|c| c.display(interner).to_string()).collect::<Vec<_>>().join("|"))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Rule::Conjunction(r) => format!(
                "conjunction:{}:{}:{}",
                r.category.display(interner),
                r.conjunction
                    .iter()
                    .map(|c| c.display(interner).to_string())
                    .collect::<Vec<_>>()
                    .join("|"),
                r.followup
                    .iter()
                    .map(|c| c.display(interner).to_string())
                    .collect::<Vec<_>>()
                    .join("|"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Interner;
    use std::collections::BTreeSet;

    #[test]
    fn leaf_rule_identity_differs_by_category() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let verb = Category::new(interner.intern("verb"), BTreeSet::new(), BTreeSet::new());
        let rule_a = Rule::Leaf(LeafRule::new_set(noun, ["cat".to_string()]));
        let rule_b = Rule::Leaf(LeafRule::new_set(verb, ["run".to_string()]));
        assert_ne!(rule_a.identity(&interner), rule_b.identity(&interner));
    }

    #[test]
    fn category_accessor_matches_variant() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = Rule::Leaf(LeafRule::new_set(noun.clone(), ["cat".to_string()]));
        assert_eq!(rule.category(), &noun);
    }
}
