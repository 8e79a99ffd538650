//! Property-inheritance rules: the building block of the fixed-point
//! closure in [`crate::model::extend_properties`].

use std::collections::BTreeSet;

use crate::category::Category;
use crate::symbol::Symbol;

/// `antecedent → (add_positive, add_negative)`: whenever a category's
/// current `(name, positive, negative)` is subsumed by `antecedent`, union
/// `add_positive`/`add_negative` into the category's property sets.
#[derive(Debug, Clone)]
pub struct PropertyInheritanceRule {
    pub antecedent: Category,
    pub add_positive: BTreeSet<Symbol>,
    pub add_negative: BTreeSet<Symbol>,
}

impl PropertyInheritanceRule {
    pub fn new(antecedent: Category, add_positive: BTreeSet<Symbol>, add_negative: BTreeSet<Symbol>) -> Self {
        PropertyInheritanceRule {
            antecedent,
            add_positive,
            add_negative,
        }
    }

    /// Evaluate this rule against a category's current property state,
    /// returning the additions to apply if the antecedent matches.
    pub fn apply(
        &self,
        name: Symbol,
        positive: &BTreeSet<Symbol>,
        negative: &BTreeSet<Symbol>,
    ) -> Option<(&BTreeSet<Symbol>, &BTreeSet<Symbol>)> {
        let name_matches = self.antecedent.is_wildcard() || self.antecedent.name() == name;
        if name_matches
            && self.antecedent.positive_properties().is_subset(positive)
            && self.antecedent.negative_properties().is_subset(negative)
        {
            Some((&self.add_positive, &self.add_negative))
        } else {
            None
        }
    }
}
