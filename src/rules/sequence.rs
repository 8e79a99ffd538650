//! Sequence rules: ordered subcategory alternation sets with a head index
//! and per-gap link types.
use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::category::Category;
use crate::error::{Error, Result};
use crate::scoring::ScoringTable;
use crate::symbol::Symbol;

/// A labeled relation between adjacent components, directed by `left`/`right`
/// arrows (see the GLOSSARY: "Link type").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkType {
    pub label: Symbol,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug)]
pub struct SequenceRule {
    pub category: Category,
    pub subcategory_sets: Vec<Vec<Category>>,
    pub head_index: usize,
    pub link_type_sets: Vec<Vec<LinkType>>,
    pub scoring: RwLock<ScoringTable>,
}

impl SequenceRule {
    /// Construct a sequence rule, validating it against the construction
    /// check that more link-type sets than gaps is ill-formed.
    pub fn new(
        category: Category,
        subcategory_sets: Vec<Vec<Category>>,
        head_index: usize,
        link_type_sets: Vec<Vec<LinkType>>,
    ) -> Result<Self> {
        if link_type_sets.len() >= subcategory_sets.len() {
            log::warn!(
                "rejecting sequence rule: {} link-type sets for {} subcategory sets",
                link_type_sets.len(),
                subcategory_sets.len()
            );
            return Err(Error::InvalidRule(format!(
                "sequence rule has {} link-type sets but only {} subcategory sets \
                 (expected at most {} gaps)",
                link_type_sets.len(),
                subcategory_sets.len(),
                subcategory_sets.len().saturating_sub(1)
            )));
        }
        if head_index >= subcategory_sets.len() {
            log::warn!(
                "rejecting sequence rule: head_index {} out of range for {} subcategory sets",
                head_index,
                subcategory_sets.len()
            );
            return Err(Error::InvalidRule(format!(
                "sequence rule head_index {} out of range for {} subcategory sets",
                head_index,
                subcategory_sets.len()
            )));
        }
        Ok(SequenceRule {
            category,
            subcategory_sets,
            head_index,
            link_type_sets,
            scoring: RwLock::new(ScoringTable::new()),
        })
    }

    /// Derive the result category for a fully assembled component list via
    /// the any/all-promoted-property algorithm.
    pub fn get_category(
        &self,
        component_categories: &[Category],
        any_promoted: &BTreeSet<Symbol>,
        all_promoted: &BTreeSet<Symbol>,
    ) -> Category {
        let head_category = &component_categories[self.head_index];
        let name = if self.category.is_wildcard() {
            head_category.name()
        } else {
            self.category.name()
        };

        let mut add_positive = head_category.positive_properties().clone();
        let mut add_negative = head_category.negative_properties().clone();

        for prop in any_promoted {
            if component_categories.iter().any(|c| c.positive_properties().contains(prop)) {
                add_positive.insert(*prop);
            } else if component_categories.iter().all(|c| c.negative_properties().contains(prop)) {
                add_negative.insert(*prop);
            }
        }
        for prop in all_promoted {
            if component_categories.iter().any(|c| c.negative_properties().contains(prop)) {
                add_negative.insert(*prop);
            } else if component_categories.iter().all(|c| c.positive_properties().contains(prop)) {
                add_positive.insert(*prop);
            }
        }

        self.category.with_name(name).promote(&add_positive, &add_negative)
    }

    /// The non-recursion predicate: prevents unit-branch infinite cycles.
    pub fn is_non_recursive(&self, result: &Category, head_category: &Category) -> bool {
        is_non_recursive(result, head_category, self.subcategory_sets.len())
    }
}

/// Shared non-recursion predicate (sequence rules only; conjunction rules
/// are always non-recursive since they always have >= 2 subtrees).
pub fn is_non_recursive(result: &Category, head_category: &Category, component_count: usize) -> bool {
    if component_count > 1 {
        return true;
    }
    if !head_category.subsumes(result) {
        return true;
    }
    result.positive_properties().len() > head_category.positive_properties().len()
        || result.negative_properties().len() > head_category.negative_properties().len()
}
