//! Conjunction rules: a three-state (leadup, conjunction, followup)
//! automaton producing coordination phrases.
use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::category::Category;
use crate::properties::StandardProperties;
use crate::rules::sequence::LinkType;
use crate::rules::subtree_match::SubtreeMatchRule;
use crate::scoring::ScoringTable;
use crate::symbol::Symbol;

/// A conditional property addition: if every predicate in `predicate`
/// matches, `add_positive`/`add_negative` are unioned into the result.
#[derive(Debug, Clone)]
pub struct PropertyRule {
    pub predicate: Vec<SubtreeMatchRule>,
    pub add_positive: BTreeSet<Symbol>,
    pub add_negative: BTreeSet<Symbol>,
}

#[derive(Debug)]
pub struct ConjunctionRule {
    pub category: Category,
    /// `None` when `single` (no leadup ever participates); `Some` otherwise.
    pub leadup: Option<Vec<Category>>,
    pub conjunction: Vec<Category>,
    pub followup: Vec<Category>,
    pub leadup_link_types: Vec<LinkType>,
    pub followup_link_types: Vec<LinkType>,
    /// Permits a leadup-less assembly (conjunction, followup only).
    pub single: bool,
    /// Permits a left-recursive chain of leadups before the conjunction.
    pub compound: bool,
    /// A disjunction of conjunctions of subtree predicates.
    pub match_rules: Vec<Vec<SubtreeMatchRule>>,
    pub property_rules: Vec<PropertyRule>,
    pub scoring: RwLock<ScoringTable>,
}

impl ConjunctionRule {
    pub fn new(
        category: Category,
        leadup: Option<Vec<Category>>,
        conjunction: Vec<Category>,
        followup: Vec<Category>,
        leadup_link_types: Vec<LinkType>,
        followup_link_types: Vec<LinkType>,
        single: bool,
        compound: bool,
        match_rules: Vec<Vec<SubtreeMatchRule>>,
        property_rules: Vec<PropertyRule>,
    ) -> Self {
        ConjunctionRule {
            category,
            leadup,
            conjunction,
            followup,
            leadup_link_types,
            followup_link_types,
            single,
            compound,
            match_rules,
            property_rules,
            scoring: RwLock::new(ScoringTable::new()),
        }
    }

    /// The conjunction term always occupies the index equal to the number
    /// of leadup components actually assembled.
    pub fn head_index_for(&self, leadup_len: usize) -> usize {
        leadup_len
    }

    /// Do any of the disjunctive match-rule conjunctions hold?
    pub fn matches(&self, components: &[Category], head_index: usize) -> bool {
        if self.match_rules.is_empty() {
            return true;
        }
        self.match_rules
            .iter()
            .any(|conjunction| conjunction.iter().all(|p| p.matches(components, head_index)))
    }

    /// Derive the result category via a four-step algorithm: intersect
    /// shared properties across non-head subtrees, apply any/all
    /// promotion, add the fixed coordination properties, then apply the
    /// conditional property rules.
    pub fn get_category(
        &self,
        components: &[Category],
        head_index: usize,
        any_promoted: &BTreeSet<Symbol>,
        all_promoted: &BTreeSet<Symbol>,
        standard_properties: &StandardProperties,
    ) -> Category {
        let n = components.len();
        debug_assert!(n >= 2);

        // (a) seed from the followup (last component), then intersect
        // positive / union negative across the other non-head components.
        let last = n - 1;
        let mut positive = components[last].positive_properties().clone();
        let mut negative = components[last].negative_properties().clone();
        for (i, component) in components.iter().enumerate().take(last) {
            if i == head_index {
                continue;
            }
            positive = positive.intersection(component.positive_properties()).copied().collect();
            negative.extend(component.negative_properties().iter().copied());
        }

        // (b) any/all-promoted property propagation across every component.
        for prop in any_promoted {
            if components.iter().any(|c| c.positive_properties().contains(prop)) {
                positive.insert(*prop);
            } else if components.iter().all(|c| c.negative_properties().contains(prop)) {
                negative.insert(*prop);
            }
        }
        for prop in all_promoted {
            if components.iter().any(|c| c.negative_properties().contains(prop)) {
                negative.insert(*prop);
            } else if components.iter().all(|c| c.positive_properties().contains(prop)) {
                positive.insert(*prop);
            }
        }
        for p in &positive {
            negative.remove(p);
        }

        // (c) fixed conjunction/compound/simple/single assignment.
        positive.insert(standard_properties.conjunction);
        use std::cmp::Ordering;
        match n.cmp(&3) {
            Ordering::Greater => {
                positive.insert(standard_properties.compound);
                negative.insert(standard_properties.simple);
                negative.insert(standard_properties.single);
            }
            Ordering::Less => {
                positive.insert(standard_properties.single);
                negative.insert(standard_properties.compound);
                negative.insert(standard_properties.simple);
            }
            Ordering::Equal => {
                positive.insert(standard_properties.simple);
                negative.insert(standard_properties.compound);
                negative.insert(standard_properties.single);
            }
        }
        for p in &positive {
            negative.remove(p);
        }

        // (d) conditional property rules.
        for rule in &self.property_rules {
            if rule.predicate.iter().all(|p| p.matches(components, head_index)) {
                positive.extend(rule.add_positive.iter().copied());
                negative.extend(rule.add_negative.iter().copied());
            }
        }
        for p in &positive {
            negative.remove(p);
        }

        let name = if self.category.is_wildcard() {
            components[head_index].name()
        } else {
            self.category.name()
        };
        self.category.with_name(name).promote(&positive, &negative)
    }

    /// Conjunction results are never considered recursive: they always
    /// assemble at least two subtrees.
    pub fn is_non_recursive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::parser;
    use crate::rules::LeafRule;
    use crate::scheduler::ParserState;
    use crate::symbol::Interner;
    use std::sync::Arc;

    fn cat(interner: &Interner, name: &str, pos: &[&str]) -> Category {
        Category::new(
            interner.intern(name),
            pos.iter().map(|p| interner.intern(p)).collect(),
            BTreeSet::new(),
        )
    }

    #[test]
    fn three_subtrees_get_simple_property() {
        let interner = Interner::new();
        let props = StandardProperties::intern(&interner);
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
        let rule = ConjunctionRule::new(
            np,
            None,
            vec![cat(&interner, "conj", &[])],
            vec![cat(&interner, "noun", &[])],
            vec![],
            vec![],
            true,
            false,
            vec![],
            vec![],
        );
        let components = vec![
            cat(&interner, "noun", &[]),
            cat(&interner, "conj", &[]),
            cat(&interner, "noun", &[]),
        ];
        let result = rule.get_category(&components, 1, &BTreeSet::new(), &BTreeSet::new(), &props);
        assert!(result.positive_properties().contains(&props.conjunction));
        assert!(result.positive_properties().contains(&props.simple));
        assert!(result.negative_properties().contains(&props.compound));
        assert!(result.negative_properties().contains(&props.single));
    }

    #[test]
    fn two_subtrees_get_single_property() {
        let interner = Interner::new();
        let props = StandardProperties::intern(&interner);
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
        let rule = ConjunctionRule::new(
            np,
            None,
            vec![cat(&interner, "conj", &[])],
            vec![cat(&interner, "noun", &[])],
            vec![],
            vec![],
            true,
            false,
            vec![],
            vec![],
        );
        let components = vec![cat(&interner, "conj", &[]), cat(&interner, "noun", &[])];
        let result = rule.get_category(&components, 0, &BTreeSet::new(), &BTreeSet::new(), &props);
        assert!(result.positive_properties().contains(&props.single));
        assert!(result.negative_properties().contains(&props.compound));
    }

    #[test]
    fn get_category_keeps_the_rules_own_template_properties() {
        let interner = Interner::new();
        let props = StandardProperties::intern(&interner);
        let np = cat(&interner, "NP", &["coordinated"]);
        let rule = ConjunctionRule::new(
            np,
            None,
            vec![cat(&interner, "conj", &[])],
            vec![cat(&interner, "noun", &[])],
            vec![],
            vec![],
            true,
            false,
            vec![],
            vec![],
        );
        let components = vec![cat(&interner, "conj", &[]), cat(&interner, "noun", &[])];
        let result = rule.get_category(&components, 0, &BTreeSet::new(), &BTreeSet::new(), &props);
        assert!(result.positive_properties().contains(&interner.intern("coordinated")));
    }

    #[test]
    fn is_always_non_recursive() {
        let interner = Interner::new();
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
        let rule = ConjunctionRule::new(np, None, vec![], vec![], vec![], vec![], true, false, vec![], vec![]);
        assert!(rule.is_non_recursive());
    }

    #[test]
    fn conjunction_rule_produces_simple_coordination_properties() {
        let interner = Interner::new();
        let noun = cat(&interner, "noun", &[]);
        let conj = cat(&interner, "conj", &[]);
        let np = Category::wildcard();

        let noun_rule = LeafRule::new_set(noun.clone(), ["cats".to_string(), "dogs".to_string()]);
        let conj_rule = LeafRule::new_set(conj.clone(), ["and".to_string()]);
        let rule = ConjunctionRule::new(np, None, vec![conj], vec![noun], vec![], vec![], true, false, vec![], vec![]);

        let model = Arc::new(
            ModelConfig::new()
                .with_primary_leaf_rule(noun_rule)
                .with_primary_leaf_rule(conj_rule)
                .with_conjunction_rule(rule)
                .build(interner)
                .unwrap(),
        );
        let mut state = ParserState::new(model);
        let parse = parser::parse(
            vec![
                ("cats".to_string(), 0, 4),
                ("and".to_string(), 5, 8),
                ("dogs".to_string(), 9, 13),
            ],
            &mut state,
            false,
            None,
        );

        let whole_span = parse
            .trees
            .iter()
            .find(|t| t.span(state.forest()) == (0, 3))
            .expect("a whole-span conjunction tree exists");

        let category = whole_span.category(state.forest());
        let interner = &state.model().interner;
        let positive: BTreeSet<String> = category.positive_properties().iter().map(|s| interner.resolve(*s)).collect();
        let negative: BTreeSet<String> = category.negative_properties().iter().map(|s| interner.resolve(*s)).collect();

        assert!(positive.contains("conjunction"));
        assert!(positive.contains("simple"));
        assert!(negative.contains("compound"));
        assert!(negative.contains("single"));
    }
}
