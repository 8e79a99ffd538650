//! The model: an immutable, shareable bundle of rules and promoted-property
//! sets backing many parses and generation runs.
//!
//! A `Model` is built once via [`ModelConfig`] and then wrapped in an `Arc`
//! so many [`crate::scheduler::ParserState`]s (and [`crate::generation`]
//! runs) can share it. Per-rule scoring tables remain individually mutable
//! behind their own `RwLock` (see [`crate::scoring`]); everything else about
//! a `Model` is fixed at construction time.

use std::collections::{BTreeSet, HashMap};

use crate::category::Category;
use crate::error::{Error, Result};
use crate::properties::StandardProperties;
use crate::rules::{ConjunctionRule, LeafRule, PropertyInheritanceRule, Rule, SequenceRule};
use crate::symbol::{Interner, Symbol};

/// Identifies one rule within a [`Model`]'s three rule lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleHandle {
    PrimaryLeaf(usize),
    SecondaryLeaf(usize),
    Branch(usize),
}

pub struct Model {
    pub interner: Interner,
    pub standard_properties: StandardProperties,
    primary_leaf: Vec<Rule>,
    secondary_leaf: Vec<Rule>,
    branch: Vec<Rule>,
    inheritance: Vec<PropertyInheritanceRule>,
    any_promoted: BTreeSet<Symbol>,
    all_promoted: BTreeSet<Symbol>,
    /// `link_type → [(branch rule index, subcategory-set index)]`, used by
    /// generation's candidate filtering. Only populated for
    /// `SequenceRule`s, which are the only branch shape that publishes a
    /// `link_type_sets` table.
    rules_by_link_type: HashMap<Symbol, Vec<(usize, usize)>>,
}

impl Model {
    pub fn primary_leaf_rules(&self) -> &[Rule] {
        &self.primary_leaf
    }

    pub fn secondary_leaf_rules(&self) -> &[Rule] {
        &self.secondary_leaf
    }

    pub fn branch_rules(&self) -> &[Rule] {
        &self.branch
    }

    pub fn inheritance_rules(&self) -> &[PropertyInheritanceRule] {
        &self.inheritance
    }

    pub fn any_promoted(&self) -> &BTreeSet<Symbol> {
        &self.any_promoted
    }

    pub fn all_promoted(&self) -> &BTreeSet<Symbol> {
        &self.all_promoted
    }

    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        match handle {
            RuleHandle::PrimaryLeaf(i) => &self.primary_leaf[i],
            RuleHandle::SecondaryLeaf(i) => &self.secondary_leaf[i],
            RuleHandle::Branch(i) => &self.branch[i],
        }
    }

    /// Rules (and the subcategory-set slot within them) whose sequence-rule
    /// `link_type_sets` reference `label`, used by generation to restrict
    /// candidate component slots by the semantic graph's actual edges.
    pub fn branch_rules_for_link(&self, label: Symbol) -> &[(usize, usize)] {
        self.rules_by_link_type.get(&label).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Iterate every rule in the model, tagged with its handle. Used by
    /// scoring-store persistence, which indexes rules by their `identity()`
    /// string rather than by handle.
    pub fn iter_rules(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> {
        self.primary_leaf
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleHandle::PrimaryLeaf(i), r))
            .chain(self.secondary_leaf.iter().enumerate().map(|(i, r)| (RuleHandle::SecondaryLeaf(i), r)))
            .chain(self.branch.iter().enumerate().map(|(i, r)| (RuleHandle::Branch(i), r)))
    }

    /// The property-inheritance fixed-point closure:
    /// repeatedly union in every inheritance rule's additions whose
    /// antecedent subsumes the current `(name, positive, negative)` state,
    /// until no rule fires a new addition. Iterations are bounded by the
    /// size of the symbol universe, so adversarial rule sets cannot loop
    /// forever.
    pub fn extend_properties(&self, name: Symbol, mut positive: BTreeSet<Symbol>, mut negative: BTreeSet<Symbol>) -> (BTreeSet<Symbol>, BTreeSet<Symbol>) {
        let bound = 2 * (self.interner.len() + 1) * (self.inheritance.len() + 1);
        for _ in 0..bound {
            let mut changed = false;
            for rule in &self.inheritance {
                if let Some((add_positive, add_negative)) = rule.apply(name, &positive, &negative) {
                    for p in add_positive {
                        if positive.insert(*p) {
                            changed = true;
                        }
                    }
                    for n in add_negative {
                        if negative.insert(*n) {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for p in &positive {
            negative.remove(p);
        }
        (positive, negative)
    }

    pub fn extend_category_properties(&self, category: &Category) -> Category {
        let (positive, negative) = self.extend_properties(
            category.name(),
            category.positive_properties().clone(),
            category.negative_properties().clone(),
        );
        Category::new(category.name(), positive, negative)
    }
}

/// Builder that assembles a [`Model`] from caller-supplied rule
/// collections, validating structural constraints the individual rule
/// constructors cannot check in isolation.#[derive(Default)]
pub struct ModelConfig {
    primary_leaf: Vec<LeafRule>,
    secondary_leaf: Vec<LeafRule>,
    sequence: Vec<SequenceRule>,
    conjunction: Vec<ConjunctionRule>,
    inheritance: Vec<PropertyInheritanceRule>,
    any_promoted: BTreeSet<Symbol>,
    all_promoted: BTreeSet<Symbol>,
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_leaf_rule(mut self, rule: LeafRule) -> Self {
        self.primary_leaf.push(rule);
        self
    }

    pub fn with_secondary_leaf_rule(mut self, rule: LeafRule) -> Self {
        self.secondary_leaf.push(rule);
        self
    }

    pub fn with_sequence_rule(mut self, rule: SequenceRule) -> Self {
        self.sequence.push(rule);
        self
    }

    pub fn with_conjunction_rule(mut self, rule: ConjunctionRule) -> Self {
        self.conjunction.push(rule);
        self
    }

    pub fn with_inheritance_rule(mut self, rule: PropertyInheritanceRule) -> Self {
        self.inheritance.push(rule);
        self
    }

    pub fn with_any_promoted(mut self, properties: impl IntoIterator<Item = Symbol>) -> Self {
        self.any_promoted.extend(properties);
        self
    }

    pub fn with_all_promoted(mut self, properties: impl IntoIterator<Item = Symbol>) -> Self {
        self.all_promoted.extend(properties);
        self
    }

    /// Validate every branch rule and assemble the immutable [`Model`].
    ///
    /// `SequenceRule` is already validated at construction time (its
    /// `new()` returns a `Result`); this pass catches the structural
    /// inconsistencies specific to `ConjunctionRule` that have no natural
    /// home in its constructor.
    pub fn build(self, interner: Interner) -> Result<Model> {
        for rule in &self.conjunction {
            if rule.conjunction.is_empty() {
                log::warn!("rejecting conjunction rule: empty conjunction-term set");
                return Err(Error::InvalidRule("conjunction rule has an empty conjunction-term set".into()));
            }
            if rule.followup.is_empty() {
                log::warn!("rejecting conjunction rule: empty followup set");
                return Err(Error::InvalidRule("conjunction rule has an empty followup set".into()));
            }
            if rule.leadup.is_none() && !rule.leadup_link_types.is_empty() {
                log::warn!("rejecting conjunction rule: leadup link types with no leadup category set");
                return Err(Error::InvalidRule(
                    "conjunction rule declares leadup link types but has no leadup category set".into(),
                ));
            }
            if rule.single && rule.compound && rule.leadup.is_none() {
                log::warn!("rejecting conjunction rule: single and compound both set with no leadup category set");
                return Err(Error::InvalidRule(
                    "conjunction rule is both single and compound but has no leadup category set to recurse over".into(),
                ));
            }
        }

        let standard_properties = StandardProperties::intern(&interner);

        let mut branch: Vec<Rule> = Vec::with_capacity(self.sequence.len() + self.conjunction.len());
        let mut rules_by_link_type: HashMap<Symbol, Vec<(usize, usize)>> = HashMap::new();
        for rule in self.sequence {
            let index = branch.len();
            for (gap, links) in rule.link_type_sets.iter().enumerate() {
                for link in links {
                    // The gap `g` sits between subcategory_sets[g] and
                    // subcategory_sets[g+1]; record both adjoining slots so
                    // generation can restrict either side of the link.
                    rules_by_link_type.entry(link.label).or_default().push((index, gap));
                    rules_by_link_type.entry(link.label).or_default().push((index, gap + 1));
                }
            }
            branch.push(Rule::Sequence(rule));
        }
        for rule in self.conjunction {
            branch.push(Rule::Conjunction(rule));
        }

        let primary_leaf: Vec<Rule> = self.primary_leaf.into_iter().map(Rule::Leaf).collect();
        let secondary_leaf: Vec<Rule> = self.secondary_leaf.into_iter().map(Rule::Leaf).collect();
        log::info!(
            "built model: {} primary leaf, {} secondary leaf, {} branch, {} inheritance rules",
            primary_leaf.len(),
            secondary_leaf.len(),
            branch.len(),
            self.inheritance.len(),
        );

        Ok(Model {
            interner,
            standard_properties,
            primary_leaf,
            secondary_leaf,
            branch,
            inheritance: self.inheritance,
            any_promoted: self.any_promoted,
            all_promoted: self.all_promoted,
            rules_by_link_type,
        })
    }
}
