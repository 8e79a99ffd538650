//! The parse forest: arena-allocated [`ParseNode`]s and [`NodeSet`]s.
//!
//! Mutual references between a derivation and the equivalence class of
//! derivations sharing its span+category would otherwise form a cyclic
//! ownership graph. Instead, both live in a `Forest` arena and refer to
//! each other by integer handle; parent links are plain handles rather than
//! owning references, so freeing the `Forest` (which happens when its
//! owning [`crate::scheduler::ParserState`] is dropped) frees the whole
//! structure at once.

use crate::category::Category;
use crate::chart::Chart;
use crate::model::{Model, RuleHandle};
use crate::scoring::{branch_features, leaf_features};
use crate::tokens::TokenSequence;

/// A handle to one derivation (one way of deriving a span+category).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u32);

/// A handle to one equivalence class of derivations sharing `(start, end,
/// category)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetHandle(u32);

impl SetHandle {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        SetHandle(raw)
    }
}

/// A candidate derivation not yet admitted to the forest: either a leaf
/// (`components` empty) or a branch assembled by a sequence/conjunction
/// rule firing.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub rule: RuleHandle,
    pub head_index: usize,
    pub category: Category,
    pub start: usize,
    pub end: usize,
    pub components: Vec<SetHandle>,
}

/// One derivation. Invariants: `end = start + 1` for leaves;
/// for branches, components are contiguous and `start`/`end` match the
/// first/last component's span.
#[derive(Debug, Clone)]
pub struct ParseNode {
    pub rule: RuleHandle,
    pub head_index: usize,
    pub category: Category,
    pub start: usize,
    pub end: usize,
    pub components: Vec<SetHandle>,
    pub owner: SetHandle,
    /// `total_score / log2(1 + depth)`, the reported node score.    pub score: f64,
    /// The raw `Σ score·weight` sum this score was normalized from.
    pub raw_score: f64,
    /// `Σ weight`, reported as the node's confidence.
    pub weight: f64,
    pub depth: f64,
}

impl ParseNode {
    fn identity_eq(&self, other: &NewNode) -> bool {
        self.rule == other.rule
            && self.head_index == other.head_index
            && self.category == other.category
            && self.start == other.start
            && self.end == other.end
            && self.components == other.components
    }
}

/// An equivalence class of [`ParseNode`]s sharing `(start, end, category)`.
#[derive(Debug, Clone)]
pub struct NodeSet {
    pub start: usize,
    pub end: usize,
    pub category: Category,
    pub members: Vec<NodeHandle>,
    pub best: NodeHandle,
    /// `ParseNode`s (in any `NodeSet`) that use this set as a component,
    /// used to propagate score changes upward.    pub parents: Vec<NodeHandle>,
}

/// The result of [`Forest::add`]: whether the node created a new
/// equivalence class, joined an existing one as a genuinely new member, or
/// was dropped as a duplicate.#[derive(Debug, Clone, Copy)]
pub enum AddOutcome {
    NewSet(SetHandle, NodeHandle),
    NewMember(SetHandle, NodeHandle),
    Duplicate,
}

impl AddOutcome {
    pub fn is_new(&self) -> bool {
        !matches!(self, AddOutcome::Duplicate)
    }

    pub fn set_handle(&self) -> Option<SetHandle> {
        match self {
            AddOutcome::NewSet(s, _) | AddOutcome::NewMember(s, _) => Some(*s),
            AddOutcome::Duplicate => None,
        }
    }

    pub fn node_handle(&self) -> Option<NodeHandle> {
        match self {
            AddOutcome::NewSet(_, n) | AddOutcome::NewMember(_, n) => Some(*n),
            AddOutcome::Duplicate => None,
        }
    }
}

/// The arena owning every [`ParseNode`] and [`NodeSet`] allocated during a
/// single parse. Never shrinks; a `NodeSet`, once created, lives until the
/// `Forest` itself is dropped.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: Vec<ParseNode>,
    sets: Vec<NodeSet>,
}

impl Forest {
    pub fn new() -> Self {
        Forest::default()
    }

    pub fn node(&self, handle: NodeHandle) -> &ParseNode {
        &self.nodes[handle.0 as usize]
    }

    pub fn set(&self, handle: SetHandle) -> &NodeSet {
        &self.sets[handle.0 as usize]
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut ParseNode {
        &mut self.nodes[handle.0 as usize]
    }

    fn set_mut(&mut self, handle: SetHandle) -> &mut NodeSet {
        &mut self.sets[handle.0 as usize]
    }

    /// The surface spelling at the head of `node`'s best derivation,
    /// recursively following head components down to a leaf. Recomputed
    /// rather than cached, since the head component's best member can
    /// change as scoring feedback arrives.    pub fn head_spelling(&self, tokens: &TokenSequence, handle: NodeHandle) -> String {
        let node = self.node(handle);
        if node.components.is_empty() {
            tokens.spelling(node.start).to_string()
        } else {
            let head_set = node.components[node.head_index];
            self.head_spelling(tokens, self.set(head_set).best)
        }
    }

    fn head_spelling_of_set(&self, tokens: &TokenSequence, handle: SetHandle) -> String {
        self.head_spelling(tokens, self.set(handle).best)
    }

    fn emitted_features(&self, tokens: &TokenSequence, new: &NewNode) -> Vec<crate::scoring::FeatureKey> {
        if new.components.is_empty() {
            leaf_features(new.category.name(), new.category.positive_properties(), tokens.spelling(new.start))
        } else {
            let head_token = self.head_spelling_of_set(tokens, new.components[new.head_index]);
            let component_categories: Vec<Category> = new.components.iter().map(|&sh| self.set(sh).category.clone()).collect();
            branch_features(new.category.name(), new.category.positive_properties(), &head_token, &component_categories)
        }
    }

    /// Score aggregation for a candidate not yet in the forest:
    /// `(raw_score, weight, depth, reported_score)`.
    pub(crate) fn score_new(&self, model: &Model, tokens: &TokenSequence, new: &NewNode) -> (f64, f64, f64, f64) {
        let rule = model.rule(new.rule);
        let emitted = self.emitted_features(tokens, new);
        let (own_score, own_weight) = rule.scoring().calculate_weighted_score(&emitted);

        let mut total_score = own_score;
        let mut total_weight = own_weight;
        let mut weighted_depth = 0.0;
        let mut weight_for_depth = 0.0;
        for &component in &new.components {
            let best = self.node(self.set(component).best);
            total_score += best.raw_score;
            total_weight += best.weight;
            weighted_depth += best.depth * best.weight;
            weight_for_depth += best.weight;
        }
        let depth = 1.0 + if weight_for_depth > 0.0 { weighted_depth / weight_for_depth } else { 0.0 };
        let reported = total_score / (1.0 + depth).log2();
        (total_score, total_weight, depth, reported)
    }

    /// `add(node) -> bool`, generalized to report which of
    /// the three outcomes occurred: inserting into the chart and, on
    /// success, registering the new node as a parent of each of its
    /// components' `NodeSet`s.
    pub fn add(&mut self, chart: &mut Chart, model: &Model, tokens: &TokenSequence, new: NewNode) -> AddOutcome {
        let existing = chart.get(new.start, &new.category, new.end);
        let (raw_score, weight, depth, reported) = self.score_new(model, tokens, &new);

        match existing {
            None => {
                let node_handle = NodeHandle(self.nodes.len() as u32);
                let set_handle = SetHandle(self.sets.len() as u32);
                self.nodes.push(ParseNode {
                    rule: new.rule,
                    head_index: new.head_index,
                    category: new.category.clone(),
                    start: new.start,
                    end: new.end,
                    components: new.components.clone(),
                    owner: set_handle,
                    score: reported,
                    raw_score,
                    weight,
                    depth,
                });
                self.sets.push(NodeSet {
                    start: new.start,
                    end: new.end,
                    category: new.category.clone(),
                    members: vec![node_handle],
                    best: node_handle,
                    parents: Vec::new(),
                });
                for &component in &new.components {
                    self.set_mut(component).parents.push(node_handle);
                }
                chart.insert(new.start, &new.category, new.end, set_handle);
                AddOutcome::NewSet(set_handle, node_handle)
            }
            Some(set_handle) => {
                if self.set(set_handle).members.iter().any(|&m| self.node(m).identity_eq(&new)) {
                    return AddOutcome::Duplicate;
                }
                let node_handle = NodeHandle(self.nodes.len() as u32);
                self.nodes.push(ParseNode {
                    rule: new.rule,
                    head_index: new.head_index,
                    category: new.category.clone(),
                    start: new.start,
                    end: new.end,
                    components: new.components.clone(),
                    owner: set_handle,
                    score: reported,
                    raw_score,
                    weight,
                    depth,
                });
                for &component in &new.components {
                    self.set_mut(component).parents.push(node_handle);
                }
                let set = self.set_mut(set_handle);
                set.members.push(node_handle);
                let current_best = self.node(set.best);
                if better(reported, weight, current_best.score, current_best.weight) {
                    self.set_mut(set_handle).best = node_handle;
                }
                AddOutcome::NewMember(set_handle, node_handle)
            }
        }
    }

    /// Re-derive a node's cached score fields in place from its rule's
    /// current scoring table and its components' current best scores, used
    /// after `adjust_score` mutates the underlying table.    fn recompute_node(&mut self, model: &Model, tokens: &TokenSequence, handle: NodeHandle) {
        let node = self.node(handle).clone();
        let new = NewNode {
            rule: node.rule,
            head_index: node.head_index,
            category: node.category,
            start: node.start,
            end: node.end,
            components: node.components,
        };
        let (raw_score, weight, depth, reported) = self.score_new(model, tokens, &new);
        let n = self.node_mut(handle);
        n.raw_score = raw_score;
        n.weight = weight;
        n.depth = depth;
        n.score = reported;
    }

    /// Rescan a `NodeSet`'s members for a new best, returning whether the
    /// best member's identity changed.
    fn recompute_best(&mut self, handle: SetHandle) -> bool {
        let set = self.set(handle);
        let old_best = set.best;
        let mut best = set.members[0];
        let mut best_node = self.node(best);
        for &member in &set.members[1..] {
            let candidate = self.node(member);
            if better(candidate.score, candidate.weight, best_node.score, best_node.weight) {
                best = member;
                best_node = candidate;
            }
        }
        if best != old_best {
            self.set_mut(handle).best = best;
            true
        } else {
            false
        }
    }

    /// `adjust_score(node, target)`: update `node`'s rule
    /// toward `target`, then recurse down the currently-best path updating
    /// each descendant's rule the same way, then propagate the resulting
    /// score changes upward through ancestor `NodeSet`s and `ParseNode`s.
    pub fn adjust_score(&mut self, model: &Model, tokens: &TokenSequence, handle: NodeHandle, target: f64) -> crate::error::Result<()> {
        let components = self.node(handle).components.clone();
        for component in &components {
            let best_child = self.set(*component).best;
            self.adjust_score(model, tokens, best_child, target)?;
        }

        let node = self.node(handle).clone();
        let new = NewNode {
            rule: node.rule,
            head_index: node.head_index,
            category: node.category,
            start: node.start,
            end: node.end,
            components: node.components,
        };
        let emitted = self.emitted_features(tokens, &new);
        model.rule(node.rule).adjust_score(&emitted, target)?;
        self.recompute_node(model, tokens, handle);

        let owner = self.node(handle).owner;
        self.propagate_upward(model, tokens, owner);
        Ok(())
    }

    fn propagate_upward(&mut self, model: &Model, tokens: &TokenSequence, start: SetHandle) {
        let mut frontier = vec![start];
        while let Some(set_handle) = frontier.pop() {
            if self.recompute_best(set_handle) {
                let parents = self.set(set_handle).parents.clone();
                for parent in parents {
                    self.recompute_node(model, tokens, parent);
                    frontier.push(self.node(parent).owner);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }
}

fn better(score: f64, weight: f64, other_score: f64, other_weight: f64) -> bool {
    match score.partial_cmp(&other_score) {
        Some(std::cmp::Ordering::Greater) => true,
        Some(std::cmp::Ordering::Equal) => weight > other_weight,
        _ => false,
    }
}

/// A rooted `NodeSet`, viewed as a tree via its best-scoring member at
/// every level.#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParseTree {
    pub root: SetHandle,
}

impl ParseTree {
    pub fn new(root: SetHandle) -> Self {
        ParseTree { root }
    }

    pub fn span(&self, forest: &Forest) -> (usize, usize) {
        let set = forest.set(self.root);
        (set.start, set.end)
    }

    pub fn category<'a>(&self, forest: &'a Forest) -> &'a Category {
        &forest.set(self.root).category
    }

    pub fn score(&self, forest: &Forest) -> f64 {
        forest.node(forest.set(self.root).best).score
    }

    pub fn weight(&self, forest: &Forest) -> f64 {
        forest.node(forest.set(self.root).best).weight
    }
}

/// An immutable snapshot of a parse: the token sequence plus the top-level
/// `ParseTree`s realized when the scheduler stopped.#[derive(Debug, Clone)]
pub struct Parse {
    pub tokens: TokenSequence,
    pub trees: Vec<ParseTree>,
    pub timed_out: bool,
}

impl Parse {
    /// `N - Σ (end - start)` over the top-level trees: the count of token
    /// positions this parse's trees leave uncovered.
    pub fn total_gap_size(&self, forest: &Forest) -> usize {
        let covered: usize = self.trees.iter().map(|t| t.span(forest)).map(|(s, e)| e - s).sum();
        self.tokens.len().saturating_sub(covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::rules::LeafRule;
    use crate::symbol::Interner;
    use std::collections::BTreeSet;

    fn simple_model() -> (Model, TokenSequence) {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(noun, ["cat".to_string()]);
        let model = ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap();
        let tokens = TokenSequence::from_tokens([("cat".to_string(), 0, 3)]);
        (model, tokens)
    }

    #[test]
    fn adding_a_leaf_creates_a_new_set() {
        let (model, tokens) = simple_model();
        let mut forest = Forest::new();
        let mut chart = Chart::new();
        let new = NewNode {
            rule: RuleHandle::PrimaryLeaf(0),
            head_index: 0,
            category: model.rule(RuleHandle::PrimaryLeaf(0)).category().clone(),
            start: 0,
            end: 1,
            components: vec![],
        };
        let outcome = forest.add(&mut chart, &model, &tokens, new);
        assert!(matches!(outcome, AddOutcome::NewSet(_, _)));
        assert_eq!(forest.node_count(), 1);
        assert_eq!(forest.set_count(), 1);
    }

    #[test]
    fn adding_the_same_leaf_twice_is_a_duplicate() {
        let (model, tokens) = simple_model();
        let mut forest = Forest::new();
        let mut chart = Chart::new();
        let category = model.rule(RuleHandle::PrimaryLeaf(0)).category().clone();
        let make = || NewNode {
            rule: RuleHandle::PrimaryLeaf(0),
            head_index: 0,
            category: category.clone(),
            start: 0,
            end: 1,
            components: vec![],
        };
        forest.add(&mut chart, &model, &tokens, make());
        let second = forest.add(&mut chart, &model, &tokens, make());
        assert!(matches!(second, AddOutcome::Duplicate));
        assert_eq!(forest.node_count(), 1);
    }

    #[test]
    fn adjust_score_keeps_bounds() {
        let (model, tokens) = simple_model();
        let mut forest = Forest::new();
        let mut chart = Chart::new();
        let category = model.rule(RuleHandle::PrimaryLeaf(0)).category().clone();
        let outcome = forest.add(
            &mut chart,
            &model,
            &tokens,
            NewNode {
                rule: RuleHandle::PrimaryLeaf(0),
                head_index: 0,
                category,
                start: 0,
                end: 1,
                components: vec![],
            },
        );
        let node_handle = outcome.node_handle().unwrap();
        for _ in 0..10 {
            forest.adjust_score(&model, &tokens, node_handle, 1.0).unwrap();
        }
        let node = forest.node(node_handle);
        assert!(node.score.is_finite());
    }
}
