//! The scheduler: a priority-ordered agenda of candidate nodes, and the
//! per-token-sequence parser state that owns the chart and forest.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ordered_float::OrderedFloat;

use crate::category::Category;
use crate::chart::Chart;
use crate::forest::{Forest, NewNode, Parse, ParseTree, SetHandle};
use crate::model::{Model, RuleHandle};
use crate::rules::{ConjunctionRule, SequenceRule};
use crate::tokens::TokenSequence;

/// The fields a candidate node's identity is determined by, used to dedup
/// the queue against already-pending (or already-realized) candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeIdentity {
    rule: RuleHandle,
    head_index: usize,
    category: Category,
    start: usize,
    end: usize,
    components: Vec<SetHandle>,
}

impl From<&NewNode> for NodeIdentity {
    fn from(new: &NewNode) -> Self {
        NodeIdentity {
            rule: new.rule,
            head_index: new.head_index,
            category: new.category.clone(),
            start: new.start,
            end: new.end,
            components: new.components.clone(),
        }
    }
}

struct QueueEntry {
    key: (OrderedFloat<f64>, OrderedFloat<f64>),
    insertion: u64,
    node: NewNode,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.insertion == other.insertion
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key).then(self.insertion.cmp(&other.insertion))
    }
}

/// `insertion_queue`: a min-heap keyed by `(same_rule_count_already_queued -
/// score, -confidence)`, combined with a membership set so pushing an
/// already-present node is a no-op.
#[derive(Default)]
struct PriorityQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    queued: HashSet<NodeIdentity>,
    rule_counts: HashMap<RuleHandle, usize>,
    next_insertion: u64,
}

impl PriorityQueue {
    fn push(&mut self, node: NewNode, score: f64, weight: f64) -> bool {
        let identity = NodeIdentity::from(&node);
        if !self.queued.insert(identity) {
            return false;
        }
        let count = *self.rule_counts.get(&node.rule).unwrap_or(&0);
        *self.rule_counts.entry(node.rule).or_insert(0) += 1;
        let key = (OrderedFloat(count as f64 - score), OrderedFloat(-weight));
        let insertion = self.next_insertion;
        self.next_insertion += 1;
        self.heap.push(Reverse(QueueEntry { key, insertion, node }));
        true
    }

    fn pop(&mut self) -> Option<NewNode> {
        let Reverse(entry) = self.heap.pop()?;
        let identity = NodeIdentity::from(&entry.node);
        self.queued.remove(&identity);
        if let Some(count) = self.rule_counts.get_mut(&entry.node.rule) {
            *count = count.saturating_sub(1);
        }
        Some(entry.node)
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// `process_node`'s outcome: whether the agenda can still make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    QueueEmpty,
    TimedOut,
}

/// One parse's mutable working state: its token sequence, chart, forest, and
/// scheduling agenda, plus the set of currently-root `NodeSet`s. Not shared
/// across parses.
pub struct ParserState {
    model: Arc<Model>,
    tokens: TokenSequence,
    chart: Chart,
    forest: Forest,
    roots: HashSet<SetHandle>,
    queue: PriorityQueue,
}

impl ParserState {
    pub fn new(model: Arc<Model>) -> Self {
        ParserState {
            model,
            tokens: TokenSequence::new(),
            chart: Chart::new(),
            forest: Forest::new(),
            roots: HashSet::new(),
            queue: PriorityQueue::default(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// A cloned handle to the shared model, for callers (tests, generation
    /// feedback loops) that need to pair it with a separately-borrowed
    /// [`Forest`] from the same `ParserState`.
    pub fn model_arc(&self) -> Arc<Model> {
        Arc::clone(&self.model)
    }

    pub fn tokens(&self) -> &TokenSequence {
        &self.tokens
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn forest_mut(&mut self) -> &mut Forest {
        &mut self.forest
    }

    pub fn roots(&self) -> impl Iterator<Item = SetHandle> + '_ {
        self.roots.iter().copied()
    }

    /// `add_token(spelling, start, end)`: append to the token sequence and
    /// fire leaf rules against it.
    pub fn add_token(&mut self, spelling: impl Into<String>, start_char: usize, end_char: usize) {
        let spelling = spelling.into();
        let index = self.tokens.len();
        self.tokens.push(spelling.clone(), start_char, end_char);
        self.fire_leaf_rules(index, &spelling);
    }

    fn fire_leaf_rules(&mut self, index: usize, spelling: &str) {
        let (case_positive, case_negative) = self.model.standard_properties.discover_case_properties(spelling);
        let mut matched_primary = false;
        let model = Arc::clone(&self.model);
        for (i, rule) in model.primary_leaf_rules().iter().enumerate() {
            let leaf = rule.as_leaf().expect("primary_leaf_rules holds only Leaf rules");
            if leaf.contains(spelling, &case_positive) {
                matched_primary = true;
                let promoted = leaf.category.promote(&case_positive, &case_negative);
                let category = model.extend_category_properties(&promoted);
                self.push_candidate(NewNode {
                    rule: RuleHandle::PrimaryLeaf(i),
                    head_index: 0,
                    category,
                    start: index,
                    end: index + 1,
                    components: Vec::new(),
                });
            }
        }
        if matched_primary {
            return;
        }
        for (i, rule) in model.secondary_leaf_rules().iter().enumerate() {
            let leaf = rule.as_leaf().expect("secondary_leaf_rules holds only Leaf rules");
            if leaf.contains(spelling, &case_positive) {
                let promoted = leaf.category.promote(&case_positive, &case_negative);
                let category = model.extend_category_properties(&promoted);
                self.push_candidate(NewNode {
                    rule: RuleHandle::SecondaryLeaf(i),
                    head_index: 0,
                    category,
                    start: index,
                    end: index + 1,
                    components: Vec::new(),
                });
            }
        }
    }

    fn push_candidate(&mut self, new: NewNode) {
        let (_, weight, _, score) = self.forest.score_new(&self.model, &self.tokens, &new);
        self.queue.push(new, score, weight);
    }

    /// `process_node(deadline)`: pop, add to the chart, fix up
    /// the root set, and fire branch rules against the winning `NodeSet`.
    pub fn process_node(&mut self, deadline: Option<Instant>) -> StepOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return StepOutcome::TimedOut;
        }
        let Some(new) = self.queue.pop() else {
            return StepOutcome::QueueEmpty;
        };
        let outcome = self.forest.add(&mut self.chart, &self.model, &self.tokens, new);
        if let Some(set_handle) = outcome.set_handle() {
            let node_handle = outcome.node_handle().expect("set_handle implies node_handle");
            let components = self.forest.node(node_handle).components.clone();
            for component in &components {
                self.roots.remove(component);
            }
            self.roots.insert(set_handle);
            self.fire_branch_rules(set_handle);
        }
        if self.queue.is_empty() {
            StepOutcome::QueueEmpty
        } else {
            StepOutcome::Continue
        }
    }

    /// Drain the agenda until it is empty or `deadline` passes. Returns
    /// whether the run timed out.
    pub fn process_all(&mut self, deadline: Option<Instant>) -> bool {
        loop {
            match self.process_node(deadline) {
                StepOutcome::Continue => continue,
                StepOutcome::QueueEmpty => return false,
                StepOutcome::TimedOut => {
                    log::warn!("parse deadline expired with {} nodes still queued", self.queue.len());
                    return true;
                }
            }
        }
    }

    /// Drain the agenda until some root `NodeSet` spans the whole token
    /// sequence, the agenda empties, or `deadline` passes.
    pub fn process_necessary(&mut self, deadline: Option<Instant>) -> bool {
        let n = self.tokens.len();
        loop {
            if n > 0 && self.roots.iter().any(|&r| {
                let set = self.forest.set(r);
                set.start == 0 && set.end == n
            }) {
                return false;
            }
            match self.process_node(deadline) {
                StepOutcome::Continue => continue,
                StepOutcome::QueueEmpty => return false,
                StepOutcome::TimedOut => {
                    log::warn!("parse deadline expired before a covering root was found ({} nodes queued)", self.queue.len());
                    return true;
                }
            }
        }
    }

    /// Snapshot the current root set into a [`Parse`].
    pub fn snapshot(&self, timed_out: bool) -> Parse {
        Parse {
            tokens: self.tokens.clone(),
            trees: self.roots.iter().map(|&r| ParseTree::new(r)).collect(),
            timed_out,
        }
    }

    fn fire_branch_rules(&mut self, set_handle: SetHandle) {
        let model = Arc::clone(&self.model);
        let set = self.forest.set(set_handle);
        let s_start = set.start;
        let s_end = set.end;
        let s_category = set.category.clone();
        for (idx, rule) in model.branch_rules().iter().enumerate() {
            if let Some(seq) = rule.as_sequence() {
                self.fire_sequence(idx, seq, set_handle, s_start, s_end, &s_category);
            } else if let Some(conj) = rule.as_conjunction() {
                self.fire_conjunction(idx, conj, set_handle, s_start, s_end, &s_category);
            }
        }
    }

    fn fire_sequence(&mut self, branch_idx: usize, rule: &SequenceRule, s_handle: SetHandle, s_start: usize, s_end: usize, s_category: &Category) {
        for i in 0..rule.subcategory_sets.len() {
            if !rule.subcategory_sets[i].iter().any(|q| q.subsumes(s_category)) {
                continue;
            }
            let forward_chains = enumerate_forward_chain(&self.chart, s_end, &rule.subcategory_sets[i + 1..]);
            if forward_chains.is_empty() {
                continue;
            }
            let backward_sets_rev: Vec<Vec<Category>> = rule.subcategory_sets[..i].iter().rev().cloned().collect();
            let backward_chains = enumerate_backward_chain(&self.chart, s_start, &backward_sets_rev);
            if backward_chains.is_empty() {
                continue;
            }
            for backward in &backward_chains {
                for forward in &forward_chains {
                    let mut components = backward.clone();
                    components.push((s_handle, s_category.clone(), s_start, s_end));
                    components.extend(forward.iter().cloned());

                    let component_categories: Vec<Category> = components.iter().map(|(_, c, _, _)| c.clone()).collect();
                    let derived = rule.get_category(&component_categories, self.model.any_promoted(), self.model.all_promoted());
                    let head_category = &component_categories[rule.head_index];
                    if !rule.is_non_recursive(&derived, head_category) {
                        continue;
                    }

                    let start = components[0].2;
                    let end = components[components.len() - 1].3;
                    let handles: Vec<SetHandle> = components.iter().map(|(h, _, _, _)| *h).collect();
                    self.push_candidate(NewNode {
                        rule: RuleHandle::Branch(branch_idx),
                        head_index: rule.head_index,
                        category: derived,
                        start,
                        end,
                        components: handles,
                    });
                }
            }
        }
    }

    fn fire_conjunction(&mut self, branch_idx: usize, rule: &ConjunctionRule, s_handle: SetHandle, s_start: usize, s_end: usize, s_category: &Category) {
        let leadup_allow_empty = rule.single || rule.leadup.is_none();

        // State: S is the conjunction term. Look left for an optional
        // leadup chain, right for the single followup slot.
        if rule.conjunction.iter().any(|q| q.subsumes(s_category)) {
            let mut leadup_options: Vec<Vec<Component>> = Vec::new();
            if leadup_allow_empty {
                leadup_options.push(Vec::new());
            }
            if let Some(leadup_cats) = &rule.leadup {
                leadup_options.extend(backward_leadups(&self.chart, s_start, leadup_cats, rule.compound));
            }
            for query in &rule.followup {
                for (followup_cat, followup_end, followup_handle) in self.chart.iter_forward_matches(s_end, query) {
                    let followup = (followup_handle, followup_cat.clone(), s_end, followup_end);
                    for leadup in &leadup_options {
                        self.try_assemble_conjunction(branch_idx, rule, leadup, (s_handle, s_category.clone(), s_start, s_end), followup.clone());
                    }
                }
            }
        }

        // State: S is the followup term. Look left for the single
        // conjunction slot, then further left for an optional leadup chain.
        if rule.followup.iter().any(|q| q.subsumes(s_category)) {
            for query in &rule.conjunction {
                for (conj_cat, conj_start, conj_handle) in self.chart.iter_backward_matches(s_start, query) {
                    let mut leadup_options: Vec<Vec<Component>> = Vec::new();
                    if leadup_allow_empty {
                        leadup_options.push(Vec::new());
                    }
                    if let Some(leadup_cats) = &rule.leadup {
                        leadup_options.extend(backward_leadups(&self.chart, conj_start, leadup_cats, rule.compound));
                    }
                    let conjunction = (conj_handle, conj_cat.clone(), conj_start, s_start);
                    for leadup in &leadup_options {
                        self.try_assemble_conjunction(branch_idx, rule, leadup, conjunction.clone(), (s_handle, s_category.clone(), s_start, s_end));
                    }
                }
            }
        }

        // State: S is itself a leadup term (only possible if compound or if
        // this is the rule's sole leadup slot). Look left for an optional
        // earlier leadup prefix, right for the rest of the automaton.
        if let Some(leadup_cats) = &rule.leadup {
            if leadup_cats.iter().any(|q| q.subsumes(s_category)) {
                let mut prefix_options: Vec<Vec<Component>> = vec![Vec::new()];
                if rule.compound {
                    prefix_options.extend(backward_leadups(&self.chart, s_start, leadup_cats, rule.compound));
                }
                for tail in enumerate_conjunction_tail(&self.chart, s_end, rule) {
                    debug_assert!(tail.len() >= 2);
                    let conj_index = tail.len() - 2;
                    for prefix in &prefix_options {
                        let mut leadup_components = prefix.clone();
                        leadup_components.push((s_handle, s_category.clone(), s_start, s_end));
                        leadup_components.extend(tail[..conj_index].iter().cloned());
                        self.try_assemble_conjunction(branch_idx, rule, &leadup_components, tail[conj_index].clone(), tail[conj_index + 1].clone());
                    }
                }
            }
        }
    }

    fn try_assemble_conjunction(&mut self, branch_idx: usize, rule: &ConjunctionRule, leadup: &[Component], conjunction: Component, followup: Component) {
        let mut components = leadup.to_vec();
        let head_index = rule.head_index_for(leadup.len());
        components.push(conjunction);
        components.push(followup);

        let component_categories: Vec<Category> = components.iter().map(|(_, c, _, _)| c.clone()).collect();
        if !rule.matches(&component_categories, head_index) {
            return;
        }
        let derived = rule.get_category(&component_categories, head_index, self.model.any_promoted(), self.model.all_promoted(), &self.model.standard_properties);

        let start = components[0].2;
        let end = components[components.len() - 1].3;
        let handles: Vec<SetHandle> = components.iter().map(|(h, _, _, _)| *h).collect();
        self.push_candidate(NewNode {
            rule: RuleHandle::Branch(branch_idx),
            head_index,
            category: derived,
            start,
            end,
            components: handles,
        });
    }
}

/// `(component set handle, its concrete category, start, end)`, the
/// currency every chain-enumeration helper below passes around.
type Component = (SetHandle, Category, usize, usize);

/// All ways to match `sets` in order starting at `start`, each element of
/// `sets[k]` tried as an alternative for that slot. Returns `[[]]` (one
/// empty solution) when `sets` is empty.
fn enumerate_forward_chain(chart: &Chart, start: usize, sets: &[Vec<Category>]) -> Vec<Vec<Component>> {
    if sets.is_empty() {
        return vec![Vec::new()];
    }
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for query in &sets[0] {
        for (concrete, end, handle) in chart.iter_forward_matches(start, query) {
            if seen.insert((handle, end)) {
                candidates.push((handle, concrete, start, end));
            }
        }
    }
    let mut results = Vec::new();
    for (handle, concrete, s, e) in candidates {
        for tail in enumerate_forward_chain(chart, e, &sets[1..]) {
            let mut seq = vec![(handle, concrete.clone(), s, e)];
            seq.extend(tail);
            results.push(seq);
        }
    }
    results
}

/// All ways to match `sets_reversed` (the desired left-to-right sets,
/// reversed so the slot closest to `end` comes first) ending at `end`,
/// returned in left-to-right order. Returns `[[]]` when empty.
fn enumerate_backward_chain(chart: &Chart, end: usize, sets_reversed: &[Vec<Category>]) -> Vec<Vec<Component>> {
    if sets_reversed.is_empty() {
        return vec![Vec::new()];
    }
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for query in &sets_reversed[0] {
        for (concrete, start, handle) in chart.iter_backward_matches(end, query) {
            if seen.insert((handle, start)) {
                candidates.push((handle, concrete, start, end));
            }
        }
    }
    let mut results = Vec::new();
    for (handle, concrete, s, e) in candidates {
        for head in enumerate_backward_chain(chart, s, &sets_reversed[1..]) {
            let mut seq = head;
            seq.push((handle, concrete.clone(), s, e));
            results.push(seq);
        }
    }
    results
}

/// Chains of one or more `leadup` components ending at `pos`, in
/// left-to-right order; chains longer than one are only produced when
/// `allow_multiple` (the rule's `compound` flag).
fn backward_leadups(chart: &Chart, pos: usize, leadup: &[Category], allow_multiple: bool) -> Vec<Vec<Component>> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for query in leadup {
        for (concrete, start, handle) in chart.iter_backward_matches(pos, query) {
            if seen.insert((handle, start)) {
                candidates.push((handle, concrete, start, pos));
            }
        }
    }
    for (handle, concrete, start, end) in candidates {
        results.push(vec![(handle, concrete.clone(), start, end)]);
        if allow_multiple {
            for longer in backward_leadups(chart, start, leadup, allow_multiple) {
                let mut chain = longer;
                chain.push((handle, concrete.clone(), start, end));
                results.push(chain);
            }
        }
    }
    results
}

/// Forward completions of a conjunction rule's automaton starting at `pos`:
/// zero or more additional leadups (only if `rule.compound`), then exactly
/// one conjunction term, then exactly one followup term.
fn enumerate_conjunction_tail(chart: &Chart, pos: usize, rule: &ConjunctionRule) -> Vec<Vec<Component>> {
    let mut results = Vec::new();
    for query in &rule.conjunction {
        for (conj_cat, conj_end, conj_handle) in chart.iter_forward_matches(pos, query) {
            for query2 in &rule.followup {
                for (followup_cat, followup_end, followup_handle) in chart.iter_forward_matches(conj_end, query2) {
                    results.push(vec![
                        (conj_handle, conj_cat.clone(), pos, conj_end),
                        (followup_handle, followup_cat.clone(), conj_end, followup_end),
                    ]);
                }
            }
        }
    }
    if rule.compound {
        if let Some(leadup_cats) = &rule.leadup {
            for query in leadup_cats {
                for (concrete, end, handle) in chart.iter_forward_matches(pos, query) {
                    for tail in enumerate_conjunction_tail(chart, end, rule) {
                        let mut seq = vec![(handle, concrete.clone(), pos, end)];
                        seq.extend(tail);
                        results.push(seq);
                    }
                }
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::rules::LeafRule;
    use crate::symbol::Interner;
    use std::collections::BTreeSet;

    fn cat(interner: &Interner, name: &str) -> Category {
        Category::new(interner.intern(name), BTreeSet::new(), BTreeSet::new())
    }

    #[test]
    fn single_leaf_token_realizes_one_root() {
        let interner = Interner::new();
        let noun = cat(&interner, "noun");
        let rule = LeafRule::new_set(noun, ["cat".to_string()]);
        let model = Arc::new(ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap());
        let mut state = ParserState::new(model);
        state.add_token("cat", 0, 3);
        state.process_all(None);
        assert_eq!(state.roots().count(), 1);
    }

    #[test]
    fn unrecognized_token_realizes_no_roots() {
        let interner = Interner::new();
        let noun = cat(&interner, "noun");
        let rule = LeafRule::new_set(noun, ["cat".to_string()]);
        let model = Arc::new(ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap());
        let mut state = ParserState::new(model);
        state.add_token("xyzzy", 0, 5);
        state.process_all(None);
        assert_eq!(state.roots().count(), 0);
    }

    #[test]
    fn sequence_rule_combines_det_and_noun() {
        let interner = Interner::new();
        let det = cat(&interner, "det");
        let noun = cat(&interner, "noun");
        let np = cat(&interner, "NP");
        let det_rule = LeafRule::new_set(det.clone(), ["the".to_string()]);
        let noun_rule = LeafRule::new_set(noun.clone(), ["cat".to_string()]);
        let seq = SequenceRule::new(np.clone(), vec![vec![det], vec![noun]], 1, vec![]).unwrap();
        let model = Arc::new(
            ModelConfig::new()
                .with_primary_leaf_rule(det_rule)
                .with_primary_leaf_rule(noun_rule)
                .with_sequence_rule(seq)
                .build(interner)
                .unwrap(),
        );
        let mut state = ParserState::new(model);
        state.add_token("the", 0, 3);
        state.add_token("cat", 4, 7);
        state.process_all(None);

        let roots: Vec<SetHandle> = state.roots().collect();
        assert_eq!(roots.len(), 1);
        let set = state.forest().set(roots[0]);
        assert_eq!(set.start, 0);
        assert_eq!(set.end, 2);
        assert_eq!(set.category.name(), np.name());
    }

    #[test]
    fn conjunction_rule_assembles_single_coordination() {
        let interner = Interner::new();
        let noun = cat(&interner, "noun");
        let conj = cat(&interner, "conj");
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
        state.add_token("cats", 0, 4);
        state.add_token("and", 5, 8);
        state.add_token("dogs", 9, 13);
        state.process_all(None);

        let roots: Vec<SetHandle> = state.roots().collect();
        let whole_span = roots.into_iter().find(|&r| {
            let set = state.forest().set(r);
            set.start == 0 && set.end == 3
        });
        assert!(whole_span.is_some());
    }
}
