//! Generation: inverting a semantic graph back into candidate surface
//! trees.
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::category::Category;
use crate::graph::ParseGraph;
use crate::model::{Model, RuleHandle};

/// One candidate derivation produced during generation: a leaf (`rule`
/// identifies a leaf rule, `components` empty) or a branch assembled from
/// successor candidates.
#[derive(Debug, Clone)]
pub struct GenTree {
    pub category: Category,
    pub rule: RuleHandle,
    pub head_token: usize,
    /// Every token index this subtree's leaves cover, used to reject
    /// overlapping component combinations.
    pub covered: BTreeSet<usize>,
    pub components: Vec<GenTree>,
}

/// How a candidate top-level tree was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Rooted at the graph's root with a category subsumed by the root
    /// category: a proper generation result.
    Result,
    /// A full tree, but not rooted correctly: kept as a fallback.
    Backup,
    /// Covers less than the whole graph: the last-resort fallback.
    Emergency,
}

pub struct GenerationOutcome {
    pub results: Vec<GenTree>,
    pub backups: Vec<GenTree>,
    pub emergency: Vec<GenTree>,
}

impl GenerationOutcome {
    /// Results if non-empty, else backups, else emergency candidates:
    /// "return results, else backups, else emergency".
    pub fn best(&self) -> &[GenTree] {
        if !self.results.is_empty() {
            &self.results
        } else if !self.backups.is_empty() {
            &self.backups
        } else {
            &self.emergency
        }
    }
}

/// Generate candidate surface trees whose extraction (`crate::graph`) would
/// reproduce `graph`, or the best available relaxation.
pub fn generate(graph: &ParseGraph, model: &Model) -> GenerationOutcome {
    let mut cache = HashMap::new();
    let mut in_progress = HashSet::new();
    let candidates = gen_node(graph.root, graph, model, &mut cache, &mut in_progress);

    let total_tokens: BTreeSet<usize> = graph.tokens.iter().map(|t| t.index).collect();
    let root_category = graph.root_category();

    let mut results = Vec::new();
    let mut backups = Vec::new();
    let mut emergency = Vec::new();
    for candidate in candidates {
        let full_coverage = candidate.covered == total_tokens;
        let matches_root = root_category.is_some_and(|rc| rc.subsumes(&candidate.category));
        if full_coverage && matches_root {
            results.push(candidate.clone());
        } else if full_coverage {
            backups.push(candidate.clone());
        }
        emergency.push(candidate);
    }
    GenerationOutcome { results, backups, emergency }
}

fn neighbors(node: usize, graph: &ParseGraph) -> Vec<usize> {
    let mut set = BTreeSet::new();
    if let Some(sinks) = graph.forward.get(&node) {
        set.extend(sinks.keys().copied());
    }
    if let Some(sources) = graph.reverse.get(&node) {
        set.extend(sources.keys().copied());
    }
    set.into_iter().collect()
}

fn edge_label_between(graph: &ParseGraph, a: usize, b: usize) -> Option<crate::symbol::Symbol> {
    graph
        .forward
        .get(&a)
        .and_then(|sinks| sinks.get(&b))
        .and_then(|labels| labels.iter().next())
        .or_else(|| graph.forward.get(&b).and_then(|sinks| sinks.get(&a)).and_then(|labels| labels.iter().next()))
        .copied()
}

fn gen_node(
    node: usize,
    graph: &ParseGraph,
    model: &Model,
    cache: &mut HashMap<usize, Vec<GenTree>>,
    in_progress: &mut HashSet<usize>,
) -> Vec<GenTree> {
    if let Some(cached) = cache.get(&node) {
        return cached.clone();
    }
    if !in_progress.insert(node) {
        // cycle: break recursion here, relying on sibling expansion elsewhere.
        return Vec::new();
    }

    let token = &graph.tokens[node];
    let target = token.category.clone();
    let spelling = token.spelling.clone();
    let span = token.span;

    let mut candidates: Vec<GenTree> = Vec::new();
    let (case_positive, case_negative) = model.standard_properties.discover_case_properties(&spelling);
    let mut matched_primary = false;
    for (i, rule) in model.primary_leaf_rules().iter().enumerate() {
        let leaf = rule.as_leaf().expect("primary_leaf_rules holds only Leaf rules");
        if leaf.contains(&spelling, &case_positive) {
            let promoted = leaf.category.promote(&case_positive, &case_negative);
            let category = model.extend_category_properties(&promoted);
            if target.subsumes(&category) {
                matched_primary = true;
                candidates.push(GenTree {
                    category,
                    rule: RuleHandle::PrimaryLeaf(i),
                    head_token: span.0,
                    covered: [node].into_iter().collect(),
                    components: Vec::new(),
                });
            }
        }
    }
    if !matched_primary {
        for (i, rule) in model.secondary_leaf_rules().iter().enumerate() {
            let leaf = rule.as_leaf().expect("secondary_leaf_rules holds only Leaf rules");
            if leaf.contains(&spelling, &case_positive) {
                let promoted = leaf.category.promote(&case_positive, &case_negative);
                let category = model.extend_category_properties(&promoted);
                if target.subsumes(&category) {
                    candidates.push(GenTree {
                        category,
                        rule: RuleHandle::SecondaryLeaf(i),
                        head_token: span.0,
                        covered: [node].into_iter().collect(),
                        components: Vec::new(),
                    });
                }
            }
        }
    }

    let neighbor_candidates: HashMap<usize, Vec<GenTree>> =
        neighbors(node, graph).into_iter().map(|m| (m, gen_node(m, graph, model, cache, in_progress))).collect();

    for (branch_idx, rule) in model.branch_rules().iter().enumerate() {
        if let Some(seq) = rule.as_sequence() {
            for head_candidate in candidates.clone() {
                if !seq.subcategory_sets[seq.head_index].iter().any(|c| c.subsumes(&head_candidate.category)) {
                    continue;
                }
                let combos = assemble_sequence(branch_idx, seq, model, &head_candidate, node, graph, &neighbor_candidates);
                candidates.extend(combos);
            }
        } else if let Some(conj) = rule.as_conjunction() {
            let combos = assemble_conjunction(branch_idx, conj, model, &target, &neighbor_candidates);
            candidates.extend(combos);
        }
    }

    in_progress.remove(&node);
    cache.insert(node, candidates.clone());
    candidates
}

/// Fill every non-head slot of `seq` around `head_candidate`, restricting
/// each slot's admissible fillers by the graph's actual edges when `seq`
/// publishes link types for that gap, else accepting any category-subsuming
/// neighbor candidate.
fn assemble_sequence(
    branch_idx: usize,
    seq: &crate::rules::SequenceRule,
    model: &Model,
    head_candidate: &GenTree,
    head_node: usize,
    graph: &ParseGraph,
    neighbor_candidates: &HashMap<usize, Vec<GenTree>>,
) -> Vec<GenTree> {
    let n_slots = seq.subcategory_sets.len();
    let mut per_slot: Vec<Vec<GenTree>> = Vec::with_capacity(n_slots);

    for slot in 0..n_slots {
        if slot == seq.head_index {
            per_slot.push(vec![head_candidate.clone()]);
            continue;
        }
        let gap = if slot < seq.head_index { slot } else { slot - 1 };
        let link_types = seq.link_type_sets.get(gap);
        let mut pool = Vec::new();
        for (&neighbor, neighbor_trees) in neighbor_candidates {
            if let Some(links) = link_types {
                if links.is_empty() {
                    // no declared label: unrestricted by edges, subsumption only.
                } else {
                    let label = edge_label_between(graph, head_node, neighbor);
                    let matches_label = label.is_some_and(|l| links.iter().any(|lt| lt.label == l));
                    if !matches_label {
                        continue;
                    }
                }
            }
            for tree in neighbor_trees {
                if seq.subcategory_sets[slot].iter().any(|c| c.subsumes(&tree.category)) {
                    pool.push(tree.clone());
                }
            }
        }
        if pool.is_empty() {
            return Vec::new();
        }
        pool.truncate(4);
        per_slot.push(pool);
    }

    let combos = cross_product(&per_slot);
    let mut results = Vec::new();
    for components in combos.into_iter().take(8) {
        if components_overlap(&components) {
            continue;
        }
        let component_categories: Vec<Category> = components.iter().map(|c| c.category.clone()).collect();
        let category = seq.get_category(&component_categories, model.any_promoted(), model.all_promoted());
        let mut covered = BTreeSet::new();
        for c in &components {
            covered.extend(c.covered.iter().copied());
        }
        results.push(GenTree {
            category,
            rule: RuleHandle::Branch(branch_idx),
            head_token: head_candidate.head_token,
            covered,
            components,
        });
    }
    results
}

/// Fill a conjunction rule's slots purely by category subsumption against
/// the target category.
fn assemble_conjunction(
    branch_idx: usize,
    conj: &crate::rules::ConjunctionRule,
    model: &Model,
    target: &Category,
    neighbor_candidates: &HashMap<usize, Vec<GenTree>>,
) -> Vec<GenTree> {
    let leadup = conj.leadup.clone().unwrap_or_default();
    let mut shapes: Vec<&Category> = Vec::new();
    shapes.extend(leadup.iter());
    shapes.extend(conj.conjunction.iter());
    shapes.extend(conj.followup.iter());
    if shapes.is_empty() {
        return Vec::new();
    }

    let all_candidates: Vec<&GenTree> = neighbor_candidates.values().flatten().collect();
    let mut per_slot: Vec<Vec<GenTree>> = Vec::with_capacity(shapes.len());
    for shape in &shapes {
        let mut pool: Vec<GenTree> = all_candidates.iter().filter(|c| target.subsumes(&c.category)).map(|c| (*c).clone()).collect();
        if pool.is_empty() {
            pool = all_candidates.iter().filter(|c| shape.subsumes(&c.category)).map(|c| (*c).clone()).collect();
        }
        if pool.is_empty() {
            return Vec::new();
        }
        pool.truncate(3);
        per_slot.push(pool);
    }

    let head_index = leadup.len();
    let combos = cross_product(&per_slot);
    let mut results = Vec::new();
    for components in combos.into_iter().take(6) {
        if components_overlap(&components) {
            continue;
        }
        let component_categories: Vec<Category> = components.iter().map(|c| c.category.clone()).collect();
        if !conj.matches(&component_categories, head_index) {
            continue;
        }
        let category = conj.get_category(
            &component_categories,
            head_index,
            model.any_promoted(),
            model.all_promoted(),
            &model.standard_properties,
        );
        let mut covered = BTreeSet::new();
        for c in &components {
            covered.extend(c.covered.iter().copied());
        }
        results.push(GenTree {
            category,
            rule: RuleHandle::Branch(branch_idx),
            head_token: components[head_index].head_token,
            covered,
            components,
        });
    }
    results
}

fn components_overlap(components: &[GenTree]) -> bool {
    let mut seen = BTreeSet::new();
    for c in components {
        for &t in &c.covered {
            if !seen.insert(t) {
                return true;
            }
        }
    }
    false
}

fn cross_product(slots: &[Vec<GenTree>]) -> Vec<Vec<GenTree>> {
    let mut results: Vec<Vec<GenTree>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::new();
        for prefix in &results {
            for candidate in slot {
                let mut extended = prefix.clone();
                extended.push(candidate.clone());
                next.push(extended);
            }
        }
        results = next;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use crate::forest::{Forest, NewNode, ParseTree};
    use crate::model::ModelConfig;
    use crate::parser;
    use crate::rules::{LeafRule, SequenceRule};
    use crate::scheduler::ParserState;
    use crate::symbol::Interner;
    use crate::tokens::TokenSequence;
    use std::sync::Arc;

    #[test]
    fn generates_a_matching_leaf_for_a_single_token_graph() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(noun.clone(), ["cat".to_string()]);
        let model = ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap();
        let tokens = TokenSequence::from_tokens([("cat".to_string(), 0, 3)]);
        let mut forest = Forest::new();
        let mut chart = Chart::new();
        let outcome = forest.add(
            &mut chart,
            &model,
            &tokens,
            NewNode {
                rule: RuleHandle::PrimaryLeaf(0),
                head_index: 0,
                category: noun,
                start: 0,
                end: 1,
                components: vec![],
            },
        );
        let tree = ParseTree::new(outcome.set_handle().unwrap());
        let graph = crate::graph::extract_graph(&tree, &forest, &tokens, &model);
        let generated = generate(&graph, &model);
        assert!(!generated.best().is_empty());
        assert!(matches!(generated.results.first(), Some(_)) || !generated.emergency.is_empty());
    }

    #[test]
    fn generation_inverts_extraction_for_a_branch_derivation() {
        // Extracting the semantic graph from a parsed NP, then generating
        // surface trees back from that graph, should recover a candidate
        // rooted at the same category and covering the same tokens.
        let interner = Interner::new();
        let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
        let det_rule = LeafRule::new_set(det.clone(), ["the".to_string()]);
        let noun_rule = LeafRule::new_set(noun.clone(), ["cat".to_string()]);
        let seq = SequenceRule::new(np, vec![vec![det], vec![noun]], 1, vec![]).unwrap();

        let model = Arc::new(
            ModelConfig::new()
                .with_primary_leaf_rule(det_rule)
                .with_primary_leaf_rule(noun_rule)
                .with_sequence_rule(seq)
                .build(interner)
                .unwrap(),
        );
        let mut state = ParserState::new(model);
        let parse = parser::parse(
            vec![("the".to_string(), 0, 3), ("cat".to_string(), 4, 7)],
            &mut state,
            false,
            None,
        );
        assert_eq!(parse.trees.len(), 1);

        let extracted = crate::graph::extract_graph(&parse.trees[0], state.forest(), state.tokens(), state.model());
        let generated = generate(&extracted, state.model());

        let best = generated.best();
        assert!(!best.is_empty());
        let covered_both_tokens = best.iter().any(|t| t.covered.len() == 2);
        assert!(covered_both_tokens, "some generated candidate should cover both tokens");
    }
}
