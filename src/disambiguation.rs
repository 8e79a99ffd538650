//! Disambiguation: selecting non-overlapping covering subsets of a Parse's
//! root trees, ranked, plus a greedy single-result fallback.
use std::collections::HashMap;
use std::time::Instant;

use ordered_float::OrderedFloat;

use crate::forest::{Forest, Parse, ParseTree};

/// A disambiguation's rank: lexicographic `(total_gap_size, piece_count,
/// -score, -weight)`, smaller is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rank {
    pub total_gap_size: usize,
    pub piece_count: usize,
    pub score: f64,
    pub weight: f64,
}

impl Rank {
    fn key(&self) -> (usize, usize, OrderedFloat<f64>, OrderedFloat<f64>) {
        (self.total_gap_size, self.piece_count, OrderedFloat(-self.score), OrderedFloat(-self.weight))
    }
}

fn rank_of(trees: &[ParseTree], forest: &Forest, n: usize) -> Rank {
    let covered: usize = trees.iter().map(|t| t.span(forest)).map(|(s, e)| e - s).sum();
    let (score, weight) = trees.iter().fold((0.0, 0.0), |(s, w), t| (s + t.score(forest), w + t.weight(forest)));
    Rank {
        total_gap_size: n.saturating_sub(covered),
        piece_count: trees.len(),
        score,
        weight,
    }
}

/// The result of a full enumeration: every disambiguation found at the
/// first non-empty `(gaps, pieces)` level, sorted by rank, plus whether the
/// search was cut short by `deadline`.
pub struct EnumerationOutcome {
    pub results: Vec<(Parse, Rank)>,
    pub timed_out: bool,
}

/// `get_sorted_disambiguations`: search increasing
/// `(gaps, pieces)` levels for the first that admits at least one
/// non-overlapping covering subset of `parse.trees`, then return every
/// such subset at that level, sorted by rank.
pub fn enumerate(parse: &Parse, forest: &Forest, deadline: Option<Instant>) -> EnumerationOutcome {
    let n = parse.tokens.len();
    let trees_by_start: HashMap<usize, Vec<&ParseTree>> = {
        let mut map: HashMap<usize, Vec<&ParseTree>> = HashMap::new();
        for tree in &parse.trees {
            let (start, _) = tree.span(forest);
            map.entry(start).or_default().push(tree);
        }
        map
    };

    let max_tree_width = parse
        .trees
        .iter()
        .map(|t| {
            let (s, e) = t.span(forest);
            e - s
        })
        .max()
        .unwrap_or(1)
        .max(1);
    let min_pieces = n / max_tree_width;

    for gaps in 0..=n {
        for pieces in min_pieces..=parse.trees.len() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return EnumerationOutcome { results: Vec::new(), timed_out: true };
            }
            let mut results: Vec<Vec<ParseTree>> = Vec::new();
            let mut chosen = Vec::new();
            let timed_out = walk(&trees_by_start, forest, n, 0, gaps, pieces, &mut chosen, &mut results, deadline);
            if timed_out {
                return EnumerationOutcome { results: Vec::new(), timed_out: true };
            }
            if !results.is_empty() {
                let mut ranked: Vec<(Parse, Rank)> = results
                    .into_iter()
                    .map(|trees| {
                        let rank = rank_of(&trees, forest, n);
                        let parse = Parse {
                            tokens: parse.tokens.clone(),
                            trees,
                            timed_out: false,
                        };
                        (parse, rank)
                    })
                    .collect();
                ranked.sort_by_key(|(_, rank)| rank.key());
                return EnumerationOutcome { results: ranked, timed_out: false };
            }
        }
    }
    EnumerationOutcome { results: Vec::new(), timed_out: false }
}

/// Depth-first walk over tree start positions, honoring the exact
/// remaining gap and piece budget (`iter_disambiguation_tails`). Returns
/// whether the walk aborted early due to `deadline`.
#[allow(clippy::too_many_arguments)]
fn walk(
    trees_by_start: &HashMap<usize, Vec<&ParseTree>>,
    forest: &Forest,
    n: usize,
    pos: usize,
    gaps_left: usize,
    pieces_left: usize,
    chosen: &mut Vec<ParseTree>,
    results: &mut Vec<Vec<ParseTree>>,
    deadline: Option<Instant>,
) -> bool {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return true;
    }
    if pos == n {
        if gaps_left == 0 && pieces_left == 0 {
            results.push(chosen.clone());
        }
        return false;
    }
    if gaps_left > 0 && walk(trees_by_start, forest, n, pos + 1, gaps_left - 1, pieces_left, chosen, results, deadline) {
        return true;
    }
    if pieces_left > 0 {
        if let Some(candidates) = trees_by_start.get(&pos) {
            for &tree in candidates {
                let (_, end) = tree.span(forest);
                chosen.push(*tree);
                let aborted = walk(trees_by_start, forest, n, end, gaps_left, pieces_left - 1, chosen, results, deadline);
                chosen.pop();
                if aborted {
                    return true;
                }
            }
        }
    }
    false
}

/// `disambiguate()`: the greedy single-result fallback, and
/// the implementation of "emergency disambiguation": score-descending
/// preference among candidates.
pub fn disambiguate(parse: &Parse, forest: &Forest) -> Parse {
    let mut candidates: Vec<&ParseTree> = parse.trees.iter().collect();
    candidates.sort_by(|a, b| {
        b.score(forest)
            .partial_cmp(&a.score(forest))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.weight(forest).partial_cmp(&a.weight(forest)).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut chosen = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();
    for &tree in &candidates {
        let (start, end) = tree.span(forest);
        if covered.iter().any(|&(cs, ce)| start < ce && cs < end) {
            continue;
        }
        covered.push((start, end));
        chosen.push(tree.clone());
    }
    Parse {
        tokens: parse.tokens.clone(),
        trees: chosen,
        timed_out: false,
    }
}

/// The outcome of disambiguating a single Parse: either the best ranked
/// covering found by full enumeration, or the greedy emergency fallback.
pub struct Disambiguation {
    pub parse: Parse,
    pub rank: Option<Rank>,
    /// Set when the full search found no proper covering (or timed out)
    /// and the greedy fallback was used instead.
    pub non_optimal: bool,
    pub timed_out: bool,
}

pub fn best_disambiguation(parse: &Parse, forest: &Forest, deadline: Option<Instant>) -> Disambiguation {
    let outcome = enumerate(parse, forest, deadline);
    if let Some((best_parse, rank)) = outcome.results.into_iter().next() {
        return Disambiguation {
            parse: best_parse,
            rank: Some(rank),
            non_optimal: false,
            timed_out: false,
        };
    }
    log::debug!("no proper disambiguation found; falling back to greedy emergency selection");
    Disambiguation {
        parse: disambiguate(parse, forest),
        rank: None,
        non_optimal: true,
        timed_out: outcome.timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::chart::Chart;
    use crate::forest::NewNode;
    use crate::model::{ModelConfig, RuleHandle};
    use crate::parser;
    use crate::rules::{LeafRule, SequenceRule};
    use crate::scheduler::ParserState;
    use crate::symbol::Interner;
    use crate::tokens::TokenSequence;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn empty_parse_has_zero_gaps_and_one_empty_disambiguation() {
        let interner = Interner::new();
        let model = ModelConfig::new().build(interner).unwrap();
        let tokens = TokenSequence::new();
        let forest = Forest::new();
        let parse = Parse {
            tokens,
            trees: Vec::new(),
            timed_out: false,
        };
        let _ = &model;
        let outcome = enumerate(&parse, &forest, None);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].1.total_gap_size, 0);
    }

    #[test]
    fn single_tree_is_its_own_best_disambiguation() {
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
        let set_handle = outcome.set_handle().unwrap();
        let parse = Parse {
            tokens,
            trees: vec![crate::forest::ParseTree::new(set_handle)],
            timed_out: false,
        };
        let result = best_disambiguation(&parse, &forest, None);
        assert_eq!(result.parse.trees.len(), 1);
        assert!(!result.non_optimal);
    }

    #[test]
    fn favored_sequence_rule_wins_ambiguity_ranking_after_feedback() {
        // Two distinct sequence rules both derive `X` from the same det/noun
        // pair. Their members land in the same chart NodeSet (identical span
        // + category); repeated positive feedback on one rule's derivation
        // must make it the set's best member, and therefore the returned
        // tree.
        let interner = Interner::new();
        let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let x = Category::new(interner.intern("X"), BTreeSet::new(), BTreeSet::new());

        let det_rule = LeafRule::new_set(det.clone(), ["the".to_string()]);
        let noun_rule = LeafRule::new_set(noun.clone(), ["cat".to_string()]);
        let favored = SequenceRule::new(x.clone(), vec![vec![det.clone()], vec![noun.clone()]], 1, vec![]).unwrap();
        let untouched = SequenceRule::new(x, vec![vec![det], vec![noun]], 1, vec![]).unwrap();

        let model = Arc::new(
            ModelConfig::new()
                .with_primary_leaf_rule(det_rule)
                .with_primary_leaf_rule(noun_rule)
                .with_sequence_rule(favored)
                .with_sequence_rule(untouched)
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
        assert_eq!(parse.trees.len(), 1, "both rules' derivations share one NodeSet");

        let root_set_handle = parse.trees[0].root;
        let favored_rule = RuleHandle::Branch(0);
        let favored_node_handle = {
            let set = state.forest().set(root_set_handle);
            *set
                .members
                .iter()
                .find(|&&m| state.forest().node(m).rule == favored_rule)
                .expect("favored rule's derivation is a member of the shared set")
        };

        let model = state.model_arc();
        let tokens = state.tokens().clone();
        for _ in 0..10 {
            state.forest_mut().adjust_score(&model, &tokens, favored_node_handle, 1.0).unwrap();
        }

        let disambiguated = disambiguate(&parse, state.forest());
        assert_eq!(disambiguated.trees.len(), 1);
        let winning_set = state.forest().set(disambiguated.trees[0].root);
        assert_eq!(state.forest().node(winning_set.best).rule, favored_rule);
    }
}
