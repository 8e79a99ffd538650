//! The parsing driver: token ingestion plus the `fast`/exhaustive agenda
//! choice.

use std::time::Instant;

use crate::forest::Parse;
use crate::scheduler::ParserState;

/// `parse(tokens, state, fast, deadline)`: ingest every token (firing leaf
/// rules as each arrives), run the agenda to either the first necessary
/// covering (`fast`) or exhaustion, then snapshot the root set.
///
/// `tokens` is accepted as any iterable of `(spelling, start_char,
/// end_char)` triples -- tokenization itself is this crate's caller's
/// concern.
pub fn parse<I>(tokens: I, state: &mut ParserState, fast: bool, deadline: Option<Instant>) -> Parse
where
    I: IntoIterator<Item = (String, usize, usize)>,
{
    for (spelling, start, end) in tokens {
        state.add_token(spelling, start, end);
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return state.snapshot(true);
        }
    }
    let timed_out = if fast {
        state.process_necessary(deadline)
    } else {
        state.process_all(deadline)
    };
    state.snapshot(timed_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::model::ModelConfig;
    use crate::rules::{LeafRule, SequenceRule};
    use crate::symbol::Interner;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn empty_input_yields_empty_parse_with_no_gaps() {
        let interner = Interner::new();
        let model = Arc::new(ModelConfig::new().build(interner).unwrap());
        let mut state = ParserState::new(model);
        let result = parse(Vec::<(String, usize, usize)>::new(), &mut state, false, None);
        assert!(result.trees.is_empty());
        assert_eq!(result.total_gap_size(state.forest()), 0);
        assert!(!result.timed_out);
    }

    #[test]
    fn single_leaf_match_has_no_gap() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(noun, ["cat".to_string()]);
        let model = Arc::new(ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap());
        let mut state = ParserState::new(model);
        let result = parse(vec![("cat".to_string(), 0, 3)], &mut state, false, None);
        assert_eq!(result.trees.len(), 1);
        assert_eq!(result.total_gap_size(state.forest()), 0);
    }

    #[test]
    fn single_unrecognized_token_leaves_a_gap() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let rule = LeafRule::new_set(noun, ["cat".to_string()]);
        let model = Arc::new(ModelConfig::new().with_primary_leaf_rule(rule).build(interner).unwrap());
        let mut state = ParserState::new(model);
        let result = parse(vec![("xyzzy".to_string(), 0, 5)], &mut state, false, None);
        assert!(result.trees.is_empty());
        assert_eq!(result.total_gap_size(state.forest()), 1);
    }

    #[test]
    fn sequence_rule_assembles_a_whole_span_np_headed_at_the_noun() {
        let interner = Interner::new();
        let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());

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
        let result = parse(
            vec![("the".to_string(), 0, 3), ("cat".to_string(), 4, 7)],
            &mut state,
            false,
            None,
        );

        assert_eq!(result.trees.len(), 1);
        let tree = result.trees[0];
        assert_eq!(tree.span(state.forest()), (0, 2));
        assert_eq!(tree.category(state.forest()).name(), np.name());

        let root_set = state.forest().set(tree.root);
        let best_node = state.forest().node(root_set.best);
        assert_eq!(best_node.head_index, 1);
        assert_eq!(best_node.components.len(), 2);
    }
}
