use std::collections::BTreeSet;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pyramid_parse::category::Category;
use pyramid_parse::disambiguation;
use pyramid_parse::model::{Model, ModelConfig};
use pyramid_parse::parser;
use pyramid_parse::rules::{LeafRule, SequenceRule};
use pyramid_parse::scheduler::ParserState;
use pyramid_parse::symbol::Interner;

/// A grammar with a genuinely ambiguous noun-noun compound alongside the
/// determiner-noun `NP` rule, so the forest being disambiguated actually
/// has overlapping candidates to choose between.
fn setup_ambiguous_model() -> Model {
    let interner = Interner::new();

    let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
    let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
    let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());

    let det_rule = LeafRule::new_set(det.clone(), ["the".to_string(), "a".to_string()]);
    let noun_rule = LeafRule::new_set(
        noun.clone(),
        ["cat".to_string(), "dog".to_string(), "house".to_string(), "door".to_string()],
    );

    let det_noun_rule = SequenceRule::new(np.clone(), vec![vec![det], vec![noun.clone()]], 1, vec![vec![]]).unwrap();
    let compound_rule = SequenceRule::new(np, vec![vec![noun.clone()], vec![noun]], 1, vec![vec![]]).unwrap();

    ModelConfig::new()
        .with_primary_leaf_rule(det_rule)
        .with_primary_leaf_rule(noun_rule)
        .with_sequence_rule(det_noun_rule)
        .with_sequence_rule(compound_rule)
        .build(interner)
        .unwrap()
}

fn tokenize(sentence: &str) -> Vec<(String, usize, usize)> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for word in sentence.split_whitespace() {
        let start = sentence[cursor..].find(word).map(|i| cursor + i).unwrap_or(cursor);
        let end = start + word.len();
        cursor = end;
        tokens.push((word.to_string(), start, end));
    }
    tokens
}

fn bench_disambiguation(c: &mut Criterion) {
    let model = Arc::new(setup_ambiguous_model());
    let tokens = tokenize("the house door cat dog");

    let mut group = c.benchmark_group("disambiguation");

    group.bench_function("greedy disambiguate", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            let parse = parser::parse(black_box(tokens.clone()), &mut state, false, None);
            disambiguation::disambiguate(&parse, state.forest())
        })
    });

    group.bench_function("best_disambiguation (ranked enumeration)", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            let parse = parser::parse(black_box(tokens.clone()), &mut state, false, None);
            disambiguation::best_disambiguation(&parse, state.forest(), None)
        })
    });

    group.bench_function("enumerate (first non-empty rank level)", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            let parse = parser::parse(black_box(tokens.clone()), &mut state, false, None);
            disambiguation::enumerate(&parse, state.forest(), None)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_disambiguation);
criterion_main!(benches);
