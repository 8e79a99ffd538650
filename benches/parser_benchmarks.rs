use std::collections::BTreeSet;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pyramid_parse::category::Category;
use pyramid_parse::model::{Model, ModelConfig};
use pyramid_parse::parser;
use pyramid_parse::rules::{LeafRule, LinkType, SequenceRule};
use pyramid_parse::scheduler::ParserState;
use pyramid_parse::symbol::Interner;

/// A small English fragment: determiners, nouns, transitive/intransitive
/// verbs, and the NP/VP/S sequence rules that assemble them.
fn setup_english_model() -> Model {
    let interner = Interner::new();

    let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
    let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
    let verb = Category::new(interner.intern("verb"), BTreeSet::new(), BTreeSet::new());
    let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
    let vp = Category::new(interner.intern("VP"), BTreeSet::new(), BTreeSet::new());
    let s = Category::new(interner.intern("S"), BTreeSet::new(), BTreeSet::new());

    let det_rule = LeafRule::new_set(det.clone(), ["the".to_string(), "a".to_string()]);
    let noun_rule = LeafRule::new_set(noun.clone(), ["cat".to_string(), "dog".to_string(), "man".to_string()]);
    let verb_rule = LeafRule::new_set(verb.clone(), ["sleeps".to_string(), "sees".to_string(), "chases".to_string()]);

    let subject_head = interner.intern("subject");
    let np_rule = SequenceRule::new(
        np.clone(),
        vec![vec![det], vec![noun.clone()]],
        1,
        vec![vec![LinkType {
            label: subject_head,
            left: true,
            right: false,
        }]],
    )
    .unwrap();

    let vp_rule = SequenceRule::new(vp.clone(), vec![vec![verb], vec![np.clone()]], 0, vec![vec![]]).unwrap();
    let s_rule = SequenceRule::new(s, vec![vec![np], vec![vp]], 1, vec![vec![]]).unwrap();

    ModelConfig::new()
        .with_primary_leaf_rule(det_rule)
        .with_primary_leaf_rule(noun_rule)
        .with_primary_leaf_rule(verb_rule)
        .with_sequence_rule(np_rule)
        .with_sequence_rule(vp_rule)
        .with_sequence_rule(s_rule)
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

fn bench_parsing(c: &mut Criterion) {
    let model = Arc::new(setup_english_model());
    let simple = tokenize("the cat sleeps");
    let complex = tokenize("the dog chases the cat");

    let mut group = c.benchmark_group("parsing");

    group.bench_function("simple sentence, exhaustive", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            parser::parse(black_box(simple.clone()), &mut state, false, None)
        })
    });

    group.bench_function("complex sentence, exhaustive", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            parser::parse(black_box(complex.clone()), &mut state, false, None)
        })
    });

    group.bench_function("complex sentence, fast (necessary-only)", |b| {
        b.iter(|| {
            let mut state = ParserState::new(Arc::clone(&model));
            parser::parse(black_box(complex.clone()), &mut state, true, None)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parsing);
criterion_main!(benches);
