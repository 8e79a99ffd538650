//! Semantic graph extraction: walking a disambiguated Parse into a directed,
//! labeled graph over token positions.
use std::collections::{BTreeSet, HashMap};

use crate::category::Category;
use crate::forest::{Forest, NodeHandle, ParseTree};
use crate::model::Model;
use crate::rules::LinkType;
use crate::symbol::{Interner, Symbol};
use crate::tokens::TokenSequence;

/// Observes the depth-first, best-first traversal of a disambiguated
/// ParseTree. Alternative consumers (tests, future visualization) can
/// implement this without depending on [`ParseGraph`]'s concrete shape.
pub trait Visitor {
    fn handle_root(&mut self, head_token: usize);
    fn handle_token(&mut self, index: usize, spelling: &str, span: (usize, usize), category: &Category);
    fn handle_phrase_start(&mut self, head_token: usize, category: &Category);
    fn handle_link(&mut self, source: usize, sink: usize, label: Symbol, left: bool, right: bool);
    fn handle_phrase_end(&mut self, head_token: usize, category: &Category);
    fn handle_tree_end(&mut self);
}

/// Needs-sources still unresolved at the point a subtree's traversal
/// finished, keyed by link label, bubbling up to whichever ancestor phrase
/// carries the matching `needs_L`/`takes_L` property.
type Pending = HashMap<Symbol, usize>;

fn prefixed(interner: &Interner, prefix: &str, label: Symbol) -> Symbol {
    interner.intern(&format!("{prefix}{}", interner.resolve(label)))
}

fn needs_label(category: &Category, interner: &Interner, label: Symbol) -> bool {
    let needs = prefixed(interner, "needs_", label);
    let takes = prefixed(interner, "takes_", label);
    category.positive_properties().contains(&needs) || category.positive_properties().contains(&takes)
}

/// Every `needs_L`/`takes_L` property carried by `category`, with the
/// prefix stripped back to the bare link label.
fn own_needs(category: &Category, interner: &Interner) -> Vec<Symbol> {
    category
        .positive_properties()
        .iter()
        .filter_map(|&prop| {
            let name = interner.resolve(prop);
            name.strip_prefix("needs_").or_else(|| name.strip_prefix("takes_")).map(|label| interner.intern(label))
        })
        .collect()
}

/// Link types associated with a non-head component, for the two branch
/// rule shapes and their link-type-set layout.
fn link_types_for<'a>(rule: &'a crate::rules::Rule, head_index: usize, component_index: usize) -> &'a [LinkType] {
    match rule {
        crate::rules::Rule::Sequence(seq) => {
            let gap = if component_index < head_index { component_index } else { component_index - 1 };
            seq.link_type_sets.get(gap).map(Vec::as_slice).unwrap_or(&[])
        }
        crate::rules::Rule::Conjunction(conj) => {
            if component_index < head_index {
                &conj.leadup_link_types
            } else {
                &conj.followup_link_types
            }
        }
        crate::rules::Rule::Leaf(_) => &[],
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    forest: &Forest,
    tokens: &TokenSequence,
    model: &Model,
    interner: &Interner,
    handle: NodeHandle,
    visitor: &mut dyn Visitor,
) -> (usize, Pending) {
    let node = forest.node(handle);
    if node.components.is_empty() {
        let head_token = node.start;
        visitor.handle_token(head_token, tokens.spelling(head_token), (node.start, node.end), &node.category);
        let mut pending = Pending::new();
        for label in own_needs(&node.category, interner) {
            pending.insert(label, head_token);
        }
        return (head_token, pending);
    }

    let rule = model.rule(node.rule);
    let head_index = node.head_index;
    let head_component_handle = forest.set(node.components[head_index]).best;
    let (head_token, mut pending) = walk(forest, tokens, model, interner, head_component_handle, visitor);

    visitor.handle_phrase_start(head_token, &node.category);

    for (i, &component) in node.components.iter().enumerate() {
        if i == head_index {
            continue;
        }
        let component_handle = forest.set(component).best;
        let (component_token, child_pending) = walk(forest, tokens, model, interner, component_handle, visitor);
        pending.extend(child_pending);

        for link in link_types_for(rule, head_index, i) {
            let label = link.label;
            let invert = interner.resolve(label).ends_with("_of");
            let redirected = if needs_label(&node.category, interner, label) { pending.remove(&label) } else { None };
            let (direct_source, direct_sink) = (component_token, head_token);
            let (source, sink) = match (redirected, invert) {
                (Some(source_token), false) => (source_token, head_token),
                (Some(source_token), true) => (head_token, source_token),
                (None, false) => (direct_source, direct_sink),
                (None, true) => (direct_sink, direct_source),
            };
            visitor.handle_link(source, sink, label, link.left, link.right);
        }
    }

    for label in own_needs(&node.category, interner) {
        pending.entry(label).or_insert(head_token);
    }

    visitor.handle_phrase_end(head_token, &node.category);
    (head_token, pending)
}

/// One token as recorded in a [`ParseGraph`].
#[derive(Debug, Clone)]
pub struct GraphToken {
    pub index: usize,
    pub spelling: String,
    pub span: (usize, usize),
    pub category: Category,
}

/// The extracted semantic graph for a single ParseTree: a rooted, directed,
/// labeled, potentially cyclic graph over token positions.#[derive(Debug, Clone)]
pub struct ParseGraph {
    pub root: usize,
    pub tokens: Vec<GraphToken>,
    pub forward: HashMap<usize, HashMap<usize, BTreeSet<Symbol>>>,
    pub reverse: HashMap<usize, HashMap<usize, BTreeSet<Symbol>>>,
    /// Every phrase headed at a token, narrowest (leaf) to widest.
    pub phrases: HashMap<usize, Vec<(Category, BTreeSet<(usize, usize)>)>>,
}

impl ParseGraph {
    /// The outermost (widest) phrase category recorded at the root token.
    pub fn root_category(&self) -> Option<&Category> {
        self.phrases.get(&self.root).and_then(|levels| levels.last()).map(|(category, _)| category)
    }
}

#[derive(Default)]
struct GraphBuilder {
    root: Option<usize>,
    tokens: HashMap<usize, GraphToken>,
    forward: HashMap<usize, HashMap<usize, BTreeSet<Symbol>>>,
    phrase_stack: Vec<(usize, Category, BTreeSet<(usize, usize)>)>,
    phrases: HashMap<usize, Vec<(Category, BTreeSet<(usize, usize)>)>>,
}

impl Visitor for GraphBuilder {
    fn handle_root(&mut self, head_token: usize) {
        self.root = Some(head_token);
    }

    fn handle_token(&mut self, index: usize, spelling: &str, span: (usize, usize), category: &Category) {
        self.tokens.entry(index).or_insert_with(|| GraphToken {
            index,
            spelling: spelling.to_string(),
            span,
            category: category.clone(),
        });
    }

    fn handle_phrase_start(&mut self, head_token: usize, category: &Category) {
        self.phrase_stack.push((head_token, category.clone(), BTreeSet::new()));
    }

    fn handle_link(&mut self, source: usize, sink: usize, label: Symbol, _left: bool, _right: bool) {
        self.forward.entry(source).or_default().entry(sink).or_default().insert(label);
        if let Some((_, _, links)) = self.phrase_stack.last_mut() {
            links.insert((source, sink));
        }
    }

    fn handle_phrase_end(&mut self, _head_token: usize, _category: &Category) {
        if let Some((head_token, category, links)) = self.phrase_stack.pop() {
            self.phrases.entry(head_token).or_default().push((category, links));
        }
    }

    fn handle_tree_end(&mut self) {}
}

impl GraphBuilder {
    fn into_graph(self) -> ParseGraph {
        let mut tokens: Vec<GraphToken> = self.tokens.into_values().collect();
        tokens.sort_by_key(|t| t.index);
        let mut reverse: HashMap<usize, HashMap<usize, BTreeSet<Symbol>>> = HashMap::new();
        for (&source, sinks) in &self.forward {
            for (&sink, labels) in sinks {
                reverse.entry(sink).or_default().entry(source).or_default().extend(labels.iter().copied());
            }
        }
        ParseGraph {
            root: self.root.unwrap_or(0),
            tokens,
            forward: self.forward,
            reverse,
            phrases: self.phrases,
        }
    }
}

/// Extract the semantic graph for a single disambiguated ParseTree
///.pub fn extract_graph(tree: &ParseTree, forest: &Forest, tokens: &TokenSequence, model: &Model) -> ParseGraph {
    let mut builder = GraphBuilder::default();
    let root_handle = forest.set(tree.root).best;
    let (head_token, _) = walk(forest, tokens, model, &model.interner, root_handle, &mut builder);
    builder.handle_root(head_token);
    builder.handle_tree_end();
    builder.into_graph()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use crate::forest::NewNode;
    use crate::model::{ModelConfig, RuleHandle};
    use crate::rules::LeafRule;
    use crate::rules::sequence::SequenceRule;

    #[test]
    fn single_leaf_graph_has_itself_as_root() {
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
        let graph = extract_graph(&tree, &forest, &tokens, &model);
        assert_eq!(graph.root, 0);
        assert_eq!(graph.tokens.len(), 1);
        assert!(graph.phrases.get(&0).is_none());
    }

    #[test]
    fn sequence_phrase_links_dependent_to_head() {
        let interner = Interner::new();
        let det = Category::new(interner.intern("det"), BTreeSet::new(), BTreeSet::new());
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let np = Category::new(interner.intern("NP"), BTreeSet::new(), BTreeSet::new());
        let link = interner.intern("mod");
        let seq = SequenceRule::new(
            np,
            vec![vec![det.clone()], vec![noun.clone()]],
            1,
            vec![vec![LinkType { label: link, left: true, right: false }]],
        )
        .unwrap();
        let det_rule = LeafRule::new_set(det.clone(), ["the".to_string()]);
        let noun_rule = LeafRule::new_set(noun.clone(), ["cat".to_string()]);
        let model = ModelConfig::new()
            .with_primary_leaf_rule(det_rule)
            .with_primary_leaf_rule(noun_rule)
            .with_sequence_rule(seq)
            .build(interner)
            .unwrap();
        let tokens = TokenSequence::from_tokens([("the".to_string(), 0, 3), ("cat".to_string(), 4, 7)]);
        let mut forest = Forest::new();
        let mut chart = Chart::new();

        let det_outcome = forest.add(
            &mut chart,
            &model,
            &tokens,
            NewNode {
                rule: RuleHandle::PrimaryLeaf(0),
                head_index: 0,
                category: det,
                start: 0,
                end: 1,
                components: vec![],
            },
        );
        let noun_outcome = forest.add(
            &mut chart,
            &model,
            &tokens,
            NewNode {
                rule: RuleHandle::PrimaryLeaf(1),
                head_index: 0,
                category: noun,
                start: 1,
                end: 2,
                components: vec![],
            },
        );
        let np_category = model.rule(RuleHandle::Branch(0)).category().clone();
        let np_outcome = forest.add(
            &mut chart,
            &model,
            &tokens,
            NewNode {
                rule: RuleHandle::Branch(0),
                head_index: 1,
                category: np_category,
                start: 0,
                end: 2,
                components: vec![det_outcome.set_handle().unwrap(), noun_outcome.set_handle().unwrap()],
            },
        );
        let tree = ParseTree::new(np_outcome.set_handle().unwrap());
        let graph = extract_graph(&tree, &forest, &tokens, &model);
        assert_eq!(graph.root, 1);
        assert_eq!(graph.tokens.len(), 2);
        assert!(graph.forward.get(&0).and_then(|sinks| sinks.get(&1)).is_some_and(|labels| labels.contains(&link)));
        let phrase_levels = graph.phrases.get(&1).unwrap();
        assert_eq!(phrase_levels.len(), 1);
        assert_eq!(phrase_levels[0].1.len(), 1);
    }
}
