//! The chart (category map): forward and backward indices over realized
//! spans.
//!
//! `start → name → category → end → NodeSet` and its mirror image
//! `end → name → category → start → NodeSet` are mutual inverses; every
//! `NodeSet` the forest allocates is recorded under exactly one
//! `(start, name, category, end)` key in both.

use std::collections::{HashMap, HashSet};

use crate::category::Category;
use crate::forest::SetHandle;
use crate::symbol::Symbol;

type Inner = HashMap<usize, HashMap<Symbol, HashMap<Category, HashMap<usize, SetHandle>>>>;

#[derive(Debug, Default)]
pub struct Chart {
    forward: Inner,
    backward: Inner,
    spans: HashSet<(usize, usize)>,
    max_end: usize,
}

impl Chart {
    pub fn new() -> Self {
        Chart::default()
    }

    /// Record `handle` under `(start, category.name(), category, end)` in
    /// both indices. Callers are expected to call this exactly once per
    /// newly allocated `NodeSet` (see [`crate::forest::Forest::add`]).
    pub fn insert(&mut self, start: usize, category: &Category, end: usize, handle: SetHandle) {
        self.forward
            .entry(start)
            .or_default()
            .entry(category.name())
            .or_default()
            .entry(category.clone())
            .or_default()
            .insert(end, handle);
        self.backward
            .entry(end)
            .or_default()
            .entry(category.name())
            .or_default()
            .entry(category.clone())
            .or_default()
            .insert(start, handle);
        self.spans.insert((start, end));
        self.max_end = self.max_end.max(end);
    }

    /// Exact lookup: is there already a `NodeSet` at this precise key?
    pub fn get(&self, start: usize, category: &Category, end: usize) -> Option<SetHandle> {
        self.forward.get(&start)?.get(&category.name())?.get(category)?.get(&end).copied()
    }

    /// `iter_forward_matches(start, query)`: every `(concrete_category,
    /// end, handle)` realized at `start` such that `query.subsumes(concrete)`.
    /// A wildcard `query` iterates every name realized at `start`.
    pub fn iter_forward_matches(&self, start: usize, query: &Category) -> Vec<(Category, usize, SetHandle)> {
        let mut results = Vec::new();
        let Some(by_name) = self.forward.get(&start) else {
            return results;
        };
        let names: Vec<Symbol> = if query.is_wildcard() {
            by_name.keys().copied().collect()
        } else {
            vec![query.name()]
        };
        for name in names {
            let Some(by_category) = by_name.get(&name) else { continue };
            for (concrete, by_end) in by_category {
                if !query.subsumes(concrete) {
                    continue;
                }
                for (&end, &handle) in by_end {
                    results.push((concrete.clone(), end, handle));
                }
            }
        }
        results
    }

    /// `iter_backward_matches(end, query)`: every `(concrete_category,
    /// start, handle)` realized ending at `end` such that
    /// `query.subsumes(concrete)`.
    pub fn iter_backward_matches(&self, end: usize, query: &Category) -> Vec<(Category, usize, SetHandle)> {
        let mut results = Vec::new();
        let Some(by_name) = self.backward.get(&end) else {
            return results;
        };
        let names: Vec<Symbol> = if query.is_wildcard() {
            by_name.keys().copied().collect()
        } else {
            vec![query.name()]
        };
        for name in names {
            let Some(by_category) = by_name.get(&name) else { continue };
            for (concrete, by_start) in by_category {
                if !query.subsumes(concrete) {
                    continue;
                }
                for (&start, &handle) in by_start {
                    results.push((concrete.clone(), start, handle));
                }
            }
        }
        results
    }

    pub fn has_span(&self, start: usize, end: usize) -> bool {
        self.spans.contains(&(start, end))
    }

    pub fn max_end(&self) -> usize {
        self.max_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Interner;
    use std::collections::BTreeSet;

    #[test]
    fn forward_and_backward_are_mutual_inverses() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let mut chart = Chart::new();
        chart.insert(0, &noun, 1, SetHandle::from_raw(0));

        let forward = chart.iter_forward_matches(0, &Category::wildcard());
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].1, 1);

        let backward = chart.iter_backward_matches(1, &Category::wildcard());
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].1, 0);
    }

    #[test]
    fn wildcard_query_matches_any_name() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let verb = Category::new(interner.intern("verb"), BTreeSet::new(), BTreeSet::new());
        let mut chart = Chart::new();
        chart.insert(0, &noun, 1, SetHandle::from_raw(0));
        chart.insert(0, &verb, 1, SetHandle::from_raw(1));
        let matches = chart.iter_forward_matches(0, &Category::wildcard());
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn named_query_restricts_to_matching_name() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let verb = Category::new(interner.intern("verb"), BTreeSet::new(), BTreeSet::new());
        let mut chart = Chart::new();
        chart.insert(0, &noun, 1, SetHandle::from_raw(0));
        chart.insert(0, &verb, 1, SetHandle::from_raw(1));
        let matches = chart.iter_forward_matches(0, &noun);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn max_end_and_span_tracking() {
        let interner = Interner::new();
        let noun = Category::new(interner.intern("noun"), BTreeSet::new(), BTreeSet::new());
        let mut chart = Chart::new();
        assert!(!chart.has_span(0, 1));
        chart.insert(0, &noun, 3, SetHandle::from_raw(0));
        assert!(chart.has_span(0, 3));
        assert_eq!(chart.max_end(), 3);
    }
}
