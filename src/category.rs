//! Category algebra: names, positive/negative property sets, subsumption.
//!
//! A [`Category`] is the grammatical type assigned to a span: an interned
//! name (or the wildcard) plus two disjoint sets of interned property
//! symbols. Categories are immutable and value-equal; subsumption is the
//! central relation the chart, the rule system, and generation all query.

use std::collections::BTreeSet;
use std::fmt;

use crate::symbol::{Interner, Symbol, WILDCARD};

/// A grammatical category: a name plus positive and negative property sets.
///
/// `positive` and `negative` are always disjoint; constructors enforce this
/// by stripping any property that appears in both in favor of the positive
/// reading (matching [`promote`]'s "positive wins conflicts" rule).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category {
    name: Symbol,
    positive: BTreeSet<Symbol>,
    negative: BTreeSet<Symbol>,
}

impl Category {
    /// Build a category, resolving any positive/negative overlap in favor
    /// of positive.
    pub fn new(name: Symbol, positive: BTreeSet<Symbol>, mut negative: BTreeSet<Symbol>) -> Self {
        for p in &positive {
            negative.remove(p);
        }
        Category {
            name,
            positive,
            negative,
        }
    }

    /// The wildcard category with no properties.
    pub fn wildcard() -> Self {
        Category {
            name: WILDCARD,
            positive: BTreeSet::new(),
            negative: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.is_wildcard()
    }

    pub fn positive_properties(&self) -> &BTreeSet<Symbol> {
        &self.positive
    }

    pub fn negative_properties(&self) -> &BTreeSet<Symbol> {
        &self.negative
    }

    /// Return a copy of this category with `name` substituted.
    pub fn with_name(&self, name: Symbol) -> Self {
        Category {
            name,
            positive: self.positive.clone(),
            negative: self.negative.clone(),
        }
    }

    /// Subsumption: does `self` match wherever `inner` matches?
    ///
    /// `self.subsumes(inner)` holds iff `inner ⊆ self`: `self`'s constraints
    /// are no stricter than `inner`'s.
    pub fn subsumes(&self, inner: &Category) -> bool {
        (self.name.is_wildcard() || self.name == inner.name)
            && self.positive.is_subset(&inner.positive)
            && self.negative.is_subset(&inner.negative)
    }

    /// `promote(add_positive, add_negative)`: union `add_positive` into the
    /// positive set, union `add_negative` into the negative set, then strip
    /// the (possibly now larger) positive set out of the negative set.
    pub fn promote(&self, add_positive: &BTreeSet<Symbol>, add_negative: &BTreeSet<Symbol>) -> Self {
        let mut positive = self.positive.clone();
        positive.extend(add_positive.iter().copied());
        let mut negative = self.negative.clone();
        negative.extend(add_negative.iter().copied());
        for p in &positive {
            negative.remove(p);
        }
        Category {
            name: self.name,
            positive,
            negative,
        }
    }

    /// Render `name(+p1,+p2,-n1)` with properties resolved and sorted.
    ///
    /// Properties are already sorted by symbol id via the `BTreeSet`, which
    /// coincides with interning (insertion) order rather than lexical order;
    /// symbol-id ordering is enough to guarantee equal categories render
    /// equal strings.
    pub fn display<'a>(&'a self, interner: &'a Interner) -> CategoryDisplay<'a> {
        CategoryDisplay {
            category: self,
            interner,
        }
    }
}

pub struct CategoryDisplay<'a> {
    category: &'a Category,
    interner: &'a Interner,
}

impl<'a> fmt::Display for CategoryDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.interner.resolve(self.category.name))?;
        let mut first = true;
        for p in &self.category.positive {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "+{}", self.interner.resolve(*p))?;
            first = false;
        }
        for n in &self.category.negative {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "-{}", self.interner.resolve(*n))?;
            first = false;
        }
        write!(f, ")")
    }
}
