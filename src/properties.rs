//! The fixed universe of standard properties and surface-case discovery.
//!
//! Nine property names recur as literals throughout the rule system: five
//! mutually-exclusive case properties assigned to every leaf, and four
//! structural properties a [`crate::rules::conjunction::ConjunctionRule`]
//! assigns based on subtree count. Interning them once at model-construction
//! time avoids repeated string lookups on every leaf-rule firing.

use std::collections::BTreeSet;

use crate::symbol::{Interner, Symbol};

/// The standard property symbols, interned once and handed around by value.
#[derive(Debug, Clone, Copy)]
pub struct StandardProperties {
    pub case_free: Symbol,
    pub mixed_case: Symbol,
    pub title_case: Symbol,
    pub upper_case: Symbol,
    pub lower_case: Symbol,
    pub conjunction: Symbol,
    pub compound: Symbol,
    pub simple: Symbol,
    pub single: Symbol,
}

impl StandardProperties {
    pub fn intern(interner: &Interner) -> Self {
        StandardProperties {
            case_free: interner.intern("case_free"),
            mixed_case: interner.intern("mixed_case"),
            title_case: interner.intern("title_case"),
            upper_case: interner.intern("upper_case"),
            lower_case: interner.intern("lower_case"),
            conjunction: interner.intern("conjunction"),
            compound: interner.intern("compound"),
            simple: interner.intern("simple"),
            single: interner.intern("single"),
        }
    }

    fn case_universe(&self) -> [Symbol; 5] {
        [
            self.case_free,
            self.mixed_case,
            self.title_case,
            self.upper_case,
            self.lower_case,
        ]
    }

    /// Discover the positive/negative case properties of a surface token:
    /// case-free when upper- and lower-casing agree, otherwise exactly one
    /// of lower/upper/title/mixed, with title implying mixed.
    pub fn discover_case_properties(&self, token: &str) -> (BTreeSet<Symbol>, BTreeSet<Symbol>) {
        let upper = token.to_uppercase();
        let lower = token.to_lowercase();

        let mut positive = BTreeSet::new();
        if upper == lower {
            positive.insert(self.case_free);
        } else if token == lower {
            positive.insert(self.lower_case);
        } else {
            if token == upper {
                positive.insert(self.upper_case);
            }
            if token == title_case(token) {
                positive.insert(self.title_case);
                positive.insert(self.mixed_case);
            }
            if positive.is_empty() {
                positive.insert(self.mixed_case);
            }
        }

        let negative = self
            .case_universe()
            .into_iter()
            .filter(|s| !positive.contains(s))
            .collect();

        (positive, negative)
    }
}

/// Title-case a single token: first character upper, remainder lower.
fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
