//! Interned symbols for category names, property names, and link-type labels.
//!
//! Interning reduces equality and hashing on names that recur constantly
//! throughout a parse (every category, every property, every link label) to
//! an integer comparison, per the interning redesign note carried over from
//! the source grammar engine this crate is modeled on.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// An interned name. Cheap to copy, compare, and hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

/// The wildcard category name, `_`, reserved at interner construction time.
pub const WILDCARD: Symbol = Symbol(0);

struct InternerTables {
    names: Vec<String>,
    ids: HashMap<String, Symbol>,
}

/// A process-wide (or model-scoped) string interner.
///
/// Unlike the generic [`crate`] registries this crate inherited its shape
/// from, an `Interner` hands back a stable handle for repeated insertions of
/// the same text rather than merely recording membership.
pub struct Interner {
    tables: RwLock<InternerTables>,
}

impl Interner {
    /// Create a new interner with the wildcard symbol pre-registered.
    pub fn new() -> Self {
        let interner = Interner {
            tables: RwLock::new(InternerTables {
                names: Vec::new(),
                ids: HashMap::new(),
            }),
        };
        let wildcard = interner.intern("_");
        debug_assert_eq!(wildcard, WILDCARD);
        interner
    }

    /// Intern `text`, returning its (possibly newly assigned) symbol.
    pub fn intern(&self, text: &str) -> Symbol {
        if let Some(symbol) = self.tables.read().unwrap().ids.get(text) {
            return *symbol;
        }
        let mut tables = self.tables.write().unwrap();
        if let Some(symbol) = tables.ids.get(text) {
            return *symbol;
        }
        let symbol = Symbol(tables.names.len() as u32);
        tables.names.push(text.to_string());
        tables.ids.insert(text.to_string(), symbol);
        symbol
    }

    /// Resolve a symbol back to its original text.
    pub fn resolve(&self, symbol: Symbol) -> String {
        self.tables.read().unwrap().names[symbol.0 as usize].clone()
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interner({} symbols)", self.len())
    }
}

impl Symbol {
    pub fn is_wildcard(self) -> bool {
        self == WILDCARD
    }
}
