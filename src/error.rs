//! Crate-wide error taxonomy.
//!
//! Recoverable parsing outcomes (no matching rule, an expired deadline, an
//! empty root set) are represented as values elsewhere in the crate, never as
//! `Error` variants -- only programming-contract violations reach here.

use thiserror::Error;

/// Error type returned by model construction and scoring entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A rule was rejected during model construction.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A score, weight, or accuracy value fell outside `[0, 1]`.
    #[error("invalid score for field '{field}': {value} is not in [0, 1]")]
    InvalidScore { field: &'static str, value: f64 },

    /// A count supplied to a scoring entry point was negative.
    #[error("invalid count: {0} is negative")]
    InvalidCount(i64),

    /// A category or property name was referenced without ever having been
    /// registered with the interner that owns it.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A persisted scoring record could not be parsed.
    #[error("malformed scoring store record: {0}")]
    ScoringStore(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
