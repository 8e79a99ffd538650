//! # pyramid-parse
//!
//! A bottom-up, rule-based natural-language parser. Tokens are assembled
//! into typed spans by dynamic programming, competing derivations are kept
//! in a shared parse forest and ranked by a learned, incrementally-updated
//! scoring model, and the same rule set runs in reverse to regenerate
//! surface forms from a semantic graph.
//!
//! The crate is deliberately narrow: tokenization, grammar-file syntax,
//! configuration loading, and word-set file I/O are all callers' concerns.
//! What's here is the chart, the rule system, the forest, the
//! scheduler, scoring, disambiguation, generation, and semantic-graph
//! extraction.
//!
//! A typical forward parse:
//!
//! ```no_run
//! use std::sync::Arc;
//! use pyramid_parse::model::Model;
//! use pyramid_parse::scheduler::ParserState;
//! use pyramid_parse::parser;
//!
//! # fn build_model() -> Model { unimplemented!() }
//! let model = Arc::new(build_model());
//! let mut state = ParserState::new(model);
//! let tokens = vec![
//!     ("the".to_string(), 0, 3),
//!     ("cat".to_string(), 4, 7),
//! ];
//! let parse = parser::parse(tokens, &mut state, false, None);
//! let disambiguation = pyramid_parse::disambiguation::best_disambiguation(&parse, state.forest(), None);
//! let _ = disambiguation;
//! ```

pub mod category;
pub mod chart;
pub mod disambiguation;
pub mod error;
pub mod forest;
pub mod generation;
pub mod graph;
pub mod model;
pub mod parser;
pub mod properties;
pub mod rules;
pub mod scheduler;
pub mod scoring;
pub mod scoring_store;
pub mod symbol;
pub mod tokens;

pub use category::Category;
pub use error::{Error, Result};
pub use forest::{Forest, Parse, ParseTree};
pub use model::{Model, ModelConfig};
pub use scheduler::ParserState;
pub use symbol::{Interner, Symbol};
pub use tokens::{Token, TokenSequence};
