//! # nodeindex-eel
//!
//! Evaluation of per-property indexing rules.
//!
//! An indexing rule is a small expression such as `${value}` or
//! `${String.toLowerCase(node.properties.title)}`. The rule is evaluated
//! with the bindings `node`, `propertyName`, `value` and
//! `documentIdentifier`, and the result becomes the indexed field value.
//!
//! ## Components
//! - [`ExpressionEngine`]: pluggable expression evaluation (source + context -> value)
//! - [`TemplateEngine`]: built-in engine for paths, literals and helper calls
//! - [`Context`]: variable bindings plus the default helpers, built once per process
//! - [`IndexingRuleEvaluator`]: binds a node and property to a rule and evaluates it

pub mod adapter;
pub mod context;
pub mod engine;
pub mod error;
mod parser;

pub use adapter::{node_binding, IndexingRuleEvaluator};
pub use context::{default_helpers, Context, HelperFn, Helpers};
pub use engine::{ExpressionEngine, TemplateEngine};
pub use error::EvaluationError;
