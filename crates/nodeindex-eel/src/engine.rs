//! Expression engines.

use serde_json::Value;

use crate::context::{value_to_text, Context};
use crate::error::EvaluationError;
use crate::parser::{parse_template, Expr, Segment};

/// Pluggable expression evaluation.
///
/// Implementations are pure: the same source and context always produce
/// the same value, and evaluation has no side effects.
pub trait ExpressionEngine: Send + Sync {
    /// Evaluate `expression` against `context`.
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvaluationError>;
}

/// Built-in engine for `${...}` templates.
///
/// A source consisting of exactly one `${...}` segment yields the typed value
/// of the expression. Any other mix of text and expressions renders a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEngine for TemplateEngine {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvaluationError> {
        let template = parse_template(expression)?;

        match template.segments.as_slice() {
            [] => Ok(Value::String(String::new())),
            [Segment::Text(text)] => Ok(Value::String(text.clone())),
            [Segment::Expression(expr)] => evaluate_expr(expr, context),
            segments => {
                let mut rendered = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => rendered.push_str(text),
                        Segment::Expression(expr) => {
                            rendered.push_str(&value_to_text(&evaluate_expr(expr, context)?))
                        }
                    }
                }
                Ok(Value::String(rendered))
            }
        }
    }
}

fn evaluate_expr(expr: &Expr, context: &Context) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => Ok(context.resolve(segments)),
        Expr::Call { function, args } => {
            let helper = context
                .helper(function)
                .ok_or_else(|| EvaluationError::UnknownFunction(function.clone()))?;
            let values = args
                .iter()
                .map(|arg| evaluate_expr(arg, context))
                .collect::<Result<Vec<_>, _>>()?;
            helper(&values)
        }
    }
}
