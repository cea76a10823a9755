//! Evaluation context: variable bindings and helper functions.
//!
//! The default helpers are built once per process and shared read-only by
//! every context, so contexts can be created and used from many threads.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::error::EvaluationError;

/// A helper callable from expressions as `Namespace.function(args)`.
pub type HelperFn = fn(&[Value]) -> Result<Value, EvaluationError>;

/// Registry of helper functions keyed by qualified name.
#[derive(Debug, Default)]
pub struct Helpers {
    functions: HashMap<&'static str, HelperFn>,
}

impl Helpers {
    /// Register a helper.
    pub fn register(&mut self, name: &'static str, function: HelperFn) {
        self.functions.insert(name, function);
    }

    /// Look up a helper by qualified name.
    pub fn get(&self, name: &str) -> Option<HelperFn> {
        self.functions.get(name).copied()
    }

    /// Registered helper names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

static DEFAULT_HELPERS: OnceLock<Helpers> = OnceLock::new();

/// The default helper set, built on first use.
pub fn default_helpers() -> &'static Helpers {
    DEFAULT_HELPERS.get_or_init(|| {
        let mut helpers = Helpers::default();
        helpers.register("String.toLowerCase", string_to_lower_case);
        helpers.register("String.toUpperCase", string_to_upper_case);
        helpers.register("String.trim", string_trim);
        helpers.register("String.stripTags", string_strip_tags);
        helpers.register("String.length", string_length);
        helpers.register("Array.join", array_join);
        helpers.register("Array.length", array_length);
        helpers.register("Json.stringify", json_stringify);
        helpers
    })
}

/// Variable bindings plus the helpers visible to an expression.
#[derive(Debug, Clone)]
pub struct Context {
    variables: Map<String, Value>,
    helpers: &'static Helpers,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Empty context with the default helpers.
    pub fn new() -> Self {
        Self {
            variables: Map::new(),
            helpers: default_helpers(),
        }
    }

    /// Bind a variable, builder style.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Bind a variable in place.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Value of a top-level variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Helper by qualified name.
    pub fn helper(&self, name: &str) -> Option<HelperFn> {
        self.helpers.get(name)
    }

    /// Resolve a dotted path. Missing segments resolve to null.
    pub fn resolve(&self, path: &[String]) -> Value {
        let Some((first, rest)) = path.split_first() else {
            return Value::Null;
        };

        let mut current = match self.variables.get(first) {
            Some(value) => value,
            None => return Value::Null,
        };

        for segment in rest {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Value::Null,
            }
        }

        current.clone()
    }
}

/// Render a value as template text. Null renders as empty.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expect_arity(function: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvaluationError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}-{max}")
        };
        return Err(EvaluationError::invalid_argument(
            function,
            format!("expected {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

/// Scalar argument as text; null stays `None`.
fn scalar_text(function: &str, value: &Value) -> Result<Option<String>, EvaluationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(_) | Value::Number(_) => Ok(Some(value.to_string())),
        _ => Err(EvaluationError::invalid_argument(
            function,
            "expected a string",
        )),
    }
}

fn map_string(
    function: &str,
    args: &[Value],
    transform: impl Fn(&str) -> String,
) -> Result<Value, EvaluationError> {
    expect_arity(function, args, 1, 1)?;
    Ok(scalar_text(function, &args[0])?
        .map(|text| Value::String(transform(&text)))
        .unwrap_or(Value::Null))
}

fn string_to_lower_case(args: &[Value]) -> Result<Value, EvaluationError> {
    map_string("String.toLowerCase", args, str::to_lowercase)
}

fn string_to_upper_case(args: &[Value]) -> Result<Value, EvaluationError> {
    map_string("String.toUpperCase", args, str::to_uppercase)
}

fn string_trim(args: &[Value]) -> Result<Value, EvaluationError> {
    map_string("String.trim", args, |s| s.trim().to_string())
}

fn string_strip_tags(args: &[Value]) -> Result<Value, EvaluationError> {
    map_string("String.stripTags", args, |s| {
        let mut out = String::with_capacity(s.len());
        let mut in_tag = false;
        for c in s.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                _ if !in_tag => out.push(c),
                _ => {}
            }
        }
        out
    })
}

fn string_length(args: &[Value]) -> Result<Value, EvaluationError> {
    expect_arity("String.length", args, 1, 1)?;
    let length = scalar_text("String.length", &args[0])?
        .map(|text| text.chars().count())
        .unwrap_or(0);
    Ok(Value::from(length))
}

fn array_join(args: &[Value]) -> Result<Value, EvaluationError> {
    expect_arity("Array.join", args, 1, 2)?;
    let separator = match args.get(1) {
        Some(value) => scalar_text("Array.join", value)?.unwrap_or_default(),
        None => ",".to_string(),
    };
    match &args[0] {
        Value::Null => Ok(Value::String(String::new())),
        Value::Array(items) => Ok(Value::String(
            items
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join(&separator),
        )),
        _ => Err(EvaluationError::invalid_argument(
            "Array.join",
            "expected an array",
        )),
    }
}

fn array_length(args: &[Value]) -> Result<Value, EvaluationError> {
    expect_arity("Array.length", args, 1, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::from(0)),
        Value::Array(items) => Ok(Value::from(items.len())),
        _ => Err(EvaluationError::invalid_argument(
            "Array.length",
            "expected an array",
        )),
    }
}

fn json_stringify(args: &[Value]) -> Result<Value, EvaluationError> {
    expect_arity("Json.stringify", args, 1, 1)?;
    Ok(Value::String(args[0].to_string()))
}
