//! Parser for indexing-rule templates.
//!
//! A template is plain text with `${...}` expression segments. Expressions
//! are literals, dotted paths, or helper calls:
//!
//! ```text
//! expr  := string | number | "true" | "false" | "null" | path | call
//! path  := ident ("." ident)*
//! call  := path "(" [expr ("," expr)*] ")"
//! ```

use serde_json::Value;

use crate::error::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Call { function: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Template {
    pub segments: Vec<Segment>,
}

/// Split `source` into text and expression segments.
pub(crate) fn parse_template(source: &str) -> Result<Template, EvaluationError> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(offset) = source[pos..].find("${") {
        let start = pos + offset;
        if start > pos {
            segments.push(Segment::Text(source[pos..start].to_string()));
        }

        let mut parser = ExpressionParser::new(source, start + 2);
        let expr = parser.parse_expression()?;
        parser.skip_whitespace();
        parser.expect_closing_brace()?;
        segments.push(Segment::Expression(expr));
        pos = parser.pos;
    }

    if pos < source.len() {
        segments.push(Segment::Text(source[pos..].to_string()));
    }

    Ok(Template { segments })
}

struct ExpressionParser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> ExpressionParser<'a> {
    fn new(source: &'a str, pos: usize) -> Self {
        Self { source, pos }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> EvaluationError {
        EvaluationError::Syntax {
            expression: self.source.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn expect_closing_brace(&mut self) -> Result<(), EvaluationError> {
        match self.peek() {
            Some('}') => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected `}}`, found `{c}`"))),
            None => Err(self.error("unterminated expression, expected `}`")),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, EvaluationError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of expression")),
            Some('\'') | Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_path_or_call(),
            Some('}') => Err(self.error("expected expression")),
            Some(c) => Err(self.error(format!("unexpected character `{c}`"))),
        }
    }

    fn parse_string(&mut self) -> Result<Expr, EvaluationError> {
        let quote = self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c) => text.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) if Some(c) == quote => break,
                Some(c) => text.push(c),
            }
        }
        Ok(Expr::Literal(Value::String(text)))
    }

    fn parse_number(&mut self) -> Result<Expr, EvaluationError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        self.take_digits();

        let rest = &self.source[self.pos..];
        let is_float = rest.starts_with('.')
            && rest[1..].chars().next().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump();
            self.take_digits();
        }

        let literal = &self.source[start..self.pos];
        let value = if is_float {
            literal
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        } else {
            literal.parse::<i64>().ok().map(Value::from)
        };

        value
            .map(Expr::Literal)
            .ok_or_else(|| self.error(format!("invalid number `{literal}`")))
    }

    fn take_digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn parse_identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        self.source[start..self.pos].to_string()
    }

    fn parse_path_or_call(&mut self) -> Result<Expr, EvaluationError> {
        let mut segments = vec![self.parse_identifier()];
        while self.peek() == Some('.') {
            self.bump();
            let segment = self.parse_identifier();
            if segment.is_empty() {
                return Err(self.error("expected identifier after `.`"));
            }
            segments.push(segment);
        }

        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.bump();
            let args = self.parse_arguments()?;
            return Ok(Expr::Call {
                function: segments.join("."),
                args,
            });
        }

        if segments.len() == 1 {
            match segments[0].as_str() {
                "true" => return Ok(Expr::Literal(Value::Bool(true))),
                "false" => return Ok(Expr::Literal(Value::Bool(false))),
                "null" => return Ok(Expr::Literal(Value::Null)),
                _ => {}
            }
        }

        Ok(Expr::Path(segments))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, EvaluationError> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                Some(c) => return Err(self.error(format!("expected `,` or `)`, found `{c}`"))),
                None => return Err(self.error("unterminated argument list")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single_expression(source: &str) -> Expr {
        let template = parse_template(source).unwrap();
        match template.segments.as_slice() {
            [Segment::Expression(expr)] => expr.clone(),
            other => panic!("expected one expression, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text() {
        let template = parse_template("no expressions here").unwrap();
        assert_eq!(
            template.segments,
            vec![Segment::Text("no expressions here".to_string())]
        );
    }

    #[test]
    fn test_path() {
        assert_eq!(
            single_expression("${node.properties.title}"),
            Expr::Path(vec![
                "node".to_string(),
                "properties".to_string(),
                "title".to_string()
            ])
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(single_expression("${'a b'}"), Expr::Literal(json!("a b")));
        assert_eq!(single_expression("${\"x\\\"y\"}"), Expr::Literal(json!("x\"y")));
        assert_eq!(single_expression("${42}"), Expr::Literal(json!(42)));
        assert_eq!(single_expression("${-1.5}"), Expr::Literal(json!(-1.5)));
        assert_eq!(single_expression("${true}"), Expr::Literal(json!(true)));
        assert_eq!(single_expression("${ null }"), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_call_with_arguments() {
        assert_eq!(
            single_expression("${Array.join(value, ', ')}"),
            Expr::Call {
                function: "Array.join".to_string(),
                args: vec![
                    Expr::Path(vec!["value".to_string()]),
                    Expr::Literal(json!(", ")),
                ],
            }
        );
    }

    #[test]
    fn test_nested_call() {
        assert_eq!(
            single_expression("${String.trim(String.stripTags(value))}"),
            Expr::Call {
                function: "String.trim".to_string(),
                args: vec![Expr::Call {
                    function: "String.stripTags".to_string(),
                    args: vec![Expr::Path(vec!["value".to_string()])],
                }],
            }
        );
    }

    #[test]
    fn test_mixed_segments() {
        let template = parse_template("Title: ${value}!").unwrap();
        assert_eq!(template.segments.len(), 3);
        assert_eq!(template.segments[0], Segment::Text("Title: ".to_string()));
        assert_eq!(template.segments[2], Segment::Text("!".to_string()));
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "${value",
            "${}",
            "${'open}",
            "${node.}",
            "${String.trim(value}",
            "${value value}",
            "${#}",
            "${-}",
        ] {
            let result = parse_template(source);
            assert!(
                matches!(result, Err(EvaluationError::Syntax { .. })),
                "expected syntax error for {source}, got {result:?}"
            );
        }
    }
}
