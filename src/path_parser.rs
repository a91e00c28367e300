// Path expression parser
//
// Grammar:
//   Expr     := Factor (Operator Factor)*
//   Operator := '+' | '&' | '-' | <whitespace>       (implied union)
//   Factor   := '~'? Atom
//   Atom     := '(' Expr ')' | Ref | Pattern
//   Ref      := '%_' | '%' Path? ':' Name
//   Pattern  := '/' ('/')? Elems? | '..' ('/..')* (Sep Elems)? | '.' ('//' Elems?)? | Elems
//   Elems    := Elem (Sep Elem)* ('//')? ('.' PropElem)?
//   Sep      := '//' | '/'
//   Elem     := Glob ('{' Predicate '}')? | '{' Predicate '}'
//
// Precedence, tightest first: ~, implied union, +, &, -.

use std::str::FromStr;

use thiserror::Error;

use crate::ast::PredicateExpression;
use crate::expression::{ExpressionOp, ExpressionReference, PathExpression};
use crate::parser::ParserError;
use crate::path::{Path, PathError};
use crate::pattern::PathPattern;
use crate::utils::{is_identifier, is_identifier_char};

/// Path expression parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathParseError {
    #[error("Unexpected character at {position}: '{found}'")]
    UnexpectedChar { found: char, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Expected {expected} at {position}")]
    Expected { expected: String, position: usize },

    #[error("Invalid path at {position}: {source}")]
    InvalidPath { source: PathError, position: usize },

    #[error("Invalid predicate at {position}: {source}")]
    Predicate { source: ParserError, position: usize },

    #[error("Unclosed predicate starting at {0}")]
    UnclosedPredicate(usize),

    #[error("Invalid pattern at {position}: {message}")]
    InvalidPattern { message: String, position: usize },
}

/// Operator and operand stacks for one parenthesized group.
#[derive(Default)]
struct Group {
    ops: Vec<ExpressionOp>,
    exprs: Vec<PathExpression>,
}

impl Group {
    /// Reduce while the stacked operator binds at least as tightly as `op`.
    /// `~` is a prefix operator and always just stacks.
    fn push_op(&mut self, op: ExpressionOp) -> Result<(), PathParseError> {
        if op != ExpressionOp::Complement {
            while self.ops.last().is_some_and(|&top| top <= op) {
                self.reduce()?;
            }
        }
        self.ops.push(op);
        Ok(())
    }

    fn reduce(&mut self) -> Result<(), PathParseError> {
        let op = self.ops.pop().ok_or(PathParseError::UnexpectedEnd)?;
        let rhs = self.exprs.pop().ok_or(PathParseError::UnexpectedEnd)?;
        let expr = if op == ExpressionOp::Complement {
            PathExpression::make_complement(rhs)
        } else {
            let lhs = self.exprs.pop().ok_or(PathParseError::UnexpectedEnd)?;
            PathExpression::make_op(op, lhs, rhs)
        };
        self.exprs.push(expr);
        Ok(())
    }

    fn finish(mut self) -> Result<PathExpression, PathParseError> {
        while !self.ops.is_empty() {
            self.reduce()?;
        }
        self.exprs.pop().ok_or(PathParseError::UnexpectedEnd)
    }
}

fn is_glob_char(c: char) -> bool {
    is_identifier_char(c) || c == '?' || c == '*'
}

fn is_elem_start(c: char) -> bool {
    is_glob_char(c) || c == '[' || c == '{'
}

/// Character-level parser for path expressions and patterns
pub struct PathParser {
    input: Vec<char>,
    position: usize,
    groups: Vec<Group>,
}

impl PathParser {
    pub fn new(input: &str) -> Self {
        PathParser {
            input: input.chars().collect(),
            position: 0,
            groups: vec![Group::default()],
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    fn at(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    /// Returns true if any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while self.current().is_some_and(char::is_whitespace) {
            self.advance();
        }
        self.position != start
    }

    fn unexpected(&self) -> PathParseError {
        match self.current() {
            Some(found) => PathParseError::UnexpectedChar {
                found,
                position: self.position,
            },
            None => PathParseError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), PathParseError> {
        if self.current() == Some(ch) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn group(&mut self) -> Result<&mut Group, PathParseError> {
        self.groups.last_mut().ok_or(PathParseError::UnexpectedEnd)
    }

    fn push_expr(&mut self, expr: PathExpression) -> Result<(), PathParseError> {
        self.group()?.exprs.push(expr);
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn can_start_factor(&self) -> bool {
        self.current()
            .is_some_and(|c| matches!(c, '~' | '(' | '%' | '/' | '.') || is_elem_start(c))
    }

    fn parse_expression(&mut self) -> Result<(), PathParseError> {
        loop {
            self.parse_factor()?;

            let mark = self.position;
            let spaced = self.skip_whitespace();
            let op = match self.current() {
                Some('+') => ExpressionOp::Union,
                Some('&') => ExpressionOp::Intersection,
                Some('-') => ExpressionOp::Difference,
                _ if spaced && self.can_start_factor() => ExpressionOp::ImpliedUnion,
                _ => {
                    self.position = mark;
                    return Ok(());
                }
            };
            if op != ExpressionOp::ImpliedUnion {
                self.advance();
                self.skip_whitespace();
            }
            self.group()?.push_op(op)?;
        }
    }

    fn parse_factor(&mut self) -> Result<(), PathParseError> {
        if self.current() == Some('~') {
            self.advance();
            self.skip_whitespace();
            // One complement per factor; `~(~/a)` spells out a double one.
            if self.current() == Some('~') {
                return Err(self.unexpected());
            }
            self.group()?.push_op(ExpressionOp::Complement)?;
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<(), PathParseError> {
        match self.current() {
            Some('(') => {
                self.advance();
                self.skip_whitespace();
                self.groups.push(Group::default());
                self.parse_expression()?;
                self.skip_whitespace();
                self.expect(')')?;
                let group = self.groups.pop().ok_or(PathParseError::UnexpectedEnd)?;
                let expr = group.finish()?;
                self.push_expr(expr)
            }
            Some('%') => {
                self.advance();
                let reference = self.parse_reference()?;
                self.push_expr(PathExpression::make_atom_ref(reference))
            }
            Some(c) if c == '/' || c == '.' || is_elem_start(c) => {
                let pattern = self.parse_pattern()?;
                self.push_expr(PathExpression::make_atom_pattern(pattern))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_reference(&mut self) -> Result<ExpressionReference, PathParseError> {
        if self.current() == Some('_') && !self.peek(1).is_some_and(|c| is_identifier_char(c) || c == ':') {
            self.advance();
            return Ok(ExpressionReference::weaker());
        }

        let start = self.position;
        while self
            .current()
            .is_some_and(|c| is_identifier_char(c) || c == '/' || c == '.')
        {
            self.advance();
        }
        let path_text: String = self.input[start..self.position].iter().collect();
        let path = if path_text.is_empty() {
            None
        } else {
            Some(
                Path::parse(&path_text)
                    .map_err(|source| PathParseError::InvalidPath { source, position: start })?,
            )
        };

        if self.current() != Some(':') {
            return Err(PathParseError::Expected {
                expected: "':' and an expression name".to_string(),
                position: self.position,
            });
        }
        self.advance();

        let name_start = self.position;
        while self.current().is_some_and(is_identifier_char) {
            self.advance();
        }
        let name: String = self.input[name_start..self.position].iter().collect();
        if !is_identifier(&name) {
            return Err(PathParseError::Expected {
                expected: "expression name".to_string(),
                position: name_start,
            });
        }
        Ok(ExpressionReference::new(path, name))
    }

    // ── Patterns ────────────────────────────────────────────────────────

    fn parse_pattern(&mut self) -> Result<PathPattern, PathParseError> {
        let mut pattern = PathPattern::new();

        if self.current() == Some('/') {
            self.advance();
            pattern.set_prefix(Path::absolute_root());
            if self.current() == Some('/') {
                self.advance();
                self.append_child(&mut pattern, "", PredicateExpression::default())?;
                if self.current() == Some('.') && self.peek(1).is_some_and(is_elem_start) {
                    self.parse_property(&mut pattern)?;
                    return Ok(pattern);
                }
            }
            if self.current().is_some_and(is_elem_start) {
                self.parse_elems(&mut pattern)?;
            }
        } else if self.at("..") {
            self.advance();
            self.advance();
            pattern.append_child("..");
            while self.at("/..") {
                self.advance();
                self.advance();
                self.advance();
                pattern.append_child("..");
            }
            if self.at("//") {
                self.advance();
                self.advance();
                self.append_child(&mut pattern, "", PredicateExpression::default())?;
                if self.current().is_some_and(is_elem_start) {
                    self.parse_elems(&mut pattern)?;
                }
            } else if self.current() == Some('/') && self.peek(1).is_some_and(is_elem_start) {
                self.advance();
                self.parse_elems(&mut pattern)?;
            }
        } else if self.current() == Some('.') {
            self.advance();
            if self.at("//") {
                self.advance();
                self.advance();
                self.append_child(&mut pattern, "", PredicateExpression::default())?;
                if self.current().is_some_and(is_elem_start) {
                    self.parse_elems(&mut pattern)?;
                }
            }
        } else {
            self.parse_elems(&mut pattern)?;
        }

        Ok(pattern)
    }

    fn parse_elems(&mut self, pattern: &mut PathPattern) -> Result<(), PathParseError> {
        self.parse_elem(pattern)?;

        loop {
            if self.at("//") {
                self.advance();
                self.advance();
                self.append_child(pattern, "", PredicateExpression::default())?;
                if self.current().is_some_and(is_elem_start) {
                    self.parse_elem(pattern)?;
                    continue;
                }
                break;
            }
            if self.current() == Some('/') {
                self.advance();
                if !self.current().is_some_and(is_elem_start) {
                    return Err(PathParseError::Expected {
                        expected: "path pattern element".to_string(),
                        position: self.position,
                    });
                }
                self.parse_elem(pattern)?;
                continue;
            }
            break;
        }

        if self.current() == Some('.') && self.peek(1).is_some_and(is_elem_start) {
            self.parse_property(pattern)?;
        }
        Ok(())
    }

    fn parse_elem(&mut self, pattern: &mut PathPattern) -> Result<(), PathParseError> {
        let position = self.position;
        let text = self.read_glob(false)?;
        let predicate = self.read_predicate()?;
        if text.is_empty() && predicate.is_empty() {
            return Err(PathParseError::Expected {
                expected: "path pattern element".to_string(),
                position,
            });
        }
        self.append_child(pattern, &text, predicate)
    }

    fn parse_property(&mut self, pattern: &mut PathPattern) -> Result<(), PathParseError> {
        self.advance(); // '.'
        let position = self.position;
        let text = self.read_glob(true)?;
        let predicate = self.read_predicate()?;
        if !pattern.can_append_property(&text, Some(&predicate)) {
            return Err(PathParseError::InvalidPattern {
                message: format!("cannot append property '{}' to '{}'", text, pattern),
                position,
            });
        }
        pattern.append_property_with_predicate(&text, predicate);
        Ok(())
    }

    fn append_child(
        &self,
        pattern: &mut PathPattern,
        text: &str,
        predicate: PredicateExpression,
    ) -> Result<(), PathParseError> {
        if !pattern.can_append_child(text, Some(&predicate)) {
            return Err(PathParseError::InvalidPattern {
                message: format!("cannot append '{}' to '{}'", text, pattern),
                position: self.position,
            });
        }
        pattern.append_child_with_predicate(text, predicate);
        Ok(())
    }

    /// Name characters, `?`, `*` and bracketed character classes. Property
    /// names may also contain namespace colons.
    fn read_glob(&mut self, property: bool) -> Result<String, PathParseError> {
        let start = self.position;
        loop {
            match self.current() {
                Some(c) if is_glob_char(c) || (property && c == ':') => self.advance(),
                Some('[') => {
                    let open = self.position;
                    self.advance();
                    while let Some(c) = self.current() {
                        if c == ']' && self.position > open + 1 {
                            break;
                        }
                        if !(is_glob_char(c) || matches!(c, '[' | ']' | '!' | '-')) {
                            break;
                        }
                        self.advance();
                    }
                    if self.current() != Some(']') {
                        return Err(PathParseError::Expected {
                            expected: "']'".to_string(),
                            position: self.position,
                        });
                    }
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(self.input[start..self.position].iter().collect())
    }

    /// An optional `{predicate}`. The closing brace is the first one outside
    /// a quoted string.
    fn read_predicate(&mut self) -> Result<PredicateExpression, PathParseError> {
        if self.current() != Some('{') {
            return Ok(PredicateExpression::default());
        }
        let open = self.position;
        self.advance();
        let start = self.position;

        let mut quote: Option<char> = None;
        loop {
            match (self.current(), quote) {
                (None, _) => return Err(PathParseError::UnclosedPredicate(open)),
                (Some('\\'), Some(_)) => {
                    self.advance();
                    self.advance();
                    continue;
                }
                (Some(c), Some(q)) if c == q => quote = None,
                (Some(c @ ('"' | '\'')), None) => quote = Some(c),
                (Some('}'), None) => break,
                _ => {}
            }
            self.advance();
        }

        let text: String = self.input[start..self.position].iter().collect();
        self.advance(); // '}'

        let predicate = crate::parser::parse(&text)
            .map_err(|source| PathParseError::Predicate { source, position: start })?;
        if predicate.is_empty() {
            return Err(PathParseError::Expected {
                expected: "predicate expression".to_string(),
                position: start,
            });
        }
        Ok(predicate)
    }

    // ── Entry points ────────────────────────────────────────────────────

    fn finish_input(&mut self) -> Result<(), PathParseError> {
        self.skip_whitespace();
        match self.current() {
            None => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    pub fn parse(mut self) -> Result<PathExpression, PathParseError> {
        self.skip_whitespace();
        self.parse_expression()?;
        self.finish_input()?;
        let group = self.groups.pop().ok_or(PathParseError::UnexpectedEnd)?;
        group.finish()
    }

    pub fn parse_pattern_only(mut self) -> Result<PathPattern, PathParseError> {
        self.skip_whitespace();
        let pattern = self.parse_pattern()?;
        self.finish_input()?;
        Ok(pattern)
    }
}

/// Parse a path expression. Blank input is the empty expression.
pub fn parse(expression: &str) -> Result<PathExpression, PathParseError> {
    if expression.trim().is_empty() {
        return Ok(PathExpression::default());
    }
    PathParser::new(expression).parse()
}

/// Parse a single path pattern.
pub fn parse_pattern(pattern: &str) -> Result<PathPattern, PathParseError> {
    PathParser::new(pattern).parse_pattern_only()
}

impl FromStr for PathExpression {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl FromStr for PathPattern {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pattern(s)
    }
}
