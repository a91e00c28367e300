// Predicate expression parser
//
// Grammar:
//   Expr     := Factor (Operator Factor)*
//   Operator := 'and' | 'or' | <whitespace>          (implied and)
//   Factor   := 'not'* Atom
//   Atom     := Call | '(' Expr ')'
//   Call     := name | name ':' Value (',' Value)* | name '(' Args? ')'
//   Args     := Value (',' Value)* (',' name '=' Value)* | name '=' Value (',' name '=' Value)*
//   Value    := quoted string | int | float | inf | -inf | true | false | bareword
//
// Precedence, tightest first: not, implied and, and, or.

use crate::ast::{FnArg, FnCall, PredicateExpression, PredicateNode, PredicateOp};
use crate::utils::{is_identifier_char, is_identifier_start};
use crate::value::Value;
use thiserror::Error;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error("Unexpected token at {position}: {found}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid syntax at {position}: {message}")]
    InvalidSyntax { message: String, position: usize },

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unclosed string literal")]
    UnclosedString,

    #[error("Invalid escape sequence: {0}")]
    InvalidEscape(String),

    #[error("Expected {expected} at {position}, found {found}")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },
}

/// Token types for the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    String(String),
    Not,
    And,
    Or,
    LeftParen,
    RightParen,
    Comma,
    Colon,
    Equal,
    /// Any character that starts no other token.
    Other(char),
    Eof,
}

/// Lexer for predicate expressions.
///
/// Operators and names are tokenized; argument values are read directly
/// from the character stream with `read_value`, since bare values such as
/// `/World/geo` or `*.usd` do not fit the token set.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn reset(&mut self, position: usize) {
        self.position = position;
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    /// Returns true if any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while self.current().is_some_and(char::is_whitespace) {
            self.advance();
        }
        self.position != start
    }

    fn read_string(&mut self, quote_char: char) -> Result<String, ParserError> {
        let mut result = String::new();
        self.advance(); // skip opening quote

        loop {
            match self.current() {
                None => return Err(ParserError::UnclosedString),
                Some(ch) if ch == quote_char => {
                    self.advance(); // skip closing quote
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        None => return Err(ParserError::UnclosedString),
                        Some('"') => result.push('"'),
                        Some('\'') => result.push('\''),
                        Some('\\') => result.push('\\'),
                        Some('n') => result.push('\n'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some('0') => result.push('\0'),
                        Some(ch) => return Err(ParserError::InvalidEscape(format!("\\{}", ch))),
                    }
                    self.advance();
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self.current().is_some_and(is_identifier_char) {
            self.advance();
        }
        self.input[start..self.position].iter().collect()
    }

    /// An unquoted run of characters up to whitespace or punctuation.
    fn read_word(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.current() {
            if ch.is_whitespace() || matches!(ch, ',' | '(' | ')' | '{' | '}' | '"' | '\'') {
                break;
            }
            self.advance();
        }
        self.input[start..self.position].iter().collect()
    }

    /// Read one argument value at the current position.
    pub fn read_value(&mut self) -> Result<Value, ParserError> {
        match self.current() {
            None => Err(ParserError::UnexpectedEnd),
            Some(q @ ('"' | '\'')) => Ok(Value::String(self.read_string(q)?)),
            Some(ch) => {
                let word = self.read_word();
                if word.is_empty() {
                    return Err(ParserError::UnexpectedToken {
                        found: ch.to_string(),
                        position: self.position,
                    });
                }
                classify_word(word)
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.current() {
            None => Token::Eof,
            Some(q @ ('"' | '\'')) => match self.read_string(q) {
                Ok(s) => Token::String(s),
                Err(_) => Token::Other(q),
            },
            Some(ch) if is_identifier_start(ch) => {
                let name = self.read_identifier();
                match name.as_str() {
                    "not" => Token::Not,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Identifier(name),
                }
            }
            Some(ch) => {
                self.advance();
                match ch {
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '=' => Token::Equal,
                    other => Token::Other(other),
                }
            }
        }
    }

    /// The next token and whether whitespace precedes it, without consuming.
    pub fn peek_token(&mut self) -> (Token, bool) {
        let mark = self.position;
        let spaced = self.skip_whitespace();
        let token = self.next_token();
        self.position = mark;
        (token, spaced)
    }
}

/// Bareword values: booleans, `inf`, integers, floats, otherwise strings.
fn classify_word(word: String) -> Result<Value, ParserError> {
    match word.as_str() {
        "true" | "True" => return Ok(Value::Bool(true)),
        "false" | "False" => return Ok(Value::Bool(false)),
        "inf" => return Ok(Value::Float(f64::INFINITY)),
        "-inf" => return Ok(Value::Float(f64::NEG_INFINITY)),
        _ => {}
    }

    let digits = word.strip_prefix('-').unwrap_or(&word);
    let int_like = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    if int_like {
        return word
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ParserError::InvalidNumber(word.clone()));
    }
    if is_float_literal(digits) {
        return word
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ParserError::InvalidNumber(word.clone()));
    }
    Ok(Value::String(word))
}

/// `digits ('.' digits)? (('e'|'E') ('+'|'-')? digits)?` with at least one
/// of the fraction or exponent present.
fn is_float_literal(s: &str) -> bool {
    fn digits(s: &str) -> (&str, &str) {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        s.split_at(end)
    }

    let (int_part, rest) = digits(s);
    if int_part.is_empty() {
        return false;
    }
    let (has_frac, rest) = match rest.strip_prefix('.') {
        Some(after) => {
            let (frac, rest) = digits(after);
            if frac.is_empty() {
                return false;
            }
            (true, rest)
        }
        None => (false, rest),
    };
    let (has_exp, rest) = match rest.strip_prefix(['e', 'E']) {
        Some(after) => {
            let after = after.strip_prefix(['+', '-']).unwrap_or(after);
            let (exp, rest) = digits(after);
            if exp.is_empty() {
                return false;
            }
            (true, rest)
        }
        None => (false, rest),
    };
    rest.is_empty() && (has_frac || has_exp)
}

// ---------------------------------------------------------------------------
// Expression builder
// ---------------------------------------------------------------------------

/// Operator and operand stacks for one parenthesized group.
#[derive(Default)]
struct Group {
    ops: Vec<PredicateOp>,
    exprs: Vec<PredicateNode>,
}

impl Group {
    /// Reduce while the stacked operator binds at least as tightly as `op`.
    /// `not` is a prefix operator and always just stacks.
    fn push_op(&mut self, op: PredicateOp) -> Result<(), ParserError> {
        if op != PredicateOp::Not {
            while self.ops.last().is_some_and(|&top| top <= op) {
                self.reduce()?;
            }
        }
        self.ops.push(op);
        Ok(())
    }

    fn reduce(&mut self) -> Result<(), ParserError> {
        let op = self.ops.pop().ok_or(ParserError::UnexpectedEnd)?;
        let rhs = self.exprs.pop().ok_or(ParserError::UnexpectedEnd)?;
        let node = if op == PredicateOp::Not {
            PredicateNode::Not(Box::new(rhs))
        } else {
            let lhs = self.exprs.pop().ok_or(ParserError::UnexpectedEnd)?;
            PredicateNode::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        };
        self.exprs.push(node);
        Ok(())
    }

    fn finish(mut self) -> Result<PredicateNode, ParserError> {
        while !self.ops.is_empty() {
            self.reduce()?;
        }
        self.exprs.pop().ok_or(ParserError::UnexpectedEnd)
    }
}

/// Shift/reduce parser for predicate expressions
pub struct Parser {
    lexer: Lexer,
    groups: Vec<Group>,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            groups: vec![Group::default()],
        }
    }

    fn group(&mut self) -> Result<&mut Group, ParserError> {
        self.groups.last_mut().ok_or(ParserError::UnexpectedEnd)
    }

    fn unexpected(&self, token: Token) -> ParserError {
        match token {
            Token::Eof => ParserError::UnexpectedEnd,
            other => ParserError::UnexpectedToken {
                found: format!("{:?}", other),
                position: self.lexer.position(),
            },
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParserError> {
        let token = self.lexer.next_token();
        if token == expected {
            Ok(())
        } else if token == Token::Eof {
            Err(ParserError::UnexpectedEnd)
        } else {
            Err(ParserError::Expected {
                expected: what.to_string(),
                found: format!("{:?}", token),
                position: self.lexer.position(),
            })
        }
    }

    fn parse_expression(&mut self) -> Result<(), ParserError> {
        loop {
            self.parse_factor()?;

            let op = match self.lexer.peek_token() {
                (Token::And, _) => PredicateOp::And,
                (Token::Or, _) => PredicateOp::Or,
                (Token::Identifier(_) | Token::Not | Token::LeftParen, true) => PredicateOp::ImpliedAnd,
                _ => return Ok(()),
            };
            if op != PredicateOp::ImpliedAnd {
                self.lexer.next_token();
            }
            self.group()?.push_op(op)?;
        }
    }

    fn parse_factor(&mut self) -> Result<(), ParserError> {
        while let (Token::Not, _) = self.lexer.peek_token() {
            self.lexer.next_token();
            self.group()?.push_op(PredicateOp::Not)?;
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<(), ParserError> {
        match self.lexer.next_token() {
            Token::LeftParen => {
                self.groups.push(Group::default());
                self.parse_expression()?;
                self.expect(Token::RightParen, "')'")?;
                let group = self.groups.pop().ok_or(ParserError::UnexpectedEnd)?;
                let node = group.finish()?;
                self.group()?.exprs.push(node);
                Ok(())
            }
            Token::Identifier(name) => {
                let call = self.parse_call(name)?;
                self.group()?.exprs.push(PredicateNode::Call(call));
                Ok(())
            }
            other => Err(self.unexpected(other)),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<FnCall, ParserError> {
        // `name:args` must be written without a space before the colon.
        if self.lexer.current() == Some(':') {
            self.lexer.advance();
            let mut args = Vec::new();
            loop {
                args.push(FnArg::positional(self.lexer.read_value()?));
                if self.lexer.current() == Some(',') {
                    self.lexer.advance();
                } else {
                    break;
                }
            }
            return Ok(FnCall::colon(name, args));
        }

        // Likewise `name(args)`; `name (x)` is an implied and with a group.
        if self.lexer.current() == Some('(') {
            self.lexer.advance();
            let args = self.parse_paren_args()?;
            return Ok(FnCall::paren(name, args));
        }

        Ok(FnCall::bare(name))
    }

    fn parse_paren_args(&mut self) -> Result<Vec<FnArg>, ParserError> {
        let mut args = Vec::new();
        if let (Token::RightParen, _) = self.lexer.peek_token() {
            self.lexer.next_token();
            return Ok(args);
        }

        let mut seen_keyword = false;
        loop {
            let mark = self.lexer.position();
            let keyword = match self.lexer.next_token() {
                Token::Identifier(name) if self.lexer.next_token() == Token::Equal => Some(name),
                _ => None,
            };

            match keyword {
                Some(name) => {
                    self.lexer.skip_whitespace();
                    args.push(FnArg::keyword(name, self.lexer.read_value()?));
                    seen_keyword = true;
                }
                None => {
                    self.lexer.reset(mark);
                    self.lexer.skip_whitespace();
                    if seen_keyword {
                        return Err(ParserError::InvalidSyntax {
                            message: "positional argument follows keyword argument".to_string(),
                            position: self.lexer.position(),
                        });
                    }
                    args.push(FnArg::positional(self.lexer.read_value()?));
                }
            }

            match self.lexer.next_token() {
                Token::Comma => continue,
                Token::RightParen => return Ok(args),
                Token::Eof => return Err(ParserError::UnexpectedEnd),
                other => {
                    return Err(ParserError::Expected {
                        expected: "',' or ')'".to_string(),
                        found: format!("{:?}", other),
                        position: self.lexer.position(),
                    })
                }
            }
        }
    }

    pub fn parse(mut self) -> Result<PredicateExpression, ParserError> {
        self.parse_expression()?;

        match self.lexer.next_token() {
            Token::Eof => {}
            other => {
                return Err(ParserError::Expected {
                    expected: "end of expression".to_string(),
                    found: format!("{:?}", other),
                    position: self.lexer.position(),
                })
            }
        }

        let group = self.groups.pop().ok_or(ParserError::UnexpectedEnd)?;
        Ok(PredicateExpression::from_root(group.finish()?))
    }
}

/// Parse a predicate expression. Blank input is the empty expression.
pub fn parse(expression: &str) -> Result<PredicateExpression, ParserError> {
    if expression.trim().is_empty() {
        return Ok(PredicateExpression::default());
    }
    Parser::new(expression).parse()
}
