//! `calculate`: evaluates arithmetic expressions.
//!
//! Supports `+ - * / % ^`, parentheses, unary signs, decimal numbers and the
//! constants `pi` and `e`. `^` is right-associative and binds tighter than
//! unary minus, so `-2^2` is `-4`.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use thiserror::Error;

use crate::registry::CALCULATE;
use crate::required_str;

pub struct CalculatorTool;

#[async_trait]
impl ToolHandler for CalculatorTool {
    fn name(&self) -> &str {
        CALCULATE
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let expr = required_str(&arguments, CALCULATE, "expression")?;
        let value = evaluate(expr).map_err(|e| ToolError::failed(CALCULATE, e.to_string()))?;
        Ok(ToolOutput::text(format_number(value)))
    }
}

/// Why an expression could not be evaluated. Offsets are byte offsets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing closing parenthesis")]
    UnclosedParen,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

/// Format a result, dropping the fraction for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let tokens = lex(expr)?;
    let mut parser = Parser { tokens, next: 0 };
    let value = parser.expression(0)?;
    if let Some(&(offset, token)) = parser.tokens.get(parser.next) {
        return Err(CalcError::UnexpectedToken {
            found: token.to_string(),
            offset,
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    /// One of `+ - * / % ^`
    Op(char),
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Op(op) => write!(f, "{op}"),
            Self::Open => f.write_str("("),
            Self::Close => f.write_str(")"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => Token::Op(ch),
            '×' => Token::Op('*'),
            '÷' => Token::Op('/'),
            '(' => Token::Open,
            ')' => Token::Close,
            c if c.is_ascii_digit() || c == '.' => {
                let text = take_while(&mut chars, |c| c.is_ascii_digit() || c == '.');
                let n = text.parse().map_err(|_| CalcError::InvalidNumber(text))?;
                tokens.push((offset, Token::Num(n)));
                continue;
            }
            c if c.is_ascii_alphabetic() => {
                let name = take_while(&mut chars, |c| c.is_ascii_alphabetic()).to_ascii_lowercase();
                let n = match name.as_str() {
                    "pi" => std::f64::consts::PI,
                    "e" => std::f64::consts::E,
                    _ => return Err(CalcError::UnknownIdentifier(name)),
                };
                tokens.push((offset, Token::Num(n)));
                continue;
            }
            _ => return Err(CalcError::UnexpectedChar { ch, offset }),
        };
        chars.next();
        tokens.push((offset, token));
    }
    Ok(tokens)
}

fn take_while(chars: &mut Peekable<CharIndices<'_>>, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !keep(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

/// Binding power of a prefix sign: below `^`, above `* / %`.
const PREFIX_BP: u8 = 5;

/// (left, right) binding powers; right < left makes the operator
/// right-associative.
fn infix_bp(op: char) -> Option<(u8, u8)> {
    match op {
        '+' | '-' => Some((1, 2)),
        '*' | '/' | '%' => Some((3, 4)),
        '^' => Some((7, 6)),
        _ => None,
    }
}

/// Precedence-climbing parser over the token stream.
struct Parser {
    tokens: Vec<(usize, Token)>,
    next: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.next).map(|&(_, t)| t)
    }

    fn bump(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.next).copied();
        if token.is_some() {
            self.next += 1;
        }
        token
    }

    fn expression(&mut self, min_bp: u8) -> Result<f64, CalcError> {
        let mut lhs = match self.bump() {
            Some((_, Token::Num(n))) => n,
            Some((_, Token::Open)) => {
                let inner = self.expression(0)?;
                match self.bump() {
                    Some((_, Token::Close)) => inner,
                    _ => return Err(CalcError::UnclosedParen),
                }
            }
            Some((_, Token::Op('-'))) => -self.expression(PREFIX_BP)?,
            Some((_, Token::Op('+'))) => self.expression(PREFIX_BP)?,
            Some((offset, token)) => {
                return Err(CalcError::UnexpectedToken {
                    found: token.to_string(),
                    offset,
                });
            }
            None => return Err(CalcError::UnexpectedEnd),
        };

        while let Some(Token::Op(op)) = self.peek() {
            let Some((left_bp, right_bp)) = infix_bp(op) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.expression(right_bp)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }
}

fn apply(op: char, lhs: f64, rhs: f64) -> Result<f64, CalcError> {
    Ok(match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        '*' => lhs * rhs,
        '/' | '%' if rhs == 0.0 => return Err(CalcError::DivisionByZero),
        '/' => lhs / rhs,
        '%' => lhs % rhs,
        _ => lhs.powf(rhs),
    })
}
