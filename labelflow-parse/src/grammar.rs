#![forbid(unsafe_code)]

use labelflow_ast::{Expr, Function, Pattern, Stmt};
use labelflow_lex::TokenScanner;

use crate::error::ParseError;
use crate::parser::Parser;

/// The parser's extension points.
///
/// A grammar extension wraps another `Grammar` and returns it from [`Grammar::next`].
/// Every production it does not override forwards to the wrapped grammar; at the end of
/// the chain the base production on [`Parser`] runs. An override that wants the inner
/// behavior calls the wrapped grammar directly.
pub trait Grammar {
    fn next(&self) -> Option<&dyn Grammar> {
        None
    }

    /// Token recognizer consulted before the base token rules.
    fn scanner(&self) -> Option<&dyn TokenScanner> {
        self.next().and_then(|g| g.scanner())
    }

    fn parse_statement(&self, p: &mut Parser<'_>) -> Result<Stmt, ParseError> {
        match self.next() {
            Some(next) => next.parse_statement(p),
            None => p.base_statement(),
        }
    }

    /// A binding target: a variable name, a destructuring pattern or a parameter.
    fn parse_binding_atom(&self, p: &mut Parser<'_>) -> Result<Pattern, ParseError> {
        match self.next() {
            Some(next) => next.parse_binding_atom(p),
            None => p.base_binding_atom(),
        }
    }

    /// Primary expression: identifier references, literals, function expressions, ...
    fn parse_expr_atom(&self, p: &mut Parser<'_>) -> Result<Expr, ParseError> {
        match self.next() {
            Some(next) => next.parse_expr_atom(p),
            None => p.base_expr_atom(),
        }
    }

    /// Operators following a complete member/call expression.
    fn parse_postfix(&self, p: &mut Parser<'_>, expr: Expr) -> Result<Expr, ParseError> {
        match self.next() {
            Some(next) => next.parse_postfix(p, expr),
            None => p.base_postfix(expr),
        }
    }

    /// Parameter list and anything between it and the body.
    fn parse_function_params(&self, p: &mut Parser<'_>, func: &mut Function) -> Result<(), ParseError> {
        match self.next() {
            Some(next) => next.parse_function_params(p, func),
            None => p.base_function_params(func),
        }
    }

    fn parse_function_body(&self, p: &mut Parser<'_>, func: &mut Function) -> Result<(), ParseError> {
        match self.next() {
            Some(next) => next.parse_function_body(p, func),
            None => p.base_function_body(func),
        }
    }
}

/// The plain host language.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseGrammar;

impl Grammar for BaseGrammar {}
