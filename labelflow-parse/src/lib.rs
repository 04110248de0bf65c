#![forbid(unsafe_code)]

mod error;
mod fmt;
mod grammar;
mod parser;

pub use error::ParseError;
pub use fmt::{format_expr, format_program};
pub use grammar::{BaseGrammar, Grammar};
pub use parser::Parser;

use labelflow_ast::{Expr, Program};
use labelflow_lex::Lexer;

pub fn parse_source(src: &str) -> miette::Result<Program> {
    parse_source_with(src, &BaseGrammar)
}

/// Parses `src` with `grammar`, attaching the source comments to the program.
pub fn parse_source_with(src: &str, grammar: &dyn Grammar) -> miette::Result<Program> {
    let lexed = Lexer::new(src)
        .with_scanner(grammar.scanner())
        .lex_with_comments()
        .map_err(miette::Report::new)?;
    tracing::trace!(tokens = lexed.tokens.len(), comments = lexed.comments.len(), "lexed");

    let mut parser = Parser::new(&lexed.tokens, grammar);
    let mut program = parser.parse_program().map_err(miette::Report::new)?;
    program.comments = lexed.comments;
    tracing::debug!(statements = program.body.len(), "parsed program");
    Ok(program)
}

pub fn parse_expr(src: &str) -> miette::Result<Expr> {
    parse_expr_with(src, &BaseGrammar)
}

pub fn parse_expr_with(src: &str, grammar: &dyn Grammar) -> miette::Result<Expr> {
    let tokens = Lexer::new(src)
        .with_scanner(grammar.scanner())
        .lex()
        .map_err(miette::Report::new)?;
    let mut parser = Parser::new(&tokens, grammar);
    parser.parse_expr_eof().map_err(miette::Report::new)
}
