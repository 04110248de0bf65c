#![forbid(unsafe_code)]

//! Security-label annotations for the host language.
//!
//! [`AnnotationGrammar`] decorates another [`Grammar`] with the annotation sublanguage:
//! label lists on bindings and signatures, `as`/`drop` postfix operators, and the
//! `SecAnn`, `traitrule` and `assert` statements. Annotated functions are rewritten as
//! soon as their body is parsed, so the program a caller gets back already carries its
//! run-time checks.

mod annotation;
mod checks;
mod inject;
mod signature;
mod statements;
mod tokens;

pub use annotation::{parse_label_annotation, parse_type_annotation};
pub use checks::{label_list_text, Checks, FAILED_CHECK};
pub use inject::{instrument_function, needs_checks, InjectStats};

use labelflow_ast::{Expr, Function, Pattern, Stmt};
use labelflow_lex::{TokenKind, TokenScanner};
use labelflow_parse::{BaseGrammar, Grammar, ParseError, Parser};

/// Names of the run-time objects the generated code calls into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeNames {
    /// Receiver of `declare`, `extends`, `assert`, `as`, `drop` and `cpAnn`.
    pub annotations: String,
    /// Receiver of `extend` for `traitrule`.
    pub traits: String,
    /// Function wrapping `symbolic` values.
    pub symbol: String,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            annotations: "SecurityAnnotation".to_string(),
            traits: "Trait".to_string(),
            symbol: "S$".to_string(),
        }
    }
}

/// Per-compilation instrumentation switch.
///
/// When disabled, every annotation is still parsed but produces no code, so the
/// output is the plain host-language program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentConfig {
    pub enabled: bool,
    pub names: RuntimeNames,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            names: RuntimeNames::default(),
        }
    }
}

impl InstrumentConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// The annotation sublanguage layered over `G`.
#[derive(Clone, Debug)]
pub struct AnnotationGrammar<G: Grammar = BaseGrammar> {
    pub(crate) next: G,
    pub(crate) config: InstrumentConfig,
}

impl AnnotationGrammar<BaseGrammar> {
    pub fn with_config(config: InstrumentConfig) -> Self {
        Self::new(BaseGrammar, config)
    }
}

impl Default for AnnotationGrammar<BaseGrammar> {
    fn default() -> Self {
        Self::with_config(InstrumentConfig::default())
    }
}

impl<G: Grammar> AnnotationGrammar<G> {
    pub fn new(next: G, config: InstrumentConfig) -> Self {
        Self { next, config }
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub(crate) fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub(crate) fn names(&self) -> &RuntimeNames {
        &self.config.names
    }
}

impl<G: Grammar> TokenScanner for AnnotationGrammar<G> {
    fn scan(&self, rest: &str) -> Option<(TokenKind, usize)> {
        tokens::scan(rest).or_else(|| self.next.scanner().and_then(|s| s.scan(rest)))
    }
}

impl<G: Grammar> Grammar for AnnotationGrammar<G> {
    fn next(&self) -> Option<&dyn Grammar> {
        Some(&self.next)
    }

    fn scanner(&self) -> Option<&dyn TokenScanner> {
        Some(self)
    }

    fn parse_statement(&self, p: &mut Parser<'_>) -> Result<Stmt, ParseError> {
        statements::parse_statement(self, p)
    }

    fn parse_binding_atom(&self, p: &mut Parser<'_>) -> Result<Pattern, ParseError> {
        signature::parse_binding_atom(self, p)
    }

    fn parse_expr_atom(&self, p: &mut Parser<'_>) -> Result<Expr, ParseError> {
        statements::parse_expr_atom(self, p)
    }

    fn parse_postfix(&self, p: &mut Parser<'_>, expr: Expr) -> Result<Expr, ParseError> {
        statements::parse_postfix(self, p, expr)
    }

    fn parse_function_params(&self, p: &mut Parser<'_>, func: &mut Function) -> Result<(), ParseError> {
        signature::parse_function_params(self, p, func)
    }

    fn parse_function_body(&self, p: &mut Parser<'_>, func: &mut Function) -> Result<(), ParseError> {
        signature::parse_function_body(self, p, func)
    }
}
