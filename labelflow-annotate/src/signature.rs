#![forbid(unsafe_code)]

use std::mem;

use labelflow_ast::{join, BindingMeta, Function, FunctionBody, Pattern, ShapeConstraint, ThisBinding};
use labelflow_lex::TokenKind;
use labelflow_parse::{Grammar, ParseError, Parser};

use crate::annotation::parse_type_annotation;
use crate::inject::{instrument_function, needs_checks, normalize_concise_body};
use crate::AnnotationGrammar;

/// A binding followed by any number of annotation suffixes. Suffixes with no
/// binding in front annotate the implicit `this`.
pub(crate) fn parse_binding_atom<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
) -> Result<Pattern, ParseError> {
    if at_suffix(p) {
        let start = p.here();
        let mut meta = BindingMeta::default();
        parse_suffixes(p, &mut meta)?;
        return Ok(Pattern::This(ThisBinding {
            span: join(start, p.prev_span()),
            meta,
        }));
    }

    let mut pattern = g.next.parse_binding_atom(p)?;
    if let Pattern::Ident(binding) = &mut pattern {
        if at_suffix(p) {
            parse_suffixes(p, &mut binding.meta)?;
            binding.span = join(binding.span, p.prev_span());
        }
    }
    Ok(pattern)
}

fn at_suffix(p: &Parser<'_>) -> bool {
    matches!(
        p.peek_kind(),
        Some(TokenKind::Colon | TokenKind::ShapeSpecified | TokenKind::ShapeNum | TokenKind::ShapeAll)
    )
}

fn parse_suffixes(p: &mut Parser<'_>, meta: &mut BindingMeta) -> Result<(), ParseError> {
    loop {
        match p.peek_kind() {
            Some(TokenKind::Colon) => {
                p.expect_any()?;
                meta.expect(parse_type_annotation(p, true)?);
            }
            Some(TokenKind::ShapeAll) => {
                p.expect_any()?;
                meta.push_shape(ShapeConstraint::AllProps(parse_type_annotation(p, true)?));
            }
            Some(TokenKind::ShapeSpecified) => {
                p.expect_any()?;
                let (prop, annotation) = parse_shape_args(p)?;
                meta.push_shape(ShapeConstraint::SpecifiedProp { prop, annotation });
            }
            Some(TokenKind::ShapeNum) => {
                p.expect_any()?;
                let (count, annotation) = parse_shape_args(p)?;
                meta.push_shape(ShapeConstraint::NumProps { count, annotation });
            }
            _ => return Ok(()),
        }
    }
}

/// `[ Expr , Annotation ]`
fn parse_shape_args(
    p: &mut Parser<'_>,
) -> Result<(labelflow_ast::Expr, labelflow_ast::Annotation), ParseError> {
    p.expect(TokenKind::LBracket)?;
    let key = p.parse_assign_expr()?;
    p.expect(TokenKind::Comma)?;
    let annotation = parse_type_annotation(p, true)?;
    p.expect(TokenKind::RBracket)?;
    Ok((key, annotation))
}

/// Parameters, then `:this`, the return annotation and the `where` clause.
pub(crate) fn parse_function_params<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
    func: &mut Function,
) -> Result<(), ParseError> {
    g.next.parse_function_params(p, func)?;

    let mut this_binding: Option<ThisBinding> = None;
    let mut params = Vec::with_capacity(func.params.len());
    for param in mem::take(&mut func.params) {
        match param {
            Pattern::This(this) => {
                if this_binding.is_some() {
                    return Err(ParseError {
                        message: "only one 'this' annotation is allowed per function".to_string(),
                        span: this.span,
                    });
                }
                this_binding = Some(this);
            }
            Pattern::Assign { span, target, .. } if matches!(*target, Pattern::This(_)) => {
                return Err(ParseError {
                    message: "a 'this' annotation cannot have a default value".to_string(),
                    span,
                });
            }
            other => {
                if let Some(this) = other.find_this() {
                    return Err(ParseError {
                        message: "a 'this' annotation must be a parameter of its own".to_string(),
                        span: this.span,
                    });
                }
                params.push(other)
            }
        }
    }
    func.params = params;
    let mut this_check = this_binding.map(|this| this.meta);

    // Arrow functions take no signature annotations after the parameter list.
    if func.is_arrow {
        func.this_check = this_check;
        return Ok(());
    }

    if p.at(TokenKind::ThisAnnot) {
        let marker = p.expect_any()?;
        if this_check.is_some() {
            return Err(ParseError {
                message: "'this' is already annotated in the parameter list".to_string(),
                span: marker.span,
            });
        }
        let mut meta = BindingMeta::default();
        meta.expect(parse_type_annotation(p, false)?);
        this_check = Some(meta);
    }
    func.this_check = this_check;

    if p.eat(TokenKind::Colon) {
        func.return_type = Some(parse_type_annotation(p, false)?);
    }
    if p.eat(TokenKind::KwWhere) {
        func.where_clause = Some(p.parse_expr()?);
    }
    Ok(())
}

pub(crate) fn parse_function_body<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
    func: &mut Function,
) -> Result<(), ParseError> {
    g.next.parse_function_body(p, func)?;
    if !g.enabled() || !needs_checks(func) {
        return Ok(());
    }

    if matches!(func.body, FunctionBody::Expr(_)) {
        normalize_concise_body(func, p.fresh_return_site());
    }
    let stats = instrument_function(func, g.names());
    tracing::debug!(
        function = func.display_name(),
        preconditions = stats.preconditions,
        wrapped_returns = stats.wrapped_returns,
        tail_checks = stats.tail_checks,
        "instrumented function"
    );
    Ok(())
}
