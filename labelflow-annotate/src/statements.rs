#![forbid(unsafe_code)]

use labelflow_ast::{join, Expr, ExprKind, Stmt};
use labelflow_lex::TokenKind;
use labelflow_parse::{Grammar, ParseError, Parser};

use crate::annotation::{parse_label_annotation, parse_label_list, parse_type_annotation};
use crate::checks::{label_list_text, Checks};
use crate::AnnotationGrammar;

pub(crate) fn parse_statement<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
) -> Result<Stmt, ParseError> {
    let used_as_name = matches!(p.peek_kind_n(1), Some(TokenKind::Dot | TokenKind::Eq));
    match p.peek_kind() {
        Some(TokenKind::KwSecAnn) if !used_as_name => parse_sec_ann(g, p),
        Some(TokenKind::KwTraitRule) if !used_as_name => parse_trait_rule(g, p),
        Some(TokenKind::KwAssert) if !used_as_name => parse_assert(g, p),
        _ => g.next.parse_statement(p),
    }
}

/// `SecAnn <! A * B !> [Extends <! C !>] ;`
fn parse_sec_ann<G: Grammar>(g: &AnnotationGrammar<G>, p: &mut Parser<'_>) -> Result<Stmt, ParseError> {
    let kw = p.expect_any()?;
    p.expect(TokenKind::LabelOpen)?;
    let labels = parse_label_list(p, true)?;
    let parents = if p.eat(TokenKind::KwExtends) {
        p.expect(TokenKind::LabelOpen)?;
        Some(parse_label_list(p, true)?)
    } else {
        None
    };
    p.consume_semicolon()?;
    let span = join(kw.span, p.prev_span());

    let empty = labels.is_empty() || parents.as_ref().is_some_and(Vec::is_empty);
    if !g.enabled() || empty {
        tracing::trace!(labels = %label_list_text(&labels), "suppressed label declaration");
        return Ok(Stmt::Empty(span));
    }

    let checks = Checks::new(g.names(), span);
    let call = match &parents {
        Some(parents) => {
            tracing::trace!(
                labels = %label_list_text(&labels),
                parents = %label_list_text(parents),
                "declared label hierarchy"
            );
            checks.extends(&labels, parents)
        }
        None => {
            tracing::trace!(labels = %label_list_text(&labels), "declared labels");
            checks.declare(&labels)
        }
    };
    Ok(checks.stmt(call))
}

/// `traitrule Target name [function] (params) { body }`
fn parse_trait_rule<G: Grammar>(g: &AnnotationGrammar<G>, p: &mut Parser<'_>) -> Result<Stmt, ParseError> {
    let kw = p.expect_any()?;
    let target = p.parse_expr()?;
    let name = p.expect_ident()?;
    let start = p.here();
    p.eat(TokenKind::KwFunction);
    let func = p.parse_function_rest(start, None, false)?;
    p.consume_semicolon()?;
    let span = join(kw.span, p.prev_span());

    if !g.enabled() {
        tracing::trace!(rule = %name.node, "suppressed trait rule");
        return Ok(Stmt::Empty(span));
    }
    let checks = Checks::new(g.names(), span);
    Ok(checks.stmt(checks.trait_rule(target, &name, func)))
}

/// `assert Expr [is Annotation] ;`
fn parse_assert<G: Grammar>(g: &AnnotationGrammar<G>, p: &mut Parser<'_>) -> Result<Stmt, ParseError> {
    let kw = p.expect_any()?;
    let value = p.parse_expr()?;
    let annotation = if p.eat(TokenKind::KwIs) {
        Some(parse_type_annotation(p, true)?)
    } else {
        None
    };
    p.consume_semicolon()?;
    let span = join(kw.span, p.prev_span());

    if !g.enabled() {
        return Ok(Stmt::Empty(span));
    }
    let checks = Checks::new(g.names(), span);
    Ok(match annotation {
        Some(annotation) => Stmt::Block(checks.block(checks.expectation(&value, &annotation))),
        None => checks.stmt(checks.generic_assert(value, "assertion")),
    })
}

/// `symbolic name Expr` and the `cpAnn` pseudo-function.
pub(crate) fn parse_expr_atom<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
) -> Result<Expr, ParseError> {
    match (p.peek_kind(), p.peek_kind_n(1)) {
        (Some(TokenKind::KwSymbolic), Some(TokenKind::Ident(_))) => {
            let kw = p.expect_any()?;
            let name = p.expect_ident()?;
            let value = p.parse_conditional_expr()?;
            if !g.enabled() {
                return Ok(value);
            }
            Ok(Checks::new(g.names(), kw.span).symbol(&name, value))
        }
        (Some(TokenKind::Ident(name)), Some(TokenKind::LParen)) if name == "cpAnn" => parse_cp_ann(g, p),
        _ => g.next.parse_expr_atom(p),
    }
}

fn parse_cp_ann<G: Grammar>(g: &AnnotationGrammar<G>, p: &mut Parser<'_>) -> Result<Expr, ParseError> {
    let name = p.expect_any()?;
    if g.enabled() {
        // The argument list is parsed as an ordinary call on the runtime member.
        return Ok(Checks::new(g.names(), name.span).cp_ann());
    }

    p.expect(TokenKind::LParen)?;
    let args = p.parse_expr_list(TokenKind::RParen)?;
    let span = join(name.span, p.prev_span());
    if args.len() != 2 {
        return Err(ParseError {
            message: format!("cpAnn takes 2 arguments, found {}", args.len()),
            span,
        });
    }
    Ok(Expr::new(span, ExprKind::Sequence(args)))
}

/// `as`/`drop` label operators, on either side of `++`/`--`.
pub(crate) fn parse_postfix<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
    expr: Expr,
) -> Result<Expr, ParseError> {
    let expr = parse_label_ops(g, p, expr)?;
    let expr = g.next.parse_postfix(p, expr)?;
    parse_label_ops(g, p, expr)
}

fn parse_label_ops<G: Grammar>(
    g: &AnnotationGrammar<G>,
    p: &mut Parser<'_>,
    mut expr: Expr,
) -> Result<Expr, ParseError> {
    loop {
        let dropping = match p.peek_kind() {
            Some(TokenKind::KwAs) => false,
            Some(TokenKind::KwDrop) => true,
            _ => return Ok(expr),
        };
        if p.newline_before() || !matches!(p.peek_kind_n(1), Some(TokenKind::LabelOpen)) {
            return Ok(expr);
        }
        p.expect_any()?;
        let annotation = parse_label_annotation(p)?;
        if !g.enabled() {
            continue;
        }

        let checks = Checks::new(g.names(), annotation.span);
        for label in &annotation.labels {
            expr = if dropping {
                checks.drop(expr, label)
            } else {
                checks.assume(expr, label)
            };
        }
        let op = if dropping { "drop" } else { "as" };
        tracing::trace!(
            op,
            labels = %label_list_text(&annotation.labels),
            "rewrote label operator"
        );
    }
}
