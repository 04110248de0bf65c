#![forbid(unsafe_code)]

use labelflow_ast::{join, Annotation, Expr, ExprKind, Label};
use labelflow_lex::TokenKind;
use labelflow_parse::{ParseError, Parser};

/// `[Base] [<! LabelList !>] [where Expr]`, after a `:` or a shape marker.
///
/// The base type is parsed at conditional-expression level, so `,`, `=` and `)` end it.
pub fn parse_type_annotation(p: &mut Parser<'_>, allow_where: bool) -> Result<Annotation, ParseError> {
    let start = p.here();
    let base = if matches!(p.peek_kind(), Some(TokenKind::Ident(_))) {
        Some(p.parse_conditional_expr()?)
    } else {
        None
    };

    let labels = if p.eat(TokenKind::LabelOpen) {
        parse_label_list(p, false)?
    } else if base.is_none() {
        return Err(p.error_here("expected a type or a label list '<!'"));
    } else {
        Vec::new()
    };

    let where_clause = if allow_where && p.eat(TokenKind::KwWhere) {
        Some(p.parse_conditional_expr()?)
    } else {
        None
    };

    Ok(Annotation {
        span: join(start, p.prev_span()),
        base,
        labels,
        where_clause,
    })
}

/// `<! LabelList !>` with no base type, as taken by `as` and `drop`.
pub fn parse_label_annotation(p: &mut Parser<'_>) -> Result<Annotation, ParseError> {
    let open = p.expect(TokenKind::LabelOpen)?;
    let labels = parse_label_list(p, false)?;
    Ok(Annotation {
        span: join(open.span, p.prev_span()),
        base: None,
        labels,
        where_clause: None,
    })
}

/// Labels separated by `*`, through the closing `!>`. The opening `<!` is already consumed.
pub(crate) fn parse_label_list(p: &mut Parser<'_>, allow_empty: bool) -> Result<Vec<Label>, ParseError> {
    let mut labels = Vec::new();
    if allow_empty && p.eat(TokenKind::LabelClose) {
        return Ok(labels);
    }
    loop {
        labels.push(parse_label(p)?);
        if !p.eat(TokenKind::Star) {
            break;
        }
    }
    if !p.eat(TokenKind::LabelClose) {
        return Err(p.error_here("expected '!>' to close the label list"));
    }
    Ok(labels)
}

fn parse_label(p: &mut Parser<'_>) -> Result<Label, ParseError> {
    let start = p.here();
    if p.eat(TokenKind::KwPtrait) {
        let target = parse_label_name(p)?;
        return Ok(Label::Ref {
            span: join(start, target.span),
            target,
        });
    }

    let name = parse_label_name(p)?;
    let parameters = if p.eat(TokenKind::LabelOpen) {
        parse_label_list(p, false)?
    } else {
        Vec::new()
    };
    let dependants = if p.eat(TokenKind::LParen) {
        p.parse_expr_list(TokenKind::RParen)?
    } else {
        Vec::new()
    };

    Ok(Label::Named {
        span: join(start, p.prev_span()),
        name,
        parameters,
        dependants,
    })
}

/// An identifier (or `this`) followed by member accesses; calls are not allowed.
fn parse_label_name(p: &mut Parser<'_>) -> Result<Expr, ParseError> {
    let head = if p.at(TokenKind::KwThis) {
        let tok = p.expect_any()?;
        Expr::new(tok.span, ExprKind::This)
    } else if p.at_ident() {
        let name = p.expect_ident()?;
        Expr::new(name.span, ExprKind::Ident(name))
    } else {
        return Err(p.error_here("a label must start with a name"));
    };
    p.parse_member_tail(head, false)
}

#[cfg(test)]
mod tests {
    use labelflow_lex::Lexer;
    use labelflow_parse::{format_expr, Grammar};

    use super::*;
    use crate::AnnotationGrammar;

    fn with_parser<T>(src: &str, f: impl FnOnce(&mut Parser<'_>) -> T) -> T {
        let grammar = AnnotationGrammar::default();
        let tokens = Lexer::new(src)
            .with_scanner(grammar.scanner())
            .lex()
            .unwrap();
        let mut p = Parser::new(&tokens, &grammar);
        f(&mut p)
    }

    fn names(labels: &[Label]) -> Vec<String> {
        labels
            .iter()
            .map(|l| match l {
                Label::Named { name, .. } => format_expr(name),
                Label::Ref { target, .. } => format!("ptrait {}", format_expr(target)),
            })
            .collect()
    }

    #[test]
    fn base_and_labels() {
        let ann = with_parser("Number <!A * B!>", |p| parse_type_annotation(p, false)).unwrap();
        assert!(matches!(ann.base.as_ref().map(|b| &b.kind), Some(ExprKind::Ident(_))));
        assert_eq!(names(&ann.labels), vec!["A", "B"]);
        assert!(ann.where_clause.is_none());
    }

    #[test]
    fn label_parameters_dependants_and_refs() {
        let ann = with_parser("<!Secret<!Key * ptrait this.level!>(owner, 2) * lib.Tainted!>", |p| {
            parse_type_annotation(p, false)
        })
        .unwrap();
        assert_eq!(names(&ann.labels), vec!["Secret", "lib.Tainted"]);
        let Label::Named {
            parameters,
            dependants,
            ..
        } = &ann.labels[0]
        else {
            panic!("expected named label");
        };
        assert_eq!(names(parameters), vec!["Key", "ptrait this.level"]);
        assert_eq!(dependants.len(), 2);
    }

    #[test]
    fn where_tail_only_when_allowed() {
        let ann = with_parser("<!A!> where x > 0", |p| parse_type_annotation(p, true)).unwrap();
        assert_eq!(ann.where_clause.as_ref().map(format_expr).as_deref(), Some("x > 0"));

        let (ann, next) = with_parser("<!A!> where x > 0", |p| {
            let ann = parse_type_annotation(p, false).unwrap();
            (ann, p.peek_kind().cloned())
        });
        assert!(ann.where_clause.is_none());
        assert_eq!(next, Some(TokenKind::KwWhere));
    }

    #[test]
    fn base_stops_at_comma_and_default() {
        let next = with_parser("Number, b", |p| {
            parse_type_annotation(p, true).unwrap();
            p.peek_kind().cloned()
        });
        assert_eq!(next, Some(TokenKind::Comma));
    }

    #[test]
    fn label_annotation_rejects_base_type() {
        let err = with_parser("Number <!A!>", parse_label_annotation).unwrap_err();
        assert!(err.message.contains("expected '<!'"), "{}", err.message);
    }

    #[test]
    fn missing_close_is_an_error() {
        let err = with_parser("<!A * B", |p| parse_type_annotation(p, false)).unwrap_err();
        assert!(err.message.contains("'!>'"), "{}", err.message);
    }

    #[test]
    fn label_must_start_with_a_name() {
        let err = with_parser("<!1!>", |p| parse_type_annotation(p, false)).unwrap_err();
        assert!(err.message.contains("must start with a name"), "{}", err.message);
    }

    #[test]
    fn empty_annotation_is_an_error() {
        let err = with_parser("= 3", |p| parse_type_annotation(p, true)).unwrap_err();
        assert!(err.message.contains("expected a type"), "{}", err.message);
    }
}
