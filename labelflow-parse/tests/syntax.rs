use labelflow_ast::{ExprKind, ForInTarget, FunctionBody, Pattern, Stmt};
use labelflow_parse::{format_program, parse_expr, parse_source};

#[test]
fn parses_statements_without_semicolons() {
    let program = parse_source("var a = 1\nvar b = a\nb++\nreturnValue()").unwrap();
    assert_eq!(program.body.len(), 4);
    assert!(matches!(program.body[2], Stmt::Expr(_)));
}

#[test]
fn return_stops_at_line_break() {
    let program = parse_source("function f() {\n    return\n    1\n}").unwrap();
    let Stmt::Function(f) = &program.body[0] else {
        panic!("expected function");
    };
    let FunctionBody::Block(body) = &f.body else {
        panic!("expected block body");
    };
    assert_eq!(body.stmts.len(), 2);
    let Stmt::Return(ret) = &body.stmts[0] else {
        panic!("expected return");
    };
    assert!(ret.argument.is_none());
}

#[test]
fn return_sites_are_distinct() {
    let program = parse_source("function f(x) { if (x) return 1; return 2 }").unwrap();
    let Stmt::Function(f) = &program.body[0] else {
        panic!("expected function");
    };
    let FunctionBody::Block(body) = &f.body else {
        panic!("expected block body");
    };
    let Stmt::If(if_stmt) = &body.stmts[0] else {
        panic!("expected if");
    };
    let Stmt::Return(first) = if_stmt.consequent.as_ref() else {
        panic!("expected return");
    };
    let Stmt::Return(second) = &body.stmts[1] else {
        panic!("expected return");
    };
    assert_ne!(first.site, second.site);
}

#[test]
fn parses_arrow_functions() {
    let expr = parse_expr("(a, b = 2) => a + b").unwrap();
    let ExprKind::Function(f) = &expr.kind else {
        panic!("expected function");
    };
    assert!(f.is_arrow);
    assert_eq!(f.params.len(), 2);
    assert!(matches!(f.params[1], Pattern::Assign { .. }));
    assert!(matches!(f.body, FunctionBody::Expr(_)));

    let expr = parse_expr("x => { return x }").unwrap();
    let ExprKind::Function(f) = &expr.kind else {
        panic!("expected function");
    };
    assert!(matches!(f.body, FunctionBody::Block(_)));
}

#[test]
fn parenthesized_expression_is_not_an_arrow() {
    let expr = parse_expr("(a, b) + c").unwrap();
    assert!(matches!(expr.kind, ExprKind::Binary { .. }));
}

#[test]
fn for_in_and_for_of_heads() {
    let program = parse_source("for (var k in obj) {}\nfor (x of xs) {}\nfor (var i = 0, n = 3; i < n; i++) {}")
        .unwrap();
    let Stmt::ForIn(first) = &program.body[0] else {
        panic!("expected for-in");
    };
    assert!(!first.of);
    assert!(matches!(first.target, ForInTarget::Var { .. }));
    let Stmt::ForIn(second) = &program.body[1] else {
        panic!("expected for-of");
    };
    assert!(second.of);
    assert!(matches!(second.target, ForInTarget::Expr(_)));
    assert!(matches!(program.body[2], Stmt::For(_)));
}

#[test]
fn member_call_and_new_chains() {
    let expr = parse_expr("new a.B(1).c(2)[d]").unwrap();
    let ExprKind::Member { object, .. } = &expr.kind else {
        panic!("expected member");
    };
    let ExprKind::Call { callee, .. } = &object.kind else {
        panic!("expected call");
    };
    let ExprKind::Member { object, .. } = &callee.kind else {
        panic!("expected member");
    };
    assert!(matches!(object.kind, ExprKind::New { .. }));
}

#[test]
fn reserved_words_are_property_names() {
    let expr = parse_expr("o.new + o.in + o.default").unwrap();
    assert!(matches!(expr.kind, ExprKind::Binary { .. }));
    assert!(parse_source("var o = { if: 1, class: 2 }").is_ok());
}

#[test]
fn rejects_invalid_assignment_target() {
    let err = parse_source("a + b = c").expect_err("expected parse error");
    assert!(err.to_string().contains("invalid assignment target"), "{err}");
}

#[test]
fn rejects_missing_catch_and_finally() {
    let err = parse_source("try { a() }").expect_err("expected parse error");
    assert!(err.to_string().contains("missing 'catch' or 'finally'"), "{err}");
}

#[test]
fn rejects_two_statements_on_one_line() {
    let err = parse_source("a b").expect_err("expected parse error");
    assert!(err.to_string().contains("expected ';'"), "{err}");
}

#[test]
fn rejects_unclosed_block() {
    let err = parse_source("function f() { a()").expect_err("expected parse error");
    assert!(err.to_string().contains("expected '}'"), "{err}");
}

#[test]
fn lex_errors_surface_through_parse_source() {
    let err = parse_source("x = 'abc").expect_err("expected lex error");
    assert!(err.to_string().contains("unterminated string"), "{err}");
}

#[test]
fn formatter_output_reparses_to_the_same_text() {
    let src = "switch (k) { case 'a': f(); break; default: g() }\nvar o = { a: [1, 2], b: function () { return this.a } };\n";
    let once = format_program(&parse_source(src).unwrap());
    let twice = format_program(&parse_source(&once).unwrap());
    assert_eq!(once, twice);
}
