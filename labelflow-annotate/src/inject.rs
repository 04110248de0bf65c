#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::mem;

use labelflow_ast::{
    span, Annotation, Block, Expr, ExprKind, Function, FunctionBody, Pattern, ReturnSite,
    ReturnStmt, Stmt,
};

use crate::checks::{Checks, RET};
use crate::RuntimeNames;

/// What one run of [`instrument_function`] added.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InjectStats {
    pub preconditions: usize,
    pub wrapped_returns: usize,
    pub tail_checks: usize,
}

impl InjectStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Whether instrumenting `func` would add any check.
pub fn needs_checks(func: &Function) -> bool {
    func.this_check.as_ref().is_some_and(|meta| !meta.is_empty())
        || func
            .params
            .iter()
            .flat_map(Pattern::bindings)
            .any(|b| !b.meta.is_empty())
        || func.where_clause.is_some()
        || func.return_type.as_ref().is_some_and(|ann| !ann.is_empty())
}

/// Rewrites a concise arrow body `=> expr` into `=> { return expr; }`.
pub fn normalize_concise_body(func: &mut Function, site: ReturnSite) {
    let placeholder = FunctionBody::Block(Block {
        span: func.span,
        stmts: Vec::new(),
    });
    func.body = match mem::replace(&mut func.body, placeholder) {
        FunctionBody::Expr(expr) => {
            let span = expr.span;
            FunctionBody::Block(Block {
                span,
                stmts: vec![Stmt::Return(ReturnStmt {
                    span,
                    argument: Some(*expr),
                    site,
                })],
            })
        }
        block => block,
    };
}

/// Splices precondition checks in front of the body of `func` and return-value checks in
/// front of every `return` it owns, plus once at the end of the body.
///
/// Runs at most once per function. Nested functions are left alone; they are
/// instrumented when their own body is parsed.
pub fn instrument_function(func: &mut Function, names: &RuntimeNames) -> InjectStats {
    let mut stats = InjectStats::default();
    if func.instrumented {
        return stats;
    }
    func.instrumented = true;

    let where_label = format!("{} where clause failed", func.display_name());
    let Function {
        body,
        params,
        this_check,
        return_type,
        where_clause,
        checked_returns,
        ..
    } = func;
    let FunctionBody::Block(body) = body else {
        return stats;
    };

    let checks = Checks::new(names, body.span);
    let mut pre = Vec::new();
    if let Some(clause) = where_clause {
        pre.push(checks.stmt(checks.generic_assert(clause.clone(), &where_label)));
    }
    if let Some(meta) = this_check {
        let this = Expr::new(checks.anchor(), ExprKind::This);
        pre.extend(checks.binding(&this, meta));
    }
    for binding in params.iter().flat_map(Pattern::bindings) {
        let value = checks.reference(&binding.name.node);
        pre.extend(checks.binding(&value, &binding.meta));
    }
    stats.preconditions = pre.len();
    body.stmts.splice(0..0, pre);

    let Some(ret_ann) = return_type.as_ref().filter(|ann| !ann.is_empty()) else {
        return stats;
    };

    let mut walker = ReturnWalker {
        checks,
        ann: ret_ann,
        checked: checked_returns,
        wrapped: 0,
    };
    walker.walk_list(&mut body.stmts);
    stats.wrapped_returns = walker.wrapped;

    // Anchored on the closing brace so trailing comments print before the checks.
    let end = body.span.offset() + body.span.len();
    let tail_at = span(end.saturating_sub(1).max(body.span.offset()), 0);
    let tail = checks.at(tail_at);
    let tail = tail.expectation(&tail.undefined(), ret_ann);
    stats.tail_checks = tail.len();
    body.stmts.extend(tail);

    stats
}

struct ReturnWalker<'a, 'n> {
    checks: Checks<'n>,
    ann: &'a Annotation,
    checked: &'a mut BTreeSet<ReturnSite>,
    wrapped: usize,
}

impl ReturnWalker<'_, '_> {
    fn walk_list(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.walk(stmt);
        }
    }

    fn walk(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Return(ret) => {
                if self.checked.insert(ret.site) {
                    let wrapped = self.wrap(ret.clone());
                    *stmt = wrapped;
                }
            }
            Stmt::Block(block) => self.walk_list(&mut block.stmts),
            Stmt::If(s) => {
                self.walk(&mut s.consequent);
                if let Some(alternate) = &mut s.alternate {
                    self.walk(alternate);
                }
            }
            Stmt::For(s) => self.walk(&mut s.body),
            Stmt::ForIn(s) => self.walk(&mut s.body),
            Stmt::While(s) => self.walk(&mut s.body),
            Stmt::DoWhile(s) => self.walk(&mut s.body),
            Stmt::Try(s) => {
                self.walk_list(&mut s.block.stmts);
                if let Some(handler) = &mut s.handler {
                    self.walk_list(&mut handler.body.stmts);
                }
                if let Some(finalizer) = &mut s.finalizer {
                    self.walk_list(&mut finalizer.stmts);
                }
            }
            Stmt::Switch(s) => {
                for case in &mut s.cases {
                    self.walk_list(&mut case.body);
                }
            }
            Stmt::Expr(_)
            | Stmt::Var(_)
            | Stmt::Function(_)
            | Stmt::Throw(_)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Empty(_) => {}
        }
    }

    /// `{ <checks on the value>; return <value>; }`, evaluating the argument once.
    fn wrap(&mut self, mut ret: ReturnStmt) -> Stmt {
        let checks = self.checks.at(ret.span);
        let mut stmts = Vec::new();
        let value = match ret.argument.take() {
            None => checks.undefined(),
            Some(arg) if is_simple(&arg) => {
                ret.argument = Some(arg.clone());
                arg
            }
            Some(arg) => {
                stmts.push(checks.var(RET, arg));
                let value = checks.reference(RET);
                ret.argument = Some(value.clone());
                value
            }
        };
        stmts.extend(checks.expectation(&value, self.ann));
        stmts.push(Stmt::Return(ret));
        self.wrapped += 1;
        Stmt::Block(checks.block(stmts))
    }
}

/// Evaluating the expression twice has no observable effect.
fn is_simple(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_)
            | ExprKind::This
            | ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
    )
}

#[cfg(test)]
mod tests {
    use labelflow_parse::{format_program, parse_source_with};

    use super::*;
    use crate::{AnnotationGrammar, InstrumentConfig};

    fn first_function(src: &str, config: InstrumentConfig) -> Function {
        let grammar = AnnotationGrammar::with_config(config);
        let program = parse_source_with(src, &grammar).unwrap();
        match program.body.into_iter().next() {
            Some(Stmt::Function(f)) => f,
            other => panic!("expected a function declaration, got {other:?}"),
        }
    }

    fn print_function(func: Function) -> String {
        format_program(&labelflow_ast::Program {
            body: vec![Stmt::Function(func)],
            comments: Vec::new(),
        })
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn every_return_site_is_checked_once_plus_tail() {
        let src = "function f(x) :<!R!> {
            if (x) { return 1; } else if (x > 2) return 2;
            for (;;) { while (x) { return x; } }
            try { return g(x); } catch (e) { return e; } finally { h(); }
            switch (x) { case 1: return; default: break; }
            var inner = function () { return 5; };
            return x;
        }";
        let func = first_function(src, InstrumentConfig::default());
        assert_eq!(func.checked_returns.len(), 7);

        let out = print_function(func);
        // Seven return sites plus the implicit end of the function.
        assert_eq!(count(&out, "SecurityAnnotation.assert("), 8);
        assert!(out.contains("var $lfRet = g(x);"), "{out}");
        // The bare `return;` in the switch and the end of the body.
        assert_eq!(count(&out, "SecurityAnnotation.assert(undefined, \"R\");"), 2, "{out}");
        // The nested function's own return is not the outer function's exit.
        assert!(out.contains("var inner = function () {\n        return 5;\n    };"), "{out}");
    }

    #[test]
    fn instrumenting_twice_changes_nothing() {
        let mut func = first_function(
            "function f(a :<!A!>) :<!R!> { if (a) return a; return 0; }",
            InstrumentConfig::default(),
        );
        assert!(func.instrumented);
        let before = func.clone();
        let stats = instrument_function(&mut func, &RuntimeNames::default());
        assert!(stats.is_empty());
        assert_eq!(func, before);

        // Even with the flag cleared, checked return sites are not wrapped again.
        func.instrumented = false;
        func.params.clear();
        func.return_type = before.return_type.clone();
        let stats = instrument_function(&mut func, &RuntimeNames::default());
        assert_eq!(stats.wrapped_returns, 0);
    }

    #[test]
    fn preconditions_follow_parameter_order() {
        let func = first_function(
            "function f(a :<!A!>, b :<!B!>) { body(); }",
            InstrumentConfig::default(),
        );
        let out = print_function(func);
        assert_eq!(
            out,
            concat!(
                "function f(a, b) {\n",
                "    SecurityAnnotation.assert(a, \"A\");\n",
                "    SecurityAnnotation.assert(b, \"B\");\n",
                "    body();\n",
                "}\n",
            )
        );
    }

    #[test]
    fn destructured_and_rest_parameters_are_checked() {
        let func = first_function(
            "function f([a :<!A!>, , { k: b :<!B!> }], ...r :<!C!>) { return a; }",
            InstrumentConfig::default(),
        );
        assert!(needs_checks(&func));
        let out = print_function(func);
        assert_eq!(count(&out, "SecurityAnnotation.assert("), 3, "{out}");
        let a_at = out.find("assert(a, \"A\")").unwrap();
        let b_at = out.find("assert(b, \"B\")").unwrap();
        let r_at = out.find("assert(r, \"C\")").unwrap();
        assert!(a_at < b_at && b_at < r_at, "{out}");
    }

    #[test]
    fn where_clause_runs_first_then_this_then_parameters() {
        let func = first_function(
            "function f(:<!T!> :S['k', <!K!>], a :Number = 1) where a > 0 { }",
            InstrumentConfig::default(),
        );
        assert!(func.this_check.is_some());
        let out = print_function(func);
        let this_at = out.find("assert(this, \"T\")").unwrap();
        let shape_at = out.find("indexOf(\"k\")").unwrap();
        let param_at = out.find("assert(a, Number)").unwrap();
        let where_at = out.find("\"f where clause failed: a > 0\"").unwrap();
        assert!(where_at < this_at && this_at < shape_at && shape_at < param_at, "{out}");
        assert!(out.starts_with("function f(a = 1) {"), "{out}");
    }

    #[test]
    fn unannotated_functions_are_untouched() {
        let func = first_function("function f(a) { return a; }", InstrumentConfig::default());
        assert!(!needs_checks(&func));
        assert_eq!(print_function(func), "function f(a) {\n    return a;\n}\n");
    }

    #[test]
    fn concise_arrow_bodies_become_blocks_when_checked() {
        let grammar = AnnotationGrammar::default();
        let program = parse_source_with("var f = (a :<!A!>) => a + 1;", &grammar).unwrap();
        let out = format_program(&program);
        assert_eq!(
            out,
            concat!(
                "var f = (a) => {\n",
                "    SecurityAnnotation.assert(a, \"A\");\n",
                "    return a + 1;\n",
                "};\n",
            )
        );
    }
}
