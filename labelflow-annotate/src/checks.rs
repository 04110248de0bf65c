#![forbid(unsafe_code)]

use labelflow_ast::{
    span, Annotation, BinOp, Binding, BindingMeta, Block, CatchClause, Expr, ExprKind, ForInit,
    ForStmt, Function, Ident, IfStmt, Label, MemberProp, Pattern, Span, Stmt, ThrowStmt, TryStmt,
    UnaryOp, UpdateOp, VarDecl, VarDeclarator, VarKind,
};
use labelflow_parse::format_expr;

use crate::RuntimeNames;

/// Thrown by every shape check that fails.
pub const FAILED_CHECK: &str = "FailedAnnotationCheck";

const PROPS: &str = "$lfProps";
const ITER: &str = "$lfIter";
const HITS: &str = "$lfHits";
const ERR: &str = "$lfErr";
pub(crate) const RET: &str = "$lfRet";

/// Builds runtime checks and calls.
///
/// Every synthesized node carries a zero-length span at the anchor position, so that
/// source comments never attach to generated code.
#[derive(Clone, Copy, Debug)]
pub struct Checks<'n> {
    names: &'n RuntimeNames,
    at: Span,
}

impl<'n> Checks<'n> {
    pub fn new(names: &'n RuntimeNames, at: Span) -> Self {
        Self {
            names,
            at: span(at.offset(), 0),
        }
    }

    /// The same builder anchored at `at`.
    pub fn at(self, at: Span) -> Self {
        Self::new(self.names, at)
    }

    pub fn anchor(&self) -> Span {
        self.at
    }

    // --- Runtime contract ---------------------------------------------------------

    /// `declare("A * B")`.
    pub fn declare(&self, labels: &[Label]) -> Expr {
        self.runtime_call("declare", vec![self.string(label_list_text(labels))])
    }

    /// `extends("A * B", "C")`.
    pub fn extends(&self, child: &[Label], parent: &[Label]) -> Expr {
        self.runtime_call(
            "extends",
            vec![
                self.string(label_list_text(child)),
                self.string(label_list_text(parent)),
            ],
        )
    }

    pub fn assert(&self, value: Expr, label: Expr) -> Expr {
        self.runtime_call("assert", vec![value, label])
    }

    /// `as(value, "L")`: `value` takes on the label.
    pub fn assume(&self, value: Expr, label: &Label) -> Expr {
        self.runtime_call("as", vec![value, self.label_arg(label)])
    }

    pub fn drop(&self, value: Expr, label: &Label) -> Expr {
        self.runtime_call("drop", vec![value, self.label_arg(label)])
    }

    /// The `cpAnn` runtime function; the call arguments are supplied by the caller.
    pub fn cp_ann(&self) -> Expr {
        self.runtime("cpAnn")
    }

    /// `Trait.extend(target, "name", function (...) { ... })`.
    pub fn trait_rule(&self, target: Expr, name: &Ident, func: Function) -> Expr {
        let callee = self.member(self.reference(&self.names.traits), "extend");
        let func = Expr::new(func.span, ExprKind::Function(Box::new(func)));
        self.call(callee, vec![target, self.string(name.node.clone()), func])
    }

    /// `S$("name", value)`.
    pub fn symbol(&self, name: &Ident, value: Expr) -> Expr {
        let callee = self.reference(&self.names.symbol);
        self.call(callee, vec![self.string(name.node.clone()), value])
    }

    /// `assert(value, "<what>: <source of value>")`.
    pub fn generic_assert(&self, value: Expr, what: &str) -> Expr {
        let description = format!("{what}: {}", format_expr(&value));
        let description = self.string(description);
        self.assert(value, description)
    }

    /// The label argument of `assert`, `as` and `drop`: a string literal naming the label,
    /// or for `ptrait` the referenced expression itself.
    pub fn label_arg(&self, label: &Label) -> Expr {
        match label {
            Label::Named { name, .. } => self.string(format_expr(name)),
            Label::Ref { target, .. } => target.clone(),
        }
    }

    // --- Expectations -------------------------------------------------------------

    /// Base, label and where-clause checks of `ann` against `value`.
    pub fn expectation(&self, value: &Expr, ann: &Annotation) -> Vec<Stmt> {
        let mut out = Vec::new();
        if let Some(base) = &ann.base {
            out.push(self.stmt(self.assert(value.clone(), base.clone())));
        }
        for label in &ann.labels {
            out.push(self.stmt(self.assert(value.clone(), self.label_arg(label))));
        }
        if let Some(clause) = &ann.where_clause {
            out.push(self.stmt(self.generic_assert(clause.clone(), "assertion")));
        }
        out
    }

    /// Every check a binding carries: expected annotation, all-properties, then each
    /// specified-property and each num-properties constraint.
    pub fn binding(&self, value: &Expr, meta: &BindingMeta) -> Vec<Stmt> {
        let mut out = Vec::new();
        if let Some(expected) = &meta.expected {
            out.extend(self.expectation(value, expected));
        }
        if let Some(all) = meta.all_props() {
            out.push(self.all_props(value, all));
        }
        for (prop, ann) in meta.specified_props() {
            out.push(self.specified_prop(value, prop, ann));
        }
        for (count, ann) in meta.num_props() {
            out.push(self.num_props(value, count, ann));
        }
        out
    }

    /// Every own property of `value` satisfies `ann`.
    pub fn all_props(&self, value: &Expr, ann: &Annotation) -> Stmt {
        let element = self.index(value.clone(), self.index(self.reference(PROPS), self.reference(ITER)));
        let body = self.expectation(&element, ann);
        let consequent = vec![self.props_decl(value), self.props_loop(body)];
        self.if_else_fail(self.object_guard(value), consequent)
    }

    /// At least `count` own properties of `value` satisfy `ann`.
    pub fn num_props(&self, value: &Expr, count: &Expr, ann: &Annotation) -> Stmt {
        let element = self.index(value.clone(), self.index(self.reference(PROPS), self.reference(ITER)));
        let mut attempt = self.expectation(&element, ann);
        attempt.push(self.stmt(self.increment(HITS)));

        let counted = Stmt::Try(TryStmt {
            span: self.at,
            block: self.block(attempt),
            handler: Some(CatchClause {
                span: self.at,
                param: Some(self.binding_pattern(ERR)),
                body: self.block(Vec::new()),
            }),
            finalizer: None,
        });

        let too_few = Stmt::If(IfStmt {
            span: self.at,
            test: self.binary(self.reference(HITS), BinOp::Lt, count.clone()),
            consequent: Box::new(self.fail()),
            alternate: None,
        });

        let consequent = vec![
            self.props_decl(value),
            self.var(HITS, self.number("0")),
            self.props_loop(vec![counted]),
            too_few,
        ];
        self.if_else_fail(self.object_guard(value), consequent)
    }

    /// `value` has the own property `prop`, and `value[prop]` satisfies `ann`.
    pub fn specified_prop(&self, value: &Expr, prop: &Expr, ann: &Annotation) -> Stmt {
        let names = self.call(
            self.member(self.reference("Object"), "getOwnPropertyNames"),
            vec![value.clone()],
        );
        let position = self.call(self.member(names, "indexOf"), vec![prop.clone()]);
        let has_prop = self.binary(position, BinOp::Ge, self.number("0"));
        let guard = self.binary(self.object_guard(value), BinOp::And, has_prop);

        let element = self.index(value.clone(), prop.clone());
        self.if_else_fail(guard, self.expectation(&element, ann))
    }

    // --- Tree helpers -------------------------------------------------------------

    pub fn reference(&self, name: &str) -> Expr {
        Expr::new(self.at, ExprKind::Ident(Ident::new(self.at, name.to_string())))
    }

    pub fn undefined(&self) -> Expr {
        self.reference("undefined")
    }

    pub fn stmt(&self, expr: Expr) -> Stmt {
        Stmt::expr(Expr { span: self.at, ..expr })
    }

    pub fn block(&self, stmts: Vec<Stmt>) -> Block {
        Block { span: self.at, stmts }
    }

    /// `var name = init;`
    pub fn var(&self, name: &str, init: Expr) -> Stmt {
        Stmt::Var(VarDecl {
            span: self.at,
            kind: VarKind::Var,
            decls: vec![VarDeclarator {
                span: self.at,
                target: self.binding_pattern(name),
                init: Some(init),
            }],
        })
    }

    fn binding_pattern(&self, name: &str) -> Pattern {
        Pattern::Ident(Binding {
            span: self.at,
            name: Ident::new(self.at, name.to_string()),
            meta: BindingMeta::default(),
        })
    }

    fn string(&self, value: String) -> Expr {
        Expr::new(self.at, ExprKind::Str(value))
    }

    fn number(&self, raw: &str) -> Expr {
        Expr::new(self.at, ExprKind::Number(raw.to_string()))
    }

    fn member(&self, object: Expr, name: &str) -> Expr {
        Expr::new(
            self.at,
            ExprKind::Member {
                object: Box::new(object),
                property: MemberProp::Named(Ident::new(self.at, name.to_string())),
            },
        )
    }

    fn index(&self, object: Expr, property: Expr) -> Expr {
        Expr::new(
            self.at,
            ExprKind::Member {
                object: Box::new(object),
                property: MemberProp::Computed(Box::new(property)),
            },
        )
    }

    fn call(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::new(
            self.at,
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
        )
    }

    fn binary(&self, left: Expr, op: BinOp, right: Expr) -> Expr {
        Expr::new(
            self.at,
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        )
    }

    fn increment(&self, name: &str) -> Expr {
        Expr::new(
            self.at,
            ExprKind::Update {
                op: UpdateOp::Incr,
                prefix: false,
                expr: Box::new(self.reference(name)),
            },
        )
    }

    fn runtime(&self, method: &str) -> Expr {
        self.member(self.reference(&self.names.annotations), method)
    }

    fn runtime_call(&self, method: &str, args: Vec<Expr>) -> Expr {
        self.call(self.runtime(method), args)
    }

    /// `typeof value == "object" && value !== null`
    fn object_guard(&self, value: &Expr) -> Expr {
        let type_of = Expr::new(
            self.at,
            ExprKind::Unary {
                op: UnaryOp::Typeof,
                expr: Box::new(value.clone()),
            },
        );
        let is_object = self.binary(type_of, BinOp::Eq, self.string("object".to_string()));
        let not_null = self.binary(value.clone(), BinOp::StrictNe, Expr::new(self.at, ExprKind::Null));
        self.binary(is_object, BinOp::And, not_null)
    }

    /// `var $lfProps = Object.getOwnPropertyNames(value);`
    fn props_decl(&self, value: &Expr) -> Stmt {
        let names = self.call(
            self.member(self.reference("Object"), "getOwnPropertyNames"),
            vec![value.clone()],
        );
        self.var(PROPS, names)
    }

    /// `for (var $lfIter = 0; $lfIter < $lfProps.length; $lfIter++) { body }`
    fn props_loop(&self, body: Vec<Stmt>) -> Stmt {
        let init = VarDecl {
            span: self.at,
            kind: VarKind::Var,
            decls: vec![VarDeclarator {
                span: self.at,
                target: self.binding_pattern(ITER),
                init: Some(self.number("0")),
            }],
        };
        Stmt::For(ForStmt {
            span: self.at,
            init: Some(ForInit::Var(init)),
            test: Some(self.binary(
                self.reference(ITER),
                BinOp::Lt,
                self.member(self.reference(PROPS), "length"),
            )),
            update: Some(self.increment(ITER)),
            body: Box::new(Stmt::Block(self.block(body))),
        })
    }

    /// `{ throw "FailedAnnotationCheck"; }`
    fn fail(&self) -> Stmt {
        Stmt::Block(self.block(vec![Stmt::Throw(ThrowStmt {
            span: self.at,
            argument: self.string(FAILED_CHECK.to_string()),
        })]))
    }

    fn if_else_fail(&self, test: Expr, consequent: Vec<Stmt>) -> Stmt {
        Stmt::If(IfStmt {
            span: self.at,
            test,
            consequent: Box::new(Stmt::Block(self.block(consequent))),
            alternate: Some(Box::new(self.fail())),
        })
    }
}

/// Label names joined by `" * "`, as passed to `declare` and `extends`.
pub fn label_list_text(labels: &[Label]) -> String {
    labels
        .iter()
        .map(|label| match label {
            Label::Named { name, .. } => format_expr(name),
            Label::Ref { target, .. } => format_expr(target),
        })
        .collect::<Vec<_>>()
        .join(" * ")
}

#[cfg(test)]
mod tests {
    use labelflow_ast::Program;
    use labelflow_parse::format_program;

    use super::*;

    fn label(name: &str) -> Label {
        let at = span(0, 0);
        Label::Named {
            span: at,
            name: Expr::new(at, ExprKind::Ident(Ident::new(at, name.to_string()))),
            parameters: Vec::new(),
            dependants: Vec::new(),
        }
    }

    fn annotated(names: &[&str]) -> Annotation {
        let mut ann = Annotation::empty(span(0, 0));
        ann.labels = names.iter().map(|n| label(n)).collect();
        ann
    }

    fn print(stmts: Vec<Stmt>) -> String {
        format_program(&Program {
            body: stmts,
            comments: Vec::new(),
        })
    }

    #[test]
    fn declare_joins_labels_in_order() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let call = checks.declare(&annotated(&["A", "B", "C"]).labels);
        assert_eq!(format_expr(&call), r#"SecurityAnnotation.declare("A * B * C")"#);

        let call = checks.extends(&annotated(&["A", "B"]).labels, &annotated(&["C"]).labels);
        assert_eq!(format_expr(&call), r#"SecurityAnnotation.extends("A * B", "C")"#);
    }

    #[test]
    fn expectation_checks_base_then_labels_then_where() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let mut ann = annotated(&["A", "B"]);
        ann.base = Some(checks.reference("Number"));
        ann.where_clause = Some(checks.reference("ok"));
        let out = print(checks.expectation(&checks.reference("x"), &ann));
        assert_eq!(
            out,
            concat!(
                "SecurityAnnotation.assert(x, Number);\n",
                "SecurityAnnotation.assert(x, \"A\");\n",
                "SecurityAnnotation.assert(x, \"B\");\n",
                "SecurityAnnotation.assert(ok, \"assertion: ok\");\n",
            )
        );
    }

    #[test]
    fn ptrait_label_passes_its_expression() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let target = checks.reference("level");
        let ann = Annotation {
            labels: vec![Label::Ref {
                span: span(0, 0),
                target,
            }],
            ..Annotation::empty(span(0, 0))
        };
        let out = print(checks.expectation(&checks.reference("x"), &ann));
        assert_eq!(out, "SecurityAnnotation.assert(x, level);\n");
    }

    #[test]
    fn all_props_expansion() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let out = print(vec![checks.all_props(&checks.reference("o"), &annotated(&["A"]))]);
        assert_eq!(
            out,
            concat!(
                "if (typeof o == \"object\" && o !== null) {\n",
                "    var $lfProps = Object.getOwnPropertyNames(o);\n",
                "    for (var $lfIter = 0; $lfIter < $lfProps.length; $lfIter++) {\n",
                "        SecurityAnnotation.assert(o[$lfProps[$lfIter]], \"A\");\n",
                "    }\n",
                "} else {\n",
                "    throw \"FailedAnnotationCheck\";\n",
                "}\n",
            )
        );
    }

    #[test]
    fn num_props_expansion() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let count = checks.number("2");
        let out = print(vec![checks.num_props(&checks.reference("o"), &count, &annotated(&["A"]))]);
        assert_eq!(
            out,
            concat!(
                "if (typeof o == \"object\" && o !== null) {\n",
                "    var $lfProps = Object.getOwnPropertyNames(o);\n",
                "    var $lfHits = 0;\n",
                "    for (var $lfIter = 0; $lfIter < $lfProps.length; $lfIter++) {\n",
                "        try {\n",
                "            SecurityAnnotation.assert(o[$lfProps[$lfIter]], \"A\");\n",
                "            $lfHits++;\n",
                "        } catch ($lfErr) {}\n",
                "    }\n",
                "    if ($lfHits < 2) {\n",
                "        throw \"FailedAnnotationCheck\";\n",
                "    }\n",
                "} else {\n",
                "    throw \"FailedAnnotationCheck\";\n",
                "}\n",
            )
        );
    }

    #[test]
    fn specified_prop_expansion() {
        let names = RuntimeNames::default();
        let checks = Checks::new(&names, span(0, 0));
        let prop = checks.string("key".to_string());
        let out = print(vec![checks.specified_prop(&checks.reference("o"), &prop, &annotated(&["A"]))]);
        assert_eq!(
            out,
            concat!(
                "if (typeof o == \"object\" && o !== null && Object.getOwnPropertyNames(o).indexOf(\"key\") >= 0) {\n",
                "    SecurityAnnotation.assert(o[\"key\"], \"A\");\n",
                "} else {\n",
                "    throw \"FailedAnnotationCheck\";\n",
                "}\n",
            )
        );
    }

    #[test]
    fn runtime_names_are_configurable() {
        let names = RuntimeNames {
            annotations: "SA".to_string(),
            traits: "T".to_string(),
            symbol: "sym".to_string(),
        };
        let checks = Checks::new(&names, span(0, 0));
        let a = label("A");
        assert_eq!(format_expr(&checks.assume(checks.reference("x"), &a)), r#"SA.as(x, "A")"#);
        assert_eq!(format_expr(&checks.drop(checks.reference("x"), &a)), r#"SA.drop(x, "A")"#);
        let name = Ident::new(span(0, 0), "secret".to_string());
        assert_eq!(format_expr(&checks.symbol(&name, checks.reference("v"))), r#"sym("secret", v)"#);
    }
}
