#![forbid(unsafe_code)]

use labelflow_ast::{
    AssignOp, BinOp, Block, Comment, CommentKind, Expr, ExprKind, ForInTarget, ForInit, Function,
    FunctionBody, IfStmt, MemberProp, Pattern, PatternProp, Program, PropKey, Property, Stmt,
    UnaryOp, UpdateOp, VarDecl,
};

const INDENT: &str = "    ";

/// Prints `program` as source text, re-emitting its comments.
pub fn format_program(program: &Program) -> String {
    let mut p = Printer::new(&program.comments);
    for stmt in &program.body {
        p.stmt(stmt);
    }
    p.flush_comments(usize::MAX);
    p.out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut p = Printer::new(&[]);
    p.expr(expr, Prec::Sequence);
    p.out
}

struct Printer<'c> {
    out: String,
    indent: usize,
    comments: &'c [Comment],
    next_comment: usize,
}

impl<'c> Printer<'c> {
    fn new(comments: &'c [Comment]) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            comments,
            next_comment: 0,
        }
    }

    /// Emits, one per line, every pending comment that starts before `offset`.
    fn flush_comments(&mut self, offset: usize) {
        while let Some(c) = self.comments.get(self.next_comment) {
            if c.span.offset() >= offset {
                break;
            }
            self.next_comment += 1;
            if !self.out.is_empty() && !self.out.ends_with('\n') {
                self.out.push('\n');
            }
            self.line_start();
            match c.kind {
                CommentKind::Line => {
                    self.out.push_str("//");
                    self.out.push_str(&c.text);
                }
                CommentKind::Block => {
                    self.out.push_str("/*");
                    self.out.push_str(&c.text);
                    self.out.push_str("*/");
                }
            }
            self.out.push('\n');
        }
    }

    fn has_comments_before(&self, offset: usize) -> bool {
        self.comments
            .get(self.next_comment)
            .is_some_and(|c| c.span.offset() < offset)
    }

    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    // --- Statements -------------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt) {
        self.flush_comments(stmt.span().offset());
        self.line_start();
        match stmt {
            Stmt::Expr(s) => {
                self.expr_stmt_head(&s.expr);
                self.out.push_str(";\n");
            }
            Stmt::Var(d) => {
                self.var_decl(d);
                self.out.push_str(";\n");
            }
            Stmt::Function(f) => {
                self.function(f);
                self.out.push('\n');
            }
            Stmt::Return(r) => {
                self.out.push_str("return");
                if let Some(arg) = &r.argument {
                    self.out.push(' ');
                    self.expr(arg, Prec::Sequence);
                }
                self.out.push_str(";\n");
            }
            Stmt::If(s) => self.if_stmt(s),
            Stmt::For(s) => {
                self.out.push_str("for (");
                match &s.init {
                    Some(ForInit::Var(d)) => self.var_decl(d),
                    Some(ForInit::Expr(e)) => self.expr(e, Prec::Sequence),
                    None => {}
                }
                self.out.push(';');
                if let Some(test) = &s.test {
                    self.out.push(' ');
                    self.expr(test, Prec::Sequence);
                }
                self.out.push(';');
                if let Some(update) = &s.update {
                    self.out.push(' ');
                    self.expr(update, Prec::Sequence);
                }
                self.out.push(')');
                self.clause_line(&s.body);
            }
            Stmt::ForIn(s) => {
                self.out.push_str("for (");
                match &s.target {
                    ForInTarget::Var { kind, target } => {
                        self.out.push_str(kind.as_str());
                        self.out.push(' ');
                        self.pattern(target);
                    }
                    ForInTarget::Expr(e) => self.expr(e, Prec::Call),
                }
                self.out.push_str(if s.of { " of " } else { " in " });
                self.expr(&s.object, Prec::Assign);
                self.out.push(')');
                self.clause_line(&s.body);
            }
            Stmt::While(s) => {
                self.out.push_str("while (");
                self.expr(&s.test, Prec::Sequence);
                self.out.push(')');
                self.clause_line(&s.body);
            }
            Stmt::DoWhile(s) => {
                self.out.push_str("do");
                if self.clause(&s.body) {
                    self.out.push(' ');
                } else {
                    self.line_start();
                }
                self.out.push_str("while (");
                self.expr(&s.test, Prec::Sequence);
                self.out.push_str(");\n");
            }
            Stmt::Switch(s) => {
                self.out.push_str("switch (");
                self.expr(&s.discriminant, Prec::Sequence);
                self.out.push_str(") {\n");
                self.indent += 1;
                for case in &s.cases {
                    self.flush_comments(case.span.offset());
                    self.line_start();
                    match &case.test {
                        Some(test) => {
                            self.out.push_str("case ");
                            self.expr(test, Prec::Sequence);
                            self.out.push_str(":\n");
                        }
                        None => self.out.push_str("default:\n"),
                    }
                    self.indent += 1;
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.flush_comments(s.span.offset() + s.span.len());
                self.indent -= 1;
                self.line_start();
                self.out.push_str("}\n");
            }
            Stmt::Try(s) => {
                self.out.push_str("try ");
                self.block(&s.block);
                if let Some(handler) = &s.handler {
                    self.out.push_str(" catch ");
                    if let Some(param) = &handler.param {
                        self.out.push('(');
                        self.pattern(param);
                        self.out.push_str(") ");
                    }
                    self.block(&handler.body);
                }
                if let Some(finalizer) = &s.finalizer {
                    self.out.push_str(" finally ");
                    self.block(finalizer);
                }
                self.out.push('\n');
            }
            Stmt::Throw(s) => {
                self.out.push_str("throw ");
                self.expr(&s.argument, Prec::Sequence);
                self.out.push_str(";\n");
            }
            Stmt::Break(_) => self.out.push_str("break;\n"),
            Stmt::Continue(_) => self.out.push_str("continue;\n"),
            Stmt::Block(b) => {
                self.block(b);
                self.out.push('\n');
            }
            Stmt::Empty(_) => self.out.push_str(";\n"),
        }
    }

    /// An expression in statement position, parenthesized when it would otherwise read
    /// as a declaration or a block.
    fn expr_stmt_head(&mut self, expr: &Expr) {
        if starts_with_brace_or_function(expr) {
            self.out.push('(');
            self.expr(expr, Prec::Sequence);
            self.out.push(')');
        } else {
            self.expr(expr, Prec::Sequence);
        }
    }

    fn var_decl(&mut self, d: &VarDecl) {
        self.out.push_str(d.kind.as_str());
        self.out.push(' ');
        for (i, decl) in d.decls.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.pattern(&decl.target);
            if let Some(init) = &decl.init {
                self.out.push_str(" = ");
                self.expr(init, Prec::Assign);
            }
        }
    }

    fn if_stmt(&mut self, s: &IfStmt) {
        self.out.push_str("if (");
        self.expr(&s.test, Prec::Sequence);
        self.out.push(')');
        let braced = self.clause(&s.consequent);

        let Some(alt) = &s.alternate else {
            if braced {
                self.out.push('\n');
            }
            return;
        };
        if braced {
            self.out.push_str(" else");
        } else {
            self.line_start();
            self.out.push_str("else");
        }
        match alt.as_ref() {
            Stmt::If(inner) => {
                self.out.push(' ');
                self.if_stmt(inner);
            }
            other => self.clause_line(other),
        }
    }

    /// Body of a compound statement. A block stays on the current line and the return
    /// value is true; anything else goes on its own indented line.
    fn clause(&mut self, stmt: &Stmt) -> bool {
        if let Stmt::Block(b) = stmt {
            self.out.push(' ');
            self.block(b);
            true
        } else {
            self.out.push('\n');
            self.indent += 1;
            self.stmt(stmt);
            self.indent -= 1;
            false
        }
    }

    fn clause_line(&mut self, stmt: &Stmt) {
        if self.clause(stmt) {
            self.out.push('\n');
        }
    }

    /// `{ ... }` without a trailing newline.
    fn block(&mut self, b: &Block) {
        let end = b.span.offset() + b.span.len();
        if b.stmts.is_empty() && !self.has_comments_before(end) {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.indent += 1;
        for stmt in &b.stmts {
            self.stmt(stmt);
        }
        self.flush_comments(end);
        self.indent -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn function(&mut self, f: &Function) {
        if f.is_arrow {
            self.params(f);
            self.out.push_str(" => ");
            match &f.body {
                FunctionBody::Block(b) => self.block(b),
                FunctionBody::Expr(e) => {
                    if starts_with_brace_or_function(e) {
                        self.out.push('(');
                        self.expr(e, Prec::Sequence);
                        self.out.push(')');
                    } else {
                        self.expr(e, Prec::Assign);
                    }
                }
            }
            return;
        }

        self.out.push_str("function");
        match &f.name {
            Some(name) => {
                self.out.push(' ');
                self.out.push_str(&name.node);
            }
            None => self.out.push(' '),
        }
        self.params(f);
        self.out.push(' ');
        self.function_body(f);
    }

    fn function_body(&mut self, f: &Function) {
        match &f.body {
            FunctionBody::Block(b) => self.block(b),
            FunctionBody::Expr(e) => {
                // Only arrows have concise bodies; print one as a block for anything else.
                self.out.push_str("{\n");
                self.indent += 1;
                self.line_start();
                self.out.push_str("return ");
                self.expr(e, Prec::Sequence);
                self.out.push_str(";\n");
                self.indent -= 1;
                self.line_start();
                self.out.push('}');
            }
        }
    }

    fn params(&mut self, f: &Function) {
        self.out.push('(');
        let mut first = true;
        for param in &f.params {
            if matches!(param, Pattern::This(_)) {
                continue;
            }
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.pattern(param);
        }
        self.out.push(')');
    }

    fn pattern(&mut self, pat: &Pattern) {
        match pat {
            Pattern::Ident(b) => self.out.push_str(&b.name.node),
            Pattern::This(_) => self.out.push_str("this"),
            Pattern::Array { elems, .. } => {
                self.out.push('[');
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Some(elem) = elem {
                        self.pattern(elem);
                    }
                }
                if matches!(elems.last(), Some(None)) {
                    self.out.push(',');
                }
                self.out.push(']');
            }
            Pattern::Object { props, .. } => {
                if props.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{ ");
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    match prop {
                        PatternProp::KeyValue { key, value } => {
                            self.prop_key(key);
                            self.out.push_str(": ");
                            self.pattern(value);
                        }
                        PatternProp::Shorthand { binding, default } => {
                            self.out.push_str(&binding.name.node);
                            if let Some(default) = default {
                                self.out.push_str(" = ");
                                self.expr(default, Prec::Assign);
                            }
                        }
                        PatternProp::Rest(target) => self.pattern(target),
                    }
                }
                self.out.push_str(" }");
            }
            Pattern::Assign { target, default, .. } => {
                self.pattern(target);
                self.out.push_str(" = ");
                self.expr(default, Prec::Assign);
            }
            Pattern::Rest { target, .. } => {
                self.out.push_str("...");
                self.pattern(target);
            }
        }
    }

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Ident(id) => self.out.push_str(&id.node),
            PropKey::Str(s) => push_string_lit(&mut self.out, s),
            PropKey::Number(n) => self.out.push_str(n),
            PropKey::Computed(e) => {
                self.out.push('[');
                self.expr(e, Prec::Assign);
                self.out.push(']');
            }
        }
    }

    // --- Expressions ------------------------------------------------------------

    fn expr(&mut self, expr: &Expr, parent: Prec) {
        let prec = expr_prec(expr);
        let parens = needs_parens(parent, prec);
        if parens {
            self.out.push('(');
        }
        self.expr_inner(expr, prec);
        if parens {
            self.out.push(')');
        }
    }

    fn expr_inner(&mut self, expr: &Expr, prec: Prec) {
        match &expr.kind {
            ExprKind::Ident(id) => self.out.push_str(&id.node),
            ExprKind::This => self.out.push_str("this"),
            ExprKind::Null => self.out.push_str("null"),
            ExprKind::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            ExprKind::Number(n) => self.out.push_str(n),
            ExprKind::Str(s) => push_string_lit(&mut self.out, s),
            ExprKind::Regex { pattern, flags } => {
                self.out.push('/');
                self.out.push_str(pattern);
                self.out.push('/');
                self.out.push_str(flags);
            }
            ExprKind::Array(elems) => {
                self.out.push('[');
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Some(elem) = elem {
                        self.expr(elem, Prec::Assign);
                    }
                }
                if matches!(elems.last(), Some(None)) {
                    self.out.push(',');
                }
                self.out.push(']');
            }
            ExprKind::Object(props) => self.object(props),
            ExprKind::Function(f) => self.function(f),
            ExprKind::Unary { op, expr: inner } => {
                self.out.push_str(unary_op_str(*op));
                if matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                    self.out.push(' ');
                }
                if sign_clash(*op, inner) {
                    self.out.push('(');
                    self.expr(inner, Prec::Sequence);
                    self.out.push(')');
                } else {
                    self.expr(inner, Prec::Unary);
                }
            }
            ExprKind::Update { op, prefix, expr: inner } => {
                let text = match op {
                    UpdateOp::Incr => "++",
                    UpdateOp::Decr => "--",
                };
                if *prefix {
                    self.out.push_str(text);
                    self.expr(inner, Prec::Unary);
                } else {
                    self.expr(inner, Prec::Postfix);
                    self.out.push_str(text);
                }
            }
            ExprKind::Binary { left, op, right } => {
                // A unary operand on the left of `**` must be parenthesized.
                let (lp, rp) = if *op == BinOp::Pow {
                    (Prec::Postfix, prec)
                } else {
                    (prec, prec.tighter())
                };
                self.expr(left, lp);
                self.out.push(' ');
                self.out.push_str(bin_op_str(*op));
                self.out.push(' ');
                self.expr(right, rp);
            }
            ExprKind::Assign { target, op, value } => {
                self.expr(target, Prec::Call);
                self.out.push(' ');
                self.out.push_str(assign_op_str(*op));
                self.out.push(' ');
                self.expr(value, Prec::Assign);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, Prec::Or);
                self.out.push_str(" ? ");
                self.expr(consequent, Prec::Assign);
                self.out.push_str(" : ");
                self.expr(alternate, Prec::Assign);
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, Prec::Call);
                self.args(args);
            }
            ExprKind::New { callee, args } => {
                self.out.push_str("new ");
                if contains_call(callee) {
                    self.out.push('(');
                    self.expr(callee, Prec::Sequence);
                    self.out.push(')');
                } else {
                    self.expr(callee, Prec::Call);
                }
                self.args(args);
            }
            ExprKind::Member { object, property } => {
                let bare_int = matches!(&object.kind, ExprKind::Number(n) if n.bytes().all(|b| b.is_ascii_digit()));
                if bare_int {
                    self.out.push('(');
                    self.expr(object, Prec::Sequence);
                    self.out.push(')');
                } else {
                    self.expr(object, Prec::Call);
                }
                match property {
                    MemberProp::Named(name) => {
                        self.out.push('.');
                        self.out.push_str(&name.node);
                    }
                    MemberProp::Computed(e) => {
                        self.out.push('[');
                        self.expr(e, Prec::Sequence);
                        self.out.push(']');
                    }
                }
            }
            ExprKind::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, Prec::Assign);
                }
            }
            ExprKind::Spread(inner) => {
                self.out.push_str("...");
                self.expr(inner, Prec::Assign);
            }
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, Prec::Assign);
        }
        self.out.push(')');
    }

    fn object(&mut self, props: &[Property]) {
        if props.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.indent += 1;
        for (i, prop) in props.iter().enumerate() {
            self.line_start();
            match prop {
                Property::KeyValue { key, value } => {
                    self.prop_key(key);
                    self.out.push_str(": ");
                    self.expr(value, Prec::Assign);
                }
                Property::Shorthand(name) => self.out.push_str(&name.node),
                Property::Method { key, func } => {
                    self.prop_key(key);
                    self.params(func);
                    self.out.push(' ');
                    self.function_body(func);
                }
                Property::Spread(e) => {
                    self.out.push_str("...");
                    self.expr(e, Prec::Assign);
                }
            }
            if i + 1 < props.len() {
                self.out.push(',');
            }
            self.out.push('\n');
        }
        self.indent -= 1;
        self.line_start();
        self.out.push('}');
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Sequence,
    Assign,
    Conditional,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Shift,
    Additive,
    Multiplicative,
    Exponent,
    Unary,
    Postfix,
    Call,
    Primary,
}

impl Prec {
    fn tighter(self) -> Prec {
        match self {
            Prec::Sequence => Prec::Assign,
            Prec::Assign => Prec::Conditional,
            Prec::Conditional => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::BitOr,
            Prec::BitOr => Prec::BitXor,
            Prec::BitXor => Prec::BitAnd,
            Prec::BitAnd => Prec::Equality,
            Prec::Equality => Prec::Relational,
            Prec::Relational => Prec::Shift,
            Prec::Shift => Prec::Additive,
            Prec::Additive => Prec::Multiplicative,
            Prec::Multiplicative => Prec::Exponent,
            Prec::Exponent => Prec::Unary,
            Prec::Unary => Prec::Postfix,
            Prec::Postfix => Prec::Call,
            Prec::Call | Prec::Primary => Prec::Primary,
        }
    }
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::Or => Prec::Or,
        BinOp::And => Prec::And,
        BinOp::BitOr => Prec::BitOr,
        BinOp::BitXor => Prec::BitXor,
        BinOp::BitAnd => Prec::BitAnd,
        BinOp::Eq | BinOp::Ne | BinOp::StrictEq | BinOp::StrictNe => Prec::Equality,
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::In | BinOp::Instanceof => {
            Prec::Relational
        }
        BinOp::Shl | BinOp::Shr | BinOp::UShr => Prec::Shift,
        BinOp::Add | BinOp::Sub => Prec::Additive,
        BinOp::Mul | BinOp::Div | BinOp::Rem => Prec::Multiplicative,
        BinOp::Pow => Prec::Exponent,
    }
}

fn expr_prec(expr: &Expr) -> Prec {
    match &expr.kind {
        ExprKind::Sequence(_) => Prec::Sequence,
        ExprKind::Assign { .. } | ExprKind::Spread(_) => Prec::Assign,
        ExprKind::Function(f) if f.is_arrow => Prec::Assign,
        ExprKind::Conditional { .. } => Prec::Conditional,
        ExprKind::Binary { op, .. } => bin_prec(*op),
        ExprKind::Unary { .. } | ExprKind::Update { prefix: true, .. } => Prec::Unary,
        ExprKind::Update { prefix: false, .. } => Prec::Postfix,
        ExprKind::Call { .. } | ExprKind::New { .. } | ExprKind::Member { .. } => Prec::Call,
        _ => Prec::Primary,
    }
}

fn needs_parens(parent: Prec, child: Prec) -> bool {
    child < parent
}

/// `- -x` and `+ +x` would lex as `--` / `++`.
fn sign_clash(op: UnaryOp, inner: &Expr) -> bool {
    let sign = match op {
        UnaryOp::Neg => UnaryOp::Neg,
        UnaryOp::Plus => UnaryOp::Plus,
        _ => return false,
    };
    match &inner.kind {
        ExprKind::Unary { op, .. } => *op == sign,
        ExprKind::Update { prefix: true, op, .. } => {
            matches!((sign, op), (UnaryOp::Neg, UpdateOp::Decr) | (UnaryOp::Plus, UpdateOp::Incr))
        }
        _ => false,
    }
}

fn starts_with_brace_or_function(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Object(_) => true,
        ExprKind::Function(f) => !f.is_arrow,
        ExprKind::Call { callee: first, .. }
        | ExprKind::Member { object: first, .. }
        | ExprKind::Binary { left: first, .. }
        | ExprKind::Assign { target: first, .. }
        | ExprKind::Conditional { test: first, .. }
        | ExprKind::Update {
            prefix: false,
            expr: first,
            ..
        } => starts_with_brace_or_function(first),
        ExprKind::Sequence(items) => items.first().is_some_and(starts_with_brace_or_function),
        _ => false,
    }
}

fn contains_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } => true,
        ExprKind::Member { object, .. } => contains_call(object),
        _ => false,
    }
}

fn push_string_lit(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000B}' => out.push_str("\\v"),
            '\u{000C}' => out.push_str("\\f"),
            '\0' if !chars.peek().is_some_and(|c| c.is_ascii_digit()) => out.push_str("\\0"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
        UnaryOp::BitNot => "~",
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
        UnaryOp::Typeof => "typeof",
        UnaryOp::Void => "void",
        UnaryOp::Delete => "delete",
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Or => "||",
        BinOp::And => "&&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::BitAnd => "&",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::StrictEq => "===",
        BinOp::StrictNe => "!==",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::In => "in",
        BinOp::Instanceof => "instanceof",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::UShr => ">>>",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Pow => "**",
    }
}

fn assign_op_str(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Rem => "%=",
        AssignOp::Shl => "<<=",
        AssignOp::Shr => ">>=",
        AssignOp::UShr => ">>>=",
        AssignOp::BitAnd => "&=",
        AssignOp::BitOr => "|=",
        AssignOp::BitXor => "^=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(src: &str) -> String {
        format_program(&crate::parse_source(src).unwrap())
    }

    fn is_idempotent(src: &str) {
        let formatted1 = fmt(src);
        let formatted2 = fmt(&formatted1);
        assert_eq!(formatted1, formatted2);
    }

    #[test]
    fn fmt_roundtrip_basic() {
        is_idempotent(
            "var a = 1, b = [1, , 3];\nfunction f(x, y = 2, ...rest) { if (x) { return y } else return rest }\n",
        );
    }

    #[test]
    fn fmt_roundtrip_control_flow() {
        is_idempotent(
            "for (var i = 0; i < n; i++) { s += i }\nfor (var k in o) if (k) continue;\nwhile (a) b()\ndo { c() } while (d)\nswitch (x) { case 1: y(); break; default: z() }\ntry { t() } catch (e) { throw e } finally { u() }\n",
        );
    }

    #[test]
    fn fmt_roundtrip_expressions() {
        is_idempotent(
            "x = a ? b : c ? d : e;\ny = (a, b);\nz = -(-q) + typeof w;\nnew (f())();\n(function () {})();\nv = { a: 1, 'b c': [2], [k]: 3, m() { return 4 }, s };\nr = /ab+c/gi.test(s);\nq = (p) => ({ p: p });\n",
        );
    }

    #[test]
    fn fmt_keeps_needed_parens_only() {
        assert_eq!(fmt("x = (a + b) * c;"), "x = (a + b) * c;\n");
        assert_eq!(fmt("x = a + (b * c);"), "x = a + b * c;\n");
        assert_eq!(fmt("x = a - (b - c);"), "x = a - (b - c);\n");
        assert_eq!(fmt("x = (a ** b) ** c;"), "x = (a ** b) ** c;\n");
        assert_eq!(fmt("(a || b) && c"), "(a || b) && c;\n");
    }

    #[test]
    fn fmt_statement_level_function_and_object_get_parens() {
        assert_eq!(
            fmt("(function () { go() })()"),
            "(function () {\n    go();\n}());\n"
        );
        assert_eq!(fmt("({}).toString()"), "({}.toString());\n");
    }

    #[test]
    fn fmt_if_else_chains() {
        let out = fmt("if (a) { x() } else if (b) { y() } else { z() }");
        assert_eq!(
            out,
            "if (a) {\n    x();\n} else if (b) {\n    y();\n} else {\n    z();\n}\n"
        );
    }

    #[test]
    fn fmt_preserves_comments() {
        let out = fmt("// head\nvar a = 1; /* mid */\nfunction f() {\n    // inside\n    return a;\n    // tail\n}\n");
        assert_eq!(
            out,
            "// head\nvar a = 1;\n/* mid */\nfunction f() {\n    // inside\n    return a;\n    // tail\n}\n"
        );
    }

    #[test]
    fn fmt_escapes_strings() {
        assert_eq!(fmt("s = 'a\"b\\n';"), "s = \"a\\\"b\\n\";\n");
    }
}
