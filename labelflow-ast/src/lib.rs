#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let a0 = a.offset();
    let b0 = b.offset();
    let start = a0.min(b0);
    let end = (a0 + a.len()).max(b0 + b.len());
    span_between(start, end)
}

/// Zero-length span at the end of `s`.
pub fn span_end(s: Span) -> Span {
    span(s.offset() + s.len(), 0)
}

pub type Ident = Spanned<String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub comments: Vec<Comment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
}

/// A source comment. `text` excludes the `//` or `/* */` delimiters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub span: Span,
    pub kind: CommentKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expr(ExprStmt),
    Var(VarDecl),
    Function(Function),
    Return(ReturnStmt),
    If(IfStmt),
    For(ForStmt),
    ForIn(ForInStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    Switch(SwitchStmt),
    Try(TryStmt),
    Throw(ThrowStmt),
    Break(Span),
    Continue(Span),
    Block(Block),
    Empty(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::Var(s) => s.span,
            Stmt::Function(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::ForIn(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::DoWhile(s) => s.span,
            Stmt::Switch(s) => s.span,
            Stmt::Try(s) => s.span,
            Stmt::Throw(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) | Stmt::Empty(span) => *span,
            Stmt::Block(s) => s.span,
        }
    }

    pub fn expr(expr: Expr) -> Stmt {
        Stmt::Expr(ExprStmt {
            span: expr.span,
            expr,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprStmt {
    pub span: Span,
    pub expr: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub kind: VarKind,
    pub decls: Vec<VarDeclarator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDeclarator {
    pub span: Span,
    pub target: Pattern,
    pub init: Option<Expr>,
}

/// Parser-assigned identity of a `return` statement, unique within one compilation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReturnSite(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub argument: Option<Expr>,
    pub site: ReturnSite,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub test: Expr,
    pub consequent: Box<Stmt>,
    pub alternate: Option<Box<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub span: Span,
    pub init: Option<ForInit>,
    pub test: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForInTarget {
    Var { kind: VarKind, target: Pattern },
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForInStmt {
    pub span: Span,
    pub target: ForInTarget,
    /// `for (.. of ..)` when set, `for (.. in ..)` otherwise.
    pub of: bool,
    pub object: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub test: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoWhileStmt {
    pub span: Span,
    pub body: Box<Stmt>,
    pub test: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchStmt {
    pub span: Span,
    pub discriminant: Expr,
    pub cases: Vec<SwitchCase>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub span: Span,
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TryStmt {
    pub span: Span,
    pub block: Block,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub span: Span,
    pub param: Option<Pattern>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThrowStmt {
    pub span: Span,
    pub argument: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    /// Concise arrow body.
    Expr(Box<Expr>),
}

impl FunctionBody {
    pub fn span(&self) -> Span {
        match self {
            FunctionBody::Block(b) => b.span,
            FunctionBody::Expr(e) => e.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub span: Span,
    pub name: Option<Ident>,
    pub params: Vec<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,

    /// Checks on the receiver, from an implicit-`this` binding or a `:this` suffix.
    pub this_check: Option<BindingMeta>,
    pub return_type: Option<Annotation>,
    pub where_clause: Option<Expr>,

    /// Return sites that already carry their return-value checks.
    pub checked_returns: BTreeSet<ReturnSite>,
    pub instrumented: bool,
}

impl Function {
    pub fn new(span: Span, name: Option<Ident>, is_arrow: bool) -> Self {
        Self {
            span,
            name,
            params: Vec::new(),
            body: FunctionBody::Block(Block {
                span,
                stmts: Vec::new(),
            }),
            is_arrow,
            this_check: None,
            return_type: None,
            where_clause: None,
            checked_returns: BTreeSet::new(),
            instrumented: false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_ref().map_or("anonymous", |n| n.node.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Ident),
    This,
    Null,
    Bool(bool),
    /// Numeric literal, kept as written.
    Number(String),
    /// String literal, with escapes already decoded.
    Str(String),
    Regex {
        pattern: String,
        flags: String,
    },
    Array(Vec<Option<Expr>>),
    Object(Vec<Property>),
    Function(Box<Function>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
    },
    Sequence(Vec<Expr>),
    Spread(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MemberProp {
    Named(Ident),
    Computed(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropKey {
    Ident(Ident),
    Str(String),
    Number(String),
    Computed(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    KeyValue { key: PropKey, value: Expr },
    Shorthand(Ident),
    Method { key: PropKey, func: Box<Function> },
    Spread(Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
    Plus,
    Typeof,
    Void,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
    Incr,
    Decr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    Instanceof,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
}

// --- Binding patterns -----------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Ident(Binding),
    /// Placeholder for an annotated implicit `this` receiver in a parameter list.
    This(ThisBinding),
    Array {
        span: Span,
        elems: Vec<Option<Pattern>>,
    },
    Object {
        span: Span,
        props: Vec<PatternProp>,
    },
    Assign {
        span: Span,
        target: Box<Pattern>,
        default: Expr,
    },
    Rest {
        span: Span,
        target: Box<Pattern>,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident(b) => b.span,
            Pattern::This(t) => t.span,
            Pattern::Array { span, .. }
            | Pattern::Object { span, .. }
            | Pattern::Assign { span, .. }
            | Pattern::Rest { span, .. } => *span,
        }
    }

    /// The identifier binding a parameter introduces, looking through a default value.
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Pattern::Ident(b) => Some(b),
            Pattern::Assign { target, .. } => target.binding(),
            _ => None,
        }
    }

    /// Every identifier this pattern binds, in source order.
    pub fn bindings(&self) -> Vec<&Binding> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings<'a>(&'a self, out: &mut Vec<&'a Binding>) {
        match self {
            Pattern::Ident(b) => out.push(b),
            Pattern::This(_) => {}
            Pattern::Array { elems, .. } => {
                for elem in elems.iter().flatten() {
                    elem.collect_bindings(out);
                }
            }
            Pattern::Object { props, .. } => {
                for prop in props {
                    match prop {
                        PatternProp::KeyValue { value, .. } => value.collect_bindings(out),
                        PatternProp::Shorthand { binding, .. } => out.push(binding),
                        PatternProp::Rest(rest) => rest.collect_bindings(out),
                    }
                }
            }
            Pattern::Assign { target, .. } | Pattern::Rest { target, .. } => {
                target.collect_bindings(out)
            }
        }
    }

    /// The first implicit-`this` placeholder anywhere inside this pattern.
    pub fn find_this(&self) -> Option<&ThisBinding> {
        match self {
            Pattern::Ident(_) => None,
            Pattern::This(this) => Some(this),
            Pattern::Array { elems, .. } => elems.iter().flatten().find_map(Pattern::find_this),
            Pattern::Object { props, .. } => props.iter().find_map(|prop| match prop {
                PatternProp::KeyValue { value, .. } => value.find_this(),
                PatternProp::Shorthand { .. } => None,
                PatternProp::Rest(rest) => rest.find_this(),
            }),
            Pattern::Assign { target, .. } | Pattern::Rest { target, .. } => target.find_this(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub span: Span,
    pub name: Ident,
    pub meta: BindingMeta,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThisBinding {
    pub span: Span,
    pub meta: BindingMeta,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternProp {
    KeyValue { key: PropKey, value: Pattern },
    Shorthand { binding: Binding, default: Option<Expr> },
    Rest(Pattern),
}

// --- Security annotations -------------------------------------------------

/// One security label inside `<! ... !>`.
#[derive(Clone, Debug, PartialEq)]
pub enum Label {
    Named {
        span: Span,
        /// Identifier, possibly followed by member accesses.
        name: Expr,
        parameters: Vec<Label>,
        dependants: Vec<Expr>,
    },
    /// `ptrait expr`: the label is whatever `expr` evaluates to at run time.
    Ref { span: Span, target: Expr },
}

impl Label {
    pub fn span(&self) -> Span {
        match self {
            Label::Named { span, .. } | Label::Ref { span, .. } => *span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub span: Span,
    pub base: Option<Expr>,
    pub labels: Vec<Label>,
    pub where_clause: Option<Expr>,
}

impl Annotation {
    pub fn empty(span: Span) -> Self {
        Self {
            span,
            base: None,
            labels: Vec::new(),
            where_clause: None,
        }
    }

    /// True when the annotation would not produce a single check.
    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.labels.is_empty() && self.where_clause.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeConstraint {
    /// `:A <! .. !>` - every own property satisfies the annotation.
    AllProps(Annotation),
    /// `:S [prop, <! .. !>]` - the named property exists and satisfies the annotation.
    SpecifiedProp { prop: Expr, annotation: Annotation },
    /// `:E [count, <! .. !>]` - at least `count` own properties satisfy the annotation.
    NumProps { count: Expr, annotation: Annotation },
}

/// Annotations attached to one binding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindingMeta {
    pub expected: Option<Annotation>,
    pub shapes: Vec<ShapeConstraint>,
}

impl BindingMeta {
    pub fn is_empty(&self) -> bool {
        self.expected.is_none() && self.shapes.is_empty()
    }

    /// Records the expected annotation unless one is already present.
    pub fn expect(&mut self, annotation: Annotation) {
        if self.expected.is_none() {
            self.expected = Some(annotation);
        }
    }

    /// Appends a shape constraint. Only the first all-properties constraint is kept.
    pub fn push_shape(&mut self, shape: ShapeConstraint) {
        if matches!(shape, ShapeConstraint::AllProps(_)) && self.all_props().is_some() {
            return;
        }
        self.shapes.push(shape);
    }

    pub fn all_props(&self) -> Option<&Annotation> {
        self.shapes.iter().find_map(|s| match s {
            ShapeConstraint::AllProps(a) => Some(a),
            _ => None,
        })
    }

    pub fn specified_props(&self) -> impl Iterator<Item = (&Expr, &Annotation)> + '_ {
        self.shapes.iter().filter_map(|s| match s {
            ShapeConstraint::SpecifiedProp { prop, annotation } => Some((prop, annotation)),
            _ => None,
        })
    }

    pub fn num_props(&self) -> impl Iterator<Item = (&Expr, &Annotation)> + '_ {
        self.shapes.iter().filter_map(|s| match s {
            ShapeConstraint::NumProps { count, annotation } => Some((count, annotation)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Annotation {
        let mut ann = Annotation::empty(span(0, 0));
        for name in names {
            ann.labels.push(Label::Named {
                span: span(0, 0),
                name: Expr::new(
                    span(0, 0),
                    ExprKind::Ident(Ident::new(span(0, 0), name.to_string())),
                ),
                parameters: Vec::new(),
                dependants: Vec::new(),
            });
        }
        ann
    }

    #[test]
    fn first_expected_annotation_wins() {
        let mut meta = BindingMeta::default();
        meta.expect(labels(&["A"]));
        meta.expect(labels(&["B"]));
        assert_eq!(meta.expected, Some(labels(&["A"])));
    }

    #[test]
    fn only_first_all_props_constraint_is_kept() {
        let mut meta = BindingMeta::default();
        meta.push_shape(ShapeConstraint::AllProps(labels(&["A"])));
        meta.push_shape(ShapeConstraint::NumProps {
            count: Expr::new(span(0, 1), ExprKind::Number("2".into())),
            annotation: labels(&["N"]),
        });
        meta.push_shape(ShapeConstraint::AllProps(labels(&["B"])));
        assert_eq!(meta.shapes.len(), 2);
        assert_eq!(meta.all_props(), Some(&labels(&["A"])));
        assert_eq!(meta.num_props().count(), 1);
        assert_eq!(meta.specified_props().count(), 0);
    }

    #[test]
    fn join_covers_both_spans_in_any_order() {
        let a = span(10, 2);
        let b = span(3, 4);
        assert_eq!(join(a, b), span_between(3, 12));
        assert_eq!(join(b, a), span_between(3, 12));
        assert_eq!(span_end(a), span(12, 0));
    }

    #[test]
    fn pattern_binding_looks_through_defaults() {
        let binding = Binding {
            span: span(0, 1),
            name: Ident::new(span(0, 1), "a".into()),
            meta: BindingMeta::default(),
        };
        let pat = Pattern::Assign {
            span: span(0, 5),
            target: Box::new(Pattern::Ident(binding.clone())),
            default: Expr::new(span(4, 1), ExprKind::Number("5".into())),
        };
        assert_eq!(pat.binding(), Some(&binding));
    }
}
