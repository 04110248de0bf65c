#![forbid(unsafe_code)]

use labelflow_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwVar,
    KwLet,
    KwConst,
    KwFunction,
    KwReturn,
    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    KwDo,
    KwBreak,
    KwContinue,
    KwNew,
    KwDelete,
    KwTypeof,
    KwVoid,
    KwInstanceof,
    KwIn,
    KwThis,
    KwNull,
    KwTrue,
    KwFalse,
    KwThrow,
    KwTry,
    KwCatch,
    KwFinally,
    KwSwitch,
    KwCase,
    KwDefault,

    // Security-annotation keywords (produced by a `TokenScanner`)
    KwAssert,
    KwWhere,
    KwIs,
    KwAs,
    KwDrop,
    KwSecAnn,
    KwExtends,
    KwTraitRule,
    KwPtrait,
    KwSymbolic,
    /// `<!`
    LabelOpen,
    /// `!>`
    LabelClose,
    /// `:S`
    ShapeSpecified,
    /// `:A`
    ShapeAll,
    /// `:E`
    ShapeNum,
    /// `:this`
    ThisAnnot,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Ellipsis,
    Question,
    Colon,
    Arrow,

    // Operators
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    ShlEq,
    ShrEq,
    UShrEq,
    AmpEq,
    PipeEq,
    CaretEq,
    EqEq,
    Neq,
    EqEqEq,
    NeqEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Shl,
    Shr,
    UShr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AndAnd,
    OrOr,

    // Literals / identifiers
    Ident(String),
    Number(String),
    String(String),
    Regex { pattern: String, flags: String },

    Eof,
}

impl TokenKind {
    /// Text of a word-like token that may stand in for an identifier in binding and
    /// expression positions (`as`, `drop`, `where`, ... outside their annotation roles).
    pub fn contextual_name(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::KwAssert => "assert",
            TokenKind::KwWhere => "where",
            TokenKind::KwIs => "is",
            TokenKind::KwAs => "as",
            TokenKind::KwDrop => "drop",
            TokenKind::KwSecAnn => "SecAnn",
            TokenKind::KwExtends => "Extends",
            TokenKind::KwTraitRule => "traitrule",
            TokenKind::KwPtrait => "ptrait",
            TokenKind::KwSymbolic => "symbolic",
            _ => return None,
        })
    }

    /// Text of a reserved word, usable after `.` and as an object key.
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::KwVar => "var",
            TokenKind::KwLet => "let",
            TokenKind::KwConst => "const",
            TokenKind::KwFunction => "function",
            TokenKind::KwReturn => "return",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwFor => "for",
            TokenKind::KwWhile => "while",
            TokenKind::KwDo => "do",
            TokenKind::KwBreak => "break",
            TokenKind::KwContinue => "continue",
            TokenKind::KwNew => "new",
            TokenKind::KwDelete => "delete",
            TokenKind::KwTypeof => "typeof",
            TokenKind::KwVoid => "void",
            TokenKind::KwInstanceof => "instanceof",
            TokenKind::KwIn => "in",
            TokenKind::KwThis => "this",
            TokenKind::KwNull => "null",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwThrow => "throw",
            TokenKind::KwTry => "try",
            TokenKind::KwCatch => "catch",
            TokenKind::KwFinally => "finally",
            TokenKind::KwSwitch => "switch",
            TokenKind::KwCase => "case",
            TokenKind::KwDefault => "default",
            _ => return self.contextual_name(),
        })
    }

    /// Whether this token can end an operand, so a `/` after it divides.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex { .. }
                | TokenKind::KwThis
                | TokenKind::KwNull
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        ) || self.contextual_name().is_some()
    }
}

/// Whether a `/` after `last` starts a regular expression rather than a division.
///
/// Annotation keywords only expect an operand in their keyword role, which depends on
/// the token before them: `is` and `where` are infix, `assert` leads a statement, and
/// `symbolic` must be followed by a name, never by `/`.
pub(crate) fn regex_allowed(before: Option<&Token>, last: Option<&Token>) -> bool {
    let Some(last) = last else {
        return true;
    };
    let after_operand = before.is_some_and(|t| t.kind.ends_operand());
    match last.kind {
        TokenKind::KwIs | TokenKind::KwWhere => after_operand,
        TokenKind::KwAssert => before.is_none_or(|t| {
            matches!(t.kind, TokenKind::Semi | TokenKind::LBrace | TokenKind::RBrace)
        }),
        _ => !last.kind.ends_operand(),
    }
}
