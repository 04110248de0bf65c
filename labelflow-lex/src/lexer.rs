#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use labelflow_ast::{span, span_between, Comment, CommentKind, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{regex_allowed, Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(labelflow::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

/// Extension point consulted at every token start before the base token rules.
pub trait TokenScanner {
    /// Recognizes an extension token at the start of `rest`, returning its kind and byte length.
    fn scan(&self, rest: &str) -> Option<(TokenKind, usize)>;
}

/// Tokens plus the comments skipped between them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
enum RawToken {
    #[token("var")]
    KwVar,
    #[token("let")]
    KwLet,
    #[token("const")]
    KwConst,
    #[token("function")]
    KwFunction,
    #[token("return")]
    KwReturn,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("for")]
    KwFor,
    #[token("while")]
    KwWhile,
    #[token("do")]
    KwDo,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,
    #[token("new")]
    KwNew,
    #[token("delete")]
    KwDelete,
    #[token("typeof")]
    KwTypeof,
    #[token("void")]
    KwVoid,
    #[token("instanceof")]
    KwInstanceof,
    #[token("in")]
    KwIn,
    #[token("this")]
    KwThis,
    #[token("null")]
    KwNull,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("throw")]
    KwThrow,
    #[token("try")]
    KwTry,
    #[token("catch")]
    KwCatch,
    #[token("finally")]
    KwFinally,
    #[token("switch")]
    KwSwitch,
    #[token("case")]
    KwCase,
    #[token("default")]
    KwDefault,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,

    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UShrEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NeqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| lex.slice().to_string())]
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r#""([^"\\\r\n]|\\(.|\r?\n))*""#)]
    #[regex(r#"'([^'\\\r\n]|\\(.|\r?\n))*'"#)]
    String,
}

pub struct Lexer<'a> {
    src: &'a str,
    scanner: Option<&'a dyn TokenScanner>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, scanner: None }
    }

    pub fn with_scanner(mut self, scanner: Option<&'a dyn TokenScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        Ok(self.lex_with_comments()?.tokens)
    }

    pub fn lex_with_comments(&self) -> Result<Lexed, LexError> {
        let src = self.src;
        let mut out = Lexed::default();
        let mut pos = 0usize;

        loop {
            let newline_before = self.skip_trivia(&mut pos, &mut out.comments)?;
            if pos >= src.len() {
                out.tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: span(src.len(), 0),
                    newline_before,
                });
                return Ok(out);
            }

            let rest = &src[pos..];
            let regex_ok = match out.tokens.as_slice() {
                [.., before, last] => regex_allowed(Some(before), Some(last)),
                [last] => regex_allowed(None, Some(last)),
                [] => regex_allowed(None, None),
            };

            let (kind, len) = if let Some(hit) = self.scanner.and_then(|s| s.scan(rest)) {
                hit
            } else if regex_ok && rest.starts_with('/') {
                lex_regex(rest, pos)?
            } else {
                lex_base(rest, pos)?
            };

            out.tokens.push(Token {
                kind,
                span: span(pos, len),
                newline_before,
            });
            pos += len;
        }
    }

    /// Skips whitespace and comments. Returns whether a line terminator was crossed.
    fn skip_trivia(&self, pos: &mut usize, comments: &mut Vec<Comment>) -> Result<bool, LexError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut newline = false;

        while *pos < src.len() {
            let rest = &src[*pos..];
            if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                comments.push(Comment {
                    span: span(*pos, end),
                    kind: CommentKind::Line,
                    text: rest[2..end].trim_end_matches('\r').to_string(),
                });
                *pos += end;
                continue;
            }
            if rest.starts_with("/*") {
                let Some(close) = rest[2..].find("*/") else {
                    return Err(LexError {
                        message: "unterminated block comment".to_string(),
                        span: span(*pos, 2),
                    });
                };
                let text = &rest[2..2 + close];
                newline |= text.contains('\n');
                comments.push(Comment {
                    span: span(*pos, close + 4),
                    kind: CommentKind::Block,
                    text: text.to_string(),
                });
                *pos += close + 4;
                continue;
            }

            match bytes[*pos] {
                b'\n' => {
                    newline = true;
                    *pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => *pos += 1,
                _ => {
                    let Some(ch) = rest.chars().next() else { break };
                    if ch == '\u{feff}' || ch == '\u{a0}' || ch == '\u{2028}' || ch == '\u{2029}' {
                        newline |= ch == '\u{2028}' || ch == '\u{2029}';
                        *pos += ch.len_utf8();
                    } else {
                        break;
                    }
                }
            }
        }
        Ok(newline)
    }
}

fn lex_base(rest: &str, pos: usize) -> Result<(TokenKind, usize), LexError> {
    let mut lex = RawToken::lexer(rest);
    let raw = match lex.next() {
        Some(Ok(raw)) => raw,
        Some(Err(())) | None => {
            let ch = rest.chars().next().unwrap_or(' ');
            let message = match ch {
                '"' | '\'' => "unterminated string literal".to_string(),
                '`' => "template literals are not supported".to_string(),
                _ => format!("unexpected character '{ch}'"),
            };
            return Err(LexError {
                message,
                span: span(pos, ch.len_utf8()),
            });
        }
    };
    let len = lex.span().end;

    let kind = match raw {
        RawToken::KwVar => TokenKind::KwVar,
        RawToken::KwLet => TokenKind::KwLet,
        RawToken::KwConst => TokenKind::KwConst,
        RawToken::KwFunction => TokenKind::KwFunction,
        RawToken::KwReturn => TokenKind::KwReturn,
        RawToken::KwIf => TokenKind::KwIf,
        RawToken::KwElse => TokenKind::KwElse,
        RawToken::KwFor => TokenKind::KwFor,
        RawToken::KwWhile => TokenKind::KwWhile,
        RawToken::KwDo => TokenKind::KwDo,
        RawToken::KwBreak => TokenKind::KwBreak,
        RawToken::KwContinue => TokenKind::KwContinue,
        RawToken::KwNew => TokenKind::KwNew,
        RawToken::KwDelete => TokenKind::KwDelete,
        RawToken::KwTypeof => TokenKind::KwTypeof,
        RawToken::KwVoid => TokenKind::KwVoid,
        RawToken::KwInstanceof => TokenKind::KwInstanceof,
        RawToken::KwIn => TokenKind::KwIn,
        RawToken::KwThis => TokenKind::KwThis,
        RawToken::KwNull => TokenKind::KwNull,
        RawToken::KwTrue => TokenKind::KwTrue,
        RawToken::KwFalse => TokenKind::KwFalse,
        RawToken::KwThrow => TokenKind::KwThrow,
        RawToken::KwTry => TokenKind::KwTry,
        RawToken::KwCatch => TokenKind::KwCatch,
        RawToken::KwFinally => TokenKind::KwFinally,
        RawToken::KwSwitch => TokenKind::KwSwitch,
        RawToken::KwCase => TokenKind::KwCase,
        RawToken::KwDefault => TokenKind::KwDefault,

        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Semi => TokenKind::Semi,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Ellipsis => TokenKind::Ellipsis,
        RawToken::Question => TokenKind::Question,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Arrow => TokenKind::Arrow,

        RawToken::Eq => TokenKind::Eq,
        RawToken::PlusEq => TokenKind::PlusEq,
        RawToken::MinusEq => TokenKind::MinusEq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::SlashEq => TokenKind::SlashEq,
        RawToken::PercentEq => TokenKind::PercentEq,
        RawToken::ShlEq => TokenKind::ShlEq,
        RawToken::ShrEq => TokenKind::ShrEq,
        RawToken::UShrEq => TokenKind::UShrEq,
        RawToken::AmpEq => TokenKind::AmpEq,
        RawToken::PipeEq => TokenKind::PipeEq,
        RawToken::CaretEq => TokenKind::CaretEq,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::Neq => TokenKind::Neq,
        RawToken::EqEqEq => TokenKind::EqEqEq,
        RawToken::NeqEq => TokenKind::NeqEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Le => TokenKind::Le,
        RawToken::Ge => TokenKind::Ge,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::StarStar => TokenKind::StarStar,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::PlusPlus => TokenKind::PlusPlus,
        RawToken::MinusMinus => TokenKind::MinusMinus,
        RawToken::Shl => TokenKind::Shl,
        RawToken::Shr => TokenKind::Shr,
        RawToken::UShr => TokenKind::UShr,
        RawToken::Amp => TokenKind::Amp,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Caret => TokenKind::Caret,
        RawToken::Bang => TokenKind::Bang,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::AndAnd => TokenKind::AndAnd,
        RawToken::OrOr => TokenKind::OrOr,

        RawToken::Ident(name) => TokenKind::Ident(name),
        RawToken::Number(text) => TokenKind::Number(text),
        RawToken::String => {
            let slice = &rest[..len];
            let body = &slice[1..slice.len() - 1];
            TokenKind::String(parse_string_body(body, pos + 1)?)
        }
    };
    Ok((kind, len))
}

/// Scans a regular-expression literal starting at `/`.
fn lex_regex(rest: &str, pos: usize) -> Result<(TokenKind, usize), LexError> {
    let unterminated = || LexError {
        message: "unterminated regular expression literal".to_string(),
        span: span(pos, 1),
    };

    let mut in_class = false;
    let mut escaped = false;
    let mut end = None;
    for (i, ch) in rest.char_indices().skip(1) {
        match ch {
            '\n' | '\r' => return Err(unterminated()),
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }
    let end = end.ok_or_else(unterminated)?;

    let pattern = rest[1..end].to_string();
    let flags: String = rest[end + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    let len = end + 1 + flags.len();
    Ok((TokenKind::Regex { pattern, flags }, len))
}

/// Decodes the escapes of a string literal body. `base` is the body's byte offset.
fn parse_string_body(body: &str, base: usize) -> Result<String, LexError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some((_, esc)) = chars.next() else { break };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            '0' => out.push('\0'),
            '\r' => {
                if chars.peek().is_some_and(|(_, c)| *c == '\n') {
                    chars.next();
                }
            }
            '\n' => {}
            'x' => {
                let hex: String = (0..2).filter_map(|_| chars.next().map(|(_, c)| c)).collect();
                out.push(decode_hex_escape(&hex, base + i, 4)?);
            }
            'u' => {
                let hex = if chars.peek().is_some_and(|(_, c)| *c == '{') {
                    chars.next();
                    let mut hex = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) => hex.push(c),
                            None => {
                                return Err(LexError {
                                    message: "unterminated unicode escape".to_string(),
                                    span: span(base + i, 2),
                                });
                            }
                        }
                    }
                    hex
                } else {
                    (0..4).filter_map(|_| chars.next().map(|(_, c)| c)).collect()
                };
                let width = hex.len() + 2;
                out.push(decode_hex_escape(&hex, base + i, width)?);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn decode_hex_escape(hex: &str, at: usize, width: usize) -> Result<char, LexError> {
    let bad = || LexError {
        message: "invalid hex escape in string literal".to_string(),
        span: span_between(at, at + width),
    };
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(bad());
    }
    let code = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
    // Lone surrogates decode to U+FFFD.
    Ok(char::from_u32(code).unwrap_or('\u{FFFD}'))
}
