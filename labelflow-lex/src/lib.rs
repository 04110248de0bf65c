#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexed, Lexer, TokenScanner};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_numbers_keep_their_spelling() {
        let nums: Vec<String> = kinds("a = 1; b = 0xFF + 1.5e3 + .25")
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Number(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec!["1", "0xFF", "1.5e3", ".25"]);
    }

    #[test]
    fn lex_string_escapes_are_decoded() {
        let tokens = Lexer::new(r#"x = "a\n\t\"b\x41B\u{43}" + 'it\'s'"#)
            .lex()
            .unwrap();
        let strings: Vec<String> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["a\n\t\"bABC".to_string(), "it's".to_string()]);
    }

    #[test]
    fn lex_rejects_unterminated_string() {
        let err = Lexer::new("x = \"abc\n").lex().unwrap_err();
        assert!(err.message.contains("unterminated string"), "{}", err.message);
    }

    #[test]
    fn lex_regex_versus_division() {
        let ks = kinds("x = a / b; y = /RSA|ECD/i.test(s); z = (a) / 2");
        let regexes: Vec<&TokenKind> = ks
            .iter()
            .filter(|k| matches!(k, TokenKind::Regex { .. }))
            .collect();
        assert_eq!(
            regexes,
            vec![&TokenKind::Regex {
                pattern: "RSA|ECD".into(),
                flags: "i".into()
            }]
        );
        assert_eq!(ks.iter().filter(|k| **k == TokenKind::Slash).count(), 2);
    }

    #[test]
    fn lex_regex_with_slash_in_class() {
        let ks = kinds("r = /[/]+/g");
        assert!(ks.contains(&TokenKind::Regex {
            pattern: "[/]+".into(),
            flags: "g".into()
        }));
    }

    #[test]
    fn lex_collects_comments_and_newlines() {
        let lexed = Lexer::new("a = 1 // one\n/* two\n */ b = 2")
            .lex_with_comments()
            .unwrap();
        assert_eq!(lexed.comments.len(), 2);
        assert_eq!(lexed.comments[0].text, " one");
        assert_eq!(lexed.comments[1].text, " two\n ");
        let b = lexed
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("b".into()))
            .unwrap();
        assert!(b.newline_before);
        let one = lexed
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::Number("1".into()))
            .unwrap();
        assert!(!one.newline_before);
    }

    #[test]
    fn lex_keywords_need_a_word_boundary() {
        assert_eq!(
            kinds("instance in"),
            vec![
                TokenKind::Ident("instance".into()),
                TokenKind::KwIn,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lex_consults_scanner_before_base_rules() {
        struct Bangs;
        impl TokenScanner for Bangs {
            fn scan(&self, rest: &str) -> Option<(TokenKind, usize)> {
                rest.starts_with("<!").then_some((TokenKind::LabelOpen, 2))
            }
        }

        let scanner = Bangs;
        let tokens = Lexer::new("a <!b")
            .with_scanner(Some(&scanner))
            .lex()
            .unwrap();
        let ks: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::LabelOpen,
                TokenKind::Ident("b".into()),
                TokenKind::Eof
            ]
        );

        // Without the scanner the same text is `<` followed by `!`.
        let plain = kinds("a <!b");
        assert_eq!(plain[1], TokenKind::Lt);
        assert_eq!(plain[2], TokenKind::Bang);
    }

    /// Lexes with the annotation words `is`, `where`, `assert` and `symbolic` as keywords.
    fn kinds_with_keywords(src: &str) -> Vec<TokenKind> {
        struct Words;
        impl TokenScanner for Words {
            fn scan(&self, rest: &str) -> Option<(TokenKind, usize)> {
                let words = [
                    ("is", TokenKind::KwIs),
                    ("where", TokenKind::KwWhere),
                    ("assert", TokenKind::KwAssert),
                    ("symbolic", TokenKind::KwSymbolic),
                ];
                words.into_iter().find_map(|(text, kind)| {
                    let tail = rest.strip_prefix(text)?;
                    let boundary = !tail
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
                    boundary.then_some((kind, text.len()))
                })
            }
        }

        let scanner = Words;
        Lexer::new(src)
            .with_scanner(Some(&scanner))
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn regex_count(ks: &[TokenKind]) -> usize {
        ks.iter()
            .filter(|k| matches!(k, TokenKind::Regex { .. }))
            .count()
    }

    #[test]
    fn lex_annotation_words_used_as_names_divide() {
        for src in [
            "var is = 4; x = is / 2;",
            "x = symbolic / 2;",
            "var where = 4; x = where / 2 / 1;",
            "x = assert / 2;",
            "x = a.is / 2;",
        ] {
            let ks = kinds_with_keywords(src);
            assert_eq!(regex_count(&ks), 0, "{src}");
            assert!(ks.contains(&TokenKind::Slash), "{src}");
        }
    }

    #[test]
    fn lex_annotation_keywords_in_keyword_role_take_a_regex() {
        assert_eq!(regex_count(&kinds_with_keywords("assert x is /re/;")), 1);
        assert_eq!(regex_count(&kinds_with_keywords("function f(a) where /re/.test(a) {}")), 1);
        assert_eq!(regex_count(&kinds_with_keywords("assert /re/.test(s);")), 1);
        assert_eq!(regex_count(&kinds_with_keywords("{ assert /re/.test(s); }")), 1);
    }

    #[test]
    fn lex_reports_template_literals() {
        let err = Lexer::new("x = `a`").lex().unwrap_err();
        assert!(err.message.contains("template literals"));
    }
}
