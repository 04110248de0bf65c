#![forbid(unsafe_code)]

use labelflow_lex::TokenKind;

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("assert", TokenKind::KwAssert),
    ("where", TokenKind::KwWhere),
    ("is", TokenKind::KwIs),
    ("as", TokenKind::KwAs),
    ("drop", TokenKind::KwDrop),
    ("SecAnn", TokenKind::KwSecAnn),
    ("Extends", TokenKind::KwExtends),
    ("traitrule", TokenKind::KwTraitRule),
    ("ptrait", TokenKind::KwPtrait),
    ("symbolic", TokenKind::KwSymbolic),
];

/// Recognizes one annotation token at the start of `rest`.
pub(crate) fn scan(rest: &str) -> Option<(TokenKind, usize)> {
    if rest.starts_with("<!") {
        return Some((TokenKind::LabelOpen, 2));
    }
    if rest.starts_with("!>") {
        return Some((TokenKind::LabelClose, 2));
    }
    if rest.starts_with(':') {
        return scan_suffix_marker(rest);
    }

    let first = rest.chars().next()?;
    if !is_ident_start(first) {
        return None;
    }
    KEYWORDS.iter().find_map(|(text, kind)| {
        let tail = rest.strip_prefix(text)?;
        if tail.chars().next().is_some_and(is_ident_continue) {
            return None;
        }
        Some((kind.clone(), text.len()))
    })
}

/// `:S [`, `:E [`, `:A <!`, `:A Name`, `:this <!`, `:this Name`.
///
/// Anything else starting with `:` is left to the base tokenizer, so conditional
/// expressions such as `c ? a :Alpha` keep their meaning.
fn scan_suffix_marker(rest: &str) -> Option<(TokenKind, usize)> {
    let markers: [(&str, TokenKind, bool); 4] = [
        (":this", TokenKind::ThisAnnot, false),
        (":S", TokenKind::ShapeSpecified, true),
        (":E", TokenKind::ShapeNum, true),
        (":A", TokenKind::ShapeAll, false),
    ];

    for (text, kind, bracketed) in markers {
        let Some(tail) = rest.strip_prefix(text) else {
            continue;
        };
        let trimmed = tail.trim_start_matches([' ', '\t']);
        let spaced = trimmed.len() < tail.len();
        let accepted = if bracketed {
            trimmed.starts_with('[')
        } else {
            trimmed.starts_with("<!")
                || (spaced && trimmed.chars().next().is_some_and(is_ident_start))
        };
        if accepted {
            return Some((kind, text.len()));
        }
    }
    None
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_need_a_boundary() {
        assert_eq!(scan("assert x"), Some((TokenKind::KwAssert, 6)));
        assert_eq!(scan("assert(x)"), Some((TokenKind::KwAssert, 6)));
        assert_eq!(scan("assertion"), None);
        assert_eq!(scan("island"), None);
        assert_eq!(scan("as$"), None);
        assert_eq!(scan("drop"), Some((TokenKind::KwDrop, 4)));
        assert_eq!(scan("SecAnn <!A!>"), Some((TokenKind::KwSecAnn, 6)));
        assert_eq!(scan("secAnn"), None);
    }

    #[test]
    fn label_delimiters() {
        assert_eq!(scan("<!A!>"), Some((TokenKind::LabelOpen, 2)));
        assert_eq!(scan("!> x"), Some((TokenKind::LabelClose, 2)));
        assert_eq!(scan("!x"), None);
        assert_eq!(scan("<= b"), None);
    }

    #[test]
    fn shape_markers_only_in_annotation_position() {
        assert_eq!(scan(":S ['a', <!A!>]"), Some((TokenKind::ShapeSpecified, 2)));
        assert_eq!(scan(":E[2, <!A!>]"), Some((TokenKind::ShapeNum, 2)));
        assert_eq!(scan(":A <!A!>"), Some((TokenKind::ShapeAll, 2)));
        assert_eq!(scan(":A Number"), Some((TokenKind::ShapeAll, 2)));
        assert_eq!(scan(":this <!T!>"), Some((TokenKind::ThisAnnot, 5)));

        // Ordinary colons in conditionals and object literals.
        assert_eq!(scan(":Alpha"), None);
        assert_eq!(scan(":Some.thing"), None);
        assert_eq!(scan(":this.x"), None);
        assert_eq!(scan(": <!A!>"), None);
        assert_eq!(scan(":A\nfoo"), None);
    }

    proptest::proptest! {
        #[test]
        fn keyword_prefixes_of_identifiers_are_not_keywords(
            index in 0..KEYWORDS.len(),
            tail in "[a-zA-Z0-9_$]{1,8}",
        ) {
            let word = format!("{}{tail}", KEYWORDS[index].0);
            // `as` + `sert` spells another keyword.
            proptest::prop_assume!(KEYWORDS.iter().all(|(text, _)| *text != word));
            proptest::prop_assert_eq!(scan(&word), None);
        }

        #[test]
        fn keywords_end_at_any_separator(
            index in 0..KEYWORDS.len(),
            sep in "[ \t\n;(.,<]",
        ) {
            let (text, kind) = &KEYWORDS[index];
            let word = format!("{text}{sep}");
            proptest::prop_assert_eq!(scan(&word), Some((kind.clone(), text.len())));
        }
    }
}
