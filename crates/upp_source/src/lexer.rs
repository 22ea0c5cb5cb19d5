//! Per-line tokenisation.
//!
//! The lexer is line-local: a token never crosses a line boundary, and
//! re-lexing a line depends on nothing but that line's text. Multi-line
//! `/* */` comments are therefore not the lexer's business — the source
//! model marks whole lines as comment lines (see
//! [`crate::source::SourceCode::update_comment_lines`]).
//!
//! Identifier and string payloads are interned through the process-wide
//! identifier pool; equality of payloads is handle equality.

use upp_base::PoolLock;

use crate::token::{
    char_is_parenthesis, Keyword, LiteralValue, Operator, Parenthesis, Token, TokenKind,
    OPERATOR_SPELLINGS,
};

/// Tokenises one line of text.
///
/// Never fails: malformed input becomes [`TokenKind::Invalid`] tokens and
/// lexing continues after them.
pub fn tokenize_line(text: &str, pool: &mut PoolLock) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        // Whitespace other than newlines (which cannot occur in a line).
        if c == b' ' || c == b'\t' || c == b'\r' {
            pos += 1;
            continue;
        }

        // Line comment swallows the rest of the line as one token.
        if c == b'/' && pos + 1 < bytes.len() && bytes[pos + 1] == b'/' {
            tokens.push(Token::new(TokenKind::Comment, pos, bytes.len()));
            break;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            pos = lex_word(text, pos, pool, &mut tokens);
            continue;
        }

        if c.is_ascii_digit() {
            pos = lex_number(text, pos, &mut tokens);
            continue;
        }

        if c == b'"' {
            pos = lex_string(text, pos, pool, &mut tokens);
            continue;
        }

        if char_is_parenthesis(c as char) {
            let parenthesis = Parenthesis::from_char(c as char);
            tokens.push(Token::new(
                TokenKind::Parenthesis(parenthesis),
                pos,
                pos + 1,
            ));
            pos += 1;
            continue;
        }

        if let Some((spelling, op)) = match_operator(&text[pos..]) {
            tokens.push(Token::new(
                TokenKind::Operator(op),
                pos,
                pos + spelling.len(),
            ));
            pos += spelling.len();
            continue;
        }

        // Unknown character (also covers non-ASCII bytes).
        let char_len = utf8_len(c);
        tokens.push(Token::new(TokenKind::Invalid, pos, pos + char_len));
        pos += char_len;
    }

    tokens
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b < 0xE0 => 2,
        b if b < 0xF0 => 3,
        _ => 4,
    }
}

/// Longest-match lookup against the operator table.
fn match_operator(rest: &str) -> Option<(&'static str, Operator)> {
    for (spelling, op) in OPERATOR_SPELLINGS {
        if rest.starts_with(spelling) {
            return Some((spelling, *op));
        }
    }
    None
}

fn lex_word(text: &str, start: usize, pool: &mut PoolLock, tokens: &mut Vec<Token>) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    let word = &text[start..end];

    let kind = if word == "_" {
        TokenKind::Operator(Operator::Uninitialized)
    } else if let Some(keyword) = Keyword::from_str(word) {
        TokenKind::Keyword(keyword)
    } else {
        match word {
            "true" => TokenKind::Literal(LiteralValue::Boolean(true)),
            "false" => TokenKind::Literal(LiteralValue::Boolean(false)),
            "null" => TokenKind::Literal(LiteralValue::Null),
            _ => TokenKind::Identifier(pool.intern(word)),
        }
    };
    tokens.push(Token::new(kind, start, end));
    end
}

fn lex_number(text: &str, start: usize, tokens: &mut Vec<Token>) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    // `10.5` is a float, but `10.member` keeps the dot for member access.
    let mut is_float = false;
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        is_float = true;
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    // A digit-led word like `5member` is not an identifier.
    if end < bytes.len() && (bytes[end].is_ascii_alphabetic() || bytes[end] == b'_') {
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        tokens.push(Token::new(TokenKind::Invalid, start, end));
        return end;
    }

    let kind = if is_float {
        match text[start..end].parse::<f64>() {
            Ok(value) => TokenKind::Literal(LiteralValue::Float(value)),
            Err(_) => TokenKind::Invalid,
        }
    } else {
        match text[start..end].parse::<i64>() {
            Ok(value) => TokenKind::Literal(LiteralValue::Integer(value)),
            Err(_) => TokenKind::Invalid,
        }
    };
    tokens.push(Token::new(kind, start, end));
    end
}

fn lex_string(text: &str, start: usize, pool: &mut PoolLock, tokens: &mut Vec<Token>) -> usize {
    let bytes = text.as_bytes();
    let mut pos = start + 1;
    let mut content = String::new();
    let mut malformed = false;

    loop {
        if pos >= bytes.len() {
            // Unterminated string.
            tokens.push(Token::new(TokenKind::Invalid, start, bytes.len()));
            return bytes.len();
        }
        match bytes[pos] {
            b'"' => {
                pos += 1;
                break;
            }
            b'\\' => {
                if pos + 1 >= bytes.len() {
                    tokens.push(Token::new(TokenKind::Invalid, start, bytes.len()));
                    return bytes.len();
                }
                match bytes[pos + 1] {
                    b'n' => content.push('\n'),
                    b't' => content.push('\t'),
                    b'r' => content.push('\r'),
                    b'0' => content.push('\0'),
                    b'\\' => content.push('\\'),
                    b'"' => content.push('"'),
                    _ => malformed = true,
                }
                pos += 2;
            }
            _ => {
                let len = utf8_len(bytes[pos]);
                content.push_str(&text[pos..pos + len]);
                pos += len;
            }
        }
    }

    let kind = if malformed {
        TokenKind::Invalid
    } else {
        TokenKind::Literal(LiteralValue::String(pool.intern(&content)))
    };
    tokens.push(Token::new(kind, start, pos));
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;

    fn lex(text: &str) -> Vec<Token> {
        let mut pool = identifier_pool().lock();
        tokenize_line(text, &mut pool)
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn identifiers_and_keywords() {
        let toks = kinds("if foo");
        assert_eq!(toks[0], TokenKind::Keyword(Keyword::If));
        assert!(matches!(toks[1], TokenKind::Identifier(_)));
    }

    #[test]
    fn same_identifier_interns_to_same_handle() {
        let toks = kinds("abc abc");
        assert_eq!(toks[0], toks[1]);
    }

    #[test]
    fn integer_and_float_literals() {
        assert_eq!(
            kinds("42"),
            vec![TokenKind::Literal(LiteralValue::Integer(42))]
        );
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Literal(LiteralValue::Float(1.5))]
        );
    }

    #[test]
    fn integer_followed_by_member_access_keeps_dot() {
        let toks = kinds("10.size");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0], TokenKind::Literal(LiteralValue::Integer(10)));
        assert_eq!(toks[1], TokenKind::Operator(Operator::Dot));
    }

    #[test]
    fn digit_led_word_is_invalid() {
        assert_eq!(kinds("5member"), vec![TokenKind::Invalid]);
    }

    #[test]
    fn longest_match_operators() {
        assert_eq!(
            kinds("::"),
            vec![TokenKind::Operator(Operator::DefineComptime)]
        );
        assert_eq!(
            kinds(":=*"),
            vec![TokenKind::Operator(Operator::DefineInferPointer)]
        );
        assert_eq!(
            kinds("*=="),
            vec![TokenKind::Operator(Operator::PointerEquals)]
        );
        assert_eq!(
            kinds("~**"),
            vec![TokenKind::Operator(Operator::TildeStarStar)]
        );
        assert_eq!(
            kinds("<= <"),
            vec![
                TokenKind::Operator(Operator::LessEqual),
                TokenKind::Operator(Operator::LessThan)
            ]
        );
    }

    #[test]
    fn boolean_and_null_literals() {
        assert_eq!(
            kinds("true false null"),
            vec![
                TokenKind::Literal(LiteralValue::Boolean(true)),
                TokenKind::Literal(LiteralValue::Boolean(false)),
                TokenKind::Literal(LiteralValue::Null),
            ]
        );
    }

    #[test]
    fn underscore_is_uninitialized_operator() {
        assert_eq!(
            kinds("_"),
            vec![TokenKind::Operator(Operator::Uninitialized)]
        );
        assert!(matches!(kinds("_x")[0], TokenKind::Identifier(_)));
    }

    #[test]
    fn string_literal_with_escapes() {
        let toks = lex(r#""a\nb""#);
        assert_eq!(toks.len(), 1);
        match toks[0].kind {
            TokenKind::Literal(LiteralValue::String(id)) => {
                assert_eq!(identifier_pool().resolve_owned(id), "a\nb");
            }
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn malformed_escape_is_invalid() {
        assert_eq!(kinds(r#""a\qb""#), vec![TokenKind::Invalid]);
    }

    #[test]
    fn unterminated_string_is_invalid() {
        assert_eq!(kinds(r#""abc"#), vec![TokenKind::Invalid]);
    }

    #[test]
    fn line_comment_swallows_rest() {
        let toks = kinds("x := 1 // trailing");
        assert_eq!(*toks.last().unwrap(), TokenKind::Comment);
        assert_eq!(toks.len(), 4);
    }

    #[test]
    fn unknown_character_is_invalid() {
        assert_eq!(kinds("@"), vec![TokenKind::Invalid]);
    }

    #[test]
    fn lexing_is_pure() {
        let a = lex("main :: () -> i32");
        let b = lex("main :: () -> i32");
        assert_eq!(a, b);
    }

    #[test]
    fn token_ranges_cover_text() {
        let text = "x := 10";
        let toks = lex(text);
        assert_eq!(toks[0].text(text), "x");
        assert_eq!(toks[1].text(text), ":=");
        assert_eq!(toks[2].text(text), "10");
    }
}
