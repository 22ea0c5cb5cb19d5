//! Token types for the Upp lexer and parser.
//!
//! Tokens are the atomic syntactic units produced per line by the lexer
//! and consumed by the parser. Every token records its byte range inside
//! the line it belongs to, so the original text can be reconstructed and
//! the editor can map a cursor position back to a token.

use upp_base::Ident;

/// Operators, tokenised by longest match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiply,
    Division,
    Modulo,
    Comma,
    Dot,
    /// `.>` dot-call
    DotCall,
    /// `~` path lookup separator in `A~B~c`
    Tilde,
    /// `~*` import all
    TildeStar,
    /// `~**` transitive import all
    TildeStarStar,
    Colon,
    Semicolon,
    QuestionMark,
    /// `!`
    Not,
    /// `&`
    Ampersand,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Equals,
    NotEquals,
    /// `*==` pointer address equality
    PointerEquals,
    /// `*!=`
    PointerNotEquals,
    /// `::`
    DefineComptime,
    /// `:=`
    DefineInfer,
    /// `:=*`
    DefineInferPointer,
    /// `:=~`
    DefineInferRaw,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `->` function return type
    Arrow,
    /// `=>`
    FatArrow,
    /// `$` comptime parameter marker
    Dollar,
    Assign,
    /// `=*`
    AssignPointer,
    /// `=~`
    AssignRaw,
    AssignAdd,
    AssignSub,
    AssignMult,
    AssignDiv,
    AssignModulo,
    /// `_` explicitly uninitialised
    Uninitialized,
}

/// The operator spelling table, longest spellings first so the lexer can
/// match greedily by scanning in order.
pub const OPERATOR_SPELLINGS: &[(&str, Operator)] = &[
    ("~**", Operator::TildeStarStar),
    ("*==", Operator::PointerEquals),
    ("*!=", Operator::PointerNotEquals),
    (":=*", Operator::DefineInferPointer),
    (":=~", Operator::DefineInferRaw),
    ("~*", Operator::TildeStar),
    ("::", Operator::DefineComptime),
    (":=", Operator::DefineInfer),
    ("==", Operator::Equals),
    ("!=", Operator::NotEquals),
    ("<=", Operator::LessEqual),
    (">=", Operator::GreaterEqual),
    ("&&", Operator::And),
    ("||", Operator::Or),
    ("->", Operator::Arrow),
    ("=>", Operator::FatArrow),
    (".>", Operator::DotCall),
    ("=*", Operator::AssignPointer),
    ("=~", Operator::AssignRaw),
    ("+=", Operator::AssignAdd),
    ("-=", Operator::AssignSub),
    ("*=", Operator::AssignMult),
    ("/=", Operator::AssignDiv),
    ("%=", Operator::AssignModulo),
    ("+", Operator::Addition),
    ("-", Operator::Subtraction),
    ("*", Operator::Multiply),
    ("/", Operator::Division),
    ("%", Operator::Modulo),
    (",", Operator::Comma),
    (".", Operator::Dot),
    ("~", Operator::Tilde),
    (":", Operator::Colon),
    (";", Operator::Semicolon),
    ("?", Operator::QuestionMark),
    ("!", Operator::Not),
    ("&", Operator::Ampersand),
    ("<", Operator::LessThan),
    (">", Operator::GreaterThan),
    ("=", Operator::Assign),
    ("$", Operator::Dollar),
];

impl Operator {
    /// Returns the source spelling of this operator.
    pub fn as_str(self) -> &'static str {
        if self == Operator::Uninitialized {
            return "_";
        }
        for (spelling, op) in OPERATOR_SPELLINGS {
            if *op == self {
                return spelling;
            }
        }
        unreachable!("operator without spelling")
    }
}

/// Keywords of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    While,
    Return,
    Break,
    Continue,
    Defer,
    Switch,
    Case,
    Default,
    Module,
    Struct,
    Union,
    CUnion,
    Enum,
    New,
    Delete,
    Cast,
    CastPtr,
    CastRaw,
    Bake,
    Extern,
    Import,
    As,
    Context,
    For,
    In,
    Const,
    Mut,
}

impl Keyword {
    /// Looks up an identifier spelling in the keyword table.
    pub fn from_str(s: &str) -> Option<Keyword> {
        Some(match s {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "defer" => Keyword::Defer,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "module" => Keyword::Module,
            "struct" => Keyword::Struct,
            "union" => Keyword::Union,
            "c_union" => Keyword::CUnion,
            "enum" => Keyword::Enum,
            "new" => Keyword::New,
            "delete" => Keyword::Delete,
            "cast" => Keyword::Cast,
            "cast_ptr" => Keyword::CastPtr,
            "cast_raw" => Keyword::CastRaw,
            "bake" => Keyword::Bake,
            "extern" => Keyword::Extern,
            "import" => Keyword::Import,
            "as" => Keyword::As,
            "context" => Keyword::Context,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "const" => Keyword::Const,
            "mut" => Keyword::Mut,
            _ => return None,
        })
    }

    /// Returns the source spelling of this keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Defer => "defer",
            Keyword::Switch => "switch",
            Keyword::Case => "case",
            Keyword::Default => "default",
            Keyword::Module => "module",
            Keyword::Struct => "struct",
            Keyword::Union => "union",
            Keyword::CUnion => "c_union",
            Keyword::Enum => "enum",
            Keyword::New => "new",
            Keyword::Delete => "delete",
            Keyword::Cast => "cast",
            Keyword::CastPtr => "cast_ptr",
            Keyword::CastRaw => "cast_raw",
            Keyword::Bake => "bake",
            Keyword::Extern => "extern",
            Keyword::Import => "import",
            Keyword::As => "as",
            Keyword::Context => "context",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Const => "const",
            Keyword::Mut => "mut",
        }
    }
}

/// The three parenthesis families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParenthesisKind {
    /// `(` `)`
    Parenthesis,
    /// `[` `]`
    Brackets,
    /// `{` `}`
    Braces,
}

/// One parenthesis character, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parenthesis {
    pub kind: ParenthesisKind,
    pub is_open: bool,
}

impl Parenthesis {
    /// Classifies a parenthesis character.
    ///
    /// # Panics
    ///
    /// Panics if `c` is not one of `()[]{}`.
    pub fn from_char(c: char) -> Parenthesis {
        let (kind, is_open) = match c {
            '(' => (ParenthesisKind::Parenthesis, true),
            ')' => (ParenthesisKind::Parenthesis, false),
            '[' => (ParenthesisKind::Brackets, true),
            ']' => (ParenthesisKind::Brackets, false),
            '{' => (ParenthesisKind::Braces, true),
            '}' => (ParenthesisKind::Braces, false),
            _ => panic!("not a parenthesis character: {c:?}"),
        };
        Parenthesis { kind, is_open }
    }

    /// Returns the character for this parenthesis.
    pub fn to_char(self) -> char {
        match (self.kind, self.is_open) {
            (ParenthesisKind::Parenthesis, true) => '(',
            (ParenthesisKind::Parenthesis, false) => ')',
            (ParenthesisKind::Brackets, true) => '[',
            (ParenthesisKind::Brackets, false) => ']',
            (ParenthesisKind::Braces, true) => '{',
            (ParenthesisKind::Braces, false) => '}',
        }
    }
}

/// Returns `true` if `c` opens or closes any parenthesis family.
pub fn char_is_parenthesis(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}')
}

/// Literal payloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Interned string contents (escapes already resolved).
    String(Ident),
    Null,
}

/// Token kind plus payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Identifier(Ident),
    Keyword(Keyword),
    Literal(LiteralValue),
    Operator(Operator),
    Parenthesis(Parenthesis),
    /// Unexpected characters, malformed escapes, digit-led identifiers.
    Invalid,
    /// `//` to end of line. Kept so text can be reconstructed from tokens.
    Comment,
}

/// One token: kind plus the byte range `[start, end)` inside its line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize) -> Token {
        Token { kind, start, end }
    }

    /// Returns this token's slice of `line_text`.
    pub fn text<'a>(&self, line_text: &'a str) -> &'a str {
        &line_text[self.start..self.end]
    }
}

/// Maps a character offset to a token ordinal within one line.
///
/// With `after_cursor` set, an offset sitting exactly between two tokens
/// resolves to the following token, otherwise to the preceding one.
/// Returns `tokens.len()` when the offset lies behind the last token.
pub fn character_index_to_token(tokens: &[Token], char_index: usize, after_cursor: bool) -> usize {
    for (i, token) in tokens.iter().enumerate() {
        if char_index < token.start {
            return i;
        }
        if char_index < token.end {
            return i;
        }
        if char_index == token.end && !after_cursor {
            return i;
        }
    }
    tokens.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_spellings_round_trip() {
        for (spelling, op) in OPERATOR_SPELLINGS {
            assert_eq!(op.as_str(), *spelling);
        }
    }

    #[test]
    fn operator_table_is_longest_first() {
        // Greedy matching depends on every prefix coming after its extension.
        for (i, (spelling, _)) in OPERATOR_SPELLINGS.iter().enumerate() {
            for (later, _) in &OPERATOR_SPELLINGS[i + 1..] {
                assert!(
                    !spelling.starts_with(later) || spelling == later,
                    "{later:?} would shadow {spelling:?}"
                );
            }
        }
    }

    #[test]
    fn keyword_round_trip() {
        for kw in ["if", "c_union", "cast_ptr", "defer", "mut"] {
            let parsed = Keyword::from_str(kw).unwrap();
            assert_eq!(parsed.as_str(), kw);
        }
        assert_eq!(Keyword::from_str("iff"), None);
    }

    #[test]
    fn parenthesis_round_trip() {
        for c in ['(', ')', '[', ']', '{', '}'] {
            assert_eq!(Parenthesis::from_char(c).to_char(), c);
        }
    }

    #[test]
    fn character_index_maps_to_tokens() {
        let tokens = vec![
            Token::new(TokenKind::Invalid, 0, 3),
            Token::new(TokenKind::Invalid, 4, 6),
        ];
        assert_eq!(character_index_to_token(&tokens, 0, false), 0);
        assert_eq!(character_index_to_token(&tokens, 3, false), 0);
        assert_eq!(character_index_to_token(&tokens, 3, true), 1);
        assert_eq!(character_index_to_token(&tokens, 5, true), 1);
        assert_eq!(character_index_to_token(&tokens, 7, true), 2);
    }
}
