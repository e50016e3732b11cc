//! Token kinds produced by the lexer.

use strum::{Display, IntoStaticStr};

/// The kind of a lexed token.
///
/// Operator variants carry no payload; the token's literal text and source
/// position live on [`Token`]. `Illegal` marks a lexing failure whose
/// diagnostic message is stored in the token literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum TokenKind {
    /// A token the lexer could not produce; the literal holds the diagnostic.
    Illegal,
    /// End of input.
    Eof,

    // Literals and names
    Ident,
    Int,
    Float,
    Str,
    /// Regular-expression literal. The literal holds the pattern with any
    /// `i`/`m` flags already folded in as an inline `(?im)` group.
    Regexp,

    // Operators
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Power,
    SquareRoot,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Match,
    NotMatch,
    And,
    Or,
    Bang,
    PlusPlus,
    MinusMinus,
    PlusAssign,
    MinusAssign,
    AsteriskAssign,
    SlashAssign,
    DotDot,
    Question,
    Colon,

    // Delimiters
    Comma,
    Semicolon,
    Period,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    // Keywords
    If,
    Else,
    While,
    For,
    Foreach,
    In,
    Function,
    Local,
    Return,
    True,
    False,
    Switch,
    Case,
    Default,
}

impl TokenKind {
    /// Returns the keyword kind for `ident`, if it is a reserved word.
    pub fn keyword(ident: &str) -> Option<Self> {
        let kind = match ident {
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "for" => Self::For,
            "foreach" => Self::Foreach,
            "in" => Self::In,
            "function" => Self::Function,
            "local" => Self::Local,
            "return" => Self::Return,
            "true" => Self::True,
            "false" => Self::False,
            "switch" => Self::Switch,
            "case" => Self::Case,
            "default" => Self::Default,
            _ => return None,
        };
        Some(kind)
    }
}

/// A lexed token with its literal text and 1-indexed source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            literal: literal.into(),
            line,
            column,
        }
    }
}
