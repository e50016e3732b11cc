//! Single-pass lexer turning script source into [`Token`]s.
//!
//! The scanner walks a rune buffer tracking line and column, skipping
//! whitespace and `//` line comments. A `/` starts a regular-expression
//! literal unless the previous token could end an expression (identifier,
//! number, `)` or `]`), in which case it is division or `/=`.

use crate::token::{Token, TokenKind};

/// Streaming scanner over the source characters.
pub struct Lexer {
    input: Vec<char>,
    /// Index of the next character to consume.
    position: usize,
    line: usize,
    column: usize,
    /// Kind of the most recently produced token, for regex/division
    /// disambiguation.
    prev: Option<TokenKind>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            prev: None,
        }
    }

    /// Lexes the whole input, ending with a single `Eof` token.
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Consumes the next char if it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    /// Produces the next token. After `Eof` is returned, further calls keep
    /// returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let column = self.column;
        let Some(ch) = self.peek() else {
            return self.emit(TokenKind::Eof, "", line, column);
        };

        if ch.is_ascii_digit() {
            return self.read_number(line, column);
        }
        if is_identifier_start(ch) {
            return self.read_identifier(line, column);
        }
        if ch == '"' || ch == '\'' {
            return self.read_string(line, column);
        }
        if ch == '/' && !self.division_context() {
            return self.read_regexp(line, column);
        }

        self.advance();
        let (kind, literal): (TokenKind, String) = match ch {
            '=' => {
                if self.eat('=') {
                    (TokenKind::Eq, "==".into())
                } else {
                    (TokenKind::Assign, "=".into())
                }
            }
            '+' => {
                if self.eat('+') {
                    (TokenKind::PlusPlus, "++".into())
                } else if self.eat('=') {
                    (TokenKind::PlusAssign, "+=".into())
                } else {
                    (TokenKind::Plus, "+".into())
                }
            }
            '-' => {
                if self.eat('-') {
                    (TokenKind::MinusMinus, "--".into())
                } else if self.eat('=') {
                    (TokenKind::MinusAssign, "-=".into())
                } else {
                    (TokenKind::Minus, "-".into())
                }
            }
            '*' => {
                if self.eat('*') {
                    (TokenKind::Power, "**".into())
                } else if self.eat('=') {
                    (TokenKind::AsteriskAssign, "*=".into())
                } else {
                    (TokenKind::Asterisk, "*".into())
                }
            }
            '/' => {
                if self.eat('=') {
                    (TokenKind::SlashAssign, "/=".into())
                } else {
                    (TokenKind::Slash, "/".into())
                }
            }
            '%' => (TokenKind::Percent, "%".into()),
            '√' => (TokenKind::SquareRoot, "√".into()),
            '!' => {
                if self.eat('=') {
                    (TokenKind::NotEq, "!=".into())
                } else if self.eat('~') {
                    (TokenKind::NotMatch, "!~".into())
                } else {
                    (TokenKind::Bang, "!".into())
                }
            }
            '~' => {
                if self.eat('=') {
                    (TokenKind::Match, "~=".into())
                } else {
                    (
                        TokenKind::Illegal,
                        "unexpected character '~', expected '~='".into(),
                    )
                }
            }
            '<' => {
                if self.eat('=') {
                    (TokenKind::LtEq, "<=".into())
                } else {
                    (TokenKind::Lt, "<".into())
                }
            }
            '>' => {
                if self.eat('=') {
                    (TokenKind::GtEq, ">=".into())
                } else {
                    (TokenKind::Gt, ">".into())
                }
            }
            '&' => {
                if self.eat('&') {
                    (TokenKind::And, "&&".into())
                } else {
                    (TokenKind::Illegal, "unexpected character '&', expected '&&'".into())
                }
            }
            '|' => {
                if self.eat('|') {
                    (TokenKind::Or, "||".into())
                } else {
                    (TokenKind::Illegal, "unexpected character '|', expected '||'".into())
                }
            }
            '.' => {
                if self.eat('.') {
                    (TokenKind::DotDot, "..".into())
                } else {
                    (TokenKind::Period, ".".into())
                }
            }
            '?' => (TokenKind::Question, "?".into()),
            ':' => (TokenKind::Colon, ":".into()),
            ',' => (TokenKind::Comma, ",".into()),
            ';' => (TokenKind::Semicolon, ";".into()),
            '(' => (TokenKind::LParen, "(".into()),
            ')' => (TokenKind::RParen, ")".into()),
            '{' => (TokenKind::LBrace, "{".into()),
            '}' => (TokenKind::RBrace, "}".into()),
            '[' => (TokenKind::LBracket, "[".into()),
            ']' => (TokenKind::RBracket, "]".into()),
            other => (
                TokenKind::Illegal,
                format!("illegal character '{other}' at start of identifier"),
            ),
        };
        self.emit(kind, literal, line, column)
    }

    fn emit(&mut self, kind: TokenKind, literal: impl Into<String>, line: usize, column: usize) -> Token {
        self.prev = Some(kind);
        Token::new(kind, literal, line, column)
    }

    /// True when a `/` should be read as division rather than a regexp.
    fn division_context(&self) -> bool {
        matches!(
            self.prev,
            Some(
                TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::Ident
                    | TokenKind::Int
                    | TokenKind::Float
            )
        )
    }

    fn read_number(&mut self, line: usize, column: usize) -> Token {
        let mut literal = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                literal.push(c);
                self.advance();
            } else {
                break;
            }
        }
        // A '.' continues a float only when followed by a digit; `1..10`
        // leaves the dots for the range operator.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            literal.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    literal.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return self.emit(TokenKind::Float, literal, line, column);
        }
        self.emit(TokenKind::Int, literal, line, column)
    }

    fn read_identifier(&mut self, line: usize, column: usize) -> Token {
        let mut literal = String::new();
        // `$` is only valid as the leading character of a legacy name.
        if self.peek() == Some('$') {
            literal.push('$');
            self.advance();
        }
        while let Some(c) = self.peek() {
            if is_identifier_continue(c) {
                literal.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if literal == "$" {
            return self.emit(
                TokenKind::Illegal,
                "illegal character '$' at start of identifier",
                line,
                column,
            );
        }
        let kind = TokenKind::keyword(&literal).unwrap_or(TokenKind::Ident);
        self.emit(kind, literal, line, column)
    }

    fn read_string(&mut self, line: usize, column: usize) -> Token {
        let quote = self.advance().expect("caller saw the opening quote");
        let mut literal = String::new();
        loop {
            match self.advance() {
                None => {
                    return self.emit(TokenKind::Illegal, "unterminated string literal", line, column);
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    None => {
                        return self.emit(TokenKind::Illegal, "unterminated string literal", line, column);
                    }
                    Some('n') => literal.push('\n'),
                    Some('r') => literal.push('\r'),
                    Some('t') => literal.push('\t'),
                    Some('\\') => literal.push('\\'),
                    Some('"') => literal.push('"'),
                    Some('\'') => literal.push('\''),
                    // Backslash before a newline continues the string on the
                    // next line without embedding the newline.
                    Some('\n') => {}
                    Some('\r') => {
                        self.eat('\n');
                    }
                    Some(other) => literal.push(other),
                },
                Some(c) => literal.push(c),
            }
        }
        self.emit(TokenKind::Str, literal, line, column)
    }

    fn read_regexp(&mut self, line: usize, column: usize) -> Token {
        self.advance(); // opening '/'
        let mut pattern = String::new();
        loop {
            match self.advance() {
                None => {
                    return self.emit(
                        TokenKind::Illegal,
                        "unterminated regular expression",
                        line,
                        column,
                    );
                }
                Some('/') => break,
                Some('\\') => match self.advance() {
                    None => {
                        return self.emit(
                            TokenKind::Illegal,
                            "unterminated regular expression",
                            line,
                            column,
                        );
                    }
                    Some('/') => pattern.push('/'),
                    Some(other) => {
                        pattern.push('\\');
                        pattern.push(other);
                    }
                },
                Some(c) => pattern.push(c),
            }
        }

        let mut insensitive = false;
        let mut multiline = false;
        while let Some(flag) = self.peek() {
            if !flag.is_ascii_alphanumeric() {
                break;
            }
            match flag {
                'i' => insensitive = true,
                'm' => multiline = true,
                other => {
                    self.advance();
                    return self.emit(
                        TokenKind::Illegal,
                        format!("unknown flag '{other}' for regular expression"),
                        line,
                        column,
                    );
                }
            }
            self.advance();
        }

        // Fold the flags into the pattern as an inline group so the literal
        // is the complete pattern text.
        let literal = match (insensitive, multiline) {
            (true, true) => format!("(?im){pattern}"),
            (true, false) => format!("(?i){pattern}"),
            (false, true) => format!("(?m){pattern}"),
            (false, false) => pattern,
        };
        self.emit(TokenKind::Regexp, literal, line, column)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_operators_and_delimiters() {
        use TokenKind::*;
        assert_eq!(
            kinds("a += 1; b == c && d || !e;"),
            vec![
                Ident, PlusAssign, Int, Semicolon, Ident, Eq, Ident, And, Ident, Or, Bang, Ident,
                Semicolon, Eof
            ]
        );
    }

    #[test]
    fn range_does_not_eat_a_float() {
        use TokenKind::*;
        assert_eq!(kinds("1..10"), vec![Int, DotDot, Int, Eof]);
        assert_eq!(kinds("1.5"), vec![Float, Eof]);
    }

    #[test]
    fn slash_after_value_is_division() {
        use TokenKind::*;
        assert_eq!(kinds("a / b"), vec![Ident, Slash, Ident, Eof]);
        assert_eq!(kinds("(a) / 2"), vec![LParen, Ident, RParen, Slash, Int, Eof]);
        assert_eq!(kinds("x /= 2;"), vec![Ident, SlashAssign, Int, Semicolon, Eof]);
    }

    #[test]
    fn slash_elsewhere_starts_a_regexp() {
        let tokens = Lexer::tokenize("Origin ~= /^M/");
        assert_eq!(tokens[2].kind, TokenKind::Regexp);
        assert_eq!(tokens[2].literal, "^M");
    }

    #[test]
    fn regexp_flags_fold_into_the_pattern() {
        let tokens = Lexer::tokenize("a ~= /mow/i");
        assert_eq!(tokens[2].kind, TokenKind::Regexp);
        assert_eq!(tokens[2].literal, "(?i)mow");

        let tokens = Lexer::tokenize("a ~= /mow/im");
        assert_eq!(tokens[2].literal, "(?im)mow");
    }

    #[test]
    fn unknown_regexp_flag_is_illegal() {
        let tokens = Lexer::tokenize("a ~= /mow/x");
        assert_eq!(tokens[2].kind, TokenKind::Illegal);
        assert!(tokens[2].literal.contains("unknown flag 'x'"));
    }

    #[test]
    fn string_escapes() {
        let tokens = Lexer::tokenize(r#""a\tb\n" 'it\'s'"#);
        assert_eq!(tokens[0].literal, "a\tb\n");
        assert_eq!(tokens[1].literal, "it's");
    }

    #[test]
    fn string_line_continuation() {
        let tokens = Lexer::tokenize("\"one \\\ntwo\"");
        assert_eq!(tokens[0].literal, "one two");
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let tokens = Lexer::tokenize("\"oops");
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(tokens[0].literal, "unterminated string literal");
    }

    #[test]
    fn dollar_prefixed_identifier() {
        let tokens = Lexer::tokenize("$country == \"RU\"");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].literal, "$country");
    }

    #[test]
    fn comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("a; // trailing\nb;"), vec![Ident, Semicolon, Ident, Semicolon, Eof]);
    }

    #[test]
    fn positions_are_one_indexed() {
        let tokens = Lexer::tokenize("a\n  b");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn sqrt_operator() {
        use TokenKind::*;
        assert_eq!(kinds("√9"), vec![SquareRoot, Int, Eof]);
    }
}
