//! Recursive-descent parser with Pratt precedence climbing.
//!
//! The parser accumulates errors and keeps going where it can safely resync
//! (at statement boundaries); the caller decides when to stop. Precedence,
//! loosest to tightest: assignment, ternary, `||`, `&&`, equality,
//! relational, range, additive, multiplicative, power, prefix, postfix,
//! call, index/member.

use crate::{
    ast::{
        AssignOperator, Block, Expression, InfixOperator, PostfixOperator, PrefixOperator, Statement,
        SwitchCase,
    },
    errors::CompileError,
    lexer::Lexer,
    regexp,
    token::{Token, TokenKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,
    Ternary,
    Or,
    And,
    Equality,
    Relational,
    Range,
    Additive,
    Multiplicative,
    Power,
    Prefix,
    Postfix,
    Call,
    Index,
}

fn infix_precedence(kind: TokenKind) -> Option<Precedence> {
    let precedence = match kind {
        TokenKind::Assign
        | TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::AsteriskAssign
        | TokenKind::SlashAssign => Precedence::Assign,
        TokenKind::Question => Precedence::Ternary,
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::Eq | TokenKind::NotEq | TokenKind::Match | TokenKind::NotMatch => Precedence::Equality,
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => Precedence::Relational,
        TokenKind::DotDot => Precedence::Range,
        TokenKind::Plus | TokenKind::Minus => Precedence::Additive,
        TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => Precedence::Multiplicative,
        TokenKind::Power => Precedence::Power,
        TokenKind::PlusPlus | TokenKind::MinusMinus => Precedence::Postfix,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket | TokenKind::Period => Precedence::Index,
        _ => return None,
    };
    Some(precedence)
}

/// Parses `source`, returning the statements alongside every error found.
///
/// The statement list is only meaningful when the error list is empty.
pub fn parse(source: &str) -> (Vec<Statement>, Vec<CompileError>) {
    Parser::new(source).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<CompileError>,
    /// Depth of `function` bodies currently open; gates `local`.
    fn_depth: usize,
    /// Non-zero while parsing the branches of a ternary.
    ternary_depth: usize,
    /// True only where a regexp literal is legal: the right operand of
    /// `~=`/`!~` and `case` values.
    regex_ok: bool,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::tokenize(source),
            pos: 0,
            errors: Vec::new(),
            fn_depth: 0,
            ternary_depth: 0,
            regex_ok: false,
        }
    }

    fn cur(&self) -> &Token {
        // tokenize always ends with Eof, so the index is in range
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> CompileError {
        let token = self.cur();
        CompileError::Syntax {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    /// Maps an `Illegal` token to the matching compile-error kind.
    fn illegal_error(&self) -> CompileError {
        let token = self.cur();
        let message = token.literal.clone();
        if message.contains("regular expression") {
            CompileError::Regex {
                message,
                line: token.line,
                column: token.column,
            }
        } else if message.contains("identifier") {
            CompileError::Identifier {
                message,
                line: token.line,
                column: token.column,
            }
        } else {
            CompileError::Syntax {
                message,
                line: token.line,
                column: token.column,
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, CompileError> {
        if self.cur().kind == kind {
            let token = self.cur().clone();
            self.advance();
            Ok(token)
        } else if self.cur().kind == TokenKind::Illegal {
            Err(self.illegal_error())
        } else {
            let found = self.describe_current();
            Err(self.syntax_error(format!("expected {expected}, found {found}")))
        }
    }

    fn describe_current(&self) -> String {
        let token = self.cur();
        match token.kind {
            TokenKind::Eof => "end of input".to_owned(),
            _ => format!("'{}'", token.literal),
        }
    }

    fn parse_program(mut self) -> (Vec<Statement>, Vec<CompileError>) {
        let mut statements = Vec::new();
        while self.cur().kind != TokenKind::Eof {
            let before = self.pos;
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                    // a stray '}' at top level never resyncs; force progress
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        (statements, self.errors)
    }

    /// Skips ahead to the next likely statement boundary after an error.
    fn synchronize(&mut self) {
        self.ternary_depth = 0;
        self.regex_ok = false;
        loop {
            match self.cur().kind {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                _ => self.advance(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, CompileError> {
        match self.cur().kind {
            TokenKind::Illegal => Err(self.illegal_error()),
            TokenKind::Return => {
                self.advance();
                let value = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Semicolon, "';' after return")?;
                Ok(Statement::Return(value))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen, "'(' after 'while'")?;
                let condition = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen, "')' after the loop condition")?;
                let body = self.parse_block()?;
                Ok(Statement::While { condition, body })
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen, "'(' after 'for'")?;
                let condition = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen, "')' after the loop condition")?;
                let body = self.parse_block()?;
                Ok(Statement::For { condition, body })
            }
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Function => self.parse_function(),
            TokenKind::Local => self.parse_local(),
            _ => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Semicolon, "';' after the expression")?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !matches!(self.cur().kind, TokenKind::RBrace | TokenKind::Eof) {
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close the block")?;
        Ok(Block(statements))
    }

    fn parse_if(&mut self) -> Result<Statement, CompileError> {
        self.advance();
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen, "')' after the condition")?;
        let consequence = self.parse_block()?;
        let alternative = if self.cur().kind == TokenKind::Else {
            self.advance();
            if self.cur().kind == TokenKind::If {
                // `else if` nests as a block holding a single if-statement
                Some(Block(vec![self.parse_if()?]))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            consequence,
            alternative,
        })
    }

    fn parse_foreach(&mut self) -> Result<Statement, CompileError> {
        self.advance();
        let first = self.expect(TokenKind::Ident, "an identifier after 'foreach'")?;
        let (index, element) = if self.cur().kind == TokenKind::Comma {
            self.advance();
            let second = self.expect(TokenKind::Ident, "an identifier after ','")?;
            (Some(first.literal), second.literal)
        } else {
            (None, first.literal)
        };
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_expression(Precedence::Lowest)?;
        let body = self.parse_block()?;
        Ok(Statement::Foreach {
            index,
            element,
            iterable,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<Statement, CompileError> {
        self.advance();
        self.expect(TokenKind::LParen, "'(' after 'switch'")?;
        let subject = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen, "')' after the switch subject")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut cases = Vec::new();
        let mut default = None;
        loop {
            match self.cur().kind {
                TokenKind::Case => {
                    self.advance();
                    let mut values = vec![self.parse_case_value()?];
                    while self.cur().kind == TokenKind::Comma {
                        self.advance();
                        values.push(self.parse_case_value()?);
                    }
                    let body = self.parse_block()?;
                    cases.push(SwitchCase { values, body });
                }
                TokenKind::Default => {
                    if default.is_some() {
                        return Err(self.syntax_error("multiple default blocks in switch"));
                    }
                    self.advance();
                    default = Some(self.parse_block()?);
                }
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                _ => {
                    let found = self.describe_current();
                    return Err(self.syntax_error(format!(
                        "expected 'case', 'default' or '}}' in switch, found {found}"
                    )));
                }
            }
        }
        Ok(Statement::Switch { subject, cases, default })
    }

    /// Parses one `case` value; regexp literals are legal here.
    fn parse_case_value(&mut self) -> Result<Expression, CompileError> {
        let saved = self.regex_ok;
        self.regex_ok = true;
        let value = self.parse_expression(Precedence::Lowest);
        self.regex_ok = saved;
        value
    }

    fn parse_function(&mut self) -> Result<Statement, CompileError> {
        self.advance();
        let name = self.expect(TokenKind::Ident, "a function name")?;
        self.expect(TokenKind::LParen, "'(' after the function name")?;
        let mut parameters = Vec::new();
        if self.cur().kind != TokenKind::RParen {
            loop {
                let param = self.expect(TokenKind::Ident, "a parameter name")?;
                parameters.push(param.literal);
                if self.cur().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after the parameter list")?;
        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;
        Ok(Statement::Function {
            name: name.literal,
            parameters,
            body: body?,
        })
    }

    fn parse_local(&mut self) -> Result<Statement, CompileError> {
        if self.fn_depth == 0 {
            return Err(self.syntax_error("'local' is only valid inside a function"));
        }
        self.advance();
        let name = self.expect(TokenKind::Ident, "an identifier after 'local'")?;
        self.expect(TokenKind::Semicolon, "';' after the local declaration")?;
        Ok(Statement::Local(name.literal))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, CompileError> {
        let mut left = self.parse_prefix()?;
        while let Some(next) = infix_precedence(self.cur().kind) {
            if precedence >= next {
                break;
            }
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, CompileError> {
        let token = self.cur().clone();
        match token.kind {
            TokenKind::Illegal => Err(self.illegal_error()),
            TokenKind::Int => {
                self.advance();
                let value: i64 = token
                    .literal
                    .parse()
                    .map_err(|_| self.syntax_error(format!("could not parse '{}' as an integer", token.literal)))?;
                Ok(Expression::IntegerLiteral(value))
            }
            TokenKind::Float => {
                self.advance();
                let value: f64 = token
                    .literal
                    .parse()
                    .map_err(|_| self.syntax_error(format!("could not parse '{}' as a float", token.literal)))?;
                Ok(Expression::FloatLiteral(value))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expression::StringLiteral(token.literal))
            }
            TokenKind::Regexp => {
                if !self.regex_ok {
                    return Err(self.syntax_error(
                        "regular expression literals are only valid in match expressions",
                    ));
                }
                if let Err(error) = regexp::compile(&token.literal) {
                    // regex errors render over several lines; keep the summary
                    let message = error.to_string();
                    let detail = message.lines().last().unwrap_or("invalid pattern").trim();
                    return Err(CompileError::Regex {
                        message: format!("invalid regular expression: {detail}"),
                        line: token.line,
                        column: token.column,
                    });
                }
                self.advance();
                Ok(Expression::RegexpLiteral(token.literal))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::BooleanLiteral(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::BooleanLiteral(false))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expression::Identifier(token.literal))
            }
            TokenKind::Minus => self.parse_prefix_operator(PrefixOperator::Minus),
            TokenKind::Bang => self.parse_prefix_operator(PrefixOperator::Not),
            TokenKind::SquareRoot => self.parse_prefix_operator(PrefixOperator::Sqrt),
            TokenKind::LParen => {
                self.advance();
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expression)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            _ => {
                let found = self.describe_current();
                Err(self.syntax_error(format!("unexpected {found} at the start of an expression")))
            }
        }
    }

    fn parse_prefix_operator(&mut self, operator: PrefixOperator) -> Result<Expression, CompileError> {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Ok(Expression::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expression, CompileError> {
        self.advance();
        let mut items = Vec::new();
        if self.cur().kind != TokenKind::RBracket {
            loop {
                items.push(self.parse_expression(Precedence::Lowest)?);
                if self.cur().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']' to close the array")?;
        Ok(Expression::ArrayLiteral(items))
    }

    fn parse_hash_literal(&mut self) -> Result<Expression, CompileError> {
        self.advance();
        let mut pairs = Vec::new();
        if self.cur().kind != TokenKind::RBrace {
            loop {
                // Keys parse above ternary precedence so ':' stays the
                // key/value separator.
                let key = self.parse_expression(Precedence::Ternary)?;
                self.expect(TokenKind::Colon, "':' between hash key and value")?;
                let value = self.parse_expression(Precedence::Lowest)?;
                pairs.push((key, value));
                if self.cur().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close the hash")?;
        Ok(Expression::HashLiteral(pairs))
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression, CompileError> {
        let kind = self.cur().kind;
        match kind {
            TokenKind::Question => self.parse_ternary(left),
            TokenKind::Assign
            | TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::AsteriskAssign
            | TokenKind::SlashAssign => self.parse_assign(left, kind),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let Expression::Identifier(name) = left else {
                    return Err(self.syntax_error("must be an identifier"));
                };
                self.advance();
                let operator = if kind == TokenKind::PlusPlus {
                    PostfixOperator::Increment
                } else {
                    PostfixOperator::Decrement
                };
                Ok(Expression::Postfix { name, operator })
            }
            TokenKind::LParen => {
                let Expression::Identifier(function) = left else {
                    return Err(self.syntax_error("expected a function name before '('"));
                };
                self.advance();
                let mut arguments = Vec::new();
                if self.cur().kind != TokenKind::RParen {
                    loop {
                        arguments.push(self.parse_expression(Precedence::Lowest)?);
                        if self.cur().kind == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' after the arguments")?;
                Ok(Expression::Call { function, arguments })
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RBracket, "']' after the index")?;
                Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                })
            }
            TokenKind::Period => {
                self.advance();
                let member = self.expect(TokenKind::Ident, "a member name after '.'")?;
                Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(Expression::StringLiteral(member.literal)),
                })
            }
            _ => {
                let operator = match kind {
                    TokenKind::Plus => InfixOperator::Add,
                    TokenKind::Minus => InfixOperator::Sub,
                    TokenKind::Asterisk => InfixOperator::Mul,
                    TokenKind::Slash => InfixOperator::Div,
                    TokenKind::Percent => InfixOperator::Mod,
                    TokenKind::Power => InfixOperator::Power,
                    TokenKind::Eq => InfixOperator::Eq,
                    TokenKind::NotEq => InfixOperator::NotEq,
                    TokenKind::Lt => InfixOperator::Lt,
                    TokenKind::LtEq => InfixOperator::LtEq,
                    TokenKind::Gt => InfixOperator::Gt,
                    TokenKind::GtEq => InfixOperator::GtEq,
                    TokenKind::Match => InfixOperator::Match,
                    TokenKind::NotMatch => InfixOperator::NotMatch,
                    TokenKind::And => InfixOperator::And,
                    TokenKind::Or => InfixOperator::Or,
                    TokenKind::DotDot => InfixOperator::Range,
                    _ => {
                        let found = self.describe_current();
                        return Err(self.syntax_error(format!("unexpected {found} in an expression")));
                    }
                };
                let precedence = infix_precedence(kind).unwrap_or(Precedence::Lowest);
                self.advance();
                let match_operator = matches!(operator, InfixOperator::Match | InfixOperator::NotMatch);
                let saved = self.regex_ok;
                self.regex_ok = match_operator;
                let right = self.parse_expression(precedence);
                self.regex_ok = saved;
                Ok(Expression::Infix {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right?),
                })
            }
        }
    }

    fn parse_assign(&mut self, left: Expression, kind: TokenKind) -> Result<Expression, CompileError> {
        let Expression::Identifier(name) = left else {
            return Err(self.syntax_error("must be an identifier"));
        };
        let operator = match kind {
            TokenKind::PlusAssign => AssignOperator::Add,
            TokenKind::MinusAssign => AssignOperator::Sub,
            TokenKind::AsteriskAssign => AssignOperator::Mul,
            TokenKind::SlashAssign => AssignOperator::Div,
            _ => AssignOperator::Assign,
        };
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        Ok(Expression::Assign {
            name,
            operator,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self, condition: Expression) -> Result<Expression, CompileError> {
        if self.ternary_depth > 0 || matches!(condition, Expression::Ternary { .. }) {
            return Err(self.syntax_error("nested ternary expressions are not supported"));
        }
        self.ternary_depth += 1;
        let result = self.parse_ternary_branches(condition);
        self.ternary_depth -= 1;
        result
    }

    fn parse_ternary_branches(&mut self, condition: Expression) -> Result<Expression, CompileError> {
        self.advance(); // '?'
        let consequence = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Colon, "':' in the ternary expression")?;
        let alternative = self.parse_expression(Precedence::Lowest)?;
        Ok(Expression::Ternary {
            condition: Box::new(condition),
            consequence: Box::new(consequence),
            alternative: Box::new(alternative),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Statement> {
        let (statements, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        statements
    }

    fn first_error(source: &str) -> CompileError {
        let (_, errors) = parse(source);
        errors.into_iter().next().expect("expected at least one parse error")
    }

    #[test]
    fn precedence_shapes_arithmetic() {
        let statements = parse_ok("return 4 + 2 * 3 / 2;");
        assert_eq!(statements[0].to_string(), "return (4 + ((2 * 3) / 2));");
    }

    #[test]
    fn precedence_of_logic_and_comparison() {
        let statements = parse_ok("a == 1 && b < 2 || c;");
        assert_eq!(statements[0].to_string(), "(((a == 1) && (b < 2)) || c);");
    }

    #[test]
    fn range_binds_tighter_than_comparison() {
        let statements = parse_ok("x = 1 .. n + 1;");
        assert_eq!(statements[0].to_string(), "x = (1 .. (n + 1));");
    }

    #[test]
    fn member_access_is_string_index() {
        let statements = parse_ok("a.b;");
        assert_eq!(
            statements[0],
            Statement::Expression(Expression::Index {
                left: Box::new(Expression::Identifier("a".into())),
                index: Box::new(Expression::StringLiteral("b".into())),
            })
        );
    }

    #[test]
    fn assignment_target_must_be_identifier() {
        let error = first_error("3 = 4;");
        assert!(error.to_string().contains("must be an identifier"), "{error}");
        let error = first_error("a[0] ++;");
        assert!(error.to_string().contains("must be an identifier"), "{error}");
    }

    #[test]
    fn nested_ternary_is_rejected() {
        let error = first_error("a ? b : c ? d : e;");
        assert!(error.to_string().contains("nested ternary"), "{error}");
        let error = first_error("a ? (x ? y : z) : c;");
        assert!(error.to_string().contains("nested ternary"), "{error}");
    }

    #[test]
    fn simple_ternary_parses() {
        let statements = parse_ok("x = a ? 1 : 2;");
        assert_eq!(statements[0].to_string(), "x = (a ? 1 : 2);");
    }

    #[test]
    fn local_outside_function_is_an_error() {
        let error = first_error("local x;");
        assert!(error.to_string().contains("only valid inside a function"), "{error}");
    }

    #[test]
    fn local_requires_an_identifier() {
        let error = first_error("function f() { local local; }");
        assert!(error.to_string().contains("expected an identifier after 'local'"), "{error}");
        let error = first_error("function f() { local 3; }");
        assert!(error.to_string().contains("expected an identifier after 'local'"), "{error}");
    }

    #[test]
    fn missing_brace_reports_expected_token() {
        let error = first_error("if (a) { return 1;");
        assert!(error.to_string().contains("expected '}'"), "{error}");
    }

    #[test]
    fn missing_semicolon_reports_expected_token() {
        let error = first_error("a = 3");
        assert!(error.to_string().contains("expected ';'"), "{error}");
    }

    #[test]
    fn foreach_forms() {
        let statements = parse_ok("foreach x in items { x; } foreach i, x in items { i; }");
        match &statements[0] {
            Statement::Foreach { index, element, .. } => {
                assert!(index.is_none());
                assert_eq!(element, "x");
            }
            other => panic!("expected foreach, got {other}"),
        }
        match &statements[1] {
            Statement::Foreach { index, element, .. } => {
                assert_eq!(index.as_deref(), Some("i"));
                assert_eq!(element, "x");
            }
            other => panic!("expected foreach, got {other}"),
        }
    }

    #[test]
    fn switch_with_cases_and_default() {
        let statements = parse_ok(
            "switch (x) { case 1, 2 { return true; } case /^M/ { return true; } default { return false; } }",
        );
        match &statements[0] {
            Statement::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].values.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected switch, got {other}"),
        }
    }

    #[test]
    fn multiple_defaults_are_rejected() {
        let error = first_error("switch (x) { default { } default { } }");
        assert!(error.to_string().contains("multiple default blocks"), "{error}");
    }

    #[test]
    fn else_if_chains() {
        let statements = parse_ok("if (a) { 1; } else if (b) { 2; } else { 3; }");
        match &statements[0] {
            Statement::If {
                alternative: Some(alt), ..
            } => {
                assert!(matches!(alt.0[0], Statement::If { .. }));
            }
            other => panic!("expected if/else-if, got {other}"),
        }
    }

    #[test]
    fn errors_accumulate_across_statements() {
        let (_, errors) = parse("a = ; b = ; c = 3;");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn unterminated_regexp_is_a_regex_error() {
        let error = first_error("a ~= /oops");
        assert!(matches!(error, CompileError::Regex { .. }), "{error:?}");
    }

    #[test]
    fn regexp_literals_are_legal_only_in_match_contexts() {
        parse_ok("a ~= /^M/; a !~ /x/i;");
        parse_ok("switch (x) { case /^M/ { } }");

        let error = first_error("x = /^M/;");
        assert!(error.to_string().contains("only valid in match expressions"), "{error}");
        let error = first_error("a + /^M/;");
        assert!(error.to_string().contains("only valid in match expressions"), "{error}");
    }

    #[test]
    fn invalid_regexp_patterns_fail_at_parse_time() {
        let error = first_error("a ~= /(unclosed/;");
        assert!(matches!(error, CompileError::Regex { .. }), "{error:?}");
    }

    #[test]
    fn function_definition_parses() {
        let statements = parse_ok("function rev(s) { local t; t = \"\"; return t; }");
        match &statements[0] {
            Statement::Function { name, parameters, body } => {
                assert_eq!(name, "rev");
                assert_eq!(parameters, &["s".to_owned()]);
                assert_eq!(body.0.len(), 3);
            }
            other => panic!("expected function, got {other}"),
        }
    }
}
