//! Statement and expression variants produced by the parser.
//!
//! Both levels are plain sum types; the emitter dispatches by matching on
//! the variant tag. `Display` renders a canonical source form used in
//! diagnostics and parser tests.

use std::fmt;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    /// A regular-expression literal; the pattern carries any flags as an
    /// inline `(?im)` group, as produced by the lexer.
    RegexpLiteral(String),
    ArrayLiteral(Vec<Expression>),
    HashLiteral(Vec<(Expression, Expression)>),
    Prefix {
        operator: PrefixOperator,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: InfixOperator,
        right: Box<Expression>,
    },
    Ternary {
        condition: Box<Expression>,
        consequence: Box<Expression>,
        alternative: Box<Expression>,
    },
    /// `name = value` and the compound forms; the target is always an
    /// identifier.
    Assign {
        name: String,
        operator: AssignOperator,
        value: Box<Expression>,
    },
    /// `name++` / `name--`.
    Postfix {
        name: String,
        operator: PostfixOperator,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    Call {
        function: String,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    /// Unary `-`.
    Minus,
    /// Logical `!`.
    Not,
    /// `√`.
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Power,
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
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOperator {
    Increment,
    Decrement,
}

/// A brace-delimited sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(pub Vec<Statement>);

/// One `case` arm of a `switch` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expression>,
    pub body: Block,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Return(Expression),
    If {
        condition: Expression,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        condition: Expression,
        body: Block,
    },
    /// The degenerate `for (cond) { .. }` loop; only the condition form is
    /// accepted.
    For {
        condition: Expression,
        body: Block,
    },
    Foreach {
        index: Option<String>,
        element: String,
        iterable: Expression,
        body: Block,
    },
    Switch {
        subject: Expression,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    Function {
        name: String,
        parameters: Vec<String>,
        body: Block,
    },
    Local(String),
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Minus => "-",
            Self::Not => "!",
            Self::Sqrt => "√",
        };
        f.write_str(s)
    }
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Power => "**",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Match => "~=",
            Self::NotMatch => "!~",
            Self::And => "&&",
            Self::Or => "||",
            Self::Range => "..",
        };
        f.write_str(s)
    }
}

impl fmt::Display for AssignOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assign => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PostfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => f.write_str(name),
            Self::IntegerLiteral(n) => write!(f, "{n}"),
            Self::FloatLiteral(n) => write!(f, "{n}"),
            Self::StringLiteral(s) => write!(f, "{s:?}"),
            Self::BooleanLiteral(b) => write!(f, "{b}"),
            Self::RegexpLiteral(pattern) => write!(f, "/{pattern}/"),
            Self::ArrayLiteral(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::HashLiteral(pairs) => {
                f.write_str("{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Self::Infix { left, operator, right } => write!(f, "({left} {operator} {right})"),
            Self::Ternary {
                condition,
                consequence,
                alternative,
            } => write!(f, "({condition} ? {consequence} : {alternative})"),
            Self::Assign { name, operator, value } => write!(f, "{name} {operator} {value}"),
            Self::Postfix { name, operator } => write!(f, "{name}{operator}"),
            Self::Index { left, index } => write!(f, "({left}[{index}])"),
            Self::Call { function, arguments } => {
                write!(f, "{function}(")?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for statement in &self.0 {
            write!(f, "{statement} ")?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(expr) => write!(f, "{expr};"),
            Self::Return(expr) => write!(f, "return {expr};"),
            Self::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if ({condition}) {consequence}")?;
                if let Some(alt) = alternative {
                    write!(f, " else {alt}")?;
                }
                Ok(())
            }
            Self::While { condition, body } => write!(f, "while ({condition}) {body}"),
            Self::For { condition, body } => write!(f, "for ({condition}) {body}"),
            Self::Foreach {
                index,
                element,
                iterable,
                body,
            } => {
                f.write_str("foreach ")?;
                if let Some(index) = index {
                    write!(f, "{index}, ")?;
                }
                write!(f, "{element} in {iterable} {body}")
            }
            Self::Switch { subject, cases, default } => {
                write!(f, "switch ({subject}) {{ ")?;
                for case in cases {
                    f.write_str("case ")?;
                    for (i, value) in case.values.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{value}")?;
                    }
                    write!(f, " {} ", case.body)?;
                }
                if let Some(default) = default {
                    write!(f, "default {default} ")?;
                }
                f.write_str("}")
            }
            Self::Function { name, parameters, body } => {
                write!(f, "function {name}({}) {body}", parameters.join(", "))
            }
            Self::Local(name) => write!(f, "local {name};"),
        }
    }
}
