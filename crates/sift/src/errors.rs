//! Compile-time and run-time error taxonomy.
//!
//! Compile errors are accumulated while a script is prepared and returned as
//! a single multi-line [`PrepareError`]. Run-time errors are fatal to one
//! execution; scripts cannot catch them.

use std::{error::Error, fmt};

use strum::IntoStaticStr;

/// A single error raised while compiling a script.
///
/// `Syntax`, `Regex` and `Identifier` come from the lexer/parser, and carry
/// the 1-indexed source position of the offending token. `ConstantFold` is
/// raised by the optimizer when folding reaches an undefined operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    Regex {
        message: String,
        line: usize,
        column: usize,
    },
    Identifier {
        message: String,
        line: usize,
        column: usize,
    },
    ConstantFold {
        message: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message, line, column } => {
                write!(f, "syntax error at line {line}, column {column}: {message}")
            }
            Self::Regex { message, line, column } => {
                write!(f, "regexp error at line {line}, column {column}: {message}")
            }
            Self::Identifier { message, line, column } => {
                write!(f, "identifier error at line {line}, column {column}: {message}")
            }
            Self::ConstantFold { message } => {
                write!(f, "constant folding failed: {message}")
            }
        }
    }
}

impl Error for CompileError {}

/// Everything that went wrong while preparing a script, one line per error.
///
/// No partially compiled program is exposed when `prepare` fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareError {
    errors: Vec<CompileError>,
}

impl PrepareError {
    pub fn new(errors: Vec<CompileError>) -> Self {
        debug_assert!(!errors.is_empty(), "PrepareError built without errors");
        Self { errors }
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }
}

impl fmt::Display for PrepareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl Error for PrepareError {}

impl From<CompileError> for PrepareError {
    fn from(error: CompileError) -> Self {
        Self::new(vec![error])
    }
}

/// A fatal error raised while executing a prepared script.
///
/// The strum derive gives every variant a stable kind name (the variant
/// name itself), reported by [`RuntimeError::kind`].
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum RuntimeError {
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// An operation applied to operands of unsupported types.
    TypeError { message: String },
    /// The value stack was popped while empty.
    StackUnderflow,
    /// The dispatch loop met a byte that is not an opcode.
    UnknownOpcode { opcode: u8 },
    /// A `Constant`/`Lookup` operand is outside the constant pool.
    ConstantIndexOutOfRange { index: u16 },
    /// `Call` named a function that is neither script-defined nor
    /// host-registered.
    FunctionNotFound { name: String },
    /// A script function was invoked with the wrong number of arguments.
    ArityError {
        name: String,
        expected: usize,
        received: usize,
    },
    /// `foreach` over a value that does not support iteration.
    NonIterable { type_name: &'static str },
    /// `++` on a value that is not numeric.
    NonIncrementable { type_name: &'static str },
    /// `--` on a value that is not numeric.
    NonDecrementable { type_name: &'static str },
    /// A hash literal used a key type that cannot be hashed.
    UnhashableKey { type_name: &'static str },
    /// A jump or operand read left the instruction stream.
    InstructionOutOfBounds { offset: usize },
    /// The instruction stream ran out without executing `Return`.
    MissingReturn,
    /// `run`/`execute` was called with no instructions (or before `prepare`).
    EmptyProgram,
    /// The cancellation token tripped.
    Timeout,
    /// A host-registered function reported an error.
    HostFunction { name: String, message: String },
}

impl RuntimeError {
    /// Stable kind name of this error, e.g. `"DivisionByZero"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => f.write_str("division by zero"),
            Self::TypeError { message } => f.write_str(message),
            Self::StackUnderflow => f.write_str("Pop from an empty stack"),
            Self::UnknownOpcode { opcode } => write!(f, "unhandled opcode 0x{opcode:02x}"),
            Self::ConstantIndexOutOfRange { index } => {
                write!(f, "constant index {index} is out of range")
            }
            Self::FunctionNotFound { name } => write!(f, "function not found: {name}"),
            Self::ArityError {
                name,
                expected,
                received,
            } => write!(
                f,
                "function {name} takes {expected} argument(s), received {received}"
            ),
            Self::NonIterable { type_name } => write!(f, "{type_name} is not iterable"),
            Self::NonIncrementable { type_name } => write!(f, "{type_name} cannot be incremented"),
            Self::NonDecrementable { type_name } => write!(f, "{type_name} cannot be decremented"),
            Self::UnhashableKey { type_name } => write!(f, "{type_name} cannot be used as a hash key"),
            Self::InstructionOutOfBounds { offset } => {
                write!(f, "instruction pointer {offset} is outside the program")
            }
            Self::MissingReturn => f.write_str("program ended without a return"),
            Self::EmptyProgram => f.write_str("the program is empty"),
            Self::Timeout => f.write_str("timeout during execution"),
            Self::HostFunction { name, message } => write!(f, "error in function {name}: {message}"),
        }
    }
}

impl Error for RuntimeError {}
