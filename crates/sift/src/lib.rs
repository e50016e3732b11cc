//! sift: an embeddable filtering/expression engine.
//!
//! A host application supplies a small C-like script together with a record
//! (any [`Record`] implementation) and optional host functions. The script
//! compiles once, through the lexer, Pratt parser, bytecode emitter and
//! peephole optimizer, and then runs repeatedly against different records
//! on a stack-based virtual machine, returning either a raw [`Value`] or a
//! boolean verdict.
//!
//! ```
//! use std::collections::HashMap;
//!
//! use sift::{Engine, PrepareFlags, Value};
//!
//! let script = r#"
//!     if ( Country == "RU" && Adults == 1 ) { return true; }
//!     return false;
//! "#;
//! let mut engine = Engine::new(script);
//! engine.prepare(PrepareFlags::default()).unwrap();
//!
//! let mut record = HashMap::new();
//! record.insert("Country".to_owned(), Value::Str("RU".into()));
//! record.insert("Adults".to_owned(), Value::Int(1));
//! assert!(engine.run(&record).unwrap());
//! ```
//!
//! The record is read-only for the duration of one execution; environment
//! variables set with [`Engine::set_variable`] persist across executions.
//! Long-running scripts are bounded cooperatively via [`CancelToken`].
#![allow(clippy::cast_possible_truncation, reason = "operand widths are checked at emission")]
#![allow(clippy::cast_sign_loss, reason = "numeric casts follow the value model's coercion rules")]
#![allow(clippy::cast_possible_wrap, reason = "wrapping is part of integer semantics")]

mod ast;
mod builtins;
mod bytecode;
mod cancel;
mod engine;
mod environment;
mod errors;
mod io;
mod lexer;
mod parse;
mod record;
mod regexp;
mod token;
mod value;

pub use crate::{
    cancel::CancelToken,
    engine::{Engine, PrepareFlags},
    environment::{Environment, HostFunction},
    errors::{CompileError, PrepareError, RuntimeError},
    io::{CollectPrint, PrintWriter, StdPrint},
    record::Record,
    value::{FloatKey, HashKey, Value, ValueIter},
};
