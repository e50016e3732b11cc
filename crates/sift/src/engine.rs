//! The public engine: compile a script once, run it against many records.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    builtins,
    bytecode::{self, Program, Vm},
    cancel::CancelToken,
    environment::Environment,
    errors::{PrepareError, RuntimeError},
    io::{PrintSink, PrintWriter, StdPrint},
    parse::parse,
    record::Record,
    value::Value,
};

/// Options for [`Engine::prepare`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareFlags {
    /// Skip the peephole optimizer and keep the raw emitted stream.
    pub no_optimize: bool,
}

impl PrepareFlags {
    /// Flags with the optimizer disabled.
    #[must_use]
    pub fn no_optimize() -> Self {
        Self { no_optimize: true }
    }
}

/// An embeddable filtering engine holding one script.
///
/// The script compiles once via [`Engine::prepare`] and can then run any
/// number of times against different records. Environment variables persist
/// across runs; per-run state (stack, frames, reflection cache) does not.
///
/// # Example
/// ```
/// use sift::{Engine, PrepareFlags, Value};
///
/// let mut engine = Engine::new("return Value >= 100;");
/// engine.prepare(PrepareFlags::default()).unwrap();
///
/// let mut record = std::collections::HashMap::new();
/// record.insert("Value".to_owned(), Value::Int(150));
/// assert!(engine.run(&record).unwrap());
/// ```
pub struct Engine {
    source: String,
    program: Option<Program>,
    env: Environment,
    cancel: Option<CancelToken>,
    print: PrintSink,
}

impl Engine {
    /// Stores `source`; nothing is compiled until [`Engine::prepare`].
    pub fn new(source: impl Into<String>) -> Self {
        let print: PrintSink = Arc::new(Mutex::new(Box::new(StdPrint)));
        let mut env = Environment::new();
        builtins::install(&mut env, &print);
        Self {
            source: source.into(),
            program: None,
            env,
            cancel: None,
            print,
        }
    }

    /// The script text this engine was built from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lexes, parses, emits and (unless disabled) optimizes the script.
    ///
    /// All compile errors are accumulated into the returned [`PrepareError`];
    /// no partially compiled program is kept on failure.
    pub fn prepare(&mut self, flags: PrepareFlags) -> Result<(), PrepareError> {
        self.program = None;
        let (statements, errors) = parse(&self.source);
        if !errors.is_empty() {
            return Err(PrepareError::new(errors));
        }
        let mut output = bytecode::compile(&statements).map_err(PrepareError::new)?;
        if !flags.no_optimize {
            output.optimize().map_err(PrepareError::new)?;
        }
        self.program = Some(output.finish());
        Ok(())
    }

    /// Attaches a cancellation token polled at every VM step.
    pub fn set_context(&mut self, cancel: CancelToken) {
        self.cancel = Some(cancel);
    }

    /// Writes a variable into the environment shared by all runs.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.env.set(&name.into(), value);
    }

    /// Reads back an environment variable.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.env.get(name).cloned()
    }

    /// Registers a host function callable from scripts. Registering over a
    /// builtin of the same name replaces it.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.env.add_function(name, function);
    }

    /// Redirects `print`/`printf` output.
    pub fn set_print_writer(&mut self, writer: impl PrintWriter + 'static) {
        let mut guard = self.print.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Box::new(writer);
    }

    /// Executes against `record` and collapses the result to a boolean by
    /// the truthiness rule.
    pub fn run(&mut self, record: &dyn Record) -> Result<bool, RuntimeError> {
        self.execute(record).map(|value| value.is_truthy())
    }

    /// Executes against `record`, returning the raw result value.
    pub fn execute(&mut self, record: &dyn Record) -> Result<Value, RuntimeError> {
        let Some(program) = &self.program else {
            // not prepared: there are no instructions to run
            return Err(RuntimeError::EmptyProgram);
        };
        Vm::new(program, &mut self.env, record, self.cancel.as_ref()).run()
    }

    /// Disassembles the prepared program: the main stream, the constant
    /// pool, and every user-defined function.
    #[must_use]
    pub fn dump(&self) -> String {
        let Some(program) = &self.program else {
            return "program not prepared\n".to_owned();
        };
        let mut output = bytecode::disassemble(&program.bytecode, &program.constants);

        output.push_str("\nConstant Pool:\n");
        for (index, constant) in program.constants.iter().enumerate() {
            output.push_str(&format!(
                "{index:04} {:>7} {}\n",
                constant.type_name(),
                bytecode::escape(&constant.inspect())
            ));
        }

        if !program.functions.is_empty() {
            output.push_str("\nUser-defined functions:\n");
            let mut names: Vec<&String> = program.functions.keys().collect();
            names.sort();
            for name in names {
                let function = &program.functions[name];
                output.push_str(&format!("function {}({})\n", function.name, function.parameters.join(", ")));
                output.push_str(&bytecode::disassemble(&function.bytecode, &program.constants));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectPrint;

    fn prepared(source: &str) -> Engine {
        let mut engine = Engine::new(source);
        engine.prepare(PrepareFlags::default()).expect("prepares");
        engine
    }

    #[test]
    fn run_collapses_execute_by_truthiness() {
        let mut engine = prepared("return 3;");
        assert_eq!(engine.execute(&()), Ok(Value::Int(3)));
        assert_eq!(engine.run(&()), Ok(true));

        let mut engine = prepared("return 0;");
        assert_eq!(engine.run(&()), Ok(false));
    }

    #[test]
    fn running_before_prepare_is_an_empty_program() {
        let mut engine = Engine::new("return true;");
        assert_eq!(engine.run(&()), Err(RuntimeError::EmptyProgram));
    }

    #[test]
    fn variables_persist_across_runs() {
        let mut engine = prepared("counter = counter + 1; return counter;");
        engine.set_variable("counter", Value::Int(0));
        assert_eq!(engine.execute(&()), Ok(Value::Int(1)));
        assert_eq!(engine.execute(&()), Ok(Value::Int(2)));
        assert_eq!(engine.get_variable("counter"), Some(Value::Int(2)));
    }

    #[test]
    fn host_functions_receive_arguments_in_source_order() {
        let mut engine = prepared("return join(\"a\", \"b\", \"c\");");
        engine.add_function("join", |args: &[Value]| {
            let joined: Vec<String> = args.iter().map(ToString::to_string).collect();
            Ok(Value::Str(joined.join("-")))
        });
        assert_eq!(engine.execute(&()), Ok(Value::Str("a-b-c".into())));
    }

    #[test]
    fn host_function_errors_carry_the_function_name() {
        let mut engine = prepared("return boom();");
        engine.add_function("boom", |_: &[Value]| Err("it broke".to_owned()));
        let error = engine.run(&()).unwrap_err();
        assert_eq!(
            error,
            RuntimeError::HostFunction {
                name: "boom".into(),
                message: "it broke".into()
            }
        );
    }

    #[test]
    fn print_output_can_be_captured() {
        let collect = CollectPrint::new();
        let mut engine = prepared("print(\"x=\", 1, \"\\n\"); return true;");
        engine.set_print_writer(collect.clone());
        engine.run(&()).unwrap();
        assert_eq!(collect.contents(), "x=1\n");
    }

    #[test]
    fn prepare_accumulates_every_parse_error() {
        let mut engine = Engine::new("a = ; b = ;");
        let error = engine.prepare(PrepareFlags::default()).unwrap_err();
        assert_eq!(error.errors().len(), 2);
        assert_eq!(error.to_string().lines().count(), 2);
    }

    #[test]
    fn no_optimize_keeps_the_raw_stream() {
        let mut optimized = Engine::new("return 1 + 2;");
        optimized.prepare(PrepareFlags::default()).unwrap();
        let mut raw = Engine::new("return 1 + 2;");
        raw.prepare(PrepareFlags::no_optimize()).unwrap();

        assert!(optimized.dump().lines().count() < raw.dump().lines().count());
        assert!(raw.dump().contains("Add"));
    }

    #[test]
    fn dump_lists_pool_and_functions() {
        let mut engine = Engine::new("function rev(s) { return s; } return rev(\"x\");");
        engine.prepare(PrepareFlags::default()).unwrap();
        let dump = engine.dump();
        assert!(dump.contains("Constant Pool:"));
        assert!(dump.contains("User-defined functions:"));
        assert!(dump.contains("function rev(s)"));
    }
}
