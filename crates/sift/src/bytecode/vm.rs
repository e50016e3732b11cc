//! The stack-based virtual machine.
//!
//! Each step of the dispatch loop polls the cancellation token, fetches one
//! opcode (plus its 16-bit operand when the opcode carries one), and
//! executes it against the value stack. Script-function calls push a frame
//! holding the callee's instruction stream and an environment scope;
//! `Return` pops both. Reflection over the host record is cached for the
//! duration of one execution.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    bytecode::{
        compiler::Program,
        op::Opcode,
    },
    cancel::CancelToken,
    environment::Environment,
    errors::RuntimeError,
    record::Record,
    regexp,
    value::{HashKey, Value, ValueIter},
};

/// An open iteration: the value iterator plus the loop variables' previous
/// bindings, restored when the iterable is exhausted so loop variables do
/// not leak out of their loop.
struct IterHandle {
    iter: ValueIter,
    /// `(name, previous value)` pairs captured at the first bind; `None`
    /// until the loop produced its first element.
    saved: Option<Vec<(String, Option<Value>)>>,
}

/// One call frame: an instruction stream and the offset being executed.
struct Frame<'a> {
    bytecode: &'a [u8],
    ip: usize,
}

/// Execution state for one `run`/`execute` call.
pub struct Vm<'a> {
    program: &'a Program,
    env: &'a mut Environment,
    record: &'a dyn Record,
    cancel: Option<&'a CancelToken>,
    stack: Vec<Value>,
    frames: SmallVec<[Frame<'a>; 4]>,
    iterators: Vec<IterHandle>,
    /// Host-record fields, read once on the first unresolved lookup.
    field_cache: Option<AHashMap<String, Value>>,
}

impl<'a> Vm<'a> {
    pub fn new(
        program: &'a Program,
        env: &'a mut Environment,
        record: &'a dyn Record,
        cancel: Option<&'a CancelToken>,
    ) -> Self {
        Self {
            program,
            env,
            record,
            cancel,
            stack: Vec::new(),
            frames: SmallVec::new(),
            iterators: Vec::new(),
            field_cache: None,
        }
    }

    /// Runs the program to its `Return`, yielding the returned value.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        if self.program.bytecode.is_empty() {
            return Err(RuntimeError::EmptyProgram);
        }
        self.frames.push(Frame {
            bytecode: &self.program.bytecode,
            ip: 0,
        });

        loop {
            if self.cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(RuntimeError::Timeout);
            }

            let (op, operand) = self.fetch()?;
            if let Some(result) = self.execute(op, operand)? {
                return Ok(result);
            }
        }
    }

    /// Fetches the next opcode and operand, advancing the frame's ip.
    fn fetch(&mut self) -> Result<(Opcode, u16), RuntimeError> {
        let frame = self.frames.last_mut().expect("the root frame outlives the loop");
        let ip = frame.ip;
        if ip == frame.bytecode.len() {
            return Err(RuntimeError::MissingReturn);
        }
        if ip > frame.bytecode.len() {
            return Err(RuntimeError::InstructionOutOfBounds { offset: ip });
        }
        let byte = frame.bytecode[ip];
        let Some(op) = Opcode::from_byte(byte) else {
            return Err(RuntimeError::UnknownOpcode { opcode: byte });
        };
        if op.has_operand() {
            let (Some(&high), Some(&low)) = (frame.bytecode.get(ip + 1), frame.bytecode.get(ip + 2)) else {
                return Err(RuntimeError::InstructionOutOfBounds { offset: ip + 1 });
            };
            frame.ip = ip + 3;
            Ok((op, u16::from_be_bytes([high, low])))
        } else {
            frame.ip = ip + 1;
            Ok((op, 0))
        }
    }

    /// Executes one instruction; `Some(value)` ends the run.
    fn execute(&mut self, op: Opcode, operand: u16) -> Result<Option<Value>, RuntimeError> {
        match op {
            Opcode::Push => self.push(Value::Int(i64::from(operand))),
            Opcode::Constant => {
                let value = self.constant(operand)?.clone();
                self.push(value);
            }
            Opcode::Void => self.push(Value::Void),
            Opcode::True => self.push(Value::Bool(true)),
            Opcode::False => self.push(Value::Bool(false)),
            Opcode::Null => self.push(Value::Null),
            Opcode::Nop => {}

            Opcode::Lookup => {
                let name = self.constant_name(operand)?;
                let value = match self.env.get(&name) {
                    Some(value) => value.clone(),
                    None => self.record_field(&name),
                };
                self.push(value);
            }
            Opcode::Set => {
                let name = self.pop_name()?;
                let value = self.pop()?;
                self.env.set(&name, value);
            }
            Opcode::Local => {
                let name = self.pop_name()?;
                self.env.declare_local(&name);
            }
            Opcode::Inc => self.step_variable(operand, 1)?,
            Opcode::Dec => self.step_variable(operand, -1)?,

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Power => {
                self.binary_arithmetic(op)?;
            }
            Opcode::Equal
            | Opcode::NotEqual
            | Opcode::Less
            | Opcode::LessEqual
            | Opcode::Greater
            | Opcode::GreaterEqual => self.comparison(op)?,
            Opcode::Matches | Opcode::NotMatches => self.matches(op)?,

            Opcode::And => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Bool(left.is_truthy() && right.is_truthy()));
            }
            Opcode::Or => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Bool(left.is_truthy() || right.is_truthy()));
            }
            Opcode::Bang => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()));
            }
            Opcode::Minus => {
                let value = self.pop()?;
                let negated = match value {
                    Value::Int(n) => Value::Int(n.wrapping_neg()),
                    Value::Float(n) => Value::Float(-n),
                    other => {
                        return Err(RuntimeError::TypeError {
                            message: format!("unary minus is not defined for {}", other.type_name()),
                        });
                    }
                };
                self.push(negated);
            }
            Opcode::SquareRoot => {
                let value = self.pop()?;
                let Some(n) = value.as_f64() else {
                    return Err(RuntimeError::TypeError {
                        message: format!("square root is not defined for {}", value.type_name()),
                    });
                };
                self.push(Value::Float(n.sqrt()));
            }

            Opcode::Jump => self.jump(operand),
            Opcode::JumpIfFalse => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.jump(operand);
                }
            }

            Opcode::Call => self.call(operand as usize)?,
            Opcode::Return => {
                let result = self.pop()?;
                if self.frames.len() > 1 {
                    self.frames.pop();
                    self.env.pop_frame();
                    self.push(result);
                } else {
                    return Ok(Some(result));
                }
            }

            Opcode::Array => {
                let count = operand as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.pop()?);
                }
                items.reverse();
                self.push(Value::Array(items));
            }
            Opcode::Hash => {
                let count = operand as usize;
                let mut pairs = AHashMap::with_capacity(count);
                for _ in 0..count {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let key = HashKey::try_from(key).map_err(|type_name| RuntimeError::UnhashableKey { type_name })?;
                    pairs.insert(key, value);
                }
                self.push(Value::Hash(pairs));
            }
            Opcode::Range => self.range()?,
            Opcode::Index => self.index()?,
            Opcode::Case => {
                let case_value = self.pop()?;
                let subject = self.pop()?;
                let verdict = match &case_value {
                    Value::Regexp(pattern) => {
                        let compiled = self.compiled_regexp(pattern)?;
                        regexp::line_match(&compiled, &text_of(&subject))
                    }
                    other => subject.semantic_eq(other),
                };
                self.push(Value::Bool(verdict));
            }

            Opcode::IterationReset => {
                let value = self.pop()?;
                match value.iterate() {
                    Some(iter) => self.iterators.push(IterHandle { iter, saved: None }),
                    None => {
                        return Err(RuntimeError::NonIterable {
                            type_name: value.type_name(),
                        });
                    }
                }
            }
            Opcode::IterationNext => self.iteration_next()?,
        }
        Ok(None)
    }

    /// Advances the innermost open iteration, binding the loop variables and
    /// pushing the "has more" flag. The first bind saves the variables'
    /// previous values; exhaustion restores them.
    fn iteration_next(&mut self) -> Result<(), RuntimeError> {
        let element_name = self.pop_name()?;
        let index_name = self.pop_name()?;
        let advanced = {
            let Some(handle) = self.iterators.last_mut() else {
                return Err(RuntimeError::StackUnderflow);
            };
            handle.iter.advance()
        };
        match advanced {
            Some((element, key)) => {
                if self.iterators.last().is_some_and(|handle| handle.saved.is_none()) {
                    let mut saved = Vec::new();
                    if !index_name.is_empty() {
                        saved.push((index_name.clone(), self.env.get(&index_name).cloned()));
                    }
                    saved.push((element_name.clone(), self.env.get(&element_name).cloned()));
                    if let Some(handle) = self.iterators.last_mut() {
                        handle.saved = Some(saved);
                    }
                }
                if !index_name.is_empty() {
                    self.env.set(&index_name, key);
                }
                self.env.set(&element_name, element);
                self.push(Value::Bool(true));
            }
            None => {
                if let Some(IterHandle { saved: Some(saved), .. }) = self.iterators.pop() {
                    for (name, previous) in saved {
                        match previous {
                            Some(value) => self.env.set(&name, value),
                            None => {
                                self.env.remove(&name);
                            }
                        }
                    }
                }
                self.push(Value::Bool(false));
            }
        }
        Ok(())
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_name(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Str(name) => Ok(name),
            other => Err(RuntimeError::TypeError {
                message: format!("expected a name, found {}", other.type_name()),
            }),
        }
    }

    fn constant(&self, index: u16) -> Result<&Value, RuntimeError> {
        self.program
            .constants
            .get(index as usize)
            .ok_or(RuntimeError::ConstantIndexOutOfRange { index })
    }

    fn constant_name(&self, index: u16) -> Result<String, RuntimeError> {
        match self.constant(index)? {
            Value::Str(name) => Ok(name.clone()),
            other => Err(RuntimeError::TypeError {
                message: format!("expected a name constant, found {}", other.type_name()),
            }),
        }
    }

    fn jump(&mut self, target: u16) {
        let frame = self.frames.last_mut().expect("the root frame outlives the loop");
        frame.ip = target as usize;
    }

    /// Reads a record field through the per-execution cache, populating the
    /// cache from the record on first use. Unknown names read as `Null`.
    fn record_field(&mut self, name: &str) -> Value {
        if self.field_cache.is_none() {
            let mut cache = AHashMap::new();
            for field in self.record.field_names() {
                let value = self.record.field(&field).unwrap_or(Value::Null);
                cache.insert(field, value);
            }
            self.field_cache = Some(cache);
        }
        self.field_cache
            .as_ref()
            .and_then(|cache| cache.get(name).cloned())
            .unwrap_or(Value::Null)
    }

    fn step_variable(&mut self, operand: u16, delta: i64) -> Result<(), RuntimeError> {
        let name = self.constant_name(operand)?;
        let current = self.env.get(&name).cloned().unwrap_or(Value::Null);
        let stepped = match current {
            Value::Int(n) => Value::Int(n.wrapping_add(delta)),
            Value::Float(n) => Value::Float(n + delta as f64),
            other if delta > 0 => {
                return Err(RuntimeError::NonIncrementable {
                    type_name: other.type_name(),
                });
            }
            other => {
                return Err(RuntimeError::NonDecrementable {
                    type_name: other.type_name(),
                });
            }
        };
        self.env.set(&name, stepped);
        Ok(())
    }

    fn binary_arithmetic(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => integer_arithmetic(*a, op, *b)?,
            (Value::Str(a), Value::Str(b)) if op == Opcode::Add => Value::Str(format!("{a}{b}")),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => float_arithmetic(a, op, b)?,
                _ => {
                    return Err(RuntimeError::TypeError {
                        message: format!(
                            "unsupported operand types for {}: {} and {}",
                            op_symbol(op),
                            left.type_name(),
                            right.type_name()
                        ),
                    });
                }
            },
        };
        self.push(result);
        Ok(())
    }

    fn comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let verdict = match op {
            Opcode::Equal => left.semantic_eq(&right),
            Opcode::NotEqual => !left.semantic_eq(&right),
            _ => {
                let ordering = match (&left, &right) {
                    (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                    _ => match (left.as_f64(), right.as_f64()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => {
                            return Err(RuntimeError::TypeError {
                                message: format!(
                                    "type mismatch: cannot compare {} and {} with {}",
                                    left.type_name(),
                                    right.type_name(),
                                    op_symbol(op)
                                ),
                            });
                        }
                    },
                };
                // NaN comparisons are false across the board
                ordering.is_some_and(|ordering| match op {
                    Opcode::Less => ordering.is_lt(),
                    Opcode::LessEqual => ordering.is_le(),
                    Opcode::Greater => ordering.is_gt(),
                    Opcode::GreaterEqual => ordering.is_ge(),
                    _ => false,
                })
            }
        };
        self.push(Value::Bool(verdict));
        Ok(())
    }

    fn matches(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let pattern = match &right {
            Value::Regexp(pattern) | Value::Str(pattern) => self.compiled_regexp(pattern)?,
            other => {
                return Err(RuntimeError::TypeError {
                    message: format!(
                        "the right side of a match must be a regular expression, found {}",
                        other.type_name()
                    ),
                });
            }
        };
        let matched = regexp::line_match(&pattern, &text_of(&left));
        let verdict = if op == Opcode::Matches { matched } else { !matched };
        self.push(Value::Bool(verdict));
        Ok(())
    }

    fn compiled_regexp(&self, pattern: &str) -> Result<regex::Regex, RuntimeError> {
        regexp::compile(pattern).map_err(|_| RuntimeError::TypeError {
            message: format!("invalid regular expression /{pattern}/"),
        })
    }

    fn range(&mut self) -> Result<(), RuntimeError> {
        let end = self.pop()?;
        let start = self.pop()?;
        let (Value::Int(start), Value::Int(end)) = (&start, &end) else {
            return Err(RuntimeError::TypeError {
                message: format!(
                    "range bounds must be integers, found {} and {}",
                    start.type_name(),
                    end.type_name()
                ),
            });
        };
        if start > end {
            return Err(RuntimeError::TypeError {
                message: "start of a range must be smaller than the end".to_owned(),
            });
        }
        let items: Vec<Value> = (*start..=*end).map(Value::Int).collect();
        self.push(Value::Array(items));
        Ok(())
    }

    fn index(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop()?;
        let container = self.pop()?;
        let element = match (&container, &index) {
            (Value::Null, _) => Value::Null,
            (Value::Array(items), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null),
            (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::Str(c.to_string())),
            (Value::Hash(pairs), key) => match HashKey::try_from(key.clone()) {
                Ok(key) => pairs.get(&key).cloned().unwrap_or(Value::Null),
                Err(type_name) => return Err(RuntimeError::UnhashableKey { type_name }),
            },
            _ => {
                return Err(RuntimeError::TypeError {
                    message: format!(
                        "cannot index {} with {}",
                        container.type_name(),
                        index.type_name()
                    ),
                });
            }
        };
        self.push(element);
        Ok(())
    }

    fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let name = self.pop_name()?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        args.reverse();

        let program = self.program;
        if let Some(function) = program.functions.get(&name) {
            if function.parameters.len() != argc {
                return Err(RuntimeError::ArityError {
                    name,
                    expected: function.parameters.len(),
                    received: argc,
                });
            }
            let bindings: Vec<(String, Value)> = function.parameters.iter().cloned().zip(args).collect();
            self.env.push_frame(bindings);
            self.frames.push(Frame {
                bytecode: &function.bytecode,
                ip: 0,
            });
            return Ok(());
        }

        let result = self.env.function(&name).map(|host| host(&args));
        match result {
            Some(Ok(value)) => {
                self.push(value);
                Ok(())
            }
            Some(Err(message)) => Err(RuntimeError::HostFunction { name, message }),
            None => Err(RuntimeError::FunctionNotFound { name }),
        }
    }
}

/// The matchable text of a value: strings as-is, everything else through its
/// display form.
fn text_of(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::Power => "**",
        Opcode::Less => "<",
        Opcode::LessEqual => "<=",
        Opcode::Greater => ">",
        Opcode::GreaterEqual => ">=",
        _ => "?",
    }
}

fn integer_arithmetic(a: i64, op: Opcode, b: i64) -> Result<Value, RuntimeError> {
    let result = match op {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        Opcode::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        // integer exponentiation goes through the float path, truncated back
        Opcode::Power => (a as f64).powf(b as f64) as i64,
        _ => unreachable!("caller matched an arithmetic opcode"),
    };
    Ok(Value::Int(result))
}

fn float_arithmetic(a: f64, op: Opcode, b: f64) -> Result<Value, RuntimeError> {
    let result = match op {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a / b
        }
        Opcode::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a % b
        }
        Opcode::Power => a.powf(b),
        _ => unreachable!("caller matched an arithmetic opcode"),
    };
    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::assemble;

    fn empty_program(bytecode: Vec<u8>) -> Program {
        Program {
            bytecode,
            constants: Vec::new(),
            functions: AHashMap::new(),
        }
    }

    fn run_raw(bytecode: Vec<u8>) -> Result<Value, RuntimeError> {
        let program = empty_program(bytecode);
        let mut env = Environment::new();
        Vm::new(&program, &mut env, &(), None).run()
    }

    #[test]
    fn empty_stream_is_an_error_before_the_first_step() {
        assert_eq!(run_raw(Vec::new()), Err(RuntimeError::EmptyProgram));
    }

    #[test]
    fn running_off_the_end_is_missing_return() {
        assert_eq!(run_raw(assemble(Opcode::True, None)), Err(RuntimeError::MissingReturn));
    }

    #[test]
    fn jump_past_the_end_is_out_of_bounds() {
        let bytecode = assemble(Opcode::Jump, Some(9));
        assert_eq!(
            run_raw(bytecode),
            Err(RuntimeError::InstructionOutOfBounds { offset: 9 })
        );
    }

    #[test]
    fn unknown_bytes_are_reported() {
        assert_eq!(run_raw(vec![0xfe]), Err(RuntimeError::UnknownOpcode { opcode: 0xfe }));
    }

    #[test]
    fn popping_an_empty_stack_is_a_defined_error() {
        let error = run_raw(assemble(Opcode::Add, None)).unwrap_err();
        assert_eq!(error, RuntimeError::StackUnderflow);
        assert_eq!(error.to_string(), "Pop from an empty stack");
    }

    #[test]
    fn constant_index_is_bounds_checked() {
        let bytecode = assemble(Opcode::Constant, Some(3));
        assert_eq!(
            run_raw(bytecode),
            Err(RuntimeError::ConstantIndexOutOfRange { index: 3 })
        );
    }

    #[test]
    fn return_yields_the_top_of_stack() {
        let mut bytecode = assemble(Opcode::Push, Some(42));
        bytecode.extend(assemble(Opcode::Return, None));
        assert_eq!(run_raw(bytecode), Ok(Value::Int(42)));
    }
}
