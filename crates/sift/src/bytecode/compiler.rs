//! AST to bytecode emitter.
//!
//! Expressions emit post-order, statements pre-order. Forward jumps are
//! emitted with placeholder operands and patched once the target is known.
//! `&&`/`||` always compile to short-circuit conditional jumps; the strict
//! `And`/`Or` opcodes are reserved for multi-value `case` arms.

use ahash::AHashMap;

use crate::{
    ast::{AssignOperator, Block, Expression, InfixOperator, PostfixOperator, PrefixOperator, Statement},
    bytecode::{
        builder::{CodeBuilder, ConstantPool},
        op::Opcode,
        optimizer,
    },
    errors::CompileError,
    value::Value,
};

/// Highest integer literal that fits the `Push` operand; larger literals go
/// through the constant pool.
const MAX_PUSH_LITERAL: i64 = i16::MAX as i64;

/// A script-defined function: its parameter names, its own instruction
/// stream, and the names it declared `local`.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub parameters: Vec<String>,
    pub bytecode: Vec<u8>,
    pub locals: Vec<String>,
}

/// A fully compiled, immutable program: the main instruction stream, the
/// shared constant pool, and the script-defined functions.
#[derive(Debug)]
pub struct Program {
    pub bytecode: Vec<u8>,
    pub constants: Vec<Value>,
    pub functions: AHashMap<String, UserFunction>,
}

/// Emitter output with the constant pool still open, so the optimizer can
/// intern folded values before the program is sealed.
#[derive(Debug)]
pub struct CompileOutput {
    bytecode: Vec<u8>,
    pool: ConstantPool,
    functions: AHashMap<String, UserFunction>,
}

impl CompileOutput {
    /// Runs the peephole passes over the main stream and every function.
    pub fn optimize(&mut self) -> Result<(), Vec<CompileError>> {
        let mut errors = Vec::new();
        if let Err(error) = optimizer::optimize(&mut self.bytecode, &mut self.pool) {
            errors.push(error);
        }
        for function in self.functions.values_mut() {
            if let Err(error) = optimizer::optimize(&mut function.bytecode, &mut self.pool) {
                errors.push(error);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    #[must_use]
    pub fn finish(self) -> Program {
        Program {
            bytecode: self.bytecode,
            constants: self.pool.into_values(),
            functions: self.functions,
        }
    }
}

/// Compiles parsed statements into bytecode, a constant pool and the
/// function table. Errors accumulate; nothing is exposed when any occurred.
pub fn compile(statements: &[Statement]) -> Result<CompileOutput, Vec<CompileError>> {
    let mut compiler = Compiler::default();
    let mut builder = CodeBuilder::new();
    for statement in statements {
        compiler.statement(&mut builder, statement);
    }
    if compiler.errors.is_empty() {
        Ok(CompileOutput {
            bytecode: builder.into_bytecode(),
            pool: compiler.pool,
            functions: compiler.functions,
        })
    } else {
        Err(compiler.errors)
    }
}

#[derive(Default)]
struct Compiler {
    pool: ConstantPool,
    functions: AHashMap<String, UserFunction>,
    errors: Vec<CompileError>,
    /// `local` declarations of each function body being compiled.
    locals_stack: Vec<Vec<String>>,
    /// Distinguishes the hidden subject binding of nested switches.
    switch_counter: usize,
}

impl Compiler {
    /// Interns a variable name, stripping the legacy `$` prefix.
    fn name_constant(&mut self, name: &str) -> u16 {
        let stripped = name.strip_prefix('$').unwrap_or(name);
        self.pool.add(Value::Str(stripped.to_owned()))
    }

    fn statement(&mut self, builder: &mut CodeBuilder, statement: &Statement) {
        match statement {
            Statement::Expression(expression) => self.expression(builder, expression),
            Statement::Return(expression) => {
                self.expression(builder, expression);
                builder.emit(Opcode::Return);
            }
            Statement::If {
                condition,
                consequence,
                alternative,
            } => {
                self.expression(builder, condition);
                let skip_consequence = builder.emit_jump(Opcode::JumpIfFalse);
                self.block(builder, consequence);
                let skip_alternative = builder.emit_jump(Opcode::Jump);
                builder.patch_jump(skip_consequence);
                if let Some(alternative) = alternative {
                    self.block(builder, alternative);
                }
                builder.patch_jump(skip_alternative);
            }
            Statement::While { condition, body } | Statement::For { condition, body } => {
                let loop_start = builder.offset();
                self.expression(builder, condition);
                let exit = builder.emit_jump(Opcode::JumpIfFalse);
                self.block(builder, body);
                self.jump_back(builder, loop_start);
                builder.patch_jump(exit);
            }
            Statement::Foreach {
                index,
                element,
                iterable,
                body,
            } => {
                self.expression(builder, iterable);
                builder.emit(Opcode::IterationReset);
                let loop_start = builder.offset();
                // The one-variable form binds no index; an empty name tells
                // the VM to skip that binding.
                let index_constant = self.name_constant(index.as_deref().unwrap_or(""));
                builder.emit_with(Opcode::Constant, index_constant);
                let element_constant = self.name_constant(element);
                builder.emit_with(Opcode::Constant, element_constant);
                builder.emit(Opcode::IterationNext);
                let exit = builder.emit_jump(Opcode::JumpIfFalse);
                self.block(builder, body);
                self.jump_back(builder, loop_start);
                builder.patch_jump(exit);
            }
            Statement::Switch { subject, cases, default } => {
                self.switch(builder, subject, cases, default.as_ref());
            }
            Statement::Function { name, parameters, body } => {
                self.function(name, parameters, body);
            }
            Statement::Local(name) => {
                let constant = self.name_constant(name);
                builder.emit_with(Opcode::Constant, constant);
                builder.emit(Opcode::Local);
                if let Some(locals) = self.locals_stack.last_mut() {
                    locals.push(name.clone());
                }
            }
        }
    }

    fn block(&mut self, builder: &mut CodeBuilder, block: &Block) {
        for statement in &block.0 {
            self.statement(builder, statement);
        }
    }

    fn jump_back(&mut self, builder: &mut CodeBuilder, target: usize) {
        let at = builder.emit_jump(Opcode::Jump);
        builder.patch_jump_to(at, target);
    }

    fn switch(
        &mut self,
        builder: &mut CodeBuilder,
        subject: &Expression,
        cases: &[crate::ast::SwitchCase],
        default: Option<&Block>,
    ) {
        // The subject is evaluated once into a hidden binding so each case
        // comparison can re-read it.
        let hidden = format!("#switch{}", self.switch_counter);
        self.switch_counter += 1;
        self.expression(builder, subject);
        let hidden_constant = self.pool.add(Value::Str(hidden.clone()));
        builder.emit_with(Opcode::Constant, hidden_constant);
        builder.emit(Opcode::Set);

        let mut exits = Vec::new();
        for case in cases {
            for (i, value) in case.values.iter().enumerate() {
                builder.emit_with(Opcode::Lookup, hidden_constant);
                self.expression(builder, value);
                builder.emit(Opcode::Case);
                if i > 0 {
                    // verdicts of a multi-value arm combine strictly
                    builder.emit(Opcode::Or);
                }
            }
            let next_case = builder.emit_jump(Opcode::JumpIfFalse);
            self.block(builder, &case.body);
            exits.push(builder.emit_jump(Opcode::Jump));
            builder.patch_jump(next_case);
        }
        if let Some(default) = default {
            self.block(builder, default);
        }
        for exit in exits {
            builder.patch_jump(exit);
        }
    }

    fn function(&mut self, name: &str, parameters: &[String], body: &Block) {
        let mut builder = CodeBuilder::new();
        self.locals_stack.push(Vec::new());
        self.block(&mut builder, body);
        let locals = self.locals_stack.pop().unwrap_or_default();
        let parameters: Vec<String> = parameters
            .iter()
            .map(|p| p.strip_prefix('$').unwrap_or(p).to_owned())
            .collect();
        self.functions.insert(
            name.to_owned(),
            UserFunction {
                name: name.to_owned(),
                parameters,
                bytecode: builder.into_bytecode(),
                locals,
            },
        );
    }

    fn expression(&mut self, builder: &mut CodeBuilder, expression: &Expression) {
        match expression {
            Expression::Identifier(name) => {
                let constant = self.name_constant(name);
                builder.emit_with(Opcode::Lookup, constant);
            }
            Expression::IntegerLiteral(value) => self.integer(builder, *value),
            Expression::FloatLiteral(value) => {
                let constant = self.pool.add(Value::Float(*value));
                builder.emit_with(Opcode::Constant, constant);
            }
            Expression::StringLiteral(value) => {
                let constant = self.pool.add(Value::Str(value.clone()));
                builder.emit_with(Opcode::Constant, constant);
            }
            Expression::BooleanLiteral(true) => {
                builder.emit(Opcode::True);
            }
            Expression::BooleanLiteral(false) => {
                builder.emit(Opcode::False);
            }
            Expression::RegexpLiteral(pattern) => {
                // placement and pattern validity were checked by the parser
                let constant = self.pool.add(Value::Regexp(pattern.clone()));
                builder.emit_with(Opcode::Constant, constant);
            }
            Expression::ArrayLiteral(items) => {
                for item in items {
                    self.expression(builder, item);
                }
                builder.emit_with(Opcode::Array, items.len() as u16);
            }
            Expression::HashLiteral(pairs) => {
                for (key, value) in pairs {
                    self.expression(builder, key);
                    self.expression(builder, value);
                }
                builder.emit_with(Opcode::Hash, pairs.len() as u16);
            }
            Expression::Prefix { operator, right } => {
                self.expression(builder, right);
                builder.emit(match operator {
                    PrefixOperator::Minus => Opcode::Minus,
                    PrefixOperator::Not => Opcode::Bang,
                    PrefixOperator::Sqrt => Opcode::SquareRoot,
                });
            }
            Expression::Infix { left, operator, right } => {
                self.infix(builder, left, *operator, right);
            }
            Expression::Ternary {
                condition,
                consequence,
                alternative,
            } => {
                self.expression(builder, condition);
                let take_alternative = builder.emit_jump(Opcode::JumpIfFalse);
                self.expression(builder, consequence);
                let done = builder.emit_jump(Opcode::Jump);
                builder.patch_jump(take_alternative);
                self.expression(builder, alternative);
                builder.patch_jump(done);
            }
            Expression::Assign { name, operator, value } => {
                if let Some(op) = compound_opcode(*operator) {
                    let constant = self.name_constant(name);
                    builder.emit_with(Opcode::Lookup, constant);
                    self.expression(builder, value);
                    builder.emit(op);
                } else {
                    self.expression(builder, value);
                }
                let constant = self.name_constant(name);
                builder.emit_with(Opcode::Constant, constant);
                builder.emit(Opcode::Set);
            }
            Expression::Postfix { name, operator } => {
                let constant = self.name_constant(name);
                builder.emit_with(
                    match operator {
                        PostfixOperator::Increment => Opcode::Inc,
                        PostfixOperator::Decrement => Opcode::Dec,
                    },
                    constant,
                );
            }
            Expression::Index { left, index } => {
                self.expression(builder, left);
                self.expression(builder, index);
                builder.emit(Opcode::Index);
            }
            Expression::Call { function, arguments } => {
                for argument in arguments {
                    self.expression(builder, argument);
                }
                let constant = self.pool.add(Value::Str(function.clone()));
                builder.emit_with(Opcode::Constant, constant);
                builder.emit_with(Opcode::Call, arguments.len() as u16);
            }
        }
    }

    fn integer(&mut self, builder: &mut CodeBuilder, value: i64) {
        if (0..=MAX_PUSH_LITERAL).contains(&value) {
            builder.emit_with(Opcode::Push, value as u16);
        } else {
            let constant = self.pool.add(Value::Int(value));
            builder.emit_with(Opcode::Constant, constant);
        }
    }

    fn infix(
        &mut self,
        builder: &mut CodeBuilder,
        left: &Expression,
        operator: InfixOperator,
        right: &Expression,
    ) {
        match operator {
            InfixOperator::And => {
                // L && R: a falsy L short-circuits to False without
                // evaluating R.
                self.expression(builder, left);
                let short_circuit = builder.emit_jump(Opcode::JumpIfFalse);
                self.expression(builder, right);
                let done = builder.emit_jump(Opcode::Jump);
                builder.patch_jump(short_circuit);
                builder.emit(Opcode::False);
                builder.patch_jump(done);
            }
            InfixOperator::Or => {
                // L || R: a truthy L short-circuits to True.
                self.expression(builder, left);
                let evaluate_right = builder.emit_jump(Opcode::JumpIfFalse);
                builder.emit(Opcode::True);
                let done = builder.emit_jump(Opcode::Jump);
                builder.patch_jump(evaluate_right);
                self.expression(builder, right);
                builder.patch_jump(done);
            }
            _ => {
                self.expression(builder, left);
                self.expression(builder, right);
                builder.emit(match operator {
                    InfixOperator::Add => Opcode::Add,
                    InfixOperator::Sub => Opcode::Sub,
                    InfixOperator::Mul => Opcode::Mul,
                    InfixOperator::Div => Opcode::Div,
                    InfixOperator::Mod => Opcode::Mod,
                    InfixOperator::Power => Opcode::Power,
                    InfixOperator::Eq => Opcode::Equal,
                    InfixOperator::NotEq => Opcode::NotEqual,
                    InfixOperator::Lt => Opcode::Less,
                    InfixOperator::LtEq => Opcode::LessEqual,
                    InfixOperator::Gt => Opcode::Greater,
                    InfixOperator::GtEq => Opcode::GreaterEqual,
                    InfixOperator::Match => Opcode::Matches,
                    InfixOperator::NotMatch => Opcode::NotMatches,
                    InfixOperator::Range => Opcode::Range,
                    InfixOperator::And | InfixOperator::Or => unreachable!("handled above"),
                });
            }
        }
    }
}

fn compound_opcode(operator: AssignOperator) -> Option<Opcode> {
    match operator {
        AssignOperator::Assign => None,
        AssignOperator::Add => Some(Opcode::Add),
        AssignOperator::Sub => Some(Opcode::Sub),
        AssignOperator::Mul => Some(Opcode::Mul),
        AssignOperator::Div => Some(Opcode::Div),
    }
}
