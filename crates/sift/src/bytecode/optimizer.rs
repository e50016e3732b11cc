//! Fixed-point peephole optimizer.
//!
//! Five passes run until none reports a change: constant arithmetic folding,
//! constant comparison folding, constant-condition jump elimination, dead
//! code removal after `Return`, and `Nop` compaction with jump fix-up.
//!
//! The first four passes never move bytes: a rewritten window is blanked
//! with `Nop`s and the replacement lands in the window's final bytes, so
//! every jump operand stays valid until the compaction pass remaps them.
//! Termination follows from a monotone measure: each change either shortens
//! the stream or converts non-`Nop` opcodes to `Nop`.

use ahash::{AHashMap, AHashSet};

use crate::{
    bytecode::{
        builder::ConstantPool,
        op::{Opcode, assemble, decode, read_instruction},
    },
    errors::CompileError,
    value::Value,
};

/// Offsets some jump in the stream lands on. A fold window must never span
/// one of these: the values visible at a merge point depend on which path
/// ran, so they are not constants there.
fn jump_targets(bytecode: &[u8]) -> AHashSet<usize> {
    let mut targets = AHashSet::new();
    let mut offset = 0;
    while offset < bytecode.len() {
        let Some((instruction, next)) = read_instruction(bytecode, offset) else {
            break;
        };
        if matches!(instruction.op, Opcode::Jump | Opcode::JumpIfFalse)
            && let Some(target) = instruction.operand
        {
            targets.insert(target as usize);
        }
        offset = next;
    }
    targets
}

/// Optimizes one instruction stream in place.
///
/// Fails only when folding reaches an undefined operation (division or
/// modulo by zero), which surfaces as a compile-time error instead of
/// silently emitting the faulty instructions.
pub fn optimize(bytecode: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<(), CompileError> {
    loop {
        let mut changed = false;
        changed |= fold_arithmetic(bytecode, pool)?;
        changed |= fold_comparisons(bytecode, pool);
        changed |= eliminate_constant_jumps(bytecode);
        changed |= strip_dead_code(bytecode);
        changed |= compact_nops(bytecode);
        if !changed {
            return Ok(());
        }
    }
}

/// The constant value an instruction pushes, when it pushes exactly one.
fn pushed_constant(op: Opcode, operand: Option<u16>, pool: &ConstantPool) -> Option<Value> {
    match op {
        Opcode::Push => Some(Value::Int(i64::from(operand?))),
        Opcode::Constant => pool.values().get(operand? as usize).cloned(),
        Opcode::True => Some(Value::Bool(true)),
        Opcode::False => Some(Value::Bool(false)),
        Opcode::Null => Some(Value::Null),
        _ => None,
    }
}

/// Blanks `range` with `Nop`s.
fn blank(bytecode: &mut [u8], start: usize, end: usize) {
    for byte in &mut bytecode[start..end] {
        *byte = Opcode::Nop as u8;
    }
}

/// Writes a push of `value` into the three bytes ending at `end`.
fn write_folded(bytecode: &mut [u8], end: usize, value: Value, pool: &mut ConstantPool) {
    let at = end - 3;
    let encoded = match value {
        Value::Int(n) if (0..=i64::from(i16::MAX)).contains(&n) => assemble(Opcode::Push, Some(n as u16)),
        other => assemble(Opcode::Constant, Some(pool.add(other))),
    };
    bytecode[at..at + 3].copy_from_slice(&encoded);
}

/// Pass 1: `Push a; Push b; <arith>` over numeric constants becomes a single
/// push of the computed value.
fn fold_arithmetic(bytecode: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<bool, CompileError> {
    let targets = jump_targets(bytecode);
    let mut changed = false;
    let mut prev: Option<(usize, Value)> = None;
    let mut prev_prev: Option<(usize, Value)> = None;
    let mut offset = 0;
    while offset < bytecode.len() {
        let Some((instruction, next)) = read_instruction(bytecode, offset) else {
            return Ok(changed);
        };
        if targets.contains(&instruction.offset) {
            prev = None;
            prev_prev = None;
        }
        match instruction.op {
            Opcode::Nop => {}
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Power => {
                if let (Some((start, left)), Some((_, right))) = (prev_prev.take(), prev.take()) {
                    let folded = fold_binary(&left, instruction.op, &right)?;
                    blank(bytecode, start, next);
                    write_folded(bytecode, next, folded.clone(), pool);
                    changed = true;
                    // the folded constant can feed a following fold
                    prev = Some((next - 3, folded));
                } else {
                    prev = None;
                    prev_prev = None;
                }
            }
            op => match pushed_constant(op, instruction.operand, pool) {
                Some(value @ (Value::Int(_) | Value::Float(_))) => {
                    prev_prev = prev.take();
                    prev = Some((instruction.offset, value));
                }
                _ => {
                    prev = None;
                    prev_prev = None;
                }
            },
        }
        offset = next;
    }
    Ok(changed)
}

/// Computes `left <op> right` with the run-time coercion rules. Both
/// operands are numeric by construction.
fn fold_binary(left: &Value, op: Opcode, right: &Value) -> Result<Value, CompileError> {
    let divide_by_zero = || CompileError::ConstantFold {
        message: "division by zero".to_owned(),
    };
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let result = match op {
            Opcode::Add => a.wrapping_add(*b),
            Opcode::Sub => a.wrapping_sub(*b),
            Opcode::Mul => a.wrapping_mul(*b),
            Opcode::Div => {
                if *b == 0 {
                    return Err(divide_by_zero());
                }
                a.wrapping_div(*b)
            }
            Opcode::Mod => {
                if *b == 0 {
                    return Err(divide_by_zero());
                }
                a.wrapping_rem(*b)
            }
            Opcode::Power => (*a as f64).powf(*b as f64) as i64,
            _ => unreachable!("caller matched an arithmetic opcode"),
        };
        return Ok(Value::Int(result));
    }

    let (a, b) = (
        left.as_f64().unwrap_or_default(),
        right.as_f64().unwrap_or_default(),
    );
    let result = match op {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => {
            if b == 0.0 {
                return Err(divide_by_zero());
            }
            a / b
        }
        Opcode::Mod => {
            if b == 0.0 {
                return Err(divide_by_zero());
            }
            a % b
        }
        Opcode::Power => a.powf(b),
        _ => unreachable!("caller matched an arithmetic opcode"),
    };
    Ok(Value::Float(result))
}

/// Pass 2: two constants followed by a comparison become `True`/`False`.
fn fold_comparisons(bytecode: &mut Vec<u8>, pool: &ConstantPool) -> bool {
    let targets = jump_targets(bytecode);
    let mut changed = false;
    let mut prev: Option<(usize, Value)> = None;
    let mut prev_prev: Option<(usize, Value)> = None;
    let mut offset = 0;
    while offset < bytecode.len() {
        let Some((instruction, next)) = read_instruction(bytecode, offset) else {
            return changed;
        };
        if targets.contains(&instruction.offset) {
            prev = None;
            prev_prev = None;
        }
        match instruction.op {
            Opcode::Nop => {}
            Opcode::Equal
            | Opcode::NotEqual
            | Opcode::Less
            | Opcode::LessEqual
            | Opcode::Greater
            | Opcode::GreaterEqual => {
                let window = match (&prev_prev, &prev) {
                    (Some((start, left)), Some((_, right))) => {
                        fold_comparison(left, instruction.op, right).map(|verdict| (*start, verdict))
                    }
                    _ => None,
                };
                if let Some((start, verdict)) = window {
                    blank(bytecode, start, next);
                    let op = if verdict { Opcode::True } else { Opcode::False };
                    bytecode[next - 1] = op as u8;
                    changed = true;
                    prev_prev = None;
                    prev = Some((next - 1, Value::Bool(verdict)));
                } else {
                    prev = None;
                    prev_prev = None;
                }
            }
            op => match pushed_constant(op, instruction.operand, pool) {
                Some(value) => {
                    prev_prev = prev.take();
                    prev = Some((instruction.offset, value));
                }
                None => {
                    prev = None;
                    prev_prev = None;
                }
            },
        }
        offset = next;
    }
    changed
}

/// Evaluates a comparison over two constants; `None` when the pair is not
/// comparable at compile time (left for the run-time error path).
fn fold_comparison(left: &Value, op: Opcode, right: &Value) -> Option<bool> {
    match op {
        Opcode::Equal => Some(left.semantic_eq(right)),
        Opcode::NotEqual => Some(!left.semantic_eq(right)),
        _ => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
            }?;
            let verdict = match op {
                Opcode::Less => ordering.is_lt(),
                Opcode::LessEqual => ordering.is_le(),
                Opcode::Greater => ordering.is_gt(),
                Opcode::GreaterEqual => ordering.is_ge(),
                _ => return None,
            };
            Some(verdict)
        }
    }
}

/// Pass 3: jumps with a constant condition, and jumps to the next
/// instruction, disappear.
fn eliminate_constant_jumps(bytecode: &mut Vec<u8>) -> bool {
    let targets = jump_targets(bytecode);
    let mut changed = false;
    let mut prev: Option<(usize, Opcode)> = None;
    let mut offset = 0;
    while offset < bytecode.len() {
        let Some((instruction, next)) = read_instruction(bytecode, offset) else {
            return changed;
        };
        match instruction.op {
            Opcode::Nop => {}
            // A targeted JumpIfFalse also branches for the jumping path;
            // its condition there is not a constant, so leave it alone.
            Opcode::JumpIfFalse if !targets.contains(&instruction.offset) => {
                match prev {
                    Some((at, Opcode::True)) => {
                        // never taken: both instructions vanish
                        blank(bytecode, at, at + 1);
                        blank(bytecode, instruction.offset, next);
                        changed = true;
                        prev = None;
                    }
                    Some((at, Opcode::False)) => {
                        // always taken: keep the target, drop the condition
                        blank(bytecode, at, at + 1);
                        bytecode[instruction.offset] = Opcode::Jump as u8;
                        changed = true;
                        prev = Some((instruction.offset, Opcode::Jump));
                    }
                    _ => prev = Some((instruction.offset, Opcode::JumpIfFalse)),
                }
            }
            Opcode::Jump => {
                if instruction.operand == Some(next as u16) {
                    blank(bytecode, instruction.offset, next);
                    changed = true;
                    prev = None;
                } else {
                    prev = Some((instruction.offset, Opcode::Jump));
                }
            }
            op => prev = Some((instruction.offset, op)),
        }
        offset = next;
    }
    changed
}

/// Pass 4: truncate after a `Return` no reachable jump crosses.
fn strip_dead_code(bytecode: &mut Vec<u8>) -> bool {
    let Some(instructions) = decode(bytecode) else {
        return false;
    };
    let jumps: Vec<(usize, usize)> = instructions
        .iter()
        .filter(|i| matches!(i.op, Opcode::Jump | Opcode::JumpIfFalse))
        .filter_map(|i| Some((i.offset, i.operand? as usize)))
        .collect();
    for instruction in &instructions {
        if instruction.op != Opcode::Return {
            continue;
        }
        let end = instruction.offset + 1;
        if end >= bytecode.len() {
            return false;
        }
        let crossed = jumps
            .iter()
            .any(|&(offset, target)| offset < instruction.offset && target > instruction.offset);
        if !crossed {
            bytecode.truncate(end);
            return true;
        }
    }
    false
}

/// Pass 5: drop every `Nop`, remapping jump targets onto the compacted
/// stream.
fn compact_nops(bytecode: &mut Vec<u8>) -> bool {
    let Some(instructions) = decode(bytecode) else {
        return false;
    };
    if !instructions.iter().any(|i| i.op == Opcode::Nop) {
        return false;
    }

    // old offset of each instruction boundary -> offset after compaction
    let mut remap: AHashMap<usize, usize> = AHashMap::new();
    let mut new_offset = 0;
    for instruction in &instructions {
        remap.insert(instruction.offset, new_offset);
        if instruction.op != Opcode::Nop {
            new_offset += instruction.op.size();
        }
    }
    remap.insert(bytecode.len(), new_offset);

    let mut compacted = Vec::with_capacity(new_offset);
    for instruction in &instructions {
        match instruction.op {
            Opcode::Nop => {}
            Opcode::Jump | Opcode::JumpIfFalse => {
                let target = instruction.operand.unwrap_or_default() as usize;
                let target = remap.get(&target).copied().unwrap_or(target);
                compacted.extend(assemble(instruction.op, Some(target as u16)));
            }
            op => compacted.extend(assemble(op, instruction.operand)),
        }
    }
    *bytecode = compacted;
    true
}
