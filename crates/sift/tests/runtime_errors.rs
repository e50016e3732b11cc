//! The run-time error taxonomy, driven end to end through scripts, plus the
//! compile-time errors `prepare` reports.

use std::collections::HashMap;

use sift::{Engine, PrepareFlags, RuntimeError, Value};

fn record() -> HashMap<String, Value> {
    let mut record = HashMap::new();
    record.insert("Value".to_owned(), Value::Int(99));
    record
}

fn run_error(source: &str) -> RuntimeError {
    let mut engine = Engine::new(source);
    engine.prepare(PrepareFlags::default()).expect("prepares");
    engine.run(&record()).expect_err("expected a runtime error")
}

// =============================================================================
// Run-time errors
// =============================================================================

/// Division and modulo by a runtime zero share one error kind.
#[test]
fn division_by_zero_at_run_time() {
    let error = run_error("return Value / (Value - 99);");
    assert_eq!(error, RuntimeError::DivisionByZero);
    assert_eq!(error.kind(), "DivisionByZero");

    let error = run_error("return Value % (Value - 99);");
    assert_eq!(error, RuntimeError::DivisionByZero);
}

/// Fold-time and run-time division by zero report the same message text.
#[test]
fn fold_time_division_by_zero_matches_run_time_text() {
    let mut engine = Engine::new("return 1 / 0;");
    let prepare_error = engine.prepare(PrepareFlags::default()).expect_err("folding fails");
    assert!(
        prepare_error.to_string().contains(&RuntimeError::DivisionByZero.to_string()),
        "{prepare_error}"
    );
}

#[test]
fn mismatched_comparison_is_a_type_error() {
    let error = run_error("return Value < \"a\";");
    assert_eq!(error.kind(), "TypeError");

    let error = run_error("return [1] + 1;");
    assert_eq!(error.kind(), "TypeError");
}

#[test]
fn unary_operators_require_numbers() {
    assert_eq!(run_error("return -\"x\";").kind(), "TypeError");
    assert_eq!(run_error("return √\"x\";").kind(), "TypeError");
}

#[test]
fn unknown_functions_are_reported_by_name() {
    let error = run_error("return nope(1);");
    assert_eq!(
        error,
        RuntimeError::FunctionNotFound { name: "nope".into() }
    );
}

#[test]
fn wrong_argument_count_is_an_arity_error() {
    let error = run_error("function f(a) { return a; } return f(1, 2);");
    assert_eq!(
        error,
        RuntimeError::ArityError {
            name: "f".into(),
            expected: 1,
            received: 2
        }
    );
}

#[test]
fn foreach_requires_an_iterable() {
    let error = run_error("foreach x in 42 { } return true;");
    assert_eq!(error, RuntimeError::NonIterable { type_name: "integer" });
}

#[test]
fn increment_and_decrement_require_numbers() {
    let error = run_error("x = \"s\"; x++; return x;");
    assert_eq!(error, RuntimeError::NonIncrementable { type_name: "string" });

    // an unbound name reads as null
    let error = run_error("y--; return y;");
    assert_eq!(error, RuntimeError::NonDecrementable { type_name: "null" });
}

#[test]
fn hash_keys_must_be_hashable() {
    let error = run_error("h = {[1]: 2}; return h;");
    assert_eq!(error, RuntimeError::UnhashableKey { type_name: "array" });
}

#[test]
fn descending_ranges_are_rejected() {
    let error = run_error("return 5..1;");
    assert_eq!(error.kind(), "TypeError");
    assert!(
        error.to_string().contains("start of a range must be smaller than the end"),
        "{error}"
    );
}

#[test]
fn string_patterns_must_compile_at_run_time() {
    let error = run_error("return \"abc\" ~= \"(bad\";");
    assert_eq!(error.kind(), "TypeError");
}

#[test]
fn running_off_the_end_is_a_missing_return() {
    assert_eq!(run_error("a = 1;"), RuntimeError::MissingReturn);
}

/// A script function that never returns poisons the whole execution.
#[test]
fn functions_must_return() {
    let error = run_error("function f() { a = 1; } return f();");
    assert_eq!(error, RuntimeError::MissingReturn);
}

#[test]
fn empty_scripts_are_an_empty_program() {
    for source in ["", "// only a comment\n"] {
        let mut engine = Engine::new(source);
        engine.prepare(PrepareFlags::default()).expect("prepares");
        assert_eq!(engine.run(&record()), Err(RuntimeError::EmptyProgram), "{source:?}");
    }
}

// =============================================================================
// Compile-time errors out of prepare
// =============================================================================

#[test]
fn syntax_errors_carry_positions() {
    let mut engine = Engine::new("if (a { return 1; }");
    let error = engine.prepare(PrepareFlags::default()).expect_err("bad syntax");
    let message = error.to_string();
    assert!(message.contains("syntax error at line 1"), "{message}");
    assert!(message.contains("expected ')'"), "{message}");
}

#[test]
fn regexp_errors_are_their_own_kind() {
    let mut engine = Engine::new("return a ~= /ok/z;");
    let error = engine.prepare(PrepareFlags::default()).expect_err("bad flag");
    assert!(error.to_string().contains("unknown flag 'z'"), "{error}");
}

#[test]
fn prepare_reports_every_error_in_order() {
    let mut engine = Engine::new("a = ;\nb = ;\n");
    let error = engine.prepare(PrepareFlags::default()).expect_err("two errors");
    let error_string = error.to_string();
    let lines: Vec<&str> = error_string.lines().map(str::trim).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("line 1"), "{lines:?}");
    assert!(lines[1].contains("line 2"), "{lines:?}");
}
