//! End-to-end scenarios: scripts compiled with `prepare` and run against a
//! booking-style record, exercising the full lexer → parser → emitter →
//! optimizer → VM path.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use sift::{CancelToken, CollectPrint, Engine, PrepareFlags, RuntimeError, Value};

/// The record shared by most scenarios:
/// `{Country:"RU", Origin:"MOW", Adults:1, Value:99}`.
fn record() -> HashMap<String, Value> {
    let mut record = HashMap::new();
    record.insert("Country".to_owned(), Value::Str("RU".into()));
    record.insert("Origin".to_owned(), Value::Str("MOW".into()));
    record.insert("Adults".to_owned(), Value::Int(1));
    record.insert("Value".to_owned(), Value::Int(99));
    record
}

fn prepared(source: &str) -> Engine {
    let mut engine = Engine::new(source);
    engine.prepare(PrepareFlags::default()).expect("script prepares");
    engine
}

fn run(source: &str) -> bool {
    prepared(source).run(&record()).expect("script runs")
}

// =============================================================================
// 1. Field access and boolean logic
// =============================================================================

/// A compound condition over record fields evaluates to true.
#[test]
fn routing_rule_over_record_fields() {
    let verdict = run(
        "if ( (Origin == \"MOW\" || Country == \"RU\") && (Value >= 100 || Adults == 1) ) \
         { return true; } else { return false; }",
    );
    assert!(verdict);
}

/// Fields missing from the record read as null, which is falsy.
#[test]
fn missing_fields_read_as_null() {
    assert!(run("if (Missing) { return false; } return Missing == null_too;"));
    assert!(!run("return Missing;"));
}

/// The `$`-prefixed legacy spelling resolves to the same field.
#[test]
fn legacy_dollar_names_resolve_to_fields() {
    assert!(run("return $Origin == \"MOW\";"));
}

// =============================================================================
// 2. Constant folding and short circuits
// =============================================================================

/// A constant-true condition returns before `print` is ever invoked.
#[test]
fn constant_condition_short_circuits_the_program() {
    let collect = CollectPrint::new();
    let mut engine = prepared("if ( 1 == 0.5 * 2 ) { return true; } print(\"x\\n\"); return false;");
    engine.set_print_writer(collect.clone());
    assert_eq!(engine.run(&()), Ok(true));
    assert_eq!(collect.contents(), "", "print must never run");
}

/// Short-circuit `&&` skips the right operand entirely.
#[test]
fn and_short_circuits_without_calling_the_right_side() {
    let mut engine = prepared("return false && boom();");
    engine.add_function("boom", |_: &[Value]| Err("must not be called".to_owned()));
    assert_eq!(engine.run(&()), Ok(false));
}

/// Short-circuit `||` skips the right operand when the left is truthy.
#[test]
fn or_short_circuits_without_calling_the_right_side() {
    let mut engine = prepared("return true || boom();");
    engine.add_function("boom", |_: &[Value]| Err("must not be called".to_owned()));
    assert_eq!(engine.run(&()), Ok(true));
}

// =============================================================================
// 3. User-defined functions
// =============================================================================

/// A script function with a local reverses a record field.
#[test]
fn script_function_with_locals() {
    let verdict = run(
        "function rev(s) { local t; t = \"\"; foreach c in s { t = c + t; } return t; } \
         return rev(Origin) == \"WOM\";",
    );
    assert!(verdict);
}

/// Function locals and parameters do not survive the call.
#[test]
fn function_scope_does_not_leak() {
    let mut engine = prepared(
        "function f(p) { local t; t = 1; return p + t; } \
         ignore = f(1); return t == null && p == null;",
    );
    assert_eq!(engine.run(&()), Ok(true));
}

/// Functions see and mutate global variables unless shadowed.
#[test]
fn functions_fall_through_to_globals() {
    let verdict = run("g = 1; function bump() { g = g + 1; return g; } ignore = bump(); return g == 2;");
    assert!(verdict);
}

// =============================================================================
// 4. Iteration
// =============================================================================

/// Summing an inclusive range.
#[test]
fn foreach_over_a_range() {
    assert!(run("a = 0; foreach i in 1..10 { a = a + i; } return a == 55;"));
}

/// Two-variable form binds the index too.
#[test]
fn foreach_with_index() {
    assert!(run(
        "total = 0; foreach i, v in [10, 20, 30] { total = total + i * v; } return total == 80;"
    ));
}

/// Hash iteration visits keys in sorted order.
#[test]
fn foreach_over_a_hash_is_sorted() {
    let value = prepared(
        "order = \"\"; foreach k, v in {\"b\": 2, \"a\": 1, \"c\": 3} { order = order + k; } return order;",
    )
    .execute(&())
    .expect("runs");
    assert_eq!(value, Value::Str("abc".into()));
}

/// Iterating an empty iterable binds nothing and runs no body.
#[test]
fn empty_iterables_terminate_immediately() {
    assert!(run("hits = 0; foreach c in \"\" { hits++; } return hits == 0 && c == null;"));
}

/// Inner loop variables with the same names do not leak into the outer
/// loop's body.
#[test]
fn nested_foreach_does_not_leak_loop_variables() {
    let value = prepared(
        "trace = \"\"; \
         foreach i, v in \"ab\" { \
             foreach i, v in \"12\" { trace = trace + v; } \
             trace = trace + v; \
         } \
         return trace;",
    )
    .execute(&())
    .expect("runs");
    assert_eq!(value, Value::Str("12a12b".into()));
}

// =============================================================================
// 5. Switch and regular expressions
// =============================================================================

/// A regexp case arm matches the record field.
#[test]
fn switch_with_a_regexp_case() {
    assert!(run("switch (Origin) { case /^M/ { return true; } default { return false; } }"));
}

/// Multi-value case arms match any of their values.
#[test]
fn switch_with_multiple_case_values() {
    assert!(run(
        "switch (Adults) { case 2, 1 { return true; } default { return false; } }"
    ));
    assert!(!run(
        "switch (Adults) { case 2, 3 { return true; } default { return false; } }"
    ));
}

/// `~=` matches per line with trimming; flags fold into the pattern.
#[test]
fn match_operators() {
    assert!(run("return Origin ~= /^mow$/i;"));
    assert!(run("return Origin !~ /LED/;"));
    assert!(run("return \"  padded  \" ~= /^padded$/;"));
}

// =============================================================================
// 6. Cancellation
// =============================================================================

/// An infinite loop is stopped by the cancellation deadline.
#[test]
fn infinite_loop_times_out() {
    let mut engine = prepared("while (true) { }");
    engine.set_context(CancelToken::with_timeout(Duration::from_millis(350)));
    let start = Instant::now();
    let result = engine.run(&());
    let elapsed = start.elapsed();
    assert_eq!(result, Err(RuntimeError::Timeout));
    assert!(elapsed >= Duration::from_millis(350));
    assert!(elapsed < Duration::from_secs(3), "cancellation took {elapsed:?}");
}

/// An explicitly cancelled token stops execution too.
#[test]
fn explicit_cancellation_stops_execution() {
    let mut engine = prepared("while (true) { }");
    let token = CancelToken::new();
    engine.set_context(token.clone());
    token.cancel();
    assert_eq!(engine.run(&()), Err(RuntimeError::Timeout));
}

// =============================================================================
// 7. General language behaviour
// =============================================================================

/// `run` and `execute` agree through the truthiness rule.
#[test]
fn run_matches_execute_truthiness() {
    for source in [
        "return 0;",
        "return 1;",
        "return \"\";",
        "return \"x\";",
        "return [];",
        "return {};",
        "return 99 - 99;",
    ] {
        let mut engine = prepared(source);
        let value = engine.execute(&record()).expect("execute");
        let mut engine = prepared(source);
        let verdict = engine.run(&record()).expect("run");
        assert_eq!(value.is_truthy(), verdict, "diverged for {source}");
    }
}

/// Preparing once and running repeatedly is deterministic.
#[test]
fn repeated_runs_are_deterministic() {
    let mut engine = prepared("return Value * Adults + len(Origin);");
    let first = engine.execute(&record()).expect("first run");
    for _ in 0..5 {
        assert_eq!(engine.execute(&record()).expect("re-run"), first);
    }
}

/// Arithmetic coercion: int op float yields float, `**` on integers
/// truncates back to an integer, `√` yields a float.
#[test]
fn arithmetic_coercion() {
    assert!(run("return 1 + 0.5 == 1.5;"));
    assert!(run("return 2 ** 10 == 1024;"));
    assert!(run("return √9 == 3.0;"));
    assert!(run("return 7 % 3 == 1;"));
    assert!(run("return -Value == 0 - 99;"));
}

/// Strings compare lexicographically and concatenate with `+`.
#[test]
fn string_semantics() {
    assert!(run("return \"abc\" < \"abd\";"));
    assert!(run("return Country + Origin == \"RUMOW\";"));
}

/// Ternaries, compound assignment and postfix operators compose.
#[test]
fn expression_operators() {
    assert!(run("x = Adults == 1 ? 10 : 20; return x == 10;"));
    assert!(run("x = 1; x += 4; x *= 2; x -= 2; x /= 4; return x == 2;"));
    assert!(run("n = 0; n++; n++; n--; return n == 1;"));
}

/// Indexing: arrays by position, hashes by key, strings by rune, member
/// syntax as string key; out-of-range reads are null.
#[test]
fn index_semantics() {
    assert!(run("return [1, 2, 3][1] == 2;"));
    assert!(run("return {\"a\": 7}[\"a\"] == 7;"));
    assert!(run("h = {\"a\": 7}; return h.a == 7;"));
    assert!(run("return \"MOW\"[0] == \"M\";"));
    assert!(run("return [1][9] == null;"));
}

/// Builtins are available by default and can be shadowed by the host.
#[test]
fn builtins_and_shadowing() {
    assert!(run("return len(Origin) == 3 && lower(Country) == \"ru\";"));
    assert!(run("return type(Value) == \"integer\" && int(\"42\") == 42;"));

    let mut engine = prepared("return len(\"anything\");");
    engine.add_function("len", |_: &[Value]| Ok(Value::Int(-1)));
    assert_eq!(engine.execute(&()), Ok(Value::Int(-1)));
}

/// A `while` loop drives its condition like any expression.
#[test]
fn while_loop_counts() {
    assert!(run("n = 0; while (n < 5) { n++; } return n == 5;"));
}

/// The degenerate `for (cond)` loop behaves like `while`.
#[test]
fn for_loop_is_condition_only() {
    assert!(run("n = 0; for (n < 3) { n++; } return n == 3;"));
}
