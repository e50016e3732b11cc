//! Command-line wrapper around the sift engine.
//!
//! ```text
//! sift run  [--no-optimize] <script> [record.json]   execute a script
//! sift dump [--no-optimize] <script>                 print the bytecode
//! ```
//!
//! `run` exits 0 when the script's verdict is true, 1 when it is false, and
//! 2 on any error. The optional record is a JSON object whose fields become
//! the script's record fields.

use std::{collections::HashMap, env, fs, process::ExitCode};

use ahash::AHashMap;
use sift::{Engine, HashKey, PrepareFlags, Value};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut command = None;
    let mut flags = PrepareFlags::default();
    let mut paths = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "--no-optimize" => flags.no_optimize = true,
            "run" | "dump" if command.is_none() => command = Some(arg.as_str()),
            _ => paths.push(arg.as_str()),
        }
    }

    let (Some(command), Some(&script_path)) = (command, paths.first()) else {
        eprintln!("usage: sift <run|dump> [--no-optimize] <script> [record.json]");
        return ExitCode::from(2);
    };

    let source = match fs::read_to_string(script_path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("error: cannot read {script_path}: {error}");
            return ExitCode::from(2);
        }
    };

    let mut engine = Engine::new(source);
    if let Err(error) = engine.prepare(flags) {
        eprintln!("error: {script_path} failed to compile:\n{error}");
        return ExitCode::from(2);
    }

    match command {
        "dump" => {
            print!("{}", engine.dump());
            ExitCode::SUCCESS
        }
        _ => {
            let record = match paths.get(1) {
                Some(&record_path) => match load_record(record_path) {
                    Ok(record) => record,
                    Err(error) => {
                        eprintln!("error: {error}");
                        return ExitCode::from(2);
                    }
                },
                None => HashMap::new(),
            };
            match engine.execute(&record) {
                Ok(value) => {
                    let verdict = value.is_truthy();
                    println!("{value}");
                    if verdict { ExitCode::SUCCESS } else { ExitCode::from(1) }
                }
                Err(error) => {
                    eprintln!("error: {error}");
                    ExitCode::from(2)
                }
            }
        }
    }
}

/// Reads a JSON object from `path` and converts its fields to record values.
fn load_record(path: &str) -> Result<HashMap<String, Value>, String> {
    let text = fs::read_to_string(path).map_err(|error| format!("cannot read {path}: {error}"))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|error| format!("{path} is not valid JSON: {error}"))?;
    let serde_json::Value::Object(fields) = json else {
        return Err(format!("{path} must contain a JSON object"));
    };
    Ok(fields
        .into_iter()
        .map(|(name, value)| (name, convert(value)))
        .collect())
}

/// Maps JSON values onto the engine's value model. Nested objects become
/// hashes so scripts can use member access on them.
fn convert(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(convert).collect()),
        serde_json::Value::Object(fields) => {
            let mut pairs = AHashMap::new();
            for (key, value) in fields {
                pairs.insert(HashKey::Str(key), convert(value));
            }
            Value::Hash(pairs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_scalars_convert() {
        assert_eq!(convert(serde_json::json!(3)), Value::Int(3));
        assert_eq!(convert(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(convert(serde_json::json!("x")), Value::Str("x".into()));
        assert_eq!(convert(serde_json::json!(true)), Value::Bool(true));
        assert_eq!(convert(serde_json::json!(null)), Value::Null);
    }

    #[test]
    fn json_arrays_and_objects_nest() {
        let value = convert(serde_json::json!({"tags": ["a", "b"], "n": 1}));
        let Value::Hash(pairs) = value else {
            panic!("expected a hash")
        };
        assert_eq!(
            pairs.get(&HashKey::Str("tags".into())),
            Some(&Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())]))
        );
    }
}
