//! Default host functions registered into every engine.
//!
//! All builtins follow the host calling convention `(&[Value]) ->
//! Result<Value, String>` and can be shadowed by `Engine::add_function`.
//! `print`/`printf` write through the engine's [`PrintSink`] and return
//! `Void`.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::{
    environment::Environment,
    io::{PrintSink, write_to_sink},
    value::Value,
};

/// Registers the default builtins into `env`.
pub fn install(env: &mut Environment, sink: &PrintSink) {
    env.add_function("len", len);
    env.add_function("lower", lower);
    env.add_function("upper", upper);
    env.add_function("trim", trim);
    env.add_function("type", type_of);
    env.add_function("string", string);
    env.add_function("int", int);
    env.add_function("float", float);
    env.add_function("now", now);
    env.add_function("hour", |args: &[Value]| time_component(args, |t| i64::from(t.hour())));
    env.add_function("minute", |args: &[Value]| {
        time_component(args, |t| i64::from(t.minute()))
    });
    env.add_function("second", |args: &[Value]| {
        time_component(args, |t| i64::from(t.second()))
    });
    env.add_function("day", |args: &[Value]| time_component(args, |t| i64::from(t.day())));
    env.add_function("month", |args: &[Value]| time_component(args, |t| i64::from(t.month())));
    env.add_function("year", |args: &[Value]| time_component(args, |t| i64::from(t.year())));
    env.add_function("weekday", weekday);

    let print_sink = sink.clone();
    env.add_function("print", move |args: &[Value]| {
        let mut text = String::new();
        for arg in args {
            text.push_str(&arg.to_string());
        }
        write_to_sink(&print_sink, &text);
        Ok(Value::Void)
    });

    let printf_sink = sink.clone();
    env.add_function("printf", move |args: &[Value]| {
        let Some(Value::Str(format)) = args.first() else {
            return Err("printf requires a format string as its first argument".to_owned());
        };
        let text = format_verbs(format, &args[1..]);
        write_to_sink(&printf_sink, &text);
        Ok(Value::Void)
    });
}

fn len(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
        [Value::Array(items)] => Ok(Value::Int(items.len() as i64)),
        [Value::Hash(pairs)] => Ok(Value::Int(pairs.len() as i64)),
        [other] => Err(format!("len is not defined for {}", other.type_name())),
        _ => Err("len requires exactly one argument".to_owned()),
    }
}

fn lower(args: &[Value]) -> Result<Value, String> {
    string_transform("lower", args, str::to_lowercase)
}

fn upper(args: &[Value]) -> Result<Value, String> {
    string_transform("upper", args, str::to_uppercase)
}

fn trim(args: &[Value]) -> Result<Value, String> {
    string_transform("trim", args, |s| s.trim().to_owned())
}

fn string_transform(
    name: &str,
    args: &[Value],
    transform: impl Fn(&str) -> String,
) -> Result<Value, String> {
    match args {
        [Value::Str(s)] => Ok(Value::Str(transform(s))),
        [other] => Err(format!("{name} is not defined for {}", other.type_name())),
        _ => Err(format!("{name} requires exactly one argument")),
    }
}

fn type_of(args: &[Value]) -> Result<Value, String> {
    match args {
        [value] => Ok(Value::Str(value.type_name().to_owned())),
        _ => Err("type requires exactly one argument".to_owned()),
    }
}

fn string(args: &[Value]) -> Result<Value, String> {
    match args {
        [value] => Ok(Value::Str(value.to_string())),
        _ => Err("string requires exactly one argument".to_owned()),
    }
}

fn int(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [Value::Float(n)] => Ok(Value::Int(*n as i64)),
        [Value::Bool(b)] => Ok(Value::Int(i64::from(*b))),
        [Value::Str(s)] => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| format!("cannot convert {s:?} to an integer")),
        [other] => Err(format!("cannot convert {} to an integer", other.type_name())),
        _ => Err("int requires exactly one argument".to_owned()),
    }
}

fn float(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Int(n)] => Ok(Value::Float(*n as f64)),
        [Value::Float(n)] => Ok(Value::Float(*n)),
        [Value::Str(s)] => s
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| format!("cannot convert {s:?} to a float")),
        [other] => Err(format!("cannot convert {} to a float", other.type_name())),
        _ => Err("float requires exactly one argument".to_owned()),
    }
}

fn now(args: &[Value]) -> Result<Value, String> {
    if args.is_empty() {
        Ok(Value::from_datetime(Utc::now()))
    } else {
        Err("now takes no arguments".to_owned())
    }
}

/// Resolves the shared zero-or-one-argument convention of the date/time
/// accessors: no argument means "now", one Integer is Unix seconds.
fn datetime_arg(args: &[Value]) -> Result<DateTime<Utc>, String> {
    match args {
        [] => Ok(Utc::now()),
        [Value::Int(seconds)] => {
            DateTime::from_timestamp(*seconds, 0).ok_or_else(|| format!("timestamp {seconds} is out of range"))
        }
        [other] => Err(format!("expected a timestamp integer, got {}", other.type_name())),
        _ => Err("expected at most one argument".to_owned()),
    }
}

fn time_component(args: &[Value], extract: impl Fn(DateTime<Utc>) -> i64) -> Result<Value, String> {
    datetime_arg(args).map(|when| Value::Int(extract(when)))
}

fn weekday(args: &[Value]) -> Result<Value, String> {
    let when = datetime_arg(args)?;
    let name = match when.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    };
    Ok(Value::Str(name.to_owned()))
}

/// Expands the `%s %d %f %v %%` verb subset of `printf`. Verbs with no
/// matching argument are written through literally.
fn format_verbs(format: &str, args: &[Value]) -> String {
    let mut output = String::with_capacity(format.len());
    let mut next_arg = 0;
    let mut chars = format.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => output.push('%'),
            Some(verb @ ('s' | 'd' | 'f' | 'v')) => {
                let Some(arg) = args.get(next_arg) else {
                    output.push('%');
                    output.push(verb);
                    continue;
                };
                next_arg += 1;
                match verb {
                    'd' => match arg {
                        Value::Int(n) => output.push_str(&n.to_string()),
                        Value::Float(n) => output.push_str(&(*n as i64).to_string()),
                        other => output.push_str(&other.to_string()),
                    },
                    'f' => match arg.as_f64() {
                        Some(n) => output.push_str(&format!("{n:.6}")),
                        None => output.push_str(&arg.to_string()),
                    },
                    _ => output.push_str(&arg.to_string()),
                }
            }
            Some(other) => {
                output.push('%');
                output.push(other);
            }
            None => output.push('%'),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::io::CollectPrint;

    fn test_env() -> (Environment, CollectPrint) {
        let collect = CollectPrint::new();
        let sink: PrintSink = Arc::new(Mutex::new(Box::new(collect.clone())));
        let mut env = Environment::new();
        install(&mut env, &sink);
        (env, collect)
    }

    fn call(env: &Environment, name: &str, args: &[Value]) -> Result<Value, String> {
        env.function(name).expect("builtin registered")(args)
    }

    #[test]
    fn len_counts_runes_elements_and_pairs() {
        let (env, _) = test_env();
        assert_eq!(call(&env, "len", &[Value::Str("héllo".into())]), Ok(Value::Int(5)));
        assert_eq!(
            call(&env, "len", &[Value::Array(vec![Value::Int(1), Value::Int(2)])]),
            Ok(Value::Int(2))
        );
        assert!(call(&env, "len", &[Value::Int(3)]).is_err());
    }

    #[test]
    fn string_case_helpers() {
        let (env, _) = test_env();
        assert_eq!(call(&env, "lower", &[Value::Str("MOW".into())]), Ok(Value::Str("mow".into())));
        assert_eq!(call(&env, "upper", &[Value::Str("ru".into())]), Ok(Value::Str("RU".into())));
        assert_eq!(
            call(&env, "trim", &[Value::Str("  x \n".into())]),
            Ok(Value::Str("x".into()))
        );
    }

    #[test]
    fn conversions() {
        let (env, _) = test_env();
        assert_eq!(call(&env, "int", &[Value::Str(" 42 ".into())]), Ok(Value::Int(42)));
        assert_eq!(call(&env, "int", &[Value::Float(3.9)]), Ok(Value::Int(3)));
        assert_eq!(call(&env, "float", &[Value::Int(2)]), Ok(Value::Float(2.0)));
        assert_eq!(call(&env, "string", &[Value::Int(7)]), Ok(Value::Str("7".into())));
        assert_eq!(call(&env, "type", &[Value::Null]), Ok(Value::Str("null".into())));
        assert!(call(&env, "int", &[Value::Str("nope".into())]).is_err());
    }

    #[test]
    fn print_concatenates_and_returns_void() {
        let (env, collect) = test_env();
        assert_eq!(
            call(&env, "print", &[Value::Str("a=".into()), Value::Int(3), Value::Str("\n".into())]),
            Ok(Value::Void)
        );
        assert_eq!(collect.contents(), "a=3\n");
    }

    #[test]
    fn printf_verbs() {
        let (env, collect) = test_env();
        call(
            &env,
            "printf",
            &[
                Value::Str("%s scored %d (%f) 100%%\n".into()),
                Value::Str("MOW".into()),
                Value::Int(9),
                Value::Float(0.5),
            ],
        )
        .unwrap();
        assert_eq!(collect.contents(), "MOW scored 9 (0.500000) 100%\n");
    }

    #[test]
    fn date_components_accept_a_timestamp() {
        let (env, _) = test_env();
        // 2023-11-14T22:13:20Z
        let ts = Value::Int(1_700_000_000);
        assert_eq!(call(&env, "year", &[ts.clone()]), Ok(Value::Int(2023)));
        assert_eq!(call(&env, "month", &[ts.clone()]), Ok(Value::Int(11)));
        assert_eq!(call(&env, "day", &[ts.clone()]), Ok(Value::Int(14)));
        assert_eq!(call(&env, "hour", &[ts.clone()]), Ok(Value::Int(22)));
        assert_eq!(call(&env, "weekday", &[ts]), Ok(Value::Str("Tuesday".into())));
    }
}
