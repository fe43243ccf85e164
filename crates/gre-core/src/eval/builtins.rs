//! Builtin function table (§4.4). Pure and deterministic except for the two
//! clock-reading functions (`NOW`, `TODAY`).

use chrono::{Duration, NaiveDateTime, Utc};

use gre_ast::Value;

use crate::errors::EngineError;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_dt(s: &str) -> Result<NaiveDateTime, EngineError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .map_err(|e| EngineError::Eval(format!("invalid datetime '{s}': {e}")))
}

fn as_number(v: &Value) -> Result<f64, EngineError> {
    v.as_f64().ok_or_else(|| EngineError::Eval(format!("expected numeric argument, got {v}")))
}

fn as_string(v: &Value) -> Result<&str, EngineError> {
    v.as_str().ok_or_else(|| EngineError::Eval(format!("expected string argument, got {v}")))
}

pub fn call(name: &str, args: &[Value]) -> Result<Value, EngineError> {
    match name {
        "NOW" => Ok(Value::String(Utc::now().naive_utc().format(DATETIME_FMT).to_string())),
        "TODAY" => Ok(Value::String(Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().format(DATETIME_FMT).to_string())),
        "DATETIME_ADD" => {
            let dt = parse_dt(as_string(arg(args, 0, name)?)?)?;
            let n = as_number(arg(args, 1, name)?)? as i64;
            let unit = as_string(arg(args, 2, name)?)?;
            let delta = duration_for(unit, n)?;
            Ok(Value::String((dt + delta).format(DATETIME_FMT).to_string()))
        }
        "DATETIME_DIFF" => {
            let a = parse_dt(as_string(arg(args, 0, name)?)?)?;
            let b = parse_dt(as_string(arg(args, 1, name)?)?)?;
            let unit = as_string(arg(args, 2, name)?)?;
            let total_seconds = (a - b).num_seconds();
            let per_unit = duration_for(unit, 1)?.num_seconds().max(1);
            Ok(Value::Int(total_seconds / per_unit))
        }
        "CONCAT" => {
            let s: String = args.iter().map(|v| v.to_string()).collect();
            Ok(Value::String(s))
        }
        "LENGTH" => match &args.first() {
            Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::List(l)) => Ok(Value::Int(l.len() as i64)),
            Some(Value::Map(m)) => Ok(Value::Int(m.len() as i64)),
            Some(Value::Null) | None => Ok(Value::Int(0)),
            Some(other) => Err(EngineError::Eval(format!("LENGTH: unsupported argument {other}"))),
        },
        "UPPER" => Ok(Value::String(as_string(arg(args, 0, name)?)?.to_uppercase())),
        "LOWER" => Ok(Value::String(as_string(arg(args, 0, name)?)?.to_lowercase())),
        "TRIM" => Ok(Value::String(as_string(arg(args, 0, name)?)?.trim().to_string())),
        "SUBSTRING" => {
            let s = as_string(arg(args, 0, name)?)?;
            let start = as_number(arg(args, 1, name)?)? as usize;
            let chars: Vec<char> = s.chars().collect();
            let start = start.min(chars.len());
            let end = match args.get(2) {
                Some(v) => (start + as_number(v)? as usize).min(chars.len()),
                None => chars.len(),
            };
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "ABS" => Ok(Value::Float(as_number(arg(args, 0, name)?)?.abs())),
        "ROUND" => {
            let x = as_number(arg(args, 0, name)?)?;
            let digits = match args.get(1) {
                Some(v) => as_number(v)? as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Float((x * factor).round() / factor))
        }
        "MIN" => reduce_numeric(args, name, f64::min),
        "MAX" => reduce_numeric(args, name, f64::max),
        "COALESCE" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        other => Err(EngineError::Eval(format!("Unknown function: {other}"))),
    }
}

fn arg<'a>(args: &'a [Value], idx: usize, fname: &str) -> Result<&'a Value, EngineError> {
    args.get(idx).ok_or_else(|| EngineError::Eval(format!("{fname}: missing argument {idx}")))
}

fn duration_for(unit: &str, n: i64) -> Result<Duration, EngineError> {
    match unit {
        "days" => Ok(Duration::days(n)),
        "hours" => Ok(Duration::hours(n)),
        "minutes" => Ok(Duration::minutes(n)),
        "seconds" => Ok(Duration::seconds(n)),
        other => Err(EngineError::Eval(format!("unknown DATETIME unit: {other}"))),
    }
}

fn reduce_numeric(args: &[Value], name: &str, f: fn(f64, f64) -> f64) -> Result<Value, EngineError> {
    if args.is_empty() {
        return Err(EngineError::Eval(format!("{name}: requires at least one argument")));
    }
    let mut acc = as_number(&args[0])?;
    for v in &args[1..] {
        acc = f(acc, as_number(v)?);
    }
    Ok(Value::Float(acc))
}
