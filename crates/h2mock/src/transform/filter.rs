//! Filters applied to a resolved source value before it reaches the target.

use crate::error::{LoadError, TransformError};
use crate::json::value_to_string;
use crate::vars::GlobalVariables;
use regex::Regex;
use serde_json::{Number, Value};

/// One parsed `filter` object.
#[derive(Debug, Clone)]
pub enum Filter {
    /// First capture group (or the whole match); every group is kept as well.
    RegexCapture(Regex),
    RegexReplace { regex: Regex, fmt: String },
    Append(String),
    Prepend(String),
    AppendVar(String),
    PrependVar(String),
    Sum(Number),
    Multiply(Number),
    /// Pass the value through only when the variable is truthy (`!name` inverts).
    ConditionVar { name: String, negated: bool },
}

/// Filter result: the value to write, plus capture groups when there were any.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub value: Value,
    pub captures: Vec<String>,
}

impl Filtered {
    fn plain(value: Value) -> Self {
        Self {
            value,
            captures: Vec::new(),
        }
    }
}

impl Filter {
    /// Parse a single-key filter object such as `{"Append": "x"}`.
    pub fn parse(document: &Value) -> Result<Self, LoadError> {
        let object = document
            .as_object()
            .ok_or_else(|| LoadError::BadSchema("filter must be an object".into()))?;
        let mut entries = object.iter();
        let (name, argument) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(LoadError::BadSchema(
                    "filter must have exactly one key".into(),
                ))
            }
        };

        let text = || {
            argument
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| LoadError::BadSchema(format!("filter '{name}' expects a string")))
        };
        let number = || match argument {
            Value::Number(n) => Ok(n.clone()),
            _ => Err(LoadError::BadSchema(format!(
                "filter '{name}' expects a number"
            ))),
        };

        match name.as_str() {
            "RegexCapture" => Ok(Filter::RegexCapture(compile(&text()?)?)),
            "RegexReplace" => {
                let rgx = argument.get("rgx").and_then(Value::as_str);
                let fmt = argument.get("fmt").and_then(Value::as_str);
                match (rgx, fmt) {
                    (Some(rgx), Some(fmt)) => Ok(Filter::RegexReplace {
                        regex: compile(rgx)?,
                        fmt: fmt.to_string(),
                    }),
                    _ => Err(LoadError::BadSchema(
                        "filter 'RegexReplace' expects {\"rgx\", \"fmt\"}".into(),
                    )),
                }
            }
            "Append" => Ok(Filter::Append(text()?)),
            "Prepend" => Ok(Filter::Prepend(text()?)),
            "AppendVar" => Ok(Filter::AppendVar(text()?)),
            "PrependVar" => Ok(Filter::PrependVar(text()?)),
            "Sum" => Ok(Filter::Sum(number()?)),
            "Multiply" => Ok(Filter::Multiply(number()?)),
            "ConditionVar" => {
                let raw = text()?;
                let (name, negated) = match raw.strip_prefix('!') {
                    Some(rest) => (rest.to_string(), true),
                    None => (raw, false),
                };
                if name.is_empty() {
                    return Err(LoadError::content("ConditionVar needs a variable name"));
                }
                Ok(Filter::ConditionVar { name, negated })
            }
            other => Err(LoadError::BadSchema(format!("unknown filter '{other}'"))),
        }
    }

    /// `Ok(None)` means the step is gated off and nothing is written.
    pub fn apply(
        &self,
        value: Value,
        vars: &GlobalVariables,
    ) -> Result<Option<Filtered>, TransformError> {
        let filtered = match self {
            Filter::RegexCapture(regex) => {
                let input = value_to_string(&value);
                let caps = regex.captures(&input).ok_or_else(|| {
                    TransformError::Filter(format!("'{}' does not match '{input}'", regex.as_str()))
                })?;
                let captures: Vec<String> = caps
                    .iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                // Whole match only for a pattern without groups.
                let first = if regex.captures_len() == 1 {
                    caps.get(0)
                } else {
                    caps.get(1)
                }
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
                Filtered {
                    value: Value::String(first),
                    captures,
                }
            }
            Filter::RegexReplace { regex, fmt } => {
                let input = value_to_string(&value);
                Filtered::plain(Value::String(
                    regex.replace_all(&input, fmt.as_str()).into_owned(),
                ))
            }
            Filter::Append(suffix) => {
                Filtered::plain(Value::String(value_to_string(&value) + suffix))
            }
            Filter::Prepend(prefix) => {
                Filtered::plain(Value::String(format!("{prefix}{}", value_to_string(&value))))
            }
            Filter::AppendVar(name) => {
                let suffix = lookup(vars, name)?;
                Filtered::plain(Value::String(value_to_string(&value) + &suffix))
            }
            Filter::PrependVar(name) => {
                let prefix = lookup(vars, name)?;
                Filtered::plain(Value::String(prefix + &value_to_string(&value)))
            }
            Filter::Sum(operand) => Filtered::plain(arithmetic(&value, operand, Op::Sum)?),
            Filter::Multiply(operand) => {
                Filtered::plain(arithmetic(&value, operand, Op::Multiply)?)
            }
            Filter::ConditionVar { name, negated } => {
                if vars.is_truthy(name) == *negated {
                    return Ok(None);
                }
                Filtered::plain(value)
            }
        };
        Ok(Some(filtered))
    }
}

fn compile(pattern: &str) -> Result<Regex, LoadError> {
    Regex::new(pattern).map_err(|e| LoadError::content(format!("invalid regex '{pattern}': {e}")))
}

fn lookup(vars: &GlobalVariables, name: &str) -> Result<String, TransformError> {
    vars.get(name)
        .ok_or_else(|| TransformError::Filter(format!("variable '{name}' is not defined")))
}

#[derive(Clone, Copy)]
enum Op {
    Sum,
    Multiply,
}

enum Numeric {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Numeric::Int)
            .or_else(|| n.as_f64().map(Numeric::Float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Numeric::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Numeric::Float))
        }
        _ => None,
    }
}

fn arithmetic(value: &Value, operand: &Number, op: Op) -> Result<Value, TransformError> {
    let lhs = numeric(value)
        .ok_or_else(|| TransformError::Filter(format!("'{}' is not numeric", value_to_string(value))))?;
    let rhs = numeric(&Value::Number(operand.clone()))
        .ok_or_else(|| TransformError::Filter(format!("'{operand}' is not numeric")))?;

    if let (Numeric::Int(a), Numeric::Int(b)) = (&lhs, &rhs) {
        let result = match op {
            Op::Sum => a.checked_add(*b),
            Op::Multiply => a.checked_mul(*b),
        };
        if let Some(result) = result {
            return Ok(Value::from(result));
        }
    }

    let as_float = |n: &Numeric| match n {
        Numeric::Int(i) => *i as f64,
        Numeric::Float(f) => *f,
    };
    let (a, b) = (as_float(&lhs), as_float(&rhs));
    let result = match op {
        Op::Sum => a + b,
        Op::Multiply => a * b,
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| TransformError::Filter(format!("{result} is not a finite number")))
}
