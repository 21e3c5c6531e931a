//! Transformation targets: where a step writes its value.

use super::filter::Filtered;
use super::{Draft, TransformContext, TransformMode, VirtualState};
use crate::error::{LoadError, TransformError};
use crate::json::{set_header, set_pointer, value_to_string};
use crate::persistence::WriteMode;
use serde_json::{Number, Value};

/// Typing applied to a value written into a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Written as resolved.
    Json,
    /// Must be (or parse into) an object or array.
    Object,
    /// A string holding JSON text, parsed before writing.
    JsonString,
    String,
    Integer,
    Unsigned,
    Float,
    Boolean,
}

impl BodyKind {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "object" => BodyKind::Object,
            "jsonstring" => BodyKind::JsonString,
            "string" => BodyKind::String,
            "integer" => BodyKind::Integer,
            "unsigned" => BodyKind::Unsigned,
            "float" => BodyKind::Float,
            "boolean" => BodyKind::Boolean,
            _ => return None,
        })
    }

    fn convert(&self, value: Value) -> Result<Value, TransformError> {
        let fail = |what: &str, value: &Value| {
            TransformError::Target(format!("'{}' is not {what}", value_to_string(value)))
        };
        match self {
            BodyKind::Json => Ok(value),
            BodyKind::Object => match value {
                Value::Object(_) | Value::Array(_) => Ok(value),
                Value::String(ref s) => match serde_json::from_str::<Value>(s) {
                    Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Ok(parsed),
                    _ => Err(fail("an object", &value)),
                },
                _ => Err(fail("an object", &value)),
            },
            BodyKind::JsonString => serde_json::from_str(&value_to_string(&value))
                .map_err(|_| fail("JSON text", &value)),
            BodyKind::String => Ok(Value::String(value_to_string(&value))),
            BodyKind::Integer => match &value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .filter(|f| {
                                f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64
                            })
                            .map(|f| f.trunc() as i64)
                    })
                    .map(Value::from)
                    .ok_or_else(|| fail("an integer", &value)),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                _ => value_to_string(&value)
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| fail("an integer", &value)),
            },
            BodyKind::Unsigned => match &value {
                Value::Number(n) => n
                    .as_u64()
                    .map(Value::from)
                    .ok_or_else(|| fail("an unsigned integer", &value)),
                Value::Bool(b) => Ok(Value::from(u64::from(*b))),
                _ => value_to_string(&value)
                    .trim()
                    .parse::<u64>()
                    .map(Value::from)
                    .map_err(|_| fail("an unsigned integer", &value)),
            },
            BodyKind::Float => {
                let parsed = match &value {
                    Value::Number(n) => n.as_f64(),
                    _ => value_to_string(&value).trim().parse::<f64>().ok(),
                };
                parsed
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| fail("a float", &value))
            }
            BodyKind::Boolean => Ok(Value::Bool(match &value {
                Value::Bool(b) => *b,
                Value::Null => false,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                Value::String(s) => !matches!(s.trim(), "" | "false" | "0"),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
            })),
        }
    }
}

/// Parsed `target` string.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Var(String),
    /// `pointer` is empty for the whole body.
    Body { kind: BodyKind, pointer: String },
    Header(String),
    StatusCode,
    DelayMs,
    Uri,
    TimeoutMs,
    /// Plain `outState`, or a virtual transition for `method` (and `uri`).
    OutState {
        method: Option<String>,
        uri: Option<String>,
    },
    TextFile(String),
    BinaryFile(String),
    UdpSocket(String),
}

impl Target {
    pub fn parse(text: &str, mode: TransformMode) -> Result<Self, LoadError> {
        let unknown = || LoadError::content(format!("unknown transformation target '{text}'"));

        if let Some(name) = text.strip_prefix("var.") {
            return named(name, text).map(|n| Target::Var(n.to_string()));
        }
        if text == "outState" {
            return Ok(Target::OutState {
                method: None,
                uri: None,
            });
        }
        if let Some(scope) = text.strip_prefix("outState.") {
            let (method, uri) = match scope.split_once('.') {
                Some((method, uri)) => (method, Some(uri.to_string())),
                None => (scope, None),
            };
            let method = named(method, text)?;
            return Ok(Target::OutState {
                method: Some(method.to_string()),
                uri: uri.filter(|u| !u.is_empty()),
            });
        }
        if let Some(path) = text.strip_prefix("txtFile.") {
            return named(path, text).map(|p| Target::TextFile(p.to_string()));
        }
        if let Some(path) = text.strip_prefix("binFile.") {
            return named(path, text).map(|p| Target::BinaryFile(p.to_string()));
        }
        if let Some(address) = text.strip_prefix("udpSocket.") {
            return named(address, text).map(|a| Target::UdpSocket(a.to_string()));
        }

        let message = match mode {
            TransformMode::Server => "response.",
            TransformMode::Client => "request.",
        };
        let rest = text.strip_prefix(message).ok_or_else(unknown)?;
        if let Some(name) = rest.strip_prefix("header.") {
            return named(name, text).map(|n| Target::Header(n.to_string()));
        }
        if let Some(body) = rest.strip_prefix("body") {
            return parse_body(body, text);
        }
        match (rest, mode) {
            ("delayMs", _) => Ok(Target::DelayMs),
            ("statusCode", TransformMode::Server) => Ok(Target::StatusCode),
            ("uri", TransformMode::Client) => Ok(Target::Uri),
            ("timeoutMs", TransformMode::Client) => Ok(Target::TimeoutMs),
            _ => Err(unknown()),
        }
    }

    /// Write `filtered` into the draft (or variables/persistence).
    ///
    /// On error the draft is left as it was.
    pub(super) fn write(
        &self,
        filtered: Filtered,
        ctx: &TransformContext<'_>,
        draft: &mut Draft,
    ) -> Result<(), TransformError> {
        let Filtered { value, captures } = filtered;
        match self {
            Target::Var(name) => {
                let vars = ctx.shared.vars();
                vars.set(name.clone(), value_to_string(&value));
                for (i, capture) in captures.into_iter().enumerate() {
                    vars.set(format!("{name}.{}", i + 1), capture);
                }
                Ok(())
            }
            Target::Body { kind, pointer } => {
                let converted = kind.convert(value)?;
                set_pointer(&mut draft.body, pointer, converted).map_err(TransformError::Target)
            }
            Target::Header(name) => {
                set_header(&mut draft.headers, name, value_to_string(&value));
                Ok(())
            }
            Target::StatusCode => {
                let code = integer::<u16>(&value)
                    .filter(|c| (100..=599).contains(c))
                    .ok_or_else(|| TransformError::Target(format!("invalid status code '{value}'")))?;
                draft.status_code = code;
                Ok(())
            }
            Target::DelayMs => {
                draft.delay_ms = integer::<u64>(&value)
                    .ok_or_else(|| TransformError::Target(format!("invalid delay '{value}'")))?;
                Ok(())
            }
            Target::TimeoutMs => {
                draft.timeout_ms = integer::<u64>(&value)
                    .ok_or_else(|| TransformError::Target(format!("invalid timeout '{value}'")))?;
                Ok(())
            }
            Target::Uri => {
                let uri = value_to_string(&value);
                if uri.is_empty() {
                    return Err(TransformError::Target("empty uri".into()));
                }
                draft.uri = uri;
                Ok(())
            }
            Target::OutState { method: None, .. } => {
                let state = state_of(&value)?;
                draft.out_state = state;
                Ok(())
            }
            Target::OutState {
                method: Some(method),
                uri,
            } => {
                let state = state_of(&value)?;
                draft.virtual_states.push(VirtualState {
                    method: method.clone(),
                    uri: uri.clone(),
                    state,
                });
                Ok(())
            }
            Target::TextFile(path) => persist_file(ctx, path, &value, WriteMode::Text),
            Target::BinaryFile(path) => persist_file(ctx, path, &value, WriteMode::Binary),
            Target::UdpSocket(address) => {
                let persistence = ctx
                    .shared
                    .persistence()
                    .ok_or_else(|| TransformError::Target("no socket writer configured".into()))?;
                if persistence.write_socket(address, value_to_string(&value).as_bytes()) {
                    Ok(())
                } else {
                    Err(TransformError::Target(format!("socket write to '{address}' failed")))
                }
            }
        }
    }
}

fn named<'a>(value: &'a str, text: &str) -> Result<&'a str, LoadError> {
    if value.is_empty() {
        Err(LoadError::content(format!("target '{text}' needs a name")))
    } else {
        Ok(value)
    }
}

fn parse_body(rest: &str, text: &str) -> Result<Target, LoadError> {
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    let (kind, pointer) = if rest.is_empty() || rest.starts_with('/') {
        (BodyKind::Json, rest)
    } else {
        let (tag, pointer) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        let tag = tag.strip_suffix('.').unwrap_or(tag);
        let kind = BodyKind::from_tag(tag).ok_or_else(|| {
            LoadError::content(format!("target '{text}': unknown body type '{tag}'"))
        })?;
        (kind, pointer)
    };
    Ok(Target::Body {
        kind,
        pointer: pointer.to_string(),
    })
}

fn integer<T: std::str::FromStr>(value: &Value) -> Option<T> {
    value_to_string(value).trim().parse().ok()
}

fn state_of(value: &Value) -> Result<String, TransformError> {
    let state = value_to_string(value);
    if state.is_empty() {
        Err(TransformError::Target("empty state".into()))
    } else {
        Ok(state)
    }
}

fn persist_file(
    ctx: &TransformContext<'_>,
    path: &str,
    value: &Value,
    mode: WriteMode,
) -> Result<(), TransformError> {
    let persistence = ctx
        .shared
        .persistence()
        .ok_or_else(|| TransformError::Target("no file writer configured".into()))?;
    let payload = value_to_string(value);
    let close_delay_us = ctx.shared.settings().file_close_delay_us;
    if persistence.write_file(path, payload.as_bytes(), mode, close_delay_us) {
        Ok(())
    } else {
        Err(TransformError::Target(format!("file write to '{path}' failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(text: &str) -> Result<Target, LoadError> {
        Target::parse(text, TransformMode::Server)
    }

    fn client(text: &str) -> Result<Target, LoadError> {
        Target::parse(text, TransformMode::Client)
    }

    fn body(kind: BodyKind, pointer: &str) -> Target {
        Target::Body {
            kind,
            pointer: pointer.to_string(),
        }
    }

    #[test]
    fn test_parse_body_targets() {
        assert_eq!(server("response.body").unwrap(), body(BodyKind::Json, ""));
        assert_eq!(server("response.body./a").unwrap(), body(BodyKind::Json, "/a"));
        assert_eq!(server("response.body.string").unwrap(), body(BodyKind::String, ""));
        assert_eq!(
            server("response.body.integer./count").unwrap(),
            body(BodyKind::Integer, "/count")
        );
        assert_eq!(
            server("response.body.boolean/ok").unwrap(),
            body(BodyKind::Boolean, "/ok")
        );
        assert!(server("response.body.decimal").is_err());
    }

    #[test]
    fn test_parse_envelope_targets() {
        assert_eq!(server("response.statusCode").unwrap(), Target::StatusCode);
        assert_eq!(server("response.delayMs").unwrap(), Target::DelayMs);
        assert_eq!(
            server("response.header.x-a").unwrap(),
            Target::Header("x-a".into())
        );
        assert!(server("response.uri").is_err());
        assert!(server("request.body").is_err());
        assert_eq!(client("request.uri").unwrap(), Target::Uri);
        assert_eq!(client("request.timeoutMs").unwrap(), Target::TimeoutMs);
        assert_eq!(client("request.body./x").unwrap(), body(BodyKind::Json, "/x"));
        assert!(client("request.statusCode").is_err());
        assert!(client("response.body").is_err());
    }

    #[test]
    fn test_parse_state_and_persistence_targets() {
        assert_eq!(
            server("outState").unwrap(),
            Target::OutState {
                method: None,
                uri: None
            }
        );
        assert_eq!(
            server("outState.DELETE").unwrap(),
            Target::OutState {
                method: Some("DELETE".into()),
                uri: None
            }
        );
        assert_eq!(
            server("outState.GET./items/1.json").unwrap(),
            Target::OutState {
                method: Some("GET".into()),
                uri: Some("/items/1.json".into())
            }
        );
        assert_eq!(
            server("txtFile./tmp/out.txt").unwrap(),
            Target::TextFile("/tmp/out.txt".into())
        );
        assert_eq!(
            server("binFile./tmp/out.bin").unwrap(),
            Target::BinaryFile("/tmp/out.bin".into())
        );
        assert_eq!(
            server("udpSocket.127.0.0.1:9000").unwrap(),
            Target::UdpSocket("127.0.0.1:9000".into())
        );
        assert!(server("outState.").is_err());
        assert!(server("var.").is_err());
        assert!(server("nowhere").is_err());
    }

    #[test]
    fn test_body_kind_conversions() {
        assert_eq!(BodyKind::Integer.convert(json!("42")).unwrap(), json!(42));
        assert_eq!(BodyKind::Integer.convert(json!(4.9)).unwrap(), json!(4));
        assert!(BodyKind::Integer.convert(json!("x")).is_err());
        assert!(BodyKind::Integer.convert(json!(1e300)).is_err());
        assert!(BodyKind::Integer.convert(json!(-1e19)).is_err());
        assert!(BodyKind::Integer.convert(json!(u64::MAX)).is_err());
        assert_eq!(BodyKind::Integer.convert(json!(-2.5)).unwrap(), json!(-2));
        assert_eq!(BodyKind::Unsigned.convert(json!("7")).unwrap(), json!(7));
        assert!(BodyKind::Unsigned.convert(json!(-1)).is_err());
        assert_eq!(BodyKind::Float.convert(json!("1.5")).unwrap(), json!(1.5));
        assert_eq!(BodyKind::Boolean.convert(json!("false")).unwrap(), json!(false));
        assert_eq!(BodyKind::Boolean.convert(json!("yes")).unwrap(), json!(true));
        assert_eq!(BodyKind::Boolean.convert(json!(0)).unwrap(), json!(false));
        assert_eq!(BodyKind::String.convert(json!(12)).unwrap(), json!("12"));
        assert_eq!(
            BodyKind::JsonString.convert(json!(r#"{"a":1}"#)).unwrap(),
            json!({"a": 1})
        );
        assert!(BodyKind::JsonString.convert(json!("{")).is_err());
        assert_eq!(
            BodyKind::Object.convert(json!(r#"[1,2]"#)).unwrap(),
            json!([1, 2])
        );
        assert!(BodyKind::Object.convert(json!("plain")).is_err());
        assert_eq!(BodyKind::Json.convert(json!({"k": true})).unwrap(), json!({"k": true}));
    }
}
