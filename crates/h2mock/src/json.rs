//! JSON helpers: pointer reads/writes, string rendering, body parsing.

use serde_json::{Map, Value};

/// Ordered header multimap as carried by requests and responses.
pub type Headers = Vec<(String, String)>;

/// Render a value the way it is written into strings (variables, headers).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Interpret a raw message body: JSON when it parses, plain string otherwise.
/// Empty bodies yield `None`.
pub fn parse_body(raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

/// Serialise a body draft into its wire text.
pub fn render_body(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Case-insensitive header lookup (first occurrence).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Replace every occurrence of `name` with a single `name: value` entry.
pub fn set_header(headers: &mut Headers, name: &str, value: String) {
    if let Some(pos) = headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
        headers[pos].1 = value;
        let mut index = 0;
        headers.retain(|(k, _)| {
            let keep = index <= pos || !k.eq_ignore_ascii_case(name);
            index += 1;
            keep
        });
    } else {
        headers.push((name.to_string(), value));
    }
}

/// Headers as a JSON object; repeated names are joined with `", "`.
pub fn headers_to_json(headers: &[(String, String)]) -> Value {
    let mut object = Map::new();
    for (name, value) in headers {
        match object.get_mut(name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                object.insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
    Value::Object(object)
}

pub fn serialize_headers<S: serde::Serializer>(
    headers: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serde::Serialize::serialize(&headers_to_json(headers), serializer)
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Write `value` at JSON pointer `pointer`, creating intermediate objects.
///
/// `root` is untouched on error.
pub fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<(), String> {
    if pointer.is_empty() {
        *root = value;
        return Ok(());
    }
    if !pointer.starts_with('/') {
        return Err(format!("'{pointer}' is not a JSON pointer"));
    }

    let mut updated = root.clone();
    let mut current = &mut updated;
    for raw in pointer[1..].split('/') {
        let token = unescape_token(raw);
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(token).or_insert(Value::Null),
            Value::Array(items) => {
                let index: usize = token
                    .parse()
                    .map_err(|_| format!("'{token}' is not an array index"))?;
                if index == items.len() {
                    items.push(Value::Null);
                }
                items
                    .get_mut(index)
                    .ok_or_else(|| format!("array index {index} out of range"))?
            }
            _ => return Err(format!("cannot descend into scalar at '{token}'")),
        };
    }
    *current = value;
    *root = updated;
    Ok(())
}
