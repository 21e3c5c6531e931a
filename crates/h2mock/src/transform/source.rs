//! Transformation sources: where a step reads its value from.

use super::{Draft, TransformContext, TransformMode};
use crate::error::{LoadError, TransformError};
use crate::json::find_header;
use crate::key::DataKey;
use crate::matching::{query_parameters, split_uri};
use chrono::format::{Item, StrftimeItems};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::fmt::Write as _;

/// Which message a `request.*`/`response.*` source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The message that was received (server role only).
    Inbound,
    /// The message being built by this transformation list.
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

/// Parsed `source` string.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Uri(Side),
    UriPath(Side),
    UriParam(Side, String),
    /// JSON pointer into the body; empty for the whole body.
    Body(Side, String),
    Header(Side, String),
    Var(String),
    Value(String),
    /// Historical event addressed through `<prefix>.method|uri|number|path` variables.
    Event(String),
    Random { min: i64, max: i64 },
    RandomSet(Vec<String>),
    Timestamp(TimeUnit),
    Strftime(String),
    RecvSeq,
    InState,
}

impl Source {
    pub fn parse(text: &str, mode: TransformMode) -> Result<Self, LoadError> {
        if text == "inState" {
            return Ok(Source::InState);
        }
        if let Some(name) = text.strip_prefix("var.") {
            return non_empty(name, text).map(|n| Source::Var(n.to_string()));
        }
        if let Some(literal) = text.strip_prefix("value.") {
            return Ok(Source::Value(literal.to_string()));
        }
        if let Some(prefix) = text.strip_prefix("event.") {
            return non_empty(prefix, text).map(|p| Source::Event(p.to_string()));
        }
        if let Some(general) = text.strip_prefix("general.") {
            return parse_general(general, text);
        }
        if let Some(rest) = text.strip_prefix("request.") {
            let side = match mode {
                TransformMode::Server => Side::Inbound,
                TransformMode::Client => Side::Draft,
            };
            return parse_message(rest, side, true, text);
        }
        if let Some(rest) = text.strip_prefix("response.") {
            return match mode {
                TransformMode::Server => parse_message(rest, Side::Draft, false, text),
                TransformMode::Client => Err(LoadError::content(format!(
                    "source '{text}' is not available to client provisions"
                ))),
            };
        }
        Err(LoadError::content(format!("unknown transformation source '{text}'")))
    }

    pub(super) fn resolve(
        &self,
        ctx: &TransformContext<'_>,
        draft: &Draft,
    ) -> Result<Value, TransformError> {
        let unresolvable = || TransformError::Unresolvable(self.describe());
        match self {
            Source::Uri(side) => {
                let uri = uri_of(ctx, draft, *side).ok_or_else(unresolvable)?;
                Ok(Value::String(uri.to_string()))
            }
            Source::UriPath(side) => {
                let uri = uri_of(ctx, draft, *side).ok_or_else(unresolvable)?;
                Ok(Value::String(split_uri(uri).0.to_string()))
            }
            Source::UriParam(side, name) => {
                let uri = uri_of(ctx, draft, *side).ok_or_else(unresolvable)?;
                query_parameters(uri)
                    .into_iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| Value::String(v))
                    .ok_or_else(unresolvable)
            }
            Source::Body(side, pointer) => {
                let body = match side {
                    Side::Inbound => ctx.inbound.and_then(|r| r.body),
                    Side::Draft => Some(&draft.body).filter(|b| !b.is_null()),
                }
                .ok_or_else(unresolvable)?;
                body.pointer(pointer).cloned().ok_or_else(unresolvable)
            }
            Source::Header(side, name) => {
                let headers = match side {
                    Side::Inbound => ctx.inbound.map(|r| r.headers).ok_or_else(unresolvable)?,
                    Side::Draft => draft.headers.as_slice(),
                };
                find_header(headers, name)
                    .map(|v| Value::String(v.to_string()))
                    .ok_or_else(unresolvable)
            }
            Source::Var(name) => ctx
                .shared
                .vars()
                .get(name)
                .map(Value::String)
                .ok_or_else(unresolvable),
            Source::Value(literal) => Ok(Value::String(literal.clone())),
            Source::Event(prefix) => resolve_event(ctx, prefix).ok_or_else(unresolvable),
            Source::Random { min, max } => {
                Ok(Value::from(rand::thread_rng().gen_range(*min..=*max)))
            }
            Source::RandomSet(items) => items
                .choose(&mut rand::thread_rng())
                .map(|item| Value::String(item.clone()))
                .ok_or_else(unresolvable),
            Source::Timestamp(unit) => {
                let now = chrono::Utc::now();
                let value = match unit {
                    TimeUnit::Seconds => now.timestamp(),
                    TimeUnit::Milliseconds => now.timestamp_millis(),
                    TimeUnit::Microseconds => now.timestamp_micros(),
                    TimeUnit::Nanoseconds => now.timestamp_nanos_opt().ok_or_else(unresolvable)?,
                };
                Ok(Value::from(value))
            }
            Source::Strftime(format) => {
                let mut rendered = String::new();
                write!(rendered, "{}", chrono::Local::now().format(format))
                    .map_err(|_| unresolvable())?;
                Ok(Value::String(rendered))
            }
            Source::RecvSeq => Ok(Value::from(ctx.sequence)),
            Source::InState => Ok(Value::String(ctx.in_state.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

fn non_empty<'a>(value: &'a str, text: &str) -> Result<&'a str, LoadError> {
    if value.is_empty() {
        Err(LoadError::content(format!("source '{text}' needs a name")))
    } else {
        Ok(value)
    }
}

fn parse_message(rest: &str, side: Side, is_request: bool, text: &str) -> Result<Source, LoadError> {
    if let Some(name) = rest.strip_prefix("header.") {
        return non_empty(name, text).map(|n| Source::Header(side, n.to_string()));
    }
    if let Some(body) = rest.strip_prefix("body") {
        let pointer = body.strip_prefix('.').unwrap_or(body);
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(LoadError::content(format!(
                "source '{text}': body path must be a JSON pointer"
            )));
        }
        return Ok(Source::Body(side, pointer.to_string()));
    }
    let uri_available = is_request;
    match rest {
        "uri" if uri_available => Ok(Source::Uri(side)),
        "uri.path" if uri_available => Ok(Source::UriPath(side)),
        _ => match rest.strip_prefix("uri.param.") {
            Some(name) if uri_available => {
                non_empty(name, text).map(|n| Source::UriParam(side, n.to_string()))
            }
            _ => Err(LoadError::content(format!("unknown transformation source '{text}'"))),
        },
    }
}

fn parse_general(general: &str, text: &str) -> Result<Source, LoadError> {
    if general == "recvseq" {
        return Ok(Source::RecvSeq);
    }
    if let Some(range) = general.strip_prefix("random.") {
        let parsed = range
            .split_once('.')
            .and_then(|(min, max)| Some((min.parse::<i64>().ok()?, max.parse::<i64>().ok()?)));
        return match parsed {
            Some((min, max)) if min <= max => Ok(Source::Random { min, max }),
            _ => Err(LoadError::content(format!(
                "source '{text}' needs 'general.random.<min>.<max>' with min <= max"
            ))),
        };
    }
    if let Some(csv) = general.strip_prefix("randomset.") {
        let items: Vec<String> = csv.split(',').map(str::to_string).collect();
        return Ok(Source::RandomSet(items));
    }
    if let Some(unit) = general.strip_prefix("timestamp.") {
        let unit = match unit {
            "s" => TimeUnit::Seconds,
            "ms" => TimeUnit::Milliseconds,
            "us" => TimeUnit::Microseconds,
            "ns" => TimeUnit::Nanoseconds,
            _ => {
                return Err(LoadError::content(format!(
                    "source '{text}': timestamp unit must be s, ms, us or ns"
                )))
            }
        };
        return Ok(Source::Timestamp(unit));
    }
    if let Some(format) = general.strip_prefix("strftime.") {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(LoadError::content(format!(
                "source '{text}': invalid strftime format"
            )));
        }
        return Ok(Source::Strftime(format.to_string()));
    }
    Err(LoadError::content(format!("unknown transformation source '{text}'")))
}

fn uri_of<'a>(ctx: &'a TransformContext<'_>, draft: &'a Draft, side: Side) -> Option<&'a str> {
    match side {
        Side::Inbound => ctx.inbound.map(|r| r.uri),
        Side::Draft => Some(draft.uri.as_str()),
    }
}

/// `event.<prefix>`: the event is picked through global variables so that
/// earlier steps (or the test harness) can aim it.
fn resolve_event(ctx: &TransformContext<'_>, prefix: &str) -> Option<Value> {
    let vars = ctx.shared.vars();
    let method = vars.get(&format!("{prefix}.method"))?;
    let uri = vars.get(&format!("{prefix}.uri"))?;
    let number: i64 = match vars.get(&format!("{prefix}.number")) {
        Some(n) => n.trim().parse().ok()?,
        None => -1,
    };
    let (key, store) = match vars.get(&format!("{prefix}.endpoint")) {
        Some(endpoint) => (
            DataKey::client(endpoint, method, uri),
            ctx.shared.client_events(),
        ),
        None => (DataKey::new(method, uri), ctx.shared.server_events()),
    };

    let index = usize::try_from(number.unsigned_abs()).ok()?;
    let event = store.get_event(&key, index, number < 0)?.to_json();
    match vars.get(&format!("{prefix}.path")) {
        Some(path) if !path.is_empty() => event.pointer(&path).cloned(),
        _ => Some(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(text: &str) -> Result<Source, LoadError> {
        Source::parse(text, TransformMode::Server)
    }

    #[test]
    fn test_parse_request_sources() {
        assert_eq!(server("request.uri").unwrap(), Source::Uri(Side::Inbound));
        assert_eq!(server("request.uri.path").unwrap(), Source::UriPath(Side::Inbound));
        assert_eq!(
            server("request.uri.param.id").unwrap(),
            Source::UriParam(Side::Inbound, "id".to_string())
        );
        assert_eq!(server("request.body").unwrap(), Source::Body(Side::Inbound, String::new()));
        assert_eq!(
            server("request.body./a/b").unwrap(),
            Source::Body(Side::Inbound, "/a/b".to_string())
        );
        assert_eq!(
            server("request.body/a").unwrap(),
            Source::Body(Side::Inbound, "/a".to_string())
        );
        assert_eq!(
            server("request.header.x-id").unwrap(),
            Source::Header(Side::Inbound, "x-id".to_string())
        );
    }

    #[test]
    fn test_parse_response_sources() {
        assert_eq!(
            server("response.body./id").unwrap(),
            Source::Body(Side::Draft, "/id".to_string())
        );
        assert!(server("response.uri").is_err());
        assert!(Source::parse("response.body", TransformMode::Client).is_err());
        assert_eq!(
            Source::parse("request.uri", TransformMode::Client).unwrap(),
            Source::Uri(Side::Draft)
        );
    }

    #[test]
    fn test_parse_general_sources() {
        assert_eq!(server("general.recvseq").unwrap(), Source::RecvSeq);
        assert_eq!(
            server("general.random.-5.5").unwrap(),
            Source::Random { min: -5, max: 5 }
        );
        assert!(server("general.random.5.1").is_err());
        assert_eq!(
            server("general.randomset.a,b,c").unwrap(),
            Source::RandomSet(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            server("general.timestamp.ms").unwrap(),
            Source::Timestamp(TimeUnit::Milliseconds)
        );
        assert!(server("general.timestamp.h").is_err());
        assert!(server("general.strftime.%Y-%m-%d").is_ok());
        assert!(server("general.strftime.%Q").is_err());
    }

    #[test]
    fn test_parse_other_sources() {
        assert_eq!(server("inState").unwrap(), Source::InState);
        assert_eq!(server("var.x").unwrap(), Source::Var("x".into()));
        assert_eq!(server("value.").unwrap(), Source::Value(String::new()));
        assert_eq!(server("value.a.b").unwrap(), Source::Value("a.b".into()));
        assert_eq!(server("event.ev").unwrap(), Source::Event("ev".into()));
        assert!(server("var.").is_err());
        assert!(matches!(server("bogus"), Err(LoadError::BadContent(_))));
        assert!(server("request.body.x").is_err());
    }
}
