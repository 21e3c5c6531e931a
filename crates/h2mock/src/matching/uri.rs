//! URI splitting and query-string normalisation.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query-string policy applied before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryParametersFilter {
    /// Sort `key=value` pairs by key, `&`-separated.
    #[default]
    SortAmpersand,
    /// Sort `key=value` pairs by key, `;`-separated.
    SortSemicolon,
    /// Leave the query string untouched.
    PassBy,
    /// Drop the query string.
    Ignore,
}

impl QueryParametersFilter {
    fn separator(&self) -> Option<char> {
        match self {
            QueryParametersFilter::SortAmpersand => Some('&'),
            QueryParametersFilter::SortSemicolon => Some(';'),
            QueryParametersFilter::PassBy | QueryParametersFilter::Ignore => None,
        }
    }
}

/// Split `uri` into path and (optional) query string.
pub fn split_uri(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

/// Apply `filter` to the query part of `uri`.
///
/// Sorting fails on repeated keys: the request is then treated as
/// unmatchable rather than matched against a partial view.
pub fn normalize_uri(uri: &str, filter: QueryParametersFilter) -> Result<String, QueryError> {
    let (path, query) = split_uri(uri);
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => {
            return Ok(match filter {
                QueryParametersFilter::PassBy => uri.to_string(),
                _ => path.to_string(),
            })
        }
    };

    match filter {
        QueryParametersFilter::PassBy => Ok(uri.to_string()),
        QueryParametersFilter::Ignore => Ok(path.to_string()),
        QueryParametersFilter::SortAmpersand | QueryParametersFilter::SortSemicolon => {
            let separator = filter.separator().unwrap_or('&');
            let sorted = sort_query(query, separator)?;
            Ok(format!("{path}?{sorted}"))
        }
    }
}

fn sort_query(query: &str, separator: char) -> Result<String, QueryError> {
    let mut pairs: BTreeMap<&str, Option<&str>> = BTreeMap::new();
    for item in query.split(separator).filter(|s| !s.is_empty()) {
        let (name, value) = match item.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (item, None),
        };
        if pairs.insert(name, value).is_some() {
            return Err(QueryError::DuplicateKey(name.to_string()));
        }
    }

    let joined: Vec<String> = pairs
        .into_iter()
        .map(|(name, value)| match value {
            Some(v) => format!("{name}={v}"),
            None => name.to_string(),
        })
        .collect();
    Ok(joined.join(&separator.to_string()))
}

/// Decoded query parameters of `uri` (both `&` and `;` separate pairs).
pub fn query_parameters(uri: &str) -> Vec<(String, String)> {
    let Some(query) = split_uri(uri).1 else {
        return Vec::new();
    };
    query
        .split(['&', ';'])
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect()
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
