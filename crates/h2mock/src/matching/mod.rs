//! Matching configuration: which algorithm resolves a request to a rule.
//!
//! The configuration is a strategy value. Rule stores keep every view
//! (direct index and insertion order) populated regardless of the active
//! algorithm, so swapping the algorithm takes effect on the next request.

mod uri;

pub use uri::{normalize_uri, query_parameters, split_uri, QueryParametersFilter};

use crate::error::{LoadError, QueryError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Request → rule resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Exact `inState#method#uri` lookup.
    #[default]
    FullMatching,
    /// Rewrite the URI with `rgx`/`fmt`, then exact lookup.
    FullMatchingRegexReplace,
    /// First rule, in load order, whose URI regex matches.
    PriorityMatchingRegex,
}

/// `server_matching` document as received from the administrative surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingDocument {
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_path_query_parameters_filter: Option<QueryParametersFilter>,
}

#[derive(Debug, Clone)]
struct UriRewrite {
    regex: Regex,
    fmt: String,
}

/// Validated, compiled matching configuration.
#[derive(Debug, Clone, Default)]
pub struct MatchingConfig {
    algorithm: Algorithm,
    rewrite: Option<UriRewrite>,
    query_filter: QueryParametersFilter,
    document: MatchingDocument,
}

impl MatchingConfig {
    /// Validate cross-field rules and compile the rewrite regex.
    pub fn from_document(document: MatchingDocument) -> Result<Self, LoadError> {
        let rewrite = match (document.algorithm, &document.rgx, &document.fmt) {
            (Algorithm::FullMatchingRegexReplace, Some(rgx), Some(fmt)) => {
                let regex = Regex::new(rgx)
                    .map_err(|e| LoadError::content(format!("invalid 'rgx' '{rgx}': {e}")))?;
                Some(UriRewrite {
                    regex,
                    fmt: fmt.clone(),
                })
            }
            (Algorithm::FullMatchingRegexReplace, _, _) => {
                return Err(LoadError::content(
                    "FullMatchingRegexReplace requires both 'rgx' and 'fmt'",
                ))
            }
            (_, None, None) => None,
            (algorithm, _, _) => {
                return Err(LoadError::content(format!(
                    "'rgx'/'fmt' are not allowed with {algorithm:?}"
                )))
            }
        };

        Ok(Self {
            algorithm: document.algorithm,
            rewrite,
            query_filter: document.uri_path_query_parameters_filter.unwrap_or_default(),
            document,
        })
    }

    /// Parse and validate a raw JSON document (schema validation is the caller's).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, LoadError> {
        let document: MatchingDocument = serde_json::from_value(value.clone())
            .map_err(|e| LoadError::BadSchema(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn query_filter(&self) -> QueryParametersFilter {
        self.query_filter
    }

    /// Apply the query-parameter policy to an incoming URI.
    pub fn normalize(&self, uri: &str) -> Result<String, QueryError> {
        normalize_uri(uri, self.query_filter)
    }

    /// Rewrite `uri` with the configured substitution, when there is one.
    pub fn rewrite<'a>(&self, uri: &'a str) -> Cow<'a, str> {
        match &self.rewrite {
            Some(rewrite) => rewrite.regex.replace_all(uri, rewrite.fmt.as_str()),
            None => Cow::Borrowed(uri),
        }
    }

    /// The document this configuration was built from.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.document).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_full_matching_with_sort() {
        let config = MatchingConfig::default();
        assert_eq!(config.algorithm(), Algorithm::FullMatching);
        assert_eq!(config.query_filter(), QueryParametersFilter::SortAmpersand);
    }

    #[test]
    fn test_from_json_full_matching() {
        let config = MatchingConfig::from_json(&json!({"algorithm": "FullMatching"})).unwrap();
        assert_eq!(config.algorithm(), Algorithm::FullMatching);
        assert_eq!(config.rewrite("/a/1"), "/a/1");
    }

    #[test]
    fn test_regex_replace_requires_rgx_and_fmt() {
        let err = MatchingConfig::from_json(&json!({
            "algorithm": "FullMatchingRegexReplace",
            "rgx": "(/users/)[0-9]+"
        }))
        .unwrap_err();
        assert!(matches!(err, LoadError::BadContent(_)));
    }

    #[test]
    fn test_rgx_not_allowed_with_other_algorithms() {
        for algorithm in ["FullMatching", "PriorityMatchingRegex"] {
            let err = MatchingConfig::from_json(&json!({
                "algorithm": algorithm,
                "rgx": "a",
                "fmt": "b"
            }))
            .unwrap_err();
            assert!(matches!(err, LoadError::BadContent(_)), "{algorithm}");
        }
        assert!(MatchingConfig::from_json(&json!({"algorithm": "FullMatching", "fmt": "x"})).is_err());
    }

    #[test]
    fn test_invalid_rgx_is_bad_content() {
        let err = MatchingConfig::from_json(&json!({
            "algorithm": "FullMatchingRegexReplace",
            "rgx": "([unclosed",
            "fmt": "x"
        }))
        .unwrap_err();
        assert!(matches!(err, LoadError::BadContent(_)));
    }

    #[test]
    fn test_rewrite_collapses_segments() {
        let config = MatchingConfig::from_json(&json!({
            "algorithm": "FullMatchingRegexReplace",
            "rgx": "(/users/)[0-9]+",
            "fmt": "${1}id"
        }))
        .unwrap();
        assert_eq!(config.rewrite("/users/42/orders"), "/users/id/orders");
        assert_eq!(config.rewrite("/other"), "/other");
    }

    #[test]
    fn test_unknown_algorithm_is_bad_schema() {
        let err = MatchingConfig::from_json(&json!({"algorithm": "Fuzzy"})).unwrap_err();
        assert!(matches!(err, LoadError::BadSchema(_)));
    }

    #[test]
    fn test_filter_is_parsed() {
        let config = MatchingConfig::from_json(&json!({
            "algorithm": "FullMatching",
            "uriPathQueryParametersFilter": "Ignore"
        }))
        .unwrap();
        assert_eq!(config.normalize("/a?x=1").unwrap(), "/a");
    }

    #[test]
    fn test_to_json_round_trips_document() {
        let doc = json!({"algorithm": "PriorityMatchingRegex", "uriPathQueryParametersFilter": "PassBy"});
        let config = MatchingConfig::from_json(&doc).unwrap();
        assert_eq!(config.to_json(), doc);
    }
}
