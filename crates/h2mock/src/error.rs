//! Error taxonomy shared by the stores and the administrative seam.

use serde::Serialize;
use tracing::{info, warn};

/// Outcome reported back to the administrative surface for a document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadResult {
    /// Document stored (new entries).
    Success,
    /// Document applied on top of existing entries (updated in place).
    Accepted,
    /// Document failed structural schema validation.
    BadSchema,
    /// Document is structurally valid but violates a content rule.
    BadContent,
}

impl LoadResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, LoadResult::Success | LoadResult::Accepted)
    }

    /// HTTP status an administrative transport would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            LoadResult::Success => 201,
            LoadResult::Accepted => 202,
            LoadResult::BadSchema => 400,
            LoadResult::BadContent => 422,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadResult::Success => "Success",
            LoadResult::Accepted => "Accepted",
            LoadResult::BadSchema => "BadSchema",
            LoadResult::BadContent => "BadContent",
        }
    }
}

impl std::fmt::Display for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection of an administrative document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("schema violation: {0}")]
    BadSchema(String),
    #[error("content violation: {0}")]
    BadContent(String),
}

impl LoadError {
    pub fn content(msg: impl Into<String>) -> Self {
        LoadError::BadContent(msg.into())
    }
}

impl From<&LoadError> for LoadResult {
    fn from(err: &LoadError) -> Self {
        match err {
            LoadError::BadSchema(_) => LoadResult::BadSchema,
            LoadError::BadContent(_) => LoadResult::BadContent,
        }
    }
}

/// Collapse a load attempt into a [`LoadResult`], leaving a log entry behind.
pub fn report(operation: &str, outcome: Result<LoadResult, LoadError>) -> LoadResult {
    match outcome {
        Ok(result) => {
            info!(operation, result = %result, "document loaded");
            result
        }
        Err(e) => {
            let result = LoadResult::from(&e);
            warn!(operation, result = %result, "document rejected: {}", e);
            result
        }
    }
}

/// Failure of a single transformation step. Absorbed by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("source '{0}' could not be resolved")]
    Unresolvable(String),
    #[error("filter failed: {0}")]
    Filter(String),
    #[error("target write failed: {0}")]
    Target(String),
}

/// URI query-string normalisation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("duplicate query parameter '{0}'")]
    DuplicateKey(String),
}

/// Malformed event-store selector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("event index {0} given without a data key")]
    IndexWithoutKey(usize),
    #[error("event index must be 1-based")]
    ZeroIndex,
}

/// Why an outbound trigger could not be sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("no client provision with id '{0}'")]
    UnknownProvision(String),
    #[error("client provision '{id}' has no rule for state '{state}'")]
    NoProvisionForState { id: String, state: String },
    #[error("client provision '{0}' is road-closed")]
    RoadClosed(String),
    #[error("client endpoint '{0}' is not registered")]
    UnknownEndpoint(String),
    #[error("client endpoint '{0}' does not permit sends")]
    EndpointNotPermitted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_result_http_status() {
        assert_eq!(LoadResult::Success.http_status(), 201);
        assert_eq!(LoadResult::Accepted.http_status(), 202);
        assert_eq!(LoadResult::BadSchema.http_status(), 400);
        assert_eq!(LoadResult::BadContent.http_status(), 422);
    }

    #[test]
    fn test_load_error_maps_to_result() {
        let schema = LoadError::BadSchema("missing field".to_string());
        let content = LoadError::content("bad regex");
        assert_eq!(LoadResult::from(&schema), LoadResult::BadSchema);
        assert_eq!(LoadResult::from(&content), LoadResult::BadContent);
        assert!(content.to_string().contains("bad regex"));
    }

    #[test]
    fn test_report_passes_through_success() {
        assert_eq!(report("test", Ok(LoadResult::Accepted)), LoadResult::Accepted);
        assert_eq!(
            report("test", Err(LoadError::content("nope"))),
            LoadResult::BadContent
        );
    }
}
