//! Published JSON Schemas for administrative documents.
//!
//! Validators are compiled once per process on first use.

use crate::error::LoadError;
use serde_json::Value;
use std::sync::OnceLock;

/// Administrative document kinds with a published schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    ServerMatching,
    ServerProvision,
    GlobalVariables,
    ClientEndpoint,
    ClientProvision,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 5] = [
        SchemaKind::ServerMatching,
        SchemaKind::ServerProvision,
        SchemaKind::GlobalVariables,
        SchemaKind::ClientEndpoint,
        SchemaKind::ClientProvision,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::ServerMatching => "server_matching",
            SchemaKind::ServerProvision => "server_provision",
            SchemaKind::GlobalVariables => "global_variables",
            SchemaKind::ClientEndpoint => "client_endpoint",
            SchemaKind::ClientProvision => "client_provision",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Raw schema text.
    pub fn source(&self) -> &'static str {
        match self {
            SchemaKind::ServerMatching => include_str!("../schemas/server_matching.json"),
            SchemaKind::ServerProvision => include_str!("../schemas/server_provision.json"),
            SchemaKind::GlobalVariables => include_str!("../schemas/global_variables.json"),
            SchemaKind::ClientEndpoint => include_str!("../schemas/client_endpoint.json"),
            SchemaKind::ClientProvision => include_str!("../schemas/client_provision.json"),
        }
    }

    /// Schema as JSON, for publication.
    pub fn document(&self) -> Value {
        serde_json::from_str(self.source()).unwrap_or(Value::Null)
    }

    fn slot(&self) -> &'static OnceLock<Result<jsonschema::Validator, String>> {
        static SERVER_MATCHING: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
        static SERVER_PROVISION: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
        static GLOBAL_VARIABLES: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
        static CLIENT_ENDPOINT: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
        static CLIENT_PROVISION: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
        match self {
            SchemaKind::ServerMatching => &SERVER_MATCHING,
            SchemaKind::ServerProvision => &SERVER_PROVISION,
            SchemaKind::GlobalVariables => &GLOBAL_VARIABLES,
            SchemaKind::ClientEndpoint => &CLIENT_ENDPOINT,
            SchemaKind::ClientProvision => &CLIENT_PROVISION,
        }
    }

    fn validator(&self) -> Result<&'static jsonschema::Validator, LoadError> {
        self.slot()
            .get_or_init(|| {
                let schema: Value = serde_json::from_str(self.source())
                    .map_err(|e| format!("embedded {} schema is not JSON: {e}", self.name()))?;
                jsonschema::validator_for(&schema)
                    .map_err(|e| format!("embedded {} schema does not compile: {e}", self.name()))
            })
            .as_ref()
            .map_err(|e| LoadError::BadSchema(e.clone()))
    }

    /// Every violation of `document`, rendered for humans.
    pub fn violations(&self, document: &Value) -> Vec<String> {
        match self.validator() {
            Ok(validator) => validator
                .iter_errors(document)
                .map(|e| e.to_string())
                .collect(),
            Err(e) => vec![e.to_string()],
        }
    }

    /// `BadSchema` with the first violation when `document` does not conform.
    pub fn validate(&self, document: &Value) -> Result<(), LoadError> {
        let violations = self.violations(document);
        match violations.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(LoadError::BadSchema(format!("{}: {first}", self.name()))),
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
