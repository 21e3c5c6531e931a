//! Transformation pipeline: ordered `source → [filter] → target` steps that
//! turn a rule's template into the concrete message.
//!
//! Steps run in array order and each sees the writes of the previous ones.
//! A failing step is logged and skipped; the rest of the list still runs.

mod filter;
mod source;
mod target;

pub use filter::{Filter, Filtered};
pub use source::{Side, Source, TimeUnit};
pub use target::{BodyKind, Target};

use crate::context::SharedContext;
use crate::error::LoadError;
use crate::json::Headers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Which role a transformation list belongs to. Decides what `request.*`
/// and `response.*` mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Inbound: `request.*` reads the received request, `response.*` is built.
    Server,
    /// Outbound: `request.*` is the request being built.
    Client,
}

/// One `transform` array item as written in a provision document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDocument {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

/// A parsed step.
#[derive(Debug, Clone)]
pub struct Transformation {
    source: Source,
    filter: Option<Filter>,
    target: Target,
    document: TransformDocument,
}

impl Transformation {
    pub fn parse(document: TransformDocument, mode: TransformMode) -> Result<Self, LoadError> {
        let source = Source::parse(&document.source, mode)?;
        let target = Target::parse(&document.target, mode)?;
        let filter = document.filter.as_ref().map(Filter::parse).transpose()?;
        Ok(Self {
            source,
            filter,
            target,
            document,
        })
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn document(&self) -> &TransformDocument {
        &self.document
    }
}

/// Parse a whole `transform` array; the first bad step rejects the list.
pub fn parse_list(
    documents: Vec<TransformDocument>,
    mode: TransformMode,
) -> Result<Vec<Transformation>, LoadError> {
    documents
        .into_iter()
        .enumerate()
        .map(|(i, doc)| {
            Transformation::parse(doc, mode).map_err(|e| match e {
                LoadError::BadSchema(msg) => LoadError::BadSchema(format!("transform[{i}]: {msg}")),
                LoadError::BadContent(msg) => {
                    LoadError::BadContent(format!("transform[{i}]: {msg}"))
                }
            })
        })
        .collect()
}

/// Read-only view of a received request.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub headers: &'a [(String, String)],
    pub body: Option<&'a Value>,
}

/// A state transition requested for another key (`outState.<METHOD>[.<uri>]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualState {
    pub method: String,
    /// `None` means the current request's URI.
    pub uri: Option<String>,
    pub state: String,
}

/// The message under construction. Server rules build a response
/// (`status_code`, `delay_ms`); client rules build a request (`uri`,
/// `delay_ms`, `timeout_ms`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub status_code: u16,
    pub headers: Headers,
    /// `Null` is an empty body.
    pub body: Value,
    pub delay_ms: u64,
    pub uri: String,
    pub timeout_ms: u64,
    pub out_state: String,
    pub virtual_states: Vec<VirtualState>,
}

/// Everything a step may read besides the draft.
pub struct TransformContext<'a> {
    pub shared: &'a SharedContext,
    pub inbound: Option<&'a RequestView<'a>>,
    pub in_state: &'a str,
    pub sequence: u64,
}

/// Run `steps` over `draft`. Returns how many steps were written.
pub fn apply(steps: &[Transformation], ctx: &TransformContext<'_>, draft: &mut Draft) -> usize {
    let mut written = 0;
    for (index, step) in steps.iter().enumerate() {
        let value = match step.source.resolve(ctx, draft) {
            Ok(value) => value,
            Err(e) => {
                skipped(index, step, &e);
                continue;
            }
        };

        let filtered = match &step.filter {
            None => Filtered {
                value,
                captures: Vec::new(),
            },
            Some(filter) => match filter.apply(value, ctx.shared.vars()) {
                Ok(Some(filtered)) => filtered,
                Ok(None) => {
                    debug!(step = index, target = %step.document.target, "transformation gated off");
                    continue;
                }
                Err(e) => {
                    skipped(index, step, &e);
                    continue;
                }
            },
        };

        match step.target.write(filtered, ctx, draft) {
            Ok(()) => written += 1,
            Err(e) => skipped(index, step, &e),
        }
    }
    written
}

fn skipped(index: usize, step: &Transformation, err: &crate::error::TransformError) {
    warn!(
        step = index,
        source = %step.document.source,
        target = %step.document.target,
        "transformation step skipped: {}",
        err
    );
}
