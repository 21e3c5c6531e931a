//! Bootstrap configuration: engine knobs plus the administrative documents
//! to load before the first request.

mod engine;

pub use engine::EngineSettings;

use crate::client::{ClientEngine, LoopbackTransport};
use crate::context::SharedContext;
use crate::error::LoadResult;
use crate::persistence::Persistence;
use crate::server::MockServer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// `server_matching` document; FullMatching when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<Value>,

    /// Global variables bulk load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<Value>,

    /// `server_provision` documents, loaded in order
    #[serde(default)]
    pub provisions: Vec<Value>,

    #[serde(default)]
    pub client_endpoints: Vec<Value>,

    #[serde(default)]
    pub client_provisions: Vec<Value>,
}

/// Server and client engines sharing one context. The client role talks to
/// the local server over loopback.
#[derive(Debug)]
pub struct Engines {
    pub ctx: Arc<SharedContext>,
    pub server: Arc<MockServer>,
    pub client: ClientEngine,
}

impl Config {
    /// Load configuration from a YAML (or JSON) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.engine.validate()?;

        if let Some(matching) = &self.matching {
            if !matching.is_object() {
                anyhow::bail!("'matching' must be an object");
            }
        }
        if let Some(globals) = &self.globals {
            if !globals.is_object() {
                anyhow::bail!("'globals' must be an object of string values");
            }
        }
        if !self.client_provisions.is_empty() && self.client_endpoints.is_empty() {
            anyhow::bail!("'clientProvisions' given without any 'clientEndpoints'");
        }
        Ok(())
    }

    /// Build the engines and load every document. Any rejected document
    /// aborts the bootstrap.
    pub fn bootstrap(&self, persistence: Option<Arc<dyn Persistence>>) -> anyhow::Result<Engines> {
        let mut ctx = SharedContext::new(self.engine.clone());
        if let Some(persistence) = persistence {
            ctx = ctx.with_persistence(persistence);
        }
        let ctx = Arc::new(ctx);
        let server = Arc::new(MockServer::new(Arc::clone(&ctx)));
        let transport = Arc::new(LoopbackTransport::new(Arc::clone(&server)));
        let client = ClientEngine::new(Arc::clone(&ctx), transport);

        if let Some(matching) = &self.matching {
            ensure_loaded("matching", server.load_matching(matching))?;
        }
        if let Some(globals) = &self.globals {
            ensure_loaded("globals", server.load_globals(globals))?;
        }
        for (i, document) in self.provisions.iter().enumerate() {
            ensure_loaded(&format!("provisions[{i}]"), server.load_provisions(document))?;
        }
        for (i, document) in self.client_endpoints.iter().enumerate() {
            ensure_loaded(&format!("clientEndpoints[{i}]"), client.load_endpoints(document))?;
        }
        for (i, document) in self.client_provisions.iter().enumerate() {
            ensure_loaded(
                &format!("clientProvisions[{i}]"),
                client.load_provisions(document),
            )?;
        }

        info!(
            provisions = server.provisions().len(),
            client_provisions = client.provisions().len(),
            algorithm = ?server.matching().algorithm(),
            "engine bootstrapped"
        );
        Ok(Engines {
            ctx,
            server,
            client,
        })
    }
}

fn ensure_loaded(section: &str, result: LoadResult) -> anyhow::Result<()> {
    if !result.is_ok() {
        anyhow::bail!("{section} rejected: {result}");
    }
    Ok(())
}
