//! Offline driver: bootstrap the engine from a config file, replay
//! JSON-lines requests through it and fire client provisions over loopback.
//!
//! Each request line looks like
//! `{"method": "GET", "uri": "/x", "headers": {"a": "1"}, "body": ...}`
//! and produces one response line on stdout.

use anyhow::Context;
use clap::Parser;
use h2mock::config::Config;
use h2mock::InboundRequest;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "h2mock")]
#[command(author, version, about = "Replay requests through a provisioned mock engine")]
struct Args {
    /// Bootstrap configuration (YAML or JSON)
    #[arg(short, long, env = "H2MOCK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines request file; `-` reads stdin
    #[arg(short, long)]
    requests: Option<PathBuf>,

    /// Client provision ids to fire after the replay, in order
    #[arg(short, long, value_delimiter = ',')]
    trigger: Vec<String>,

    /// Print the event summary at the end
    #[arg(short, long)]
    summary: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    method: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    headers: IndexMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

impl From<ReplayLine> for InboundRequest {
    fn from(line: ReplayLine) -> Self {
        let mut request = InboundRequest::new(line.method, line.uri);
        request.headers = line.headers.into_iter().collect();
        request.body = line.body.filter(|b| !b.is_null());
        request
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let engines = config.bootstrap(None)?;

    if let Some(path) = &args.requests {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(BufReader::new(std::io::stdin()))
        } else {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening requests {}", path.display()))?;
            Box::new(BufReader::new(file))
        };

        let mut replayed = 0usize;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(line = number + 1, "skipping malformed request: {}", e);
                    continue;
                }
            };
            let response = engines.server.process(&InboundRequest::from(parsed));
            println!("{}", response.to_json());
            replayed += 1;
        }
        info!(replayed, "replay finished");
    }

    for id in &args.trigger {
        match engines.client.trigger(id).await {
            Ok(outcome) => println!("{}", json!({"trigger": id, "outcome": outcome})),
            Err(e) => {
                warn!(id = %id, "trigger refused: {}", e);
                println!("{}", json!({"trigger": id, "error": e.to_string()}));
            }
        }
    }

    if args.summary {
        let summary = json!({
            "server": engines.server.event_summary(None),
            "client": engines.client.events().summary(config.engine.summary_max_keys),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
