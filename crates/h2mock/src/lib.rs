//! h2mock: a programmable, stateful mock endpoint engine.
//!
//! The crate decides *what* a canned response contains once a transport has
//! parsed a request into method/URI/headers/body:
//!
//! - `matching`: the active matching algorithm and URI normalisation
//! - `provision`: provisioning rules and the dual-index rule store
//! - `transform`: the source → filter → target transformation pipeline
//! - `events`: per-key request/response history that drives the state machine
//! - `vars`: the global variable store shared by every transformation
//! - `server`: the inbound (server) role tying the above together
//! - `client`: the outbound (client) role, driven through [`client::OutboundTransport`]
//!
//! Transport, administrative plumbing and file/socket persistence are
//! collaborators reached through traits; the engine never opens sockets itself.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod key;
pub mod matching;
pub mod persistence;
pub mod provision;
pub mod schema;
pub mod server;
pub mod transform;
pub mod vars;

mod json;

pub use context::SharedContext;
pub use error::{LoadError, LoadResult};
pub use key::DataKey;
pub use server::{InboundRequest, MockResponse, MockServer};
