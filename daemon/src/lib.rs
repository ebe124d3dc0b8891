//! The daemon (spec §4.6): a persistent controller that accepts run
//! requests over RPC, allocates an isolated execution environment per run
//! via an injected [`cloche_common::Runtime`], ingests the in-environment
//! runner's JSON-lines status stream, persists run and step-execution
//! records through an injected [`cloche_common::PersistenceStore`], and
//! exposes query/streaming endpoints.

pub mod config;
pub mod error;
pub mod history;
pub mod ingestion;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use config::DaemonConfig;
pub use error::RpcError;
pub use protocol::{DaemonRequest, DaemonResponse};
pub use server::DaemonServer;
pub use supervisor::DaemonState;
