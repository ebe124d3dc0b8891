//! Errors surfaced by RPC handling (spec §7 `RuntimeError`, `PersistenceError`).

use cloche_common::{RuntimeError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no runtime configured for kind '{0}'")]
    NoRuntime(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("run '{0}' is not in flight")]
    RunNotInFlight(cloche_common::RunId),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
