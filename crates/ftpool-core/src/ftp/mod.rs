//! # ftpool-core — Pooled FTP Session Manager
//!
//! Bounded pool of reusable FTP control sessions plus transfer
//! orchestration on top of it. The wire protocol is not implemented here;
//! sessions are consumed through the `RemoteSession` capability trait.
//!
//! Architecture:
//! - `types` — configuration, policies, pool statistics
//! - `error` — FTP-specific error type
//! - `session` — `RemoteSession` / `SessionConnector` capability traits
//! - `factory` — create, validate and tear down sessions
//! - `pool` — bounded session pool (acquire / release / invalidate / shutdown)
//! - `path` — remote path splitting and directory chains
//! - `transfer` — store / retrieve / delete with directory creation and retry
//! - `service` — access strategies and the `FtpTransfers` facade
//! - `simulated` — in-memory server for tests and offline use

pub mod types;
pub mod error;
pub mod session;
pub mod factory;
pub mod pool;
pub mod path;
pub mod transfer;
pub mod service;
pub mod simulated;

// Re-exports for lib.rs consumers
pub use types::*;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use session::{is_positive_completion, RemoteSession, SessionConnector};
pub use factory::SessionFactory;
pub use pool::{PooledSession, SessionPool};
pub use path::RemotePath;
pub use transfer::TransferOrchestrator;
pub use service::{FtpTransfers, OnceSession, OnceSource, PooledSource, SessionSource};
pub use simulated::{ServerCounters, SimulatedConnector, SimulatedServer, SimulatedSession};
