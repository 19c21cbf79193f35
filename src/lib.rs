//! # ftpool — Pooled FTP Transfers
//!
//! Application-facing entry point over `ftpool-core`:
//! - `config` — JSON config file + `FTPOOL_*` environment overrides
//! - `logging` — tracing subscriber setup
//! - `pooled` / `unpooled` — ready-to-use `FtpTransfers`

pub mod config;
pub mod error;
pub mod logging;

pub use config::{apply_env_overrides, load_config, parse_config};
pub use error::ConfigError;
pub use ftpool_core::*;

use std::sync::Arc;

/// Build a pool for `config` and wrap it in transfers that borrow from it.
///
/// Fails when the configuration is invalid or the initial sessions cannot
/// be opened. Call `shutdown` on the result when done.
pub async fn pooled<C: SessionConnector>(
    config: FtpPoolConfig,
    connector: C,
) -> FtpResult<FtpTransfers<PooledSource<C>>> {
    let target = format!("{}:{}", config.host, config.port);
    let factory = Arc::new(SessionFactory::new(connector, config));
    let pool = Arc::new(SessionPool::new(factory).await?);
    tracing::info!(%target, stats = ?pool.stats(), "FTP pool started");
    Ok(FtpTransfers::pooled(pool))
}

/// Transfers that open a fresh session per operation.
pub fn unpooled<C: SessionConnector>(
    config: FtpPoolConfig,
    connector: C,
) -> FtpResult<FtpTransfers<OnceSource<C>>> {
    config.validate()?;
    Ok(FtpTransfers::unpooled(Arc::new(SessionFactory::new(
        connector, config,
    ))))
}
