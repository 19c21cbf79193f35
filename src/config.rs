//! Pool configuration from a JSON file plus environment overrides.
//!
//! Precedence: environment variable, then file value, then the built-in
//! default. The result is validated before it is handed out.

use crate::error::ConfigError;
use ftpool_core::FtpPoolConfig;
use std::path::Path;

pub const ENV_HOST: &str = "FTPOOL_HOST";
pub const ENV_PORT: &str = "FTPOOL_PORT";
pub const ENV_USERNAME: &str = "FTPOOL_USERNAME";
pub const ENV_PASSWORD: &str = "FTPOOL_PASSWORD";

/// Read, override from the process environment, and validate.
pub fn load_config(path: &Path) -> Result<FtpPoolConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg = parse_config(&raw)?;
    apply_env_overrides(&mut cfg, |var| std::env::var(var).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn parse_config(raw: &str) -> Result<FtpPoolConfig, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

/// Apply `FTPOOL_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(cfg: &mut FtpPoolConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_HOST) {
        cfg.host = host;
    }
    if let Some(port) = lookup(ENV_PORT) {
        cfg.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_PORT,
            value: port.clone(),
        })?;
    }
    if let Some(username) = lookup(ENV_USERNAME) {
        cfg.username = username;
    }
    if let Some(password) = lookup(ENV_PASSWORD) {
        cfg.password = password;
    }
    Ok(())
}
