//! Shared types for the pool crate.

use crate::ftp::error::{FtpError, FtpResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Connection ──────────────────────────────────────────────────────

/// Transfer type (RFC 959 TYPE command).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TransferType {
    Ascii,
    #[default]
    Binary,
}

/// What the factory does when the server rejects the configured credentials.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum LoginFailurePolicy {
    /// Log and hand out the (unauthenticated) session anyway.
    #[default]
    Continue,
    /// Tear the session down and fail creation.
    Reject,
}

/// Configuration shared by the session factory and the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpPoolConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Control-channel text encoding.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Connect timeout in milliseconds. `None` leaves it to the connector.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Transfer buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default = "default_true")]
    pub passive_mode: bool,
    /// Number of warm sessions the pool keeps idle. Capacity is twice this.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub on_login_failure: LoginFailurePolicy,
    /// Bound on the pooled re-check loop.
    #[serde(default = "default_acquire_attempts")]
    pub max_acquire_attempts: u32,
    /// How long `release` may wait for room in the idle queue.
    #[serde(default = "default_release_timeout")]
    pub release_timeout_ms: u64,
    /// Total store/retrieve attempts (initial + retries).
    #[serde(default = "default_transfer_attempts")]
    pub max_transfer_attempts: u32,
}

fn default_port() -> u16 {
    21
}
fn default_username() -> String {
    "anonymous".into()
}
fn default_encoding() -> String {
    "UTF-8".into()
}
fn default_buffer_size() -> usize {
    8192
}
fn default_true() -> bool {
    true
}
fn default_pool_size() -> usize {
    5
}
fn default_acquire_attempts() -> u32 {
    3
}
fn default_release_timeout() -> u64 {
    3000
}
fn default_transfer_attempts() -> u32 {
    4
}

impl Default for FtpPoolConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
            encoding: default_encoding(),
            connect_timeout_ms: None,
            buffer_size: default_buffer_size(),
            transfer_type: TransferType::Binary,
            passive_mode: true,
            pool_size: default_pool_size(),
            on_login_failure: LoginFailurePolicy::Continue,
            max_acquire_attempts: default_acquire_attempts(),
            release_timeout_ms: default_release_timeout(),
            max_transfer_attempts: default_transfer_attempts(),
        }
    }
}

impl FtpPoolConfig {
    /// Convenience constructor for the common host/credentials case.
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> FtpResult<()> {
        if self.host.trim().is_empty() {
            return Err(FtpError::invalid_config("Host must not be empty"));
        }
        if self.port == 0 {
            return Err(FtpError::invalid_config("Port must not be 0"));
        }
        if self.pool_size == 0 {
            return Err(FtpError::invalid_config("Pool size must be at least 1"));
        }
        if self.max_acquire_attempts == 0 || self.max_transfer_attempts == 0 {
            return Err(FtpError::invalid_config("Attempt limits must be at least 1"));
        }
        Ok(())
    }

    /// Hard ceiling on live sessions; absorbs bursts of returning borrowers.
    pub fn capacity(&self) -> usize {
        self.pool_size * 2
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            encoding: self.encoding.clone(),
            connect_timeout: self.connect_timeout(),
        }
    }
}

/// Parameters handed to a `SessionConnector` when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub encoding: String,
    pub connect_timeout: Option<Duration>,
}

// ─── Pool ────────────────────────────────────────────────────────────

/// Point-in-time view of a session pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub target_size: usize,
    pub capacity: usize,
    pub idle: usize,
    pub closed: bool,
}
