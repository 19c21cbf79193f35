//! Pool- and session-level error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised failure raised inside the core.
///
/// Public transfer operations never return this to their callers; it only
/// travels between the factory, the pool and the access strategies, and is
/// logged at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// Server reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// TCP / DNS failure while opening the control connection.
    ConnectionFailed,
    /// Server answered the connection with a non-positive greeting.
    Refused,
    /// Credentials rejected and the login policy forbids continuing.
    AuthFailed,
    /// Connect or enqueue deadline elapsed.
    Timeout,
    /// Session dropped by the peer.
    Disconnected,
    /// Server answered a command with a 4xx/5xx reply.
    CommandRejected,
    /// Local stream read/write failure.
    IoError,
    /// Initial fill of the pool could not be completed.
    PoolInit,
    /// Pool has been shut down.
    PoolClosed,
    /// Pooled acquisition kept producing unusable sessions.
    AcquireExhausted,
    /// Config / parameter validation error.
    InvalidConfig,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, msg)
    }

    pub fn refused(code: u16, msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Refused, msg).with_code(code)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::AuthFailed, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::IoError, msg)
    }

    pub fn pool_init(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::PoolInit, msg)
    }

    pub fn pool_closed() -> Self {
        Self::new(FtpErrorKind::PoolClosed, "Session pool has been shut down")
    }

    pub fn acquire_exhausted(attempts: u32) -> Self {
        Self::new(
            FtpErrorKind::AcquireExhausted,
            format!("No usable session after {} acquisition attempts", attempts),
        )
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    /// Classify a server reply code into the most appropriate error kind.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Disconnected,
            430 | 530 => FtpErrorKind::AuthFailed,
            _ if code >= 400 => FtpErrorKind::CommandRejected,
            _ => FtpErrorKind::Refused,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::disconnected(e.to_string()),
            _ => Self::io_error(e.to_string()),
        }
    }
}
