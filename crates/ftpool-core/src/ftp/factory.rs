//! Session factory — creates, validates and tears down sessions.
//!
//! Lifecycle of a created session: connect (with timeout) → check greeting
//! → login → buffer size → TYPE → optional PASV. The factory knows nothing
//! about pooling; both access strategies share it.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::{is_positive_completion, RemoteSession, SessionConnector};
use crate::ftp::types::{FtpPoolConfig, LoginFailurePolicy};
use log::{debug, error, warn};
use tokio::time::timeout;

pub struct SessionFactory<C: SessionConnector> {
    connector: C,
    config: FtpPoolConfig,
}

impl<C: SessionConnector> SessionFactory<C> {
    pub fn new(connector: C, config: FtpPoolConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &FtpPoolConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open and prepare a new session.
    ///
    /// A rejected login does not fail creation under
    /// `LoginFailurePolicy::Continue`; the session comes back connected but
    /// unauthenticated and later commands fail at the protocol level.
    pub async fn create(&self) -> FtpResult<C::Session> {
        let cfg = &self.config;
        let options = cfg.connect_options();
        let addr = format!("{}:{}", cfg.host, cfg.port);

        let connected = match options.connect_timeout {
            Some(dur) => timeout(dur, self.connector.connect(&options))
                .await
                .map_err(|_| FtpError::timeout(format!("Connect to {} timed out", addr)))?,
            None => self.connector.connect(&options).await,
        };
        let mut session = connected.map_err(|e| {
            error!("Failed to open FTP connection to {}: {}", addr, e);
            e
        })?;

        let greeting = session.reply_code();
        if !is_positive_completion(greeting) {
            let text = session.reply_string();
            if let Err(e) = session.disconnect().await {
                debug!("Disconnect after refused greeting failed: {}", e);
            }
            warn!("FTP server {} refused connection, replyCode: {}", addr, greeting);
            return Err(FtpError::refused(greeting, text));
        }

        let logged_in = match session.login(&cfg.username, &cfg.password).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("FTP login to {} errored: {}", addr, e);
                false
            }
        };
        if !logged_in {
            warn!(
                "FTP login failed for user '{}' on {}: {}",
                cfg.username,
                addr,
                session.reply_string().trim()
            );
            if cfg.on_login_failure == LoginFailurePolicy::Reject {
                let code = session.reply_code();
                let text = session.reply_string().trim().to_string();
                self.destroy(session).await;
                return Err(if code >= 400 {
                    FtpError::from_reply(code, &text)
                } else {
                    FtpError::auth_failed(text)
                });
            }
        }

        session.set_buffer_size(cfg.buffer_size);
        match session.set_transfer_type(cfg.transfer_type).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "FTP server {} rejected TYPE {:?}: {}",
                addr,
                cfg.transfer_type,
                FtpError::from_reply(session.reply_code(), session.reply_string().trim())
            ),
            Err(e) => warn!("Setting transfer type on {} failed: {}", addr, e),
        }
        if cfg.passive_mode {
            session.enter_passive_mode();
        }

        debug!("FTP session to {} created (authenticated: {})", addr, logged_in);
        Ok(session)
    }

    /// Logout then disconnect. A failing logout never skips the disconnect.
    pub async fn destroy(&self, mut session: C::Session) {
        if session.is_connected() {
            match session.logout().await {
                Ok(true) => {}
                Ok(false) => warn!(
                    "FTP logout refused: {}",
                    session.reply_string().trim()
                ),
                Err(e) => warn!("Failure to log out FTP session: {}", e),
            }
        }
        if let Err(e) = session.disconnect().await {
            warn!("Failed to close FTP connection: {}", e);
        }
        debug!("FTP session destroyed");
    }

    /// NOOP check. Disconnected sessions and NOOP errors count as dead.
    pub async fn validate(&self, session: &mut C::Session) -> bool {
        if !session.is_connected() {
            return false;
        }
        match session.noop().await {
            Ok(ok) => ok,
            Err(e) => {
                debug!("FTP NOOP check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::error::FtpErrorKind;
    use crate::ftp::simulated::{SimulatedConnector, SimulatedServer};
    use crate::ftp::types::TransferType;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    fn factory(server: &Arc<SimulatedServer>) -> SessionFactory<SimulatedConnector> {
        SessionFactory::new(server.connector(), FtpPoolConfig::new("sim.local", "user", "secret"))
    }

    #[tokio::test]
    async fn test_create_applies_settings() {
        let server = SimulatedServer::new("user", "secret");
        let mut cfg = FtpPoolConfig::new("sim.local", "user", "secret");
        cfg.buffer_size = 4096;
        let f = SessionFactory::new(server.connector(), cfg);

        let s = f.create().await.unwrap();
        assert!(s.is_connected());
        assert!(s.is_authenticated());
        assert_eq!(s.buffer_size(), 4096);
        assert_eq!(s.transfer_type(), TransferType::Binary);
        assert!(s.is_passive());
        assert_eq!(server.counters().connects, 1);
    }

    #[tokio::test]
    async fn test_refused_greeting_disconnects() {
        let server = SimulatedServer::new("user", "secret");
        server.set_greeting(421);
        let err = factory(&server).create().await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::Refused);
        assert_eq!(err.code, Some(421));
        assert_eq!(server.counters().disconnects, 1);
        assert_eq!(server.counters().logins, 0);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let server = SimulatedServer::new("user", "secret");
        server.set_reachable(false);
        let err = factory(&server).create().await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::ConnectionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let server = SimulatedServer::new("user", "secret");
        server.set_connect_delay(Some(Duration::from_secs(30)));
        let mut cfg = FtpPoolConfig::new("sim.local", "user", "secret");
        cfg.connect_timeout_ms = Some(500);
        let err = SessionFactory::new(server.connector(), cfg).create().await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_login_failure_continues_by_default() {
        let server = SimulatedServer::new("user", "secret");
        let f = SessionFactory::new(
            server.connector(),
            FtpPoolConfig::new("sim.local", "user", "wrong"),
        );
        let mut s = f.create().await.unwrap();
        assert!(s.is_connected());
        assert!(!s.is_authenticated());

        // The failure surfaces at the protocol layer instead.
        let mut src = Cursor::new(b"data".to_vec());
        assert!(!s.store_file("a.txt", &mut src).await.unwrap());
        assert_eq!(s.reply_code(), 530);
    }

    #[tokio::test]
    async fn test_login_failure_rejected_by_policy() {
        let server = SimulatedServer::new("user", "secret");
        let mut cfg = FtpPoolConfig::new("sim.local", "user", "wrong");
        cfg.on_login_failure = LoginFailurePolicy::Reject;
        let err = SessionFactory::new(server.connector(), cfg).create().await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::AuthFailed);
        assert_eq!(err.code, Some(530));
        assert_eq!(err.message, "530 Login incorrect.");
        assert_eq!(server.counters().disconnects, 1);
    }

    #[tokio::test]
    async fn test_destroy_logs_out_then_disconnects() {
        let server = SimulatedServer::new("user", "secret");
        let f = factory(&server);
        let s = f.create().await.unwrap();
        f.destroy(s).await;
        let c = server.counters();
        assert_eq!(c.logouts, 1);
        assert_eq!(c.disconnects, 1);
    }

    #[tokio::test]
    async fn test_destroy_disconnects_even_when_logout_fails() {
        let server = SimulatedServer::new("user", "secret");
        let f = factory(&server);
        let s = f.create().await.unwrap();
        server.drop_connections();
        f.destroy(s).await;
        let c = server.counters();
        assert_eq!(c.logouts, 0);
        assert_eq!(c.disconnects, 1);
    }

    #[tokio::test]
    async fn test_validate() {
        let server = SimulatedServer::new("user", "secret");
        let f = factory(&server);
        let mut s = f.create().await.unwrap();
        assert!(f.validate(&mut s).await);

        server.set_noop_failing(true);
        assert!(!f.validate(&mut s).await);
        server.set_noop_failing(false);

        server.drop_connections();
        assert!(!f.validate(&mut s).await);
        assert!(!s.is_connected());
        // Already disconnected: no NOOP is sent.
        let noops = server.counters().noops;
        assert!(!f.validate(&mut s).await);
        assert_eq!(server.counters().noops, noops);
    }
}
