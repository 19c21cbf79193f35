//! Transfer orchestration — one logical file operation on a borrowed session.
//!
//! The orchestrator owns no session. It resolves the remote directory,
//! creating missing prefixes for uploads, then drives STOR / RETR with a
//! bounded number of attempts and no backoff. Every failure is logged with
//! the remote path, attempt number and last reply; callers only see `bool`.

use crate::ftp::path::RemotePath;
use crate::ftp::session::RemoteSession;
use log::{debug, error, info, warn};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite};

/// Total attempts (initial + retries) when nothing else is configured.
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct TransferOrchestrator {
    max_attempts: u32,
}

impl Default for TransferOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_ATTEMPTS)
    }
}

impl TransferOrchestrator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    // ─── STOR ────────────────────────────────────────────────────

    /// Upload `content` to `remote_path`, creating missing directories.
    ///
    /// `content` is rewound to its starting position before every retry.
    pub async fn store<S, R>(&self, session: &mut S, content: &mut R, remote_path: &str) -> bool
    where
        S: RemoteSession + ?Sized,
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let target = RemotePath::split(remote_path);
        if !self.ensure_directory(session, &target).await {
            return false;
        }

        let start = match content.stream_position().await {
            Ok(pos) => pos,
            Err(e) => {
                error!("Cannot read position of upload source for {}: {}", remote_path, e);
                return false;
            }
        };

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                if let Err(e) = content.seek(SeekFrom::Start(start)).await {
                    error!("Cannot rewind upload source for {}: {}", remote_path, e);
                    return false;
                }
            }
            match session.store_file(&target.name, content).await {
                Ok(true) => {
                    info!("Stored {} (attempt {})", remote_path, attempt);
                    return true;
                }
                Ok(false) => warn!(
                    "STOR {} failed (attempt {}/{}), replyString: {}",
                    remote_path,
                    attempt,
                    self.max_attempts,
                    session.reply_string().trim()
                ),
                Err(e) => warn!(
                    "STOR {} errored (attempt {}/{}): {}",
                    remote_path, attempt, self.max_attempts, e
                ),
            }
            if !session.is_connected() {
                warn!("Session lost while storing {}; giving up", remote_path);
                break;
            }
        }
        error!("Failed to upload file: {}", remote_path);
        false
    }

    /// Walk the directory chain from the root, creating what is missing.
    ///
    /// Ends with the session's working directory at the deepest prefix.
    async fn ensure_directory<S>(&self, session: &mut S, target: &RemotePath) -> bool
    where
        S: RemoteSession + ?Sized,
    {
        if target.is_root_directory() {
            return cwd(session, "/").await;
        }

        for prefix in &target.directory_chain() {
            if cwd(session, prefix).await {
                continue;
            }
            match session.make_directory(prefix).await {
                Ok(true) => debug!("Created remote directory {}", prefix),
                Ok(false) => debug!(
                    "MKD {} refused: {}",
                    prefix,
                    session.reply_string().trim()
                ),
                Err(e) => debug!("MKD {} errored: {}", prefix, e),
            }
            if !cwd(session, prefix).await {
                error!(
                    "Cannot resolve remote directory {}, replyString: {}",
                    prefix,
                    session.reply_string().trim()
                );
                return false;
            }
        }
        true
    }

    // ─── RETR ────────────────────────────────────────────────────

    /// Download `remote_path` into `sink`. Directories are never created.
    ///
    /// Relative paths resolve from the root, as for `store`. `sink` is
    /// rewound to its starting position before every retry but not
    /// truncated.
    pub async fn retrieve<S, W>(&self, session: &mut S, remote_path: &str, sink: &mut W) -> bool
    where
        S: RemoteSession + ?Sized,
        W: AsyncWrite + AsyncSeek + Unpin + Send,
    {
        let target = RemotePath::split(remote_path);
        let directory = target.absolute_directory();
        if !cwd(session, &directory).await {
            error!(
                "Cannot change to remote directory {}, replyString: {}",
                directory,
                session.reply_string().trim()
            );
            return false;
        }

        let start = match sink.stream_position().await {
            Ok(pos) => pos,
            Err(e) => {
                error!("Cannot read position of download sink for {}: {}", remote_path, e);
                return false;
            }
        };

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                if let Err(e) = sink.seek(SeekFrom::Start(start)).await {
                    error!("Cannot rewind download sink for {}: {}", remote_path, e);
                    return false;
                }
            }
            match session.retrieve_file(&target.name, sink).await {
                Ok(true) => {
                    info!("Retrieved {} (attempt {})", remote_path, attempt);
                    return true;
                }
                Ok(false) => warn!(
                    "RETR {} failed (attempt {}/{}), replyString: {}",
                    remote_path,
                    attempt,
                    self.max_attempts,
                    session.reply_string().trim()
                ),
                Err(e) => warn!(
                    "RETR {} errored (attempt {}/{}): {}",
                    remote_path, attempt, self.max_attempts, e
                ),
            }
            if !session.is_connected() {
                warn!("Session lost while retrieving {}; giving up", remote_path);
                break;
            }
        }
        error!("Failed to download file: {}", remote_path);
        false
    }

    // ─── DELE ────────────────────────────────────────────────────

    /// Delete `remote_path`, resolved from the root. Exactly one attempt.
    pub async fn delete<S>(&self, session: &mut S, remote_path: &str) -> bool
    where
        S: RemoteSession + ?Sized,
    {
        let absolute = RemotePath::split(remote_path).absolute_path();
        match session.delete_file(&absolute).await {
            Ok(true) => {
                info!("Deleted {}", remote_path);
                true
            }
            Ok(false) => {
                error!(
                    "Failed to delete file: {}, replyString: {}",
                    remote_path,
                    session.reply_string().trim()
                );
                false
            }
            Err(e) => {
                error!("Failed to delete file: {}: {}", remote_path, e);
                false
            }
        }
    }
}

async fn cwd<S: RemoteSession + ?Sized>(session: &mut S, path: &str) -> bool {
    match session.change_working_directory(path).await {
        Ok(ok) => ok,
        Err(e) => {
            debug!("CWD {} errored: {}", path, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::simulated::{SimulatedServer, SimulatedSession};
    use crate::ftp::session::SessionConnector;
    use crate::ftp::types::ConnectOptions;
    use std::io::Cursor;
    use std::sync::Arc;

    async fn session(server: &Arc<SimulatedServer>) -> SimulatedSession {
        let opts = ConnectOptions {
            host: "sim".into(),
            port: 21,
            encoding: "UTF-8".into(),
            connect_timeout: None,
        };
        let mut s = server.connector().connect(&opts).await.unwrap();
        assert!(s.login("user", "secret").await.unwrap());
        server.clear_commands();
        s
    }

    fn mkdirs(server: &SimulatedServer) -> Vec<String> {
        server
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("MKD "))
            .collect()
    }

    #[tokio::test]
    async fn test_store_creates_only_missing_prefixes() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/a");
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"payload".to_vec());
        assert!(TransferOrchestrator::default().store(&mut s, &mut src, "/a/b/c/f.txt").await);

        assert_eq!(mkdirs(&server), vec!["MKD /a/b", "MKD /a/b/c"]);
        assert_eq!(s.working_directory(), "/a/b/c");
        assert_eq!(server.file("/a/b/c/f.txt").as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_store_into_existing_tree_creates_nothing() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/2019");
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"x".to_vec());
        assert!(TransferOrchestrator::default().store(&mut s, &mut src, "/2019/a.txt").await);
        assert!(mkdirs(&server).is_empty());
        assert_eq!(server.counters().mkdirs, 0);
    }

    #[tokio::test]
    async fn test_store_root_resets_working_directory() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/old");
        let mut s = session(&server).await;
        assert!(s.change_working_directory("/old").await.unwrap());

        let mut src = Cursor::new(b"x".to_vec());
        assert!(TransferOrchestrator::default().store(&mut s, &mut src, "top.txt").await);
        assert!(server.file("/top.txt").is_some());
        assert!(server.file("/old/top.txt").is_none());
    }

    #[tokio::test]
    async fn test_store_retries_then_succeeds() {
        let server = SimulatedServer::new("user", "secret");
        server.fail_next_stores(2);
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"retry me".to_vec());
        assert!(TransferOrchestrator::default().store(&mut s, &mut src, "/r.txt").await);
        assert_eq!(server.counters().stores, 3);
        assert_eq!(server.file("/r.txt").as_deref(), Some(&b"retry me"[..]));
    }

    #[tokio::test]
    async fn test_store_gives_up_after_max_attempts() {
        let server = SimulatedServer::new("user", "secret");
        server.fail_next_stores(10);
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"x".to_vec());
        assert!(!TransferOrchestrator::default().store(&mut s, &mut src, "/r.txt").await);
        assert_eq!(server.counters().stores, 4);
        assert!(server.file("/r.txt").is_none());
    }

    #[tokio::test]
    async fn test_store_starts_at_current_position() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"0123456789".to_vec());
        src.set_position(4);
        assert!(TransferOrchestrator::new(2).store(&mut s, &mut src, "/tail.bin").await);
        assert_eq!(server.file("/tail.bin").as_deref(), Some(&b"456789"[..]));
    }

    #[tokio::test]
    async fn test_store_directory_failure_skips_transfer() {
        let server = SimulatedServer::new("user", "secret");
        server.set_mkdir_denied(true);
        let mut s = session(&server).await;

        let mut src = Cursor::new(b"x".to_vec());
        assert!(!TransferOrchestrator::default().store(&mut s, &mut src, "/no/f.txt").await);
        assert_eq!(server.counters().stores, 0);
    }

    #[tokio::test]
    async fn test_store_on_dead_session_sends_nothing() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = session(&server).await;
        server.drop_connections();

        let mut src = Cursor::new(b"x".to_vec());
        assert!(!TransferOrchestrator::default().store(&mut s, &mut src, "f.txt").await);
        assert!(server.commands().is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_store_fails_at_protocol_level() {
        let server = SimulatedServer::new("user", "secret");
        let opts = ConnectOptions {
            host: "sim".into(),
            port: 21,
            encoding: "UTF-8".into(),
            connect_timeout: None,
        };
        let mut s = server.connector().connect(&opts).await.unwrap();
        assert!(!s.login("user", "nope").await.unwrap());

        let mut src = Cursor::new(b"x".to_vec());
        assert!(!TransferOrchestrator::default().store(&mut s, &mut src, "f.txt").await);
        assert_eq!(s.reply_code(), 530);
    }

    #[tokio::test]
    async fn test_retrieve_never_creates_directories() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = session(&server).await;

        let mut sink = Cursor::new(Vec::new());
        assert!(!TransferOrchestrator::default().retrieve(&mut s, "/missing/f.txt", &mut sink).await);
        assert!(mkdirs(&server).is_empty());
        assert_eq!(server.counters().retrieves, 0);
    }

    #[tokio::test]
    async fn test_retrieve_retries_into_rewound_sink() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/d");
        server.put_file("/d/f.txt", b"contents");
        server.fail_next_retrieves(1);
        let mut s = session(&server).await;

        let mut sink = Cursor::new(Vec::new());
        assert!(TransferOrchestrator::default().retrieve(&mut s, "/d/f.txt", &mut sink).await);
        assert_eq!(server.counters().retrieves, 2);
        assert_eq!(sink.into_inner(), b"contents".to_vec());
    }

    #[tokio::test]
    async fn test_retrieve_missing_file_exhausts_attempts() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = session(&server).await;

        let mut sink = Cursor::new(Vec::new());
        assert!(!TransferOrchestrator::new(3).retrieve(&mut s, "/nope.txt", &mut sink).await);
        assert_eq!(server.counters().retrieves, 3);
    }

    #[tokio::test]
    async fn test_delete_single_attempt() {
        let server = SimulatedServer::new("user", "secret");
        server.put_file("/gone.txt", b"x");
        let mut s = session(&server).await;
        let orchestrator = TransferOrchestrator::default();

        assert!(orchestrator.delete(&mut s, "/gone.txt").await);
        assert!(!orchestrator.delete(&mut s, "/gone.txt").await);
        assert_eq!(server.counters().deletes, 2);
        assert_eq!(server.commands(), vec!["DELE /gone.txt", "DELE /gone.txt"]);
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_from_root_whatever_the_working_directory() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/rel");
        server.add_directory("/elsewhere");
        server.put_file("/rel/x.txt", b"hello");
        let mut s = session(&server).await;
        let orchestrator = TransferOrchestrator::default();

        assert!(s.change_working_directory("/elsewhere").await.unwrap());
        let mut sink = Cursor::new(Vec::new());
        assert!(orchestrator.retrieve(&mut s, "rel/x.txt", &mut sink).await);
        assert_eq!(sink.into_inner(), b"hello".to_vec());
        assert!(server.commands().contains(&"CWD /rel".to_string()));

        assert!(s.change_working_directory("/elsewhere").await.unwrap());
        assert!(orchestrator.delete(&mut s, "rel/x.txt").await);
        assert!(server.file("/rel/x.txt").is_none());
        assert!(server.commands().contains(&"DELE /rel/x.txt".to_string()));
    }

    #[tokio::test]
    async fn test_works_through_trait_object() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = session(&server).await;
        let dynamic: &mut dyn RemoteSession = &mut s;

        let mut src = Cursor::new(b"dyn".to_vec());
        assert!(TransferOrchestrator::default().store(dynamic, &mut src, "/d.txt").await);
        assert_eq!(server.file("/d.txt").as_deref(), Some(&b"dyn"[..]));
    }
}
