//! Public transfer facade and the two session access strategies.
//!
//! `FtpTransfers` wraps local resources (paths, files, byte slices,
//! streams), borrows a session from its `SessionSource`, runs the shared
//! `TransferOrchestrator` on it and hands the session back. Every public
//! operation answers `bool`; the reason for a `false` is in the log.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::factory::SessionFactory;
use crate::ftp::pool::{PooledSession, SessionPool};
use crate::ftp::session::{is_positive_completion, RemoteSession, SessionConnector};
use crate::ftp::transfer::TransferOrchestrator;
use log::{error, warn};
use std::io::Cursor;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

// ─── Access strategies ───────────────────────────────────────────────

/// Where `FtpTransfers` gets its sessions from and where they go afterwards.
#[async_trait::async_trait]
pub trait SessionSource: Send + Sync {
    type Session: RemoteSession + 'static;
    type Lease: DerefMut<Target = Self::Session> + Send;

    async fn acquire_session(&self) -> FtpResult<Self::Lease>;

    /// Hand the session back. Never fails.
    async fn release_session(&self, lease: Self::Lease);
}

/// A session owned for exactly one operation.
pub struct OnceSession<S>(S);

impl<S> Deref for OnceSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S> DerefMut for OnceSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}

/// Unpooled strategy: a fresh session per operation, always torn down.
pub struct OnceSource<C: SessionConnector> {
    factory: Arc<SessionFactory<C>>,
}

impl<C: SessionConnector> OnceSource<C> {
    pub fn new(factory: Arc<SessionFactory<C>>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<SessionFactory<C>> {
        &self.factory
    }
}

#[async_trait::async_trait]
impl<C: SessionConnector> SessionSource for OnceSource<C> {
    type Session = C::Session;
    type Lease = OnceSession<C::Session>;

    async fn acquire_session(&self) -> FtpResult<Self::Lease> {
        self.factory.create().await.map(OnceSession)
    }

    async fn release_session(&self, lease: Self::Lease) {
        self.factory.destroy(lease.0).await;
    }
}

/// Pooled strategy: borrow from a shared pool, return for reuse.
pub struct PooledSource<C: SessionConnector> {
    pool: Arc<SessionPool<C>>,
    max_acquire_attempts: u32,
}

impl<C: SessionConnector> PooledSource<C> {
    pub fn new(pool: Arc<SessionPool<C>>) -> Self {
        let max_acquire_attempts = pool.factory().config().max_acquire_attempts.max(1);
        Self {
            pool,
            max_acquire_attempts,
        }
    }

    pub fn pool(&self) -> &Arc<SessionPool<C>> {
        &self.pool
    }
}

#[async_trait::async_trait]
impl<C: SessionConnector> SessionSource for PooledSource<C> {
    type Session = C::Session;
    type Lease = PooledSession<C>;

    /// Borrow a session whose last reply was a positive completion.
    ///
    /// Unusable sessions are invalidated and the borrow retried, at most
    /// `max_acquire_attempts` times in total.
    async fn acquire_session(&self) -> FtpResult<Self::Lease> {
        for attempt in 1..=self.max_acquire_attempts {
            let lease = self.pool.acquire().await?;
            if lease.is_connected() && is_positive_completion(lease.reply_code()) {
                return Ok(lease);
            }
            warn!(
                "Pooled FTP session unusable (connected: {}, replyCode: {}); invalidating (attempt {}/{})",
                lease.is_connected(),
                lease.reply_code(),
                attempt,
                self.max_acquire_attempts
            );
            self.pool.invalidate(lease).await;
        }
        Err(FtpError::acquire_exhausted(self.max_acquire_attempts))
    }

    async fn release_session(&self, lease: Self::Lease) {
        self.pool.release(lease).await;
    }
}

// ─── Facade ──────────────────────────────────────────────────────────

pub struct FtpTransfers<Src: SessionSource> {
    source: Src,
    orchestrator: TransferOrchestrator,
}

impl<C: SessionConnector> FtpTransfers<OnceSource<C>> {
    /// Transfers that open and close a session per operation.
    pub fn unpooled(factory: Arc<SessionFactory<C>>) -> Self {
        let orchestrator = TransferOrchestrator::new(factory.config().max_transfer_attempts);
        Self::new(OnceSource::new(factory), orchestrator)
    }
}

impl<C: SessionConnector> FtpTransfers<PooledSource<C>> {
    /// Transfers that borrow from `pool`.
    pub fn pooled(pool: Arc<SessionPool<C>>) -> Self {
        let orchestrator =
            TransferOrchestrator::new(pool.factory().config().max_transfer_attempts);
        Self::new(PooledSource::new(pool), orchestrator)
    }

    pub fn pool(&self) -> &Arc<SessionPool<C>> {
        self.source.pool()
    }

    /// Shut the underlying pool down.
    pub async fn shutdown(&self) {
        self.source.pool().shutdown().await;
    }
}

impl<Src: SessionSource> FtpTransfers<Src> {
    pub fn new(source: Src, orchestrator: TransferOrchestrator) -> Self {
        Self {
            source,
            orchestrator,
        }
    }

    pub fn source(&self) -> &Src {
        &self.source
    }

    pub fn orchestrator(&self) -> &TransferOrchestrator {
        &self.orchestrator
    }

    async fn lease_for(&self, op: &str, remote_path: &str) -> Option<Src::Lease> {
        match self.source.acquire_session().await {
            Ok(lease) => Some(lease),
            Err(e) => {
                error!("No FTP session for {} {}: {}", op, remote_path, e);
                None
            }
        }
    }

    // ─── Upload ──────────────────────────────────────────────────

    /// Upload the local file at `local_path`. A blank path fails without
    /// touching the network.
    pub async fn upload_file(&self, local_path: &str, remote_path: &str) -> bool {
        if local_path.trim().is_empty() {
            warn!("Upload to {} skipped: local path is blank", remote_path);
            return false;
        }
        self.upload_local_file(Path::new(local_path), remote_path).await
    }

    pub async fn upload_local_file(&self, local: &Path, remote_path: &str) -> bool {
        match tokio::fs::metadata(local).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                warn!("Upload skipped: {} is not a regular file", local.display());
                return false;
            }
            Err(e) => {
                warn!("Upload skipped: cannot stat {}: {}", local.display(), e);
                return false;
            }
        }
        let mut file = match tokio::fs::File::open(local).await {
            Ok(f) => f,
            Err(e) => {
                error!("Cannot open {} for upload: {}", local.display(), e);
                return false;
            }
        };
        self.upload_stream(&mut file, remote_path).await
    }

    pub async fn upload_bytes(&self, bytes: &[u8], remote_path: &str) -> bool {
        if bytes.is_empty() {
            warn!("Upload to {} skipped: no content", remote_path);
            return false;
        }
        self.upload_stream(&mut Cursor::new(bytes), remote_path).await
    }

    /// Upload from a seekable reader. The reader is rewound to where it
    /// started before each retry.
    pub async fn upload_stream<R>(&self, content: &mut R, remote_path: &str) -> bool
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let remote_path = or_root(remote_path);
        let Some(mut lease) = self.lease_for("upload", remote_path).await else {
            return false;
        };
        let ok = self
            .orchestrator
            .store(&mut *lease, content, remote_path)
            .await;
        self.source.release_session(lease).await;
        ok
    }

    // ─── Download ────────────────────────────────────────────────

    /// Download into the local file at `local_path`, creating its parent
    /// directories. A blank path fails without touching the network.
    pub async fn download_file(&self, remote_path: &str, local_path: &str) -> bool {
        if local_path.trim().is_empty() {
            warn!("Download of {} skipped: local path is blank", remote_path);
            return false;
        }
        self.download_to_file(remote_path, Path::new(local_path)).await
    }

    pub async fn download_to_file(&self, remote_path: &str, local: &Path) -> bool {
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("Cannot create {}: {}", parent.display(), e);
                return false;
            }
        }
        let mut file = match tokio::fs::File::create(local).await {
            Ok(f) => f,
            Err(e) => {
                error!("Cannot create {} for download: {}", local.display(), e);
                return false;
            }
        };
        if !self.download_stream(remote_path, &mut file).await {
            return false;
        }
        // Cut off whatever an aborted, longer attempt left past the final one.
        let finish = async {
            file.flush().await?;
            let end = file.stream_position().await?;
            file.set_len(end).await
        };
        match finish.await {
            Ok(()) => true,
            Err(e) => {
                error!("Cannot finish writing {}: {}", local.display(), e);
                false
            }
        }
    }

    /// Download into a seekable writer. The writer is rewound to where it
    /// started before each retry but never truncated, so bytes from an
    /// aborted attempt that ran past the final one stay behind the last
    /// written position. `download_to_file` trims them.
    pub async fn download_stream<W>(&self, remote_path: &str, sink: &mut W) -> bool
    where
        W: AsyncWrite + AsyncSeek + Unpin + Send,
    {
        let remote_path = or_root(remote_path);
        let Some(mut lease) = self.lease_for("download", remote_path).await else {
            return false;
        };
        let ok = self
            .orchestrator
            .retrieve(&mut *lease, remote_path, sink)
            .await;
        self.source.release_session(lease).await;
        ok
    }

    // ─── Delete ──────────────────────────────────────────────────

    pub async fn delete_file(&self, remote_path: &str) -> bool {
        if remote_path.trim().is_empty() {
            warn!("Delete skipped: remote path is blank");
            return false;
        }
        let Some(mut lease) = self.lease_for("delete", remote_path).await else {
            return false;
        };
        let ok = self.orchestrator.delete(&mut *lease, remote_path).await;
        self.source.release_session(lease).await;
        ok
    }
}

fn or_root(remote_path: &str) -> &str {
    if remote_path.trim().is_empty() {
        "/"
    } else {
        remote_path
    }
}
