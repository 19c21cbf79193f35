//! Session pool — bounded queue of idle sessions plus a growth budget.
//!
//! Two resources are tracked separately:
//! - the idle queue (`mpsc` channel, capacity `2 × target`) holding warm
//!   sessions, FIFO;
//! - the slot semaphore, holding one permit per session that *could* still
//!   be opened. Every live session (idle or borrowed) owns one forgotten
//!   permit; destroying a session hands its permit back.
//!
//! `acquire` prefers an idle session, then opens a new one while slots
//! remain, and only then waits for either. The number of live sessions
//! therefore never exceeds the capacity, and a waiter is woken both by a
//! returned session and by a destroyed one.
//!
//! A slot claimed by an `acquire` that is cancelled mid-way (timeout,
//! `select!`) is handed back by `SlotGuard`, or by the lease's drop once
//! a session exists.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::factory::SessionFactory;
use crate::ftp::session::{RemoteSession, SessionConnector};
use crate::ftp::types::PoolStats;
use log::{debug, error, info, warn};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::time::timeout;

/// A session borrowed from a `SessionPool`.
///
/// Hand it back with `SessionPool::release` or `SessionPool::invalidate`.
/// Dropping it instead tears the session down on a background task and
/// frees its slot once that finishes.
pub struct PooledSession<C: SessionConnector> {
    session: Option<C::Session>,
    factory: Arc<SessionFactory<C>>,
    slots: Arc<Semaphore>,
}

impl<C: SessionConnector> PooledSession<C> {
    fn new(session: C::Session, factory: Arc<SessionFactory<C>>, slots: Arc<Semaphore>) -> Self {
        Self {
            session: Some(session),
            factory,
            slots,
        }
    }

    fn take(&mut self) -> Option<C::Session> {
        self.session.take()
    }
}

impl<C: SessionConnector> Deref for PooledSession<C> {
    type Target = C::Session;

    fn deref(&self) -> &C::Session {
        // Only `release` / `invalidate` empty the lease, and both consume it.
        self.session.as_ref().expect("pooled session used after release")
    }
}

impl<C: SessionConnector> DerefMut for PooledSession<C> {
    fn deref_mut(&mut self) -> &mut C::Session {
        self.session.as_mut().expect("pooled session used after release")
    }
}

impl<C: SessionConnector> Drop for PooledSession<C> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Pooled FTP session dropped without release; closing it in the background");
                let factory = Arc::clone(&self.factory);
                let slots = Arc::clone(&self.slots);
                handle.spawn(async move {
                    factory.destroy(session).await;
                    slots.add_permits(1);
                });
            }
            Err(_) => {
                warn!("Pooled FTP session dropped outside a runtime; closing it without logout");
                drop(session);
                self.slots.add_permits(1);
            }
        }
    }
}

/// One unit of capacity claimed by an `acquire` still in progress.
/// Handed back on drop unless the session opened into it was leased out.
struct SlotGuard {
    slots: Arc<Semaphore>,
    armed: bool,
}

impl SlotGuard {
    fn new(slots: Arc<Semaphore>) -> Self {
        Self { slots, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.slots.add_permits(1);
        }
    }
}

enum Slot<S> {
    Idle(S),
    /// A slot was claimed; a new session must be opened into it.
    Empty(SlotGuard),
}

pub struct SessionPool<C: SessionConnector> {
    factory: Arc<SessionFactory<C>>,
    idle_tx: mpsc::Sender<C::Session>,
    idle_rx: Mutex<mpsc::Receiver<C::Session>>,
    idle: AtomicUsize,
    slots: Arc<Semaphore>,
    target_size: usize,
    capacity: usize,
    release_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl<C: SessionConnector> SessionPool<C> {
    /// Build the pool and open `pool_size` warm sessions.
    ///
    /// Any failure during the initial fill tears down what was opened and
    /// fails construction.
    pub async fn new(factory: Arc<SessionFactory<C>>) -> FtpResult<Self> {
        let cfg = factory.config();
        cfg.validate()?;
        let target_size = cfg.pool_size;
        let capacity = cfg.capacity();
        let release_timeout = cfg.release_timeout();

        let mut warm = Vec::with_capacity(target_size);
        for _ in 0..target_size {
            match factory.create().await {
                Ok(session) => warm.push(session),
                Err(e) => {
                    error!(
                        "Failed to initialize FTP session pool ({}/{} sessions opened): {}",
                        warm.len(),
                        target_size,
                        e
                    );
                    for session in warm {
                        factory.destroy(session).await;
                    }
                    return Err(FtpError::pool_init(format!(
                        "Failed to initialize FTP session pool: {}",
                        e
                    )));
                }
            }
        }

        let (idle_tx, idle_rx) = mpsc::channel(capacity);
        let slots = Arc::new(Semaphore::new(capacity - target_size));
        let mut idle = 0;
        for session in warm {
            match idle_tx.try_send(session) {
                Ok(()) => idle += 1,
                Err(e) => {
                    factory.destroy(e.into_inner()).await;
                    slots.add_permits(1);
                }
            }
        }
        let (closed, _) = watch::channel(false);

        info!(
            "FTP session pool ready: {} warm sessions, capacity {}",
            idle, capacity
        );
        Ok(Self {
            factory,
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            idle: AtomicUsize::new(idle),
            slots,
            target_size,
            capacity,
            release_timeout,
            closed,
        })
    }

    pub fn factory(&self) -> &Arc<SessionFactory<C>> {
        &self.factory
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            target_size: self.target_size,
            capacity: self.capacity,
            idle: self.idle_count(),
            closed: self.is_closed(),
        }
    }

    // ─── Borrow / return ─────────────────────────────────────────

    /// Borrow a session, waiting until one is idle or a slot frees up.
    ///
    /// An idle session that fails the NOOP check is destroyed and replaced
    /// by a fresh one. Liveness can still change before the caller uses
    /// it; the pooled access strategy re-checks.
    pub async fn acquire(&self) -> FtpResult<PooledSession<C>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(FtpError::pool_closed());
        }

        let slot = tokio::select! {
            slot = self.next_slot() => slot?,
            _ = closed.changed() => return Err(FtpError::pool_closed()),
        };

        match slot {
            Slot::Idle(session) => {
                // From here on a cancelled `acquire` drops the lease, which
                // tears the session down and frees its slot.
                let mut lease = self.lease(session);
                if self.factory.validate(&mut *lease).await {
                    return Ok(lease);
                }
                debug!("Idle FTP session failed validation; replacing it");
                let slot = SlotGuard::new(Arc::clone(&self.slots));
                if let Some(stale) = lease.take() {
                    self.factory.destroy(stale).await;
                }
                self.open_in_slot(slot).await
            }
            Slot::Empty(slot) => self.open_in_slot(slot).await,
        }
    }

    async fn next_slot(&self) -> FtpResult<Slot<C::Session>> {
        let mut rx = self.idle_rx.lock().await;
        if let Ok(session) = rx.try_recv() {
            self.idle.fetch_sub(1, Ordering::SeqCst);
            return Ok(Slot::Idle(session));
        }
        if let Ok(permit) = self.slots.try_acquire() {
            permit.forget();
            return Ok(Slot::Empty(SlotGuard::new(Arc::clone(&self.slots))));
        }

        tokio::select! {
            session = rx.recv() => match session {
                Some(session) => {
                    self.idle.fetch_sub(1, Ordering::SeqCst);
                    Ok(Slot::Idle(session))
                }
                None => Err(FtpError::pool_closed()),
            },
            permit = self.slots.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(Slot::Empty(SlotGuard::new(Arc::clone(&self.slots))))
                }
                Err(_) => Err(FtpError::pool_closed()),
            },
        }
    }

    /// Open a session into a claimed slot. The slot goes back if opening
    /// fails or the caller stops waiting.
    async fn open_in_slot(&self, slot: SlotGuard) -> FtpResult<PooledSession<C>> {
        let session = self.factory.create().await?;
        slot.disarm();
        Ok(self.lease(session))
    }

    fn lease(&self, session: C::Session) -> PooledSession<C> {
        PooledSession::new(session, Arc::clone(&self.factory), Arc::clone(&self.slots))
    }

    /// Return a borrowed session.
    ///
    /// Connected sessions go back to the idle queue while it holds fewer
    /// than `target_size`; everything else is destroyed. Never fails.
    pub async fn release(&self, mut lease: PooledSession<C>) {
        let Some(session) = lease.take() else {
            return;
        };

        if self.is_closed() {
            self.retire(session).await;
            return;
        }
        if !session.is_connected() {
            debug!("Returned FTP session is disconnected; destroying it");
            self.retire(session).await;
            return;
        }
        if self.idle_count() >= self.target_size {
            debug!(
                "FTP pool already holds {} idle sessions; destroying returned session",
                self.target_size
            );
            self.retire(session).await;
            return;
        }

        match timeout(self.release_timeout, self.idle_tx.reserve()).await {
            Ok(Ok(permit)) => {
                self.idle.fetch_add(1, Ordering::SeqCst);
                permit.send(session);
            }
            Ok(Err(_)) => self.retire(session).await,
            Err(_) => {
                warn!(
                    "Timed out after {:?} returning FTP session to the pool; destroying it",
                    self.release_timeout
                );
                self.retire(session).await;
            }
        }
    }

    /// Destroy a borrowed session instead of returning it.
    pub async fn invalidate(&self, mut lease: PooledSession<C>) {
        if let Some(session) = lease.take() {
            self.retire(session).await;
        }
    }

    async fn retire(&self, session: C::Session) {
        self.factory.destroy(session).await;
        self.slots.add_permits(1);
    }

    // ─── Teardown ────────────────────────────────────────────────

    /// Close the pool and destroy every idle session.
    ///
    /// Waiting `acquire` calls fail with `PoolClosed`; sessions still
    /// borrowed are destroyed when they come back. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.slots.close();

        let mut rx = self.idle_rx.lock().await;
        rx.close();
        let mut destroyed = 0usize;
        while let Some(session) = rx.recv().await {
            self.idle.fetch_sub(1, Ordering::SeqCst);
            self.factory.destroy(session).await;
            destroyed += 1;
        }
        info!("FTP session pool shut down; {} idle sessions closed", destroyed);
    }

    /// Run `body` with the pool and shut it down afterwards.
    pub async fn scope<F, Fut, T>(self: Arc<Self>, body: F) -> T
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = T>,
    {
        let out = body(Arc::clone(&self)).await;
        self.shutdown().await;
        out
    }
}

impl<C: SessionConnector> Drop for SessionPool<C> {
    fn drop(&mut self) {
        if *self.closed.borrow() {
            return;
        }
        let rx = self.idle_rx.get_mut();
        let mut idle = Vec::new();
        while let Ok(session) = rx.try_recv() {
            idle.push(session);
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    "FTP session pool dropped without shutdown; closing {} idle sessions in the background",
                    idle.len()
                );
                let factory = Arc::clone(&self.factory);
                handle.spawn(async move {
                    for session in idle {
                        factory.destroy(session).await;
                    }
                });
            }
            Err(_) => warn!(
                "FTP session pool dropped outside a runtime; {} idle sessions closed without logout",
                idle.len()
            ),
        }
    }
}
