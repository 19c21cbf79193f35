//! In-memory FTP server and session.
//!
//! `SimulatedServer` keeps a directory tree, file contents and per-command
//! counters behind a mutex; `SimulatedConnector` hands out
//! `SimulatedSession`s bound to it. Failure knobs (refused greeting,
//! unreachable host, rejected credentials, failing transfers, dropped
//! connections) make every error path of the pool and the orchestrator
//! reachable without a network.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::{is_positive_completion, RemoteSession, SessionConnector};
use crate::ftp::types::{ConnectOptions, TransferType};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// How many times each command reached the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerCounters {
    pub connects: usize,
    pub logins: usize,
    pub logouts: usize,
    pub disconnects: usize,
    pub noops: usize,
    pub mkdirs: usize,
    pub stores: usize,
    pub retrieves: usize,
    pub deletes: usize,
}

struct ServerState {
    username: String,
    password: String,
    greeting_code: u16,
    reachable: bool,
    connect_delay: Option<Duration>,
    directories: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
    fail_next_stores: u32,
    fail_next_retrieves: u32,
    aborted_retrieve_payload: Vec<u8>,
    noop_failing: bool,
    mkdir_denied: bool,
    /// Bumped by `drop_connections`; sessions from an older epoch are dead.
    epoch: u64,
    counters: ServerCounters,
    commands: Vec<String>,
}

/// In-memory stand-in for a remote FTP server.
pub struct SimulatedServer {
    state: Mutex<ServerState>,
}

impl SimulatedServer {
    /// A reachable server that accepts exactly one set of credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Arc<Self> {
        let mut directories = HashSet::new();
        directories.insert("/".to_string());
        Arc::new(Self {
            state: Mutex::new(ServerState {
                username: username.into(),
                password: password.into(),
                greeting_code: 220,
                reachable: true,
                connect_delay: None,
                directories,
                files: HashMap::new(),
                fail_next_stores: 0,
                fail_next_retrieves: 0,
                aborted_retrieve_payload: Vec::new(),
                noop_failing: false,
                mkdir_denied: false,
                epoch: 0,
                counters: ServerCounters::default(),
                commands: Vec::new(),
            }),
        })
    }

    pub fn connector(self: &Arc<Self>) -> SimulatedConnector {
        SimulatedConnector {
            server: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Knobs ───────────────────────────────────────────────────

    /// Reply code sent on connect (e.g. 421 or 554 to refuse).
    pub fn set_greeting(&self, code: u16) {
        self.lock().greeting_code = code;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.lock().connect_delay = delay;
    }

    /// Make the next `n` STOR commands fail with 451.
    pub fn fail_next_stores(&self, n: u32) {
        self.lock().fail_next_stores = n;
    }

    /// Make the next `n` RETR commands fail with 451.
    pub fn fail_next_retrieves(&self, n: u32) {
        self.lock().fail_next_retrieves = n;
    }

    /// Bytes sent down the data connection before an injected RETR failure.
    pub fn set_aborted_retrieve_payload(&self, payload: &[u8]) {
        self.lock().aborted_retrieve_payload = payload.to_vec();
    }

    pub fn set_noop_failing(&self, failing: bool) {
        self.lock().noop_failing = failing;
    }

    pub fn set_mkdir_denied(&self, denied: bool) {
        self.lock().mkdir_denied = denied;
    }

    /// Silently kill every open control connection.
    pub fn drop_connections(&self) {
        self.lock().epoch += 1;
    }

    pub fn add_directory(&self, path: &str) {
        let mut st = self.lock();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            st.directories.insert(current.clone());
        }
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.lock().files.insert(path.to_string(), content.to_vec());
    }

    // ─── Inspection ──────────────────────────────────────────────

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_directory(&self, path: &str) -> bool {
        self.lock().directories.contains(path)
    }

    pub fn counters(&self) -> ServerCounters {
        self.lock().counters
    }

    /// Every command received so far, e.g. `"MKD /a"`, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }
}

/// Dials a `SimulatedServer`.
#[derive(Clone)]
pub struct SimulatedConnector {
    server: Arc<SimulatedServer>,
}

impl SimulatedConnector {
    pub fn server(&self) -> &Arc<SimulatedServer> {
        &self.server
    }
}

#[async_trait::async_trait]
impl SessionConnector for SimulatedConnector {
    type Session = SimulatedSession;

    async fn connect(&self, options: &ConnectOptions) -> FtpResult<SimulatedSession> {
        let delay = self.server.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut st = self.server.lock();
        if !st.reachable {
            return Err(FtpError::connection_failed(format!(
                "TCP connect to {}:{}: connection refused",
                options.host, options.port
            )));
        }
        st.counters.connects += 1;
        let code = st.greeting_code;
        let epoch = st.epoch;
        drop(st);

        let text = if is_positive_completion(code) {
            format!("{} Simulated FTP server ready", code)
        } else {
            format!("{} Service not available", code)
        };
        log::trace!("<<< {}", text);
        Ok(SimulatedSession {
            id: Uuid::new_v4().to_string(),
            server: Arc::clone(&self.server),
            epoch,
            connected: true,
            authenticated: false,
            cwd: "/".into(),
            reply_code: code,
            reply_text: text,
            buffer_size: 0,
            transfer_type: TransferType::Ascii,
            passive: false,
        })
    }
}

/// One control connection to a `SimulatedServer`.
pub struct SimulatedSession {
    pub id: String,
    server: Arc<SimulatedServer>,
    epoch: u64,
    connected: bool,
    authenticated: bool,
    cwd: String,
    reply_code: u16,
    reply_text: String,
    buffer_size: usize,
    transfer_type: TransferType,
    passive: bool,
}

impl SimulatedSession {
    pub fn working_directory(&self) -> &str {
        &self.cwd
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    fn reply(&mut self, code: u16, text: &str) -> bool {
        self.reply_code = code;
        self.reply_text = format!("{} {}", code, text);
        log::trace!("<<< {}", self.reply_text);
        is_positive_completion(code)
    }

    /// Record the command and fail if the connection is gone.
    fn begin(&mut self, st: &mut ServerState, cmd: String) -> FtpResult<()> {
        if !self.connected {
            return Err(FtpError::disconnected("Not connected"));
        }
        if self.epoch != st.epoch {
            self.connected = false;
            return Err(FtpError::disconnected("Connection reset by server"));
        }
        log::trace!(">>> {}", cmd);
        st.commands.push(cmd);
        Ok(())
    }

    /// Absolute, normalised form of `path` relative to the working directory.
    fn resolve(&self, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.cwd, path)
        };
        let mut parts: Vec<&str> = Vec::new();
        for part in joined.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                p => parts.push(p),
            }
        }
        format!("/{}", parts.join("/"))
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".into(),
            Some(idx) => path[..idx].to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RemoteSession for SimulatedSession {
    fn reply_code(&self) -> u16 {
        self.reply_code
    }

    fn reply_string(&self) -> String {
        self.reply_text.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn login(&mut self, username: &str, password: &str) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        self.begin(&mut st, format!("USER {}", username))?;
        if username == st.username && password == st.password {
            st.counters.logins += 1;
            self.authenticated = true;
            Ok(self.reply(230, "Login successful."))
        } else {
            self.authenticated = false;
            Ok(self.reply(530, "Login incorrect."))
        }
    }

    fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    async fn set_transfer_type(&mut self, transfer_type: TransferType) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        let cmd = match transfer_type {
            TransferType::Ascii => "TYPE A",
            TransferType::Binary => "TYPE I",
        };
        self.begin(&mut st, cmd.to_string())?;
        if !self.authenticated {
            return Ok(self.reply(530, "Please login with USER and PASS."));
        }
        self.transfer_type = transfer_type;
        Ok(self.reply(200, "Switching mode."))
    }

    fn enter_passive_mode(&mut self) {
        self.passive = true;
    }

    async fn noop(&mut self) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        self.begin(&mut st, "NOOP".into())?;
        st.counters.noops += 1;
        if st.noop_failing {
            return Ok(self.reply(502, "NOOP not implemented."));
        }
        if !self.authenticated {
            return Ok(self.reply(530, "Please login with USER and PASS."));
        }
        Ok(self.reply(200, "NOOP ok."))
    }

    async fn change_working_directory(&mut self, path: &str) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        let target = self.resolve(path);
        self.begin(&mut st, format!("CWD {}", target))?;
        if !self.authenticated {
            return Ok(self.reply(530, "Please login with USER and PASS."));
        }
        if st.directories.contains(&target) {
            self.cwd = target;
            Ok(self.reply(250, "Directory successfully changed."))
        } else {
            Ok(self.reply(550, "Failed to change directory."))
        }
    }

    async fn make_directory(&mut self, path: &str) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        let target = self.resolve(path);
        self.begin(&mut st, format!("MKD {}", target))?;
        st.counters.mkdirs += 1;
        if !self.authenticated {
            return Ok(self.reply(530, "Please login with USER and PASS."));
        }
        if st.mkdir_denied
            || st.directories.contains(&target)
            || !st.directories.contains(&Self::parent_of(&target))
        {
            return Ok(self.reply(550, "Create directory operation failed."));
        }
        st.directories.insert(target.clone());
        Ok(self.reply(257, &format!("\"{}\" created", target)))
    }

    async fn store_file(
        &mut self,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let target = self.resolve(name);
        {
            let mut st = server.lock();
            self.begin(&mut st, format!("STOR {}", target))?;
            st.counters.stores += 1;
            if !self.authenticated {
                return Ok(self.reply(530, "Please login with USER and PASS."));
            }
            if name.trim().is_empty() {
                return Ok(self.reply(501, "Syntax error in parameters or arguments."));
            }
            if st.fail_next_stores > 0 {
                st.fail_next_stores -= 1;
                return Ok(self.reply(451, "Requested action aborted: local error in processing."));
            }
        }

        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;

        let mut st = server.lock();
        st.files.insert(target, data);
        Ok(self.reply(226, "Transfer complete."))
    }

    async fn retrieve_file(
        &mut self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let target = self.resolve(name);
        let (data, aborted) = {
            let mut st = server.lock();
            self.begin(&mut st, format!("RETR {}", target))?;
            st.counters.retrieves += 1;
            if !self.authenticated {
                return Ok(self.reply(530, "Please login with USER and PASS."));
            }
            if st.fail_next_retrieves > 0 {
                st.fail_next_retrieves -= 1;
                (st.aborted_retrieve_payload.clone(), true)
            } else {
                match st.files.get(&target) {
                    Some(data) => (data.clone(), false),
                    None => return Ok(self.reply(550, "Failed to open file.")),
                }
            }
        };

        sink.write_all(&data).await?;
        sink.flush().await?;
        if aborted {
            return Ok(self.reply(451, "Requested action aborted: local error in processing."));
        }
        Ok(self.reply(226, "Transfer complete."))
    }

    async fn delete_file(&mut self, path: &str) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        let target = self.resolve(path);
        self.begin(&mut st, format!("DELE {}", target))?;
        st.counters.deletes += 1;
        if !self.authenticated {
            return Ok(self.reply(530, "Please login with USER and PASS."));
        }
        if st.files.remove(&target).is_some() {
            Ok(self.reply(250, "Delete operation successful."))
        } else {
            Ok(self.reply(550, "Delete operation failed."))
        }
    }

    async fn logout(&mut self) -> FtpResult<bool> {
        let server = Arc::clone(&self.server);
        let mut st = server.lock();
        self.begin(&mut st, "QUIT".into())?;
        st.counters.logouts += 1;
        self.authenticated = false;
        Ok(self.reply(221, "Goodbye."))
    }

    async fn disconnect(&mut self) -> FtpResult<()> {
        self.connected = false;
        self.authenticated = false;
        self.server.lock().counters.disconnects += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn logged_in(server: &Arc<SimulatedServer>) -> SimulatedSession {
        let opts = ConnectOptions {
            host: "sim".into(),
            port: 21,
            encoding: "UTF-8".into(),
            connect_timeout: None,
        };
        let mut s = server.connector().connect(&opts).await.unwrap();
        assert!(s.login("user", "secret").await.unwrap());
        s
    }

    #[tokio::test]
    async fn test_mkdir_requires_parent() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = logged_in(&server).await;
        assert!(!s.make_directory("/a/b").await.unwrap());
        assert!(s.make_directory("/a").await.unwrap());
        assert!(s.make_directory("/a/b").await.unwrap());
        assert!(!s.make_directory("/a").await.unwrap());
        assert_eq!(s.reply_code(), 550);
        assert!(server.has_directory("/a/b"));
    }

    #[tokio::test]
    async fn test_store_relative_to_cwd() {
        let server = SimulatedServer::new("user", "secret");
        server.add_directory("/in/box");
        let mut s = logged_in(&server).await;
        assert!(s.change_working_directory("/in/box").await.unwrap());
        let mut src = Cursor::new(b"hello".to_vec());
        assert!(s.store_file("x.txt", &mut src).await.unwrap());
        assert_eq!(server.file("/in/box/x.txt").as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_dropped_connection_errors() {
        let server = SimulatedServer::new("user", "secret");
        let mut s = logged_in(&server).await;
        server.drop_connections();
        assert!(s.noop().await.is_err());
        assert!(!s.is_connected());
    }

    #[tokio::test]
    async fn test_unauthenticated_commands_refused() {
        let server = SimulatedServer::new("user", "secret");
        let opts = ConnectOptions {
            host: "sim".into(),
            port: 21,
            encoding: "UTF-8".into(),
            connect_timeout: None,
        };
        let mut s = server.connector().connect(&opts).await.unwrap();
        assert!(!s.login("user", "wrong").await.unwrap());
        assert!(!s.change_working_directory("/").await.unwrap());
        assert_eq!(s.reply_code(), 530);
    }
}
