//! Remote session abstraction.
//!
//! The wire protocol lives outside this crate. Anything that can open an
//! FTP control connection and issue the handful of commands below can be
//! pooled: implement `SessionConnector` for the thing that dials, and
//! `RemoteSession` for the connection it hands back.
//!
//! Command methods follow the usual FTP client convention: `Ok(false)`
//! means the server refused (inspect `reply_code` / `reply_string`),
//! `Err(_)` means the connection itself misbehaved.

use crate::ftp::error::FtpResult;
use crate::ftp::types::{ConnectOptions, TransferType};
use tokio::io::{AsyncRead, AsyncWrite};

/// `true` for 2xx replies.
pub fn is_positive_completion(code: u16) -> bool {
    (200..300).contains(&code)
}

/// One control connection to the remote server.
#[async_trait::async_trait]
pub trait RemoteSession: Send {
    /// Code of the last reply received.
    fn reply_code(&self) -> u16;

    /// Full text of the last reply received.
    fn reply_string(&self) -> String;

    /// Local view of the control connection.
    fn is_connected(&self) -> bool;

    async fn login(&mut self, username: &str, password: &str) -> FtpResult<bool>;

    /// Size of the buffer used for data transfers.
    fn set_buffer_size(&mut self, size: usize);

    async fn set_transfer_type(&mut self, transfer_type: TransferType) -> FtpResult<bool>;

    /// Use PASV for subsequent data connections.
    fn enter_passive_mode(&mut self);

    async fn noop(&mut self) -> FtpResult<bool>;

    async fn change_working_directory(&mut self, path: &str) -> FtpResult<bool>;

    async fn make_directory(&mut self, path: &str) -> FtpResult<bool>;

    async fn store_file(
        &mut self,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> FtpResult<bool>;

    async fn retrieve_file(
        &mut self,
        name: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<bool>;

    async fn delete_file(&mut self, path: &str) -> FtpResult<bool>;

    async fn logout(&mut self) -> FtpResult<bool>;

    async fn disconnect(&mut self) -> FtpResult<()>;
}

/// Dials the server and returns a connected (not yet authenticated) session.
///
/// The returned session's `reply_code` must hold the server greeting.
#[async_trait::async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession + 'static;

    async fn connect(&self, options: &ConnectOptions) -> FtpResult<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_completion_range() {
        assert!(is_positive_completion(200));
        assert!(is_positive_completion(226));
        assert!(is_positive_completion(257));
        assert!(!is_positive_completion(150));
        assert!(!is_positive_completion(331));
        assert!(!is_positive_completion(421));
        assert!(!is_positive_completion(530));
    }
}
