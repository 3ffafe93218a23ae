//! Control socket client.
//!
//! One newline-terminated command per connection. The response is read until
//! the peer closes; a response longer than `limit` bytes is an error rather
//! than a silently cut reply. Connect and read share a single deadline.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("control socket {0} does not exist")]
    Missing(PathBuf),

    #[error("cannot connect to control socket: {0}")]
    Connect(#[source] io::Error),

    #[error("control socket i/o failed: {0}")]
    Io(#[source] io::Error),

    #[error("control socket did not answer within {0:?}")]
    Timeout(Duration),

    #[error("control socket response truncated at {0} bytes")]
    Truncated(usize),
}

impl SocketError {
    /// True when the socket cannot be reached at all (fallback applies).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SocketError::Missing(_) | SocketError::Connect(_))
    }
}

#[derive(Debug, Clone)]
pub struct ControlSocket {
    path: PathBuf,
    timeout: Duration,
    limit: usize,
}

impl ControlSocket {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, limit: usize) -> Self {
        Self {
            path: path.into(),
            timeout,
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Send `command` and return the (lossily decoded) response.
    pub async fn send(&self, command: &str) -> Result<String, SocketError> {
        if !self.exists() {
            return Err(SocketError::Missing(self.path.clone()));
        }

        match time::timeout(self.timeout, self.exchange(command)).await {
            Ok(result) => result,
            Err(_) => Err(SocketError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, command: &str) -> Result<String, SocketError> {
        let mut stream = UnixStream::connect(&self.path)
            .await
            .map_err(SocketError::Connect)?;

        let mut line = command.trim_end().to_string();
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(SocketError::Io)?;

        // one byte past the limit tells a full reply from a cut one
        let mut buf = Vec::with_capacity(self.limit.min(8 * 1024));
        let mut reader = (&mut stream).take(self.limit as u64 + 1);
        reader.read_to_end(&mut buf).await.map_err(SocketError::Io)?;
        if buf.len() > self.limit {
            return Err(SocketError::Truncated(self.limit));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
