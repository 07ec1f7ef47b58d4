//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting transport IO errors into the stream errors a response body
//! reader understands.

use crate::base::neterror::NetError;
use std::io::{self, ErrorKind};

impl NetError {
    /// Map a transport IO error onto the closest stream error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => NetError::ConnectionTimedOut,
            ErrorKind::ConnectionReset => NetError::ConnectionReset,
            ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            ErrorKind::NotConnected => NetError::SocketNotConnected,
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe => NetError::ConnectionClosed,
            ErrorKind::InvalidData => NetError::InvalidResponse,
            kind => NetError::TransportIo {
                kind: format!("{:?}", kind),
                message: err.to_string(),
            },
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        NetError::from_io(&err)
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Convert an IO error raised on the transport serving `url`.
    ///
    /// # Example
    /// ```ignore
    /// use chromenet_response::base::context::IoResultExt;
    ///
    /// let tcp = TcpStream::connect(addr).await.stream_context("http://example.com/")?;
    /// ```
    fn stream_context(self, url: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn stream_context(self, url: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            let mapped = NetError::from_io(&e);
            tracing::debug!(url = %url, error = %e, mapped = %mapped, "transport IO error");
            mapped
        })
    }
}
