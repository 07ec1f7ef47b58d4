//! Connection ownership as seen by a response.
//!
//! A response never touches transport internals. It only decides what
//! happens to the connection once the body is done with it: hand it back to
//! the pool for reuse, or destroy it.

use crate::base::neterror::NetError;
use std::fmt;

/// A pool-managed transport connection exclusively owned by one response.
///
/// Both operations consume the handle, so each one runs at most once and
/// never both.
pub trait ConnectionHandle: Send + fmt::Debug {
    /// Return the connection to its pool for reuse.
    fn release(self: Box<Self>) -> Result<(), NetError>;

    /// Destroy the connection without returning it to the pool.
    fn close(self: Box<Self>) -> Result<(), NetError>;
}

/// What happened to a connection when its owner let go of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Released,
    Closed,
}

/// Release or close `conn`, logging failures instead of propagating them.
///
/// The connection is gone either way, and surfacing a disposal failure
/// would hide the error that caused it.
pub(crate) fn dispose(conn: Box<dyn ConnectionHandle>, how: Disposition, url: &url::Url) {
    let result = match how {
        Disposition::Released => conn.release(),
        Disposition::Closed => conn.close(),
    };
    match result {
        Ok(()) => tracing::debug!(url = %url, disposition = ?how, "connection disposed"),
        Err(e) => tracing::warn!(url = %url, disposition = ?how, error = %e, "connection disposal failed"),
    }
}
