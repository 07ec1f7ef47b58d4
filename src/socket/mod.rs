//! Socket and connection management.
//!
//! Mirrors the parts of Chromium's `net/socket/` a response needs:
//! - [`handle`]: connection ownership (release to pool or close)
//! - [`pool`]: idle connection pooling per (scheme, host, port)

pub mod handle;
pub mod pool;
