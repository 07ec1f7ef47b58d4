use crate::base::neterror::NetError;
use crate::socket::handle::ConnectionHandle;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// A transport the pool can park between responses.
/// Mimics net::StreamSocket's liveness check.
pub trait PoolableSocket: Send + Sync + 'static {
    /// Returns true if the transport can still carry another request.
    fn is_connected(&self) -> bool;
}

impl PoolableSocket for tokio::net::TcpStream {
    /// Uses peer_addr() plus a non-blocking read as a lightweight liveness test.
    fn is_connected(&self) -> bool {
        // peer_addr() returns Err if socket is disconnected
        if self.peer_addr().is_err() {
            return false;
        }

        // Try a non-blocking read to detect closed connections.
        // Any byte sitting on an idle socket also makes it unusable.
        let mut buf = [0u8; 1];
        match self.try_read(&mut buf) {
            Ok(_) => false,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }
}

/// Identifies a connection group (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId {
    scheme: String,
    host: String,
    port: u16,
}

impl GroupId {
    pub fn from_url(url: &Url) -> Option<Self> {
        Some(GroupId {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
        })
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Per-group state tracking.
struct Group<T> {
    idle_sockets: VecDeque<T>,
    active_count: usize,
}

impl<T> Group<T> {
    fn new() -> Self {
        Self {
            idle_sockets: VecDeque::new(),
            active_count: 0,
        }
    }
}

struct PoolShared<T> {
    groups: DashMap<GroupId, Group<T>>,
    total_active: AtomicUsize,
    max_idle_per_group: usize,
}

impl<T: PoolableSocket> PoolShared<T> {
    fn checkin(&self, group_id: &GroupId, socket: T) {
        let mut group = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(Group::new);
        group.active_count = group.active_count.saturating_sub(1);
        self.total_active.fetch_sub(1, Ordering::Relaxed);

        if !socket.is_connected() {
            tracing::debug!(group = %group_id, "released socket is dead, dropping");
            return;
        }
        if group.idle_sockets.len() >= self.max_idle_per_group {
            tracing::debug!(group = %group_id, "idle limit reached, dropping released socket");
            return;
        }
        group.idle_sockets.push_back(socket);
    }

    fn discard(&self, group_id: &GroupId) {
        let mut group = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(Group::new);
        group.active_count = group.active_count.saturating_sub(1);
        self.total_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Parks idle transports per (scheme, host, port) and hands them out again.
///
/// Establishing transports is the connect layer's job: it registers fresh
/// sockets with [`ClientSocketPool::register`]. Responses give them back
/// through the [`ConnectionHandle`] impl on [`PooledConnection`].
pub struct ClientSocketPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for ClientSocketPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ClientSocketPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSocketPool")
            .field("max_idle_per_group", &self.shared.max_idle_per_group)
            .field(
                "total_active",
                &self.shared.total_active.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<T: PoolableSocket> Default for ClientSocketPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PoolableSocket> ClientSocketPool<T> {
    pub fn new() -> Self {
        // Chromium's per-group socket limit
        Self::with_max_idle_per_group(6)
    }

    pub fn with_max_idle_per_group(max_idle_per_group: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                groups: DashMap::new(),
                total_active: AtomicUsize::new(0),
                max_idle_per_group,
            }),
        }
    }

    /// Track a freshly established transport as an active connection.
    pub fn register(&self, url: &Url, socket: T) -> Result<PooledConnection<T>, NetError> {
        let group_id = GroupId::from_url(url).ok_or(NetError::InvalidUrl)?;
        {
            let mut group = self
                .shared
                .groups
                .entry(group_id.clone())
                .or_insert_with(Group::new);
            group.active_count += 1;
        }
        self.shared.total_active.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            pool: Arc::clone(&self.shared),
            group_id,
            socket: Some(socket),
            reused: false,
        })
    }

    /// Take an idle connection for `url`, skipping ones that died while parked.
    pub fn acquire(&self, url: &Url) -> Option<PooledConnection<T>> {
        let group_id = GroupId::from_url(url)?;
        let mut group = self.shared.groups.get_mut(&group_id)?;

        while let Some(socket) = group.idle_sockets.pop_front() {
            if socket.is_connected() {
                group.active_count += 1;
                self.shared.total_active.fetch_add(1, Ordering::Relaxed);
                return Some(PooledConnection {
                    pool: Arc::clone(&self.shared),
                    group_id: group_id.clone(),
                    socket: Some(socket),
                    reused: true,
                });
            }
            // Dead socket, continue to next
        }
        None
    }

    /// Get total active socket count.
    pub fn total_active_count(&self) -> usize {
        self.shared.total_active.load(Ordering::Relaxed)
    }

    /// Get total idle socket count across all groups.
    pub fn idle_socket_count(&self) -> usize {
        self.shared
            .groups
            .iter()
            .map(|g| g.idle_sockets.len())
            .sum()
    }

    /// Get idle socket count for the group `url` belongs to.
    pub fn idle_socket_count_for(&self, url: &Url) -> usize {
        GroupId::from_url(url)
            .and_then(|gid| self.shared.groups.get(&gid).map(|g| g.idle_sockets.len()))
            .unwrap_or(0)
    }
}

/// An active connection checked out of a [`ClientSocketPool`].
///
/// Dropping it without releasing counts as a close.
pub struct PooledConnection<T: PoolableSocket> {
    pool: Arc<PoolShared<T>>,
    group_id: GroupId,
    socket: Option<T>,
    reused: bool,
}

impl<T: PoolableSocket> PooledConnection<T> {
    /// Whether this connection came out of the idle queue.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn socket(&self) -> Option<&T> {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> Option<&mut T> {
        self.socket.as_mut()
    }
}

impl<T: PoolableSocket> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("group", &self.group_id)
            .field("reused", &self.reused)
            .field("open", &self.socket.is_some())
            .finish()
    }
}

impl<T: PoolableSocket> ConnectionHandle for PooledConnection<T> {
    fn release(mut self: Box<Self>) -> Result<(), NetError> {
        let socket = self.socket.take().ok_or(NetError::SocketNotConnected)?;
        self.pool.checkin(&self.group_id, socket);
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), NetError> {
        let socket = self.socket.take().ok_or(NetError::SocketNotConnected)?;
        drop(socket);
        self.pool.discard(&self.group_id);
        Ok(())
    }
}

impl<T: PoolableSocket> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if self.socket.take().is_some() {
            self.pool.discard(&self.group_id);
        }
    }
}
