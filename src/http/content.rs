//! Response body streaming.
//! Mirrors Chromium's HttpStream::ReadResponseBody, split into two halves:
//!
//! - a [`BodyFeeder`] held by the transport reader, which pushes chunks,
//!   EOF or an error, and is told to pause when the reader falls behind;
//! - a [`ContentStream`] owned by the response, which pulls chunks in wire
//!   order.
//!
//! The backpressure policy lives entirely in the pair. [`FlowControlStream`]
//! pauses the feeder above a high-water mark and resumes it below a
//! low-water mark; [`UnboundedStream`] never pauses.

use crate::base::neterror::NetError;
use bytes::{Bytes, BytesMut};
use futures::future::poll_fn;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::sync::mpsc;

/// Buffer limits for a content stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Pause the feeder once more than this many bytes are buffered.
    pub high_water: usize,
    /// Resume the feeder once buffered bytes drop to this level.
    pub low_water: usize,
    /// Most bytes `release()` will skip before giving up and closing.
    pub max_drain_bytes: u64,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            high_water: 128 * 1024,
            low_water: 64 * 1024,
            max_drain_bytes: 1024 * 1024,
        }
    }
}

impl StreamLimits {
    /// Never pause the feeder and drain any amount on release.
    pub fn unbounded() -> Self {
        Self {
            high_water: usize::MAX,
            low_water: usize::MAX,
            max_drain_bytes: u64::MAX,
        }
    }

    pub fn validate(&self) -> Result<(), NetError> {
        if self.low_water > self.high_water {
            return Err(NetError::invalid_config(format!(
                "low_water ({}) exceeds high_water ({})",
                self.low_water, self.high_water
            )));
        }
        Ok(())
    }
}

/// Transport-facing half of a content stream.
pub trait BodyFeeder: Send + Sync + 'static {
    /// Queue a chunk. Chunks after EOF or after the reader went away are dropped.
    fn feed_data(&self, chunk: Bytes);

    /// Mark the end of the body.
    fn feed_eof(&self);

    /// Fail the body. Readers see the error on their next read.
    fn set_error(&self, err: NetError);

    /// Ready once the feeder may push more data.
    fn poll_writable(&self, cx: &mut Context<'_>) -> Poll<()>;

    /// Whether the reader asked the transport to stop reading.
    fn is_paused(&self) -> bool;

    /// Whether the reading half has been dropped.
    fn is_closed(&self) -> bool;

    /// Resolves once the reading half has been dropped.
    fn closed(&self) -> impl Future<Output = ()> + Send + '_
    where
        Self: Sized;

    /// Wait for the reader to catch up, then queue `chunk`.
    fn send(&self, chunk: Bytes) -> impl Future<Output = ()> + Send + '_
    where
        Self: Sized,
    {
        async move {
            poll_fn(|cx| self.poll_writable(cx)).await;
            self.feed_data(chunk);
        }
    }
}

/// Reader-facing half: a lazy, finite, non-restartable sequence of chunks.
pub trait ContentStream: Send + 'static {
    type Feeder: BodyFeeder;

    /// Create a connected stream/feeder pair.
    fn open(limits: &StreamLimits) -> (Self, Self::Feeder)
    where
        Self: Sized;

    /// Next chunk in wire order, `None` at EOF.
    fn poll_read_some(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>, NetError>>;

    /// True once EOF was seen and every chunk has been consumed.
    fn at_eof(&self) -> bool;

    /// Bytes currently queued and not yet read.
    fn buffered_bytes(&self) -> usize {
        0
    }

    fn read_some(&mut self) -> impl Future<Output = Result<Option<Bytes>, NetError>> + Send + '_
    where
        Self: Sized,
    {
        poll_fn(move |cx| self.poll_read_some(cx))
    }

    /// Concatenate everything up to EOF.
    fn read_until_eof(&mut self) -> impl Future<Output = Result<Bytes, NetError>> + Send + '_
    where
        Self: Sized,
    {
        async move {
            let mut first: Option<Bytes> = None;
            let mut rest = BytesMut::new();
            while let Some(chunk) = self.read_some().await? {
                match &first {
                    None => first = Some(chunk),
                    Some(head) => {
                        if rest.is_empty() {
                            rest.extend_from_slice(head);
                        }
                        rest.extend_from_slice(&chunk);
                    }
                }
            }
            if rest.is_empty() {
                return Ok(first.unwrap_or_default());
            }
            Ok(rest.freeze())
        }
    }

    /// Discard everything up to EOF without materialising it.
    ///
    /// Fails with `ResponseBodyTooBigToDrain` once more than `limit` bytes
    /// have been skipped.
    fn skip_to_eof(&mut self, limit: u64) -> impl Future<Output = Result<u64, NetError>> + Send + '_
    where
        Self: Sized,
    {
        async move {
            let mut skipped = 0u64;
            while let Some(chunk) = self.read_some().await? {
                skipped += chunk.len() as u64;
                if skipped > limit {
                    return Err(NetError::ResponseBodyTooBigToDrain);
                }
            }
            Ok(skipped)
        }
    }
}

struct Inner {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    eof: bool,
    error: Option<NetError>,
    paused: bool,
    reader_gone: bool,
    reader: Option<Waker>,
    writer: Option<Waker>,
    closed: Option<Waker>,
    limits: StreamLimits,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded in-memory queue with high/low-water flow control.
pub struct FlowControlStream {
    shared: Arc<Mutex<Inner>>,
}

/// Feeder for [`FlowControlStream`].
///
/// Dropping it before `feed_eof` fails the stream with `ConnectionClosed`.
pub struct FlowControlFeeder {
    shared: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for FlowControlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.shared);
        f.debug_struct("FlowControlStream")
            .field("buffered", &inner.buffered)
            .field("eof", &inner.eof)
            .field("paused", &inner.paused)
            .finish()
    }
}

impl std::fmt::Debug for FlowControlFeeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowControlFeeder")
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl FlowControlStream {
    pub fn limits(&self) -> StreamLimits {
        lock(&self.shared).limits
    }
}

impl ContentStream for FlowControlStream {
    type Feeder = FlowControlFeeder;

    fn open(limits: &StreamLimits) -> (Self, Self::Feeder) {
        let shared = Arc::new(Mutex::new(Inner {
            chunks: VecDeque::new(),
            buffered: 0,
            eof: false,
            error: None,
            paused: false,
            reader_gone: false,
            reader: None,
            writer: None,
            closed: None,
            limits: *limits,
        }));
        (
            FlowControlStream {
                shared: Arc::clone(&shared),
            },
            FlowControlFeeder { shared },
        )
    }

    fn poll_read_some(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>, NetError>> {
        let mut inner = lock(&self.shared);

        // Fail fast: a transport error beats any data still queued.
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone()));
        }

        if let Some(chunk) = inner.chunks.pop_front() {
            inner.buffered -= chunk.len();
            let resume = inner.paused && inner.buffered <= inner.limits.low_water;
            let writer = if resume {
                inner.paused = false;
                tracing::trace!(buffered = inner.buffered, "resuming transport reader");
                inner.writer.take()
            } else {
                None
            };
            drop(inner);
            if let Some(waker) = writer {
                waker.wake();
            }
            return Poll::Ready(Ok(Some(chunk)));
        }

        if inner.eof {
            return Poll::Ready(Ok(None));
        }

        inner.reader = Some(cx.waker().clone());
        Poll::Pending
    }

    fn at_eof(&self) -> bool {
        let inner = lock(&self.shared);
        inner.eof && inner.chunks.is_empty()
    }

    fn buffered_bytes(&self) -> usize {
        lock(&self.shared).buffered
    }
}

impl Drop for FlowControlStream {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared);
        inner.reader_gone = true;
        inner.chunks.clear();
        inner.buffered = 0;
        let wakers = [inner.writer.take(), inner.closed.take()];
        drop(inner);
        for waker in wakers.into_iter().flatten() {
            waker.wake();
        }
    }
}

impl FlowControlFeeder {
    fn finish(&self, err: Option<NetError>) {
        let mut inner = lock(&self.shared);
        if inner.eof || inner.error.is_some() {
            return;
        }
        match err {
            Some(err) => inner.error = Some(err),
            None => inner.eof = true,
        }
        let reader = inner.reader.take();
        drop(inner);
        if let Some(waker) = reader {
            waker.wake();
        }
    }
}

impl BodyFeeder for FlowControlFeeder {
    fn feed_data(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = lock(&self.shared);
        if inner.eof || inner.error.is_some() || inner.reader_gone {
            tracing::trace!(len = chunk.len(), "dropping chunk fed after end of body");
            return;
        }
        inner.buffered += chunk.len();
        inner.chunks.push_back(chunk);
        if !inner.paused && inner.buffered > inner.limits.high_water {
            inner.paused = true;
            tracing::trace!(buffered = inner.buffered, "pausing transport reader");
        }
        let reader = inner.reader.take();
        drop(inner);
        if let Some(waker) = reader {
            waker.wake();
        }
    }

    fn feed_eof(&self) {
        self.finish(None);
    }

    fn set_error(&self, err: NetError) {
        self.finish(Some(err));
    }

    fn poll_writable(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = lock(&self.shared);
        if !inner.paused || inner.reader_gone {
            return Poll::Ready(());
        }
        inner.writer = Some(cx.waker().clone());
        Poll::Pending
    }

    fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }

    fn is_closed(&self) -> bool {
        lock(&self.shared).reader_gone
    }

    fn closed(&self) -> impl Future<Output = ()> + Send + '_ {
        poll_fn(move |cx| {
            let mut inner = lock(&self.shared);
            if inner.reader_gone {
                return Poll::Ready(());
            }
            inner.closed = Some(cx.waker().clone());
            Poll::Pending
        })
    }
}

impl Drop for FlowControlFeeder {
    fn drop(&mut self) {
        // Transport went away mid-body.
        self.finish(Some(NetError::ConnectionClosed));
    }
}

enum Frame {
    Data(Bytes),
    Eof,
    Error(NetError),
}

/// Channel-backed stream that never applies backpressure.
///
/// Errors are delivered in order after any chunks queued before them.
#[derive(Debug)]
pub struct UnboundedStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    eof: bool,
    error: Option<NetError>,
}

/// Feeder for [`UnboundedStream`]. Always writable.
#[derive(Debug)]
pub struct UnboundedFeeder {
    tx: mpsc::UnboundedSender<Frame>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Data(b) => write!(f, "Data({} bytes)", b.len()),
            Frame::Eof => write!(f, "Eof"),
            Frame::Error(e) => write!(f, "Error({})", e),
        }
    }
}

impl ContentStream for UnboundedStream {
    type Feeder = UnboundedFeeder;

    fn open(_limits: &StreamLimits) -> (Self, Self::Feeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            UnboundedStream {
                rx,
                eof: false,
                error: None,
            },
            UnboundedFeeder { tx },
        )
    }

    fn poll_read_some(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>, NetError>> {
        if let Some(err) = &self.error {
            return Poll::Ready(Err(err.clone()));
        }
        if self.eof {
            return Poll::Ready(Ok(None));
        }
        loop {
            return match self.rx.poll_recv(cx) {
                Poll::Ready(Some(Frame::Data(chunk))) if chunk.is_empty() => continue,
                Poll::Ready(Some(Frame::Data(chunk))) => Poll::Ready(Ok(Some(chunk))),
                Poll::Ready(Some(Frame::Eof)) => {
                    self.eof = true;
                    Poll::Ready(Ok(None))
                }
                Poll::Ready(Some(Frame::Error(err))) => {
                    self.error = Some(err.clone());
                    Poll::Ready(Err(err))
                }
                Poll::Ready(None) => {
                    self.error = Some(NetError::ConnectionClosed);
                    Poll::Ready(Err(NetError::ConnectionClosed))
                }
                Poll::Pending => Poll::Pending,
            };
        }
    }

    fn at_eof(&self) -> bool {
        self.eof
    }
}

impl BodyFeeder for UnboundedFeeder {
    fn feed_data(&self, chunk: Bytes) {
        let _ = self.tx.send(Frame::Data(chunk));
    }

    fn feed_eof(&self) {
        let _ = self.tx.send(Frame::Eof);
    }

    fn set_error(&self, err: NetError) {
        let _ = self.tx.send(Frame::Error(err));
    }

    fn poll_writable(&self, _cx: &mut Context<'_>) -> Poll<()> {
        Poll::Ready(())
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed(&self) -> impl Future<Output = ()> + Send + '_ {
        self.tx.closed()
    }
}
