//! HTTP Response with body access.
//!
//! A [`Response`] owns the connection it arrived on until the body is done
//! with it. The body is either read to completion and the connection goes
//! back to the pool, or the read fails (or is cancelled) and the connection
//! is destroyed, so a reused connection never carries stale bytes.
//!
//! ```rust,ignore
//! let mut response = Response::new(Method::GET, url);
//! let feeder = response.setup(Box::new(connection))?;
//! response.set_head(StatusCode::OK, None, headers)?;
//! tokio::spawn(pump_body(body, feeder));
//!
//! let text = response.text(None).await?; // connection released here
//! ```

use crate::base::neterror::NetError;
use crate::http::content::{ContentStream, FlowControlStream, StreamLimits};
use crate::http::encoding::{self, EncodingResolver};
use crate::http::expect::ContinueExpectation;
use crate::http::headers::ResponseHeaders;
use crate::http::leak::LeakGuard;
use crate::http::pump::pump_body;
use crate::http::state::ResponseState;
use crate::socket::handle::{self, ConnectionHandle, Disposition};
use bytes::Bytes;
use encoding_rs::Encoding;
use http::{Method, StatusCode, Version};
use hyper::body::Incoming;
use std::fmt;
use tokio::task::JoinHandle;
use url::Url;

/// Per-response configuration.
#[derive(Debug, Clone, Default)]
pub struct ResponseConfig {
    /// Buffer limits handed to the content stream.
    pub limits: StreamLimits,
    /// Encoding resolution used by `text()` and `json()`.
    pub resolver: EncodingResolver,
}

/// Connection ownership plus the state that governs it.
#[derive(Debug, Default)]
struct ConnectionSlot {
    connection: Option<Box<dyn ConnectionHandle>>,
    state: ResponseState,
    leak: LeakGuard,
}

impl ConnectionSlot {
    fn dispose(&mut self, how: Disposition, url: &Url) {
        if let Some(conn) = self.connection.take() {
            handle::dispose(conn, how, url);
        }
        self.state = self.state.on_dispose(how);
        self.leak.disarm();
    }
}

/// Closes the connection unless the body operation finished.
///
/// Dropping a pending `read()`/`release()` future drops this guard with
/// bytes still outstanding, and such a connection cannot be reused. Any
/// close also drops the content stream so the transport side stops.
struct BodyGuard<'a, S> {
    slot: &'a mut ConnectionSlot,
    content: &'a mut Option<S>,
    url: &'a Url,
    armed: bool,
}

impl<'a, S> BodyGuard<'a, S> {
    fn new(slot: &'a mut ConnectionSlot, content: &'a mut Option<S>, url: &'a Url) -> Self {
        Self {
            slot,
            content,
            url,
            armed: true,
        }
    }

    fn finish(mut self, how: Disposition) {
        self.armed = false;
        self.slot.dispose(how, self.url);
        if how == Disposition::Closed {
            *self.content = None;
        }
    }
}

impl<S> Drop for BodyGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(url = %self.url, "body operation cancelled, closing connection");
            self.slot.dispose(Disposition::Closed, self.url);
            *self.content = None;
        }
    }
}

/// One HTTP response: metadata, body stream and connection ownership.
///
/// `S` is the content stream implementation, i.e. the backpressure policy.
pub struct Response<S: ContentStream = FlowControlStream> {
    method: Method,
    url: Url,
    version: Version,
    status: Option<StatusCode>,
    reason: Option<String>,
    headers: ResponseHeaders,
    head_set: bool,
    continue_expectation: Option<ContinueExpectation>,
    content: Option<S>,
    content_cache: Option<Bytes>,
    slot: ConnectionSlot,
    config: ResponseConfig,
}

impl Response<FlowControlStream> {
    /// Create a response with the default flow-controlled content stream.
    pub fn new(method: Method, url: Url) -> Self {
        Self::with_config(method, url, ResponseConfig::default())
    }
}

impl<S: ContentStream> Response<S> {
    /// Create a response using content stream `S` and `config`.
    pub fn with_config(method: Method, url: Url, config: ResponseConfig) -> Self {
        Self {
            method,
            url,
            version: Version::HTTP_11,
            status: None,
            reason: None,
            headers: ResponseHeaders::new(),
            head_set: false,
            continue_expectation: None,
            content: None,
            content_cache: None,
            slot: ConnectionSlot::default(),
            config,
        }
    }

    /// Attach the `Expect: 100-continue` signal of the request.
    pub fn with_continue(mut self, expectation: ContinueExpectation) -> Self {
        self.continue_expectation = Some(expectation);
        self
    }

    /// Bind a freshly obtained connection and create the content stream.
    ///
    /// Returns the feeder the transport reader pushes body chunks into.
    /// Fails with `AlreadySetup` on a second call; the rejected connection
    /// is closed.
    pub fn setup(&mut self, connection: Box<dyn ConnectionHandle>) -> Result<S::Feeder, NetError> {
        let next = match self.slot.state.on_setup(self.waiting_for_continue()) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(url = %self.url, state = ?self.slot.state, "setup called twice");
                handle::dispose(connection, Disposition::Closed, &self.url);
                return Err(e);
            }
        };
        if let Err(e) = self.config.limits.validate() {
            handle::dispose(connection, Disposition::Closed, &self.url);
            return Err(e);
        }

        let (stream, feeder) = S::open(&self.config.limits);
        self.content = Some(stream);
        self.slot.connection = Some(connection);
        self.slot.state = if self.head_set { next.on_head() } else { next };
        self.slot.leak.arm();
        tracing::debug!(method = %self.method, url = %self.url, state = ?self.slot.state, "response connected");
        Ok(feeder)
    }

    /// True while a `100-continue` expectation is unresolved.
    pub fn waiting_for_continue(&self) -> bool {
        self.continue_expectation
            .as_ref()
            .is_some_and(|expect| !expect.is_resolved())
    }

    pub fn continue_expectation(&self) -> Option<&ContinueExpectation> {
        self.continue_expectation.as_ref()
    }

    /// The `100 Continue` interim response arrived.
    pub fn resolve_continue(&mut self) {
        if let Some(expect) = &self.continue_expectation {
            if expect.resolve() {
                tracing::debug!(url = %self.url, "100 continue received");
            }
        }
        self.slot.state = self.slot.state.on_continue_resolved();
    }

    /// Stop waiting for `100 Continue`.
    pub fn abandon_continue(&mut self) {
        if let Some(expect) = &self.continue_expectation {
            if expect.abandon() {
                tracing::debug!(url = %self.url, "100 continue abandoned");
            }
        }
        self.slot.state = self.slot.state.on_continue_resolved();
    }

    /// Record the status line and headers. Write-once.
    ///
    /// A `100` status resolves the continue expectation instead. Any final
    /// status arriving while still waiting for `100` abandons it.
    pub fn set_head(
        &mut self,
        status: StatusCode,
        reason: Option<String>,
        headers: ResponseHeaders,
    ) -> Result<(), NetError> {
        if self.head_set {
            return Err(NetError::HeadAlreadySet);
        }
        if status == StatusCode::CONTINUE {
            self.resolve_continue();
            return Ok(());
        }
        if self.waiting_for_continue() {
            self.abandon_continue();
        }

        self.status = Some(status);
        self.reason = reason;
        self.headers = headers;
        self.head_set = true;
        self.slot.state = self.slot.state.on_head();
        Ok(())
    }

    /// Record the head of a parsed `http::Response`.
    pub fn set_head_from_parts(&mut self, parts: &http::response::Parts) -> Result<(), NetError> {
        let headers = ResponseHeaders::from_header_map(&parts.headers)?;
        let reason = parts
            .extensions
            .get::<hyper::ext::ReasonPhrase>()
            .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
            .map(str::to_owned);
        self.set_head(parts.status, reason, headers)?;
        self.version = parts.version;
        Ok(())
    }

    /// Wire up a hyper response: record its head, bind `connection` and
    /// spawn a task pumping the body into the content stream.
    pub fn attach_hyper(
        &mut self,
        response: http::Response<Incoming>,
        connection: Box<dyn ConnectionHandle>,
    ) -> Result<JoinHandle<Result<u64, NetError>>, NetError> {
        let (parts, body) = response.into_parts();
        let feeder = self.setup(connection)?;
        self.set_head_from_parts(&parts)?;
        Ok(tokio::spawn(pump_body(body, feeder)))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Status code, `None` until the head is parsed.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Reason phrase as sent, or the canonical one for the status.
    pub fn reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .or_else(|| self.status.and_then(|s| s.canonical_reason()))
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers.content_type()
    }

    /// Raw `charset` parameter of `Content-Type`, known to us or not.
    pub fn charset(&self) -> Option<String> {
        let mime = self.content_type()?;
        mime.get_param("charset").map(|charset| charset.as_str().to_owned())
    }

    pub fn state(&self) -> ResponseState {
        self.slot.state
    }

    /// Whether this response still owns an open connection.
    pub fn connection_held(&self) -> bool {
        self.slot.connection.is_some()
    }

    /// The content stream, once `setup` has run.
    pub fn content(&self) -> Option<&S> {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> Option<&mut S> {
        self.content.as_mut()
    }

    /// The fully read body, if `read()` has completed.
    pub fn cached_body(&self) -> Option<&Bytes> {
        self.content_cache.as_ref()
    }

    /// Encoding `text(None)` would use for the cached body.
    pub fn encoding(&self) -> &'static Encoding {
        let body = self.content_cache.as_deref().unwrap_or_default();
        self.config.resolver.resolve(&self.headers, body)
    }

    /// Read the whole body, then release the connection.
    ///
    /// The first successful read is cached and every later call returns the
    /// cache without touching the stream. A stream failure closes the
    /// connection and is returned as-is. Once released or closed without a
    /// cached body, returns empty bytes.
    pub async fn read(&mut self) -> Result<Bytes, NetError> {
        if let Some(body) = &self.content_cache {
            return Ok(body.clone());
        }
        if self.slot.state.is_terminal() {
            return Ok(Bytes::new());
        }
        if self.content.is_none() {
            return Err(NetError::SocketNotConnected);
        }

        let mut guard = BodyGuard::new(&mut self.slot, &mut self.content, &self.url);
        let result = match guard.content.as_mut() {
            Some(content) => content.read_until_eof().await,
            None => Err(NetError::SocketNotConnected),
        };
        match result {
            Ok(body) => {
                guard.finish(Disposition::Released);
                tracing::debug!(url = %self.url, len = body.len(), "response body read");
                self.content_cache = Some(body.clone());
                Ok(body)
            }
            Err(e) => {
                guard.finish(Disposition::Closed);
                tracing::debug!(url = %self.url, error = %e, "response body read failed");
                Err(e)
            }
        }
    }

    /// Discard the unread body and return the connection to the pool.
    ///
    /// Skips at most `StreamLimits::max_drain_bytes`; a body that is larger,
    /// or that fails mid-drain, closes the connection instead. No-op before
    /// `setup` and once released or closed.
    pub async fn release(&mut self) {
        if !self.slot.state.holds_connection() {
            return;
        }
        let limit = self.config.limits.max_drain_bytes;

        let mut guard = BodyGuard::new(&mut self.slot, &mut self.content, &self.url);
        let drained = match guard.content.as_mut() {
            None => Ok(0),
            Some(content) if content.at_eof() => Ok(0),
            Some(content) => content.skip_to_eof(limit).await,
        };
        match drained {
            Ok(skipped) => {
                guard.finish(Disposition::Released);
                tracing::debug!(url = %self.url, skipped, "response body drained");
            }
            Err(e) => {
                guard.finish(Disposition::Closed);
                tracing::debug!(url = %self.url, error = %e, "response body drain failed");
            }
        }
    }

    /// Destroy the connection without draining.
    ///
    /// No-op before `setup` and once released or closed.
    pub fn close(&mut self) {
        if !self.slot.state.holds_connection() {
            return;
        }
        self.slot.dispose(Disposition::Closed, &self.url);
        // Lets the transport side see the reader is gone.
        self.content = None;
    }

    /// Decode the body as text.
    ///
    /// `encoding` overrides everything; otherwise the `Content-Type`
    /// charset, then a sniffed guess, then UTF-8.
    pub async fn text(&mut self, encoding: Option<&str>) -> Result<String, NetError> {
        let body = self.read().await?;
        let encoding = match encoding {
            Some(label) => encoding::lookup(label)?,
            None => self.config.resolver.resolve(&self.headers, &body),
        };
        encoding::decode(&body, encoding)
    }

    /// Whether `Content-Type` names a JSON media type (`application/json` or `+json`).
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|mime| {
            mime.essence_str() == "application/json"
                || mime.suffix().is_some_and(|suffix| suffix.as_str() == "json")
        })
    }

    /// Read the body and decode it with `loader`.
    ///
    /// Returns `Ok(None)` and logs a warning when `Content-Type` is not a
    /// JSON media type, and `Ok(None)` for an empty body.
    pub async fn json_with<T, E, F>(
        &mut self,
        loader: F,
        encoding: Option<&str>,
    ) -> Result<Option<T>, NetError>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: fmt::Display,
    {
        let body = self.read().await?;
        if !self.is_json() {
            let content_type = self.headers.get("Content-Type").unwrap_or_default();
            tracing::warn!(
                url = %self.url,
                content_type = %content_type,
                "attempt to decode JSON with unexpected mimetype"
            );
            return Ok(None);
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let text = self.text(encoding).await?;
        loader(&text).map(Some).map_err(NetError::json_parse)
    }

    /// Read the body and deserialize it as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(
        &mut self,
        encoding: Option<&str>,
    ) -> Result<Option<T>, NetError> {
        self.json_with(|text| serde_json::from_str::<T>(text), encoding)
            .await
    }

    /// Read the body, then close.
    #[deprecated(since = "0.1.0", note = "Use read() instead; it releases the connection itself")]
    pub async fn read_and_close(&mut self) -> Result<Bytes, NetError> {
        tracing::warn!(url = %self.url, "read_and_close() is deprecated, use read()");
        let body = self.read().await;
        self.close();
        body
    }

    /// Read the body and decode it as JSON.
    #[cfg(feature = "json")]
    #[deprecated(since = "0.1.0", note = "Use json() instead")]
    pub async fn read_decoded(&mut self) -> Result<Option<serde_json::Value>, NetError> {
        tracing::warn!(url = %self.url, "read_decoded() is deprecated, use json()");
        self.json(None).await
    }

    /// Close, accepting the legacy `force` flag.
    ///
    /// Both values destroy the connection immediately.
    #[deprecated(since = "0.1.0", note = "Use close() instead")]
    pub fn close_with(&mut self, force: bool) {
        if !force {
            tracing::warn!(url = %self.url, "close(force=false) is deprecated, use close()");
        }
        self.close();
    }

    /// `<Response(url) [status reason]>`, or `[pending]` before the head.
    pub fn representation(&self) -> String {
        self.to_string()
    }
}

impl<S: ContentStream> fmt::Display for Response<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "<Response({}) [{} {}]>",
                self.url,
                status.as_u16(),
                self.reason().unwrap_or_default()
            ),
            None => write!(f, "<Response({}) [pending]>", self.url),
        }
    }
}

impl<S: ContentStream> fmt::Debug for Response<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("state", &self.slot.state)
            .field("connection", &self.slot.connection)
            .field("cached", &self.content_cache.as_ref().map(Bytes::len))
            .finish()
    }
}

impl<S: ContentStream> Drop for Response<S> {
    fn drop(&mut self) {
        if self.slot.connection.is_some() {
            tracing::warn!(
                method = %self.method,
                url = %self.url,
                state = ?self.slot.state,
                "response dropped while holding an open connection, closing it"
            );
            self.slot.leak.trip();
            self.slot.dispose(Disposition::Closed, &self.url);
        }
    }
}
