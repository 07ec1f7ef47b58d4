use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::content::ContentStream;
use crate::http::pump::classify_body_error;
use crate::http::response::{Response, ResponseConfig};
use crate::socket::pool::{ClientSocketPool, PoolableSocket, PooledConnection};
use bytes::Bytes;
use http::{Method, Request};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use url::Url;

/// An HTTP/1.1 connection ready to carry requests.
/// Equivalent to net::HttpStream.
pub struct HttpStream {
    sender: http1::SendRequest<Empty<Bytes>>,
}

impl std::fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStream")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl HttpStream {
    /// Run the HTTP/1.1 handshake over `io` and spawn the connection driver.
    pub async fn handshake<I>(io: I) -> Result<Self, NetError>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| classify_body_error(&e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "connection driver finished with error");
            }
        });

        Ok(Self { sender })
    }

    /// Send `req` once the connection is idle and return the response head.
    pub async fn send_request(
        &mut self,
        req: Request<Empty<Bytes>>,
    ) -> Result<http::Response<Incoming>, NetError> {
        self.sender
            .ready()
            .await
            .map_err(|e| classify_body_error(&e))?;
        self.sender.send_request(req).await.map_err(|e| {
            let err = classify_body_error(&e);
            tracing::debug!(error = %e, mapped = %err, "request failed");
            err
        })
    }
}

impl PoolableSocket for HttpStream {
    fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Hands out HTTP streams, reusing idle pooled connections when possible.
pub struct HttpStreamFactory {
    pool: ClientSocketPool<HttpStream>,
}

impl HttpStreamFactory {
    pub fn new(pool: ClientSocketPool<HttpStream>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ClientSocketPool<HttpStream> {
        &self.pool
    }

    /// Get a connection for `url`: an idle one from the pool, otherwise a
    /// new TCP connection.
    pub async fn request_stream(&self, url: &Url) -> Result<PooledConnection<HttpStream>, NetError> {
        if let Some(conn) = self.pool.acquire(url) {
            tracing::debug!(group = %conn.group_id(), "reusing idle connection");
            return Ok(conn);
        }

        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        let socket = TcpStream::connect((host, port))
            .await
            .stream_context(url.as_str())?;
        socket.set_nodelay(true).stream_context(url.as_str())?;

        let stream = HttpStream::handshake(socket).await?;
        tracing::debug!(host, port, "opened new connection");
        self.pool.register(url, stream)
    }

    /// Send a bodiless request and bind the response to its connection.
    ///
    /// Returns the response together with the task feeding its body.
    pub async fn send<S: ContentStream>(
        &self,
        method: Method,
        url: Url,
        config: ResponseConfig,
    ) -> Result<(Response<S>, JoinHandle<Result<u64, NetError>>), NetError> {
        let mut conn = self.request_stream(&url).await?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let req = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(http::header::HOST, authority)
            .body(Empty::new())
            .map_err(|_| NetError::InvalidUrl)?;

        let stream = conn.socket_mut().ok_or(NetError::SocketNotConnected)?;
        let head = stream.send_request(req).await?;

        let mut response = Response::with_config(method, url, config);
        match response.attach_hyper(head, Box::new(conn)) {
            Ok(pump) => Ok((response, pump)),
            Err(e) => {
                response.close();
                Err(e)
            }
        }
    }
}
