//! End-to-end tests over real HTTP/1.1 connections.
//!
//! A raw TCP server answers every request with a canned response, so the
//! tests see exactly what hyper parses and what the pool does with the
//! connection afterwards.

use chromenet_response::base::neterror::NetError;
use chromenet_response::http::{FlowControlStream, HttpStreamFactory, ResponseConfig, ResponseState};
use chromenet_response::socket::pool::ClientSocketPool;
use encoding_rs::WINDOWS_1251;
use http::{Method, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

struct TestServer {
    url: Url,
    accepted: Arc<AtomicUsize>,
}

fn canned(status_line: &str, headers: &[(&str, &str)], body: &[u8], content_length: usize) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status_line, content_length);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Answer every request with `reply`. Hang up after one reply unless `keep_alive`.
async fn spawn_server(reply: Vec<u8>, keep_alive: bool) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let end = loop {
                        if let Some(end) = head_end(&buf) {
                            break end;
                        }
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    };
                    buf.drain(..end);
                    if socket.write_all(&reply).await.is_err() || !keep_alive {
                        return;
                    }
                }
            });
        }
    });

    TestServer {
        url: Url::parse(&format!("http://127.0.0.1:{}/resource?q=1", port)).unwrap(),
        accepted,
    }
}

#[tokio::test]
async fn test_keep_alive_connection_is_reused() {
    let server = spawn_server(canned("200 OK", &[], b"hello", 5), true).await;
    let factory = HttpStreamFactory::new(ClientSocketPool::new());

    for _ in 0..3 {
        let (mut response, pump) = factory
            .send::<FlowControlStream>(Method::GET, server.url.clone(), ResponseConfig::default())
            .await
            .unwrap();
        assert_eq!(response.status(), Some(StatusCode::OK));
        assert_eq!(response.text(None).await.unwrap(), "hello");
        assert_eq!(response.state(), ResponseState::Released);
        assert_eq!(pump.await.unwrap(), Ok(5));
        assert_eq!(factory.pool().idle_socket_count_for(&server.url), 1);
    }

    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(factory.pool().total_active_count(), 0);
}

#[tokio::test]
async fn test_reason_phrase_and_headers() {
    let reply = canned("200 Fine", &[("X-Trace", "abc"), ("X-Trace", "def")], b"", 0);
    let server = spawn_server(reply, true).await;
    let factory = HttpStreamFactory::new(ClientSocketPool::new());

    let (mut response, _pump) = factory
        .send::<FlowControlStream>(Method::GET, server.url.clone(), ResponseConfig::default())
        .await
        .unwrap();

    assert_eq!(response.reason(), Some("Fine"));
    let traces: Vec<&str> = response.headers().get_all("x-trace").collect();
    assert_eq!(traces, vec!["abc", "def"]);
    assert_eq!(
        response.representation(),
        format!("<Response({}) [200 Fine]>", server.url)
    );
    response.release().await;
    assert_eq!(factory.pool().idle_socket_count(), 1);
}

#[tokio::test]
async fn test_declared_charset_over_the_wire() {
    let body = WINDOWS_1251.encode(r#"{"тест": "пройден"}"#).0.into_owned();
    let reply = canned(
        "200 OK",
        &[("Content-Type", "application/json; charset=cp1251")],
        &body,
        body.len(),
    );
    let server = spawn_server(reply, true).await;
    let factory = HttpStreamFactory::new(ClientSocketPool::new());

    let (mut response, _pump) = factory
        .send::<FlowControlStream>(Method::GET, server.url.clone(), ResponseConfig::default())
        .await
        .unwrap();

    let value: Option<serde_json::Value> = response.json(None).await.unwrap();
    assert_eq!(value, Some(serde_json::json!({"тест": "пройден"})));
}

#[tokio::test]
async fn test_release_drains_unread_body() {
    let body = vec![b'x'; 64 * 1024];
    let server = spawn_server(canned("200 OK", &[], &body, body.len()), true).await;
    let factory = HttpStreamFactory::new(ClientSocketPool::new());

    let (mut response, _pump) = factory
        .send::<FlowControlStream>(Method::GET, server.url.clone(), ResponseConfig::default())
        .await
        .unwrap();
    response.release().await;

    assert_eq!(response.state(), ResponseState::Released);
    assert!(response.cached_body().is_none());
    assert_eq!(factory.pool().idle_socket_count(), 1);
}

#[tokio::test]
async fn test_truncated_body_closes_connection() {
    let server = spawn_server(canned("200 OK", &[], b"only ten b", 100), false).await;
    let factory = HttpStreamFactory::new(ClientSocketPool::new());

    let (mut response, pump) = factory
        .send::<FlowControlStream>(Method::GET, server.url.clone(), ResponseConfig::default())
        .await
        .unwrap();

    let err = response.read().await.unwrap_err();
    assert!(err.is_stream_error(), "unexpected error: {:?}", err);
    assert_eq!(response.state(), ResponseState::Closed);
    assert_eq!(pump.await.unwrap(), Err(err));
    assert_eq!(factory.pool().idle_socket_count(), 0);
    assert_eq!(factory.pool().total_active_count(), 0);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let factory = HttpStreamFactory::new(ClientSocketPool::new());
    let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
    let result = factory
        .send::<FlowControlStream>(Method::GET, url, ResponseConfig::default())
        .await;

    assert_eq!(result.err(), Some(NetError::ConnectionRefused));
}
