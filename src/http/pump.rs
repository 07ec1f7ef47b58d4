//! Drives a transport body into a content stream feeder.

use crate::base::neterror::NetError;
use crate::http::content::BodyFeeder;
use bytes::Buf;
use http_body_util::BodyExt;
use std::error::Error as StdError;

/// Map a body error from the transport onto a stream error.
pub fn classify_body_error(err: &(dyn StdError + 'static)) -> NetError {
    if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
        if hyper_err.is_timeout() {
            return NetError::ConnectionTimedOut;
        }
        if hyper_err.is_incomplete_message() {
            return NetError::ConnectionClosed;
        }
        if hyper_err.is_canceled() || hyper_err.is_closed() {
            return NetError::ConnectionAborted;
        }
        if hyper_err.is_parse() {
            return NetError::InvalidHttpResponse;
        }
    }

    // Walk the source chain looking for the underlying IO failure.
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return NetError::from_io(io);
        }
        source = e.source();
    }
    NetError::ConnectionFailed
}

/// Copy every data frame of `body` into `feeder`, honouring backpressure.
///
/// Trailers are ignored. Returns the number of body bytes forwarded. On a
/// body error the feeder is failed with the mapped error, which is also
/// returned. If the reader goes away the pump stops at once, even while the
/// transport is stalled, and drops `body`.
pub async fn pump_body<B, F>(body: B, feeder: F) -> Result<u64, NetError>
where
    B: http_body::Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
    F: BodyFeeder,
{
    let mut body = std::pin::pin!(body);
    let mut forwarded = 0u64;

    loop {
        let frame = tokio::select! {
            biased;
            _ = feeder.closed() => {
                tracing::debug!(forwarded, "content reader dropped, stopping body pump");
                return Ok(forwarded);
            }
            frame = body.frame() => frame,
        };

        match frame {
            None => {
                feeder.feed_eof();
                tracing::trace!(forwarded, "body pump reached EOF");
                return Ok(forwarded);
            }
            Some(Ok(frame)) => {
                let Ok(mut data) = frame.into_data() else {
                    continue;
                };
                let chunk = data.copy_to_bytes(data.remaining());
                if chunk.is_empty() {
                    continue;
                }
                forwarded += chunk.len() as u64;
                feeder.send(chunk).await;
            }
            Some(Err(e)) => {
                let boxed: Box<dyn StdError + Send + Sync> = e.into();
                let err = classify_body_error(&*boxed);
                tracing::debug!(error = %boxed, mapped = %err, "body stream failed");
                feeder.set_error(err.clone());
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::content::{ContentStream, FlowControlStream, StreamLimits};
    use bytes::Bytes;
    use futures::StreamExt;
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;

    #[tokio::test]
    async fn test_pump_full_body() {
        let (mut stream, feeder) = FlowControlStream::open(&StreamLimits::default());
        let forwarded = pump_body(Full::new(Bytes::from_static(b"payload")), feeder)
            .await
            .unwrap();
        assert_eq!(forwarded, 7);
        assert_eq!(stream.read_until_eof().await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_pump_error_fails_stream() {
        let frames: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"par"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "rst")),
        ];
        let body = StreamBody::new(futures::stream::iter(frames));

        let (mut stream, feeder) = FlowControlStream::open(&StreamLimits::default());
        let result = pump_body(body, feeder).await;
        assert_eq!(result, Err(NetError::ConnectionReset));
        assert_eq!(stream.read_until_eof().await, Err(NetError::ConnectionReset));
    }

    #[tokio::test]
    async fn test_pump_waits_for_reader_under_backpressure() {
        let limits = StreamLimits {
            high_water: 4,
            low_water: 2,
            max_drain_bytes: 1024,
        };
        let frames: Vec<Result<Frame<Bytes>, std::io::Error>> = (0..8)
            .map(|_| Ok(Frame::data(Bytes::from_static(b"abc"))))
            .collect();
        let body = StreamBody::new(futures::stream::iter(frames));

        let (mut stream, feeder) = FlowControlStream::open(&limits);
        let pump = tokio::spawn(pump_body(body, feeder));

        let all = stream.read_until_eof().await.unwrap();
        assert_eq!(all.len(), 24);
        assert_eq!(pump.await.unwrap(), Ok(24));
    }

    #[tokio::test]
    async fn test_pump_stops_on_stalled_body_when_reader_drops() {
        let first: Vec<Result<Frame<Bytes>, std::io::Error>> =
            vec![Ok(Frame::data(Bytes::from_static(b"abc")))];
        let stalled = futures::stream::iter(first).chain(futures::stream::pending());
        let body = StreamBody::new(stalled);

        let (mut stream, feeder) = FlowControlStream::open(&StreamLimits::default());
        let pump = tokio::spawn(pump_body(body, feeder));

        assert_eq!(stream.read_some().await.unwrap().unwrap(), "abc");
        drop(stream);

        let result = tokio::time::timeout(std::time::Duration::from_millis(200), pump)
            .await
            .expect("pump kept running after the reader went away");
        assert_eq!(result.unwrap(), Ok(3));
    }
}
