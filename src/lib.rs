//! # chromenet-response
//!
//! Response handling for a Chromium-inspired async HTTP client.
//!
//! A [`Response`](crate::http::Response) owns the pooled connection it arrived on
//! and decides its fate: the body is read (or drained) to completion and the
//! connection goes back to the pool, or something fails and the connection
//! is destroyed.
//!
//! ## Features
//!
//! - **Connection ownership**: exactly one release or close per connection,
//!   also under cancellation and drop
//! - **Backpressure**: bounded content streams pause the transport reader
//! - **Text decoding**: explicit, declared or sniffed character encodings
//! - **JSON**: serde-based decoding with media type checks (`json` feature)
//! - **100-continue**: shared expectation signal between request and response
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chromenet_response::http::{FlowControlStream, HttpStreamFactory, ResponseConfig};
//! use chromenet_response::socket::pool::ClientSocketPool;
//!
//! #[tokio::main]
//! async fn main() {
//!     let factory = HttpStreamFactory::new(ClientSocketPool::new());
//!     let url = url::Url::parse("http://example.com/").unwrap();
//!     let (mut response, _pump) = factory
//!         .send::<FlowControlStream>(http::Method::GET, url, ResponseConfig::default())
//!         .await
//!         .unwrap();
//!     println!("{}", response.text(None).await.unwrap());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and IO error mapping
//! - [`http`] - Response, content streams, encodings
//! - [`socket`] - Connection handles and pooling

pub mod base;
pub mod http;
pub mod socket;
