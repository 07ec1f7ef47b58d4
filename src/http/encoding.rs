//! Character encoding resolution for response bodies.
//!
//! Precedence, highest first:
//! 1. an encoding the caller names explicitly,
//! 2. the `charset` parameter of `Content-Type`, if it names a known encoding,
//! 3. a statistical guess over the first [`EncodingResolver::sniff_limit`] bytes,
//! 4. UTF-8.
//!
//! Falling back to UTF-8 instead of failing keeps mislabeled responses readable.

use crate::base::neterror::NetError;
use crate::http::headers::ResponseHeaders;
use encoding_rs::{Encoding, UTF_8};
use std::fmt;
use std::sync::Arc;

/// Default number of body bytes handed to the detector.
pub const DEFAULT_SNIFF_LIMIT: usize = 4096;

/// Guesses an encoding from raw bytes.
pub trait CharsetDetector: Send + Sync + fmt::Debug {
    /// `complete` is false when `sample` is a prefix of a longer body.
    /// Returns `None` when there is nothing to go on.
    fn detect(&self, sample: &[u8], complete: bool) -> Option<&'static Encoding>;
}

/// Detector backed by `chardetng`, with BOM sniffing first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChardetDetector;

impl CharsetDetector for ChardetDetector {
    fn detect(&self, sample: &[u8], complete: bool) -> Option<&'static Encoding> {
        if sample.is_empty() {
            return None;
        }
        if let Some((encoding, _)) = Encoding::for_bom(sample) {
            return Some(encoding);
        }
        if sample.is_ascii() {
            return None;
        }
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(sample, complete);
        Some(detector.guess(None, true))
    }
}

/// Resolves the encoding used by `Response::text` and friends.
#[derive(Clone)]
pub struct EncodingResolver {
    /// Maximum number of leading body bytes to sniff.
    pub sniff_limit: usize,
    /// Statistical detector consulted when headers are silent.
    pub detector: Arc<dyn CharsetDetector>,
}

impl fmt::Debug for EncodingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingResolver")
            .field("sniff_limit", &self.sniff_limit)
            .field("detector", &self.detector)
            .finish()
    }
}

impl Default for EncodingResolver {
    fn default() -> Self {
        Self::new(ChardetDetector)
    }
}

impl EncodingResolver {
    pub fn new(detector: impl CharsetDetector + 'static) -> Self {
        Self {
            sniff_limit: DEFAULT_SNIFF_LIMIT,
            detector: Arc::new(detector),
        }
    }

    /// Encoding declared by the `charset` parameter of `Content-Type`.
    pub fn declared(headers: &ResponseHeaders) -> Option<&'static Encoding> {
        let mime = headers.content_type()?;
        let charset = mime.get_param("charset")?;
        let encoding = Encoding::for_label(charset.as_str().as_bytes());
        if encoding.is_none() {
            tracing::debug!(charset = %charset, "ignoring unknown charset in Content-Type");
        }
        encoding
    }

    /// Statistical guess over the head of `body`, UTF-8 when inconclusive.
    pub fn sniff(&self, body: &[u8]) -> &'static Encoding {
        let complete = body.len() <= self.sniff_limit;
        let sample = &body[..body.len().min(self.sniff_limit)];
        match self.detector.detect(sample, complete) {
            Some(encoding) => {
                tracing::debug!(encoding = encoding.name(), "sniffed body encoding");
                encoding
            }
            None => UTF_8,
        }
    }

    /// Header charset if present and known, otherwise the sniffed encoding.
    pub fn resolve(&self, headers: &ResponseHeaders, body: &[u8]) -> &'static Encoding {
        Self::declared(headers).unwrap_or_else(|| self.sniff(body))
    }
}

/// Look up an encoding by WHATWG label (`"cp1251"`, `"utf8"`, `"latin1"`, ...).
pub fn lookup(label: &str) -> Result<&'static Encoding, NetError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| NetError::unknown_encoding(label))
}

/// Decode `bytes` strictly: malformed input is an error, not U+FFFD.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> Result<String, NetError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| NetError::text_decoding_failed(encoding.name()))
}
