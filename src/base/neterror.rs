use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Response body too big to drain")]
    ResponseBodyTooBigToDrain,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,

    // Response lifecycle errors (custom codes starting at -10000)
    #[error("Response connection already set up")]
    AlreadySetup,
    #[error("Response status and headers already set")]
    HeadAlreadySet,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Failed to decode body as {encoding}")]
    TextDecodingFailed { encoding: String },
    #[error("Unknown text encoding: {label}")]
    UnknownEncoding { label: String },
    #[error("JSON parse error: {message}")]
    JsonParseError { message: String },
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    #[error("Transport IO error ({kind}): {message}")]
    TransportIo { kind: String, message: String },

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::InvalidResponse => -320,
            NetError::ResponseBodyTooBigToDrain => -345,
            NetError::InvalidHttpResponse => -370,

            NetError::AlreadySetup => -10000,
            NetError::HeadAlreadySet => -10001,
            NetError::InvalidHeader => -10002,
            NetError::TextDecodingFailed { .. } => -10003,
            NetError::UnknownEncoding { .. } => -10004,
            NetError::JsonParseError { .. } => -10005,
            NetError::InvalidConfig { .. } => -10006,
            NetError::TransportIo { .. } => -10007,
            NetError::Unknown(code) => *code,
        }
    }

    /// Errors that originate in the transport while the body is being read.
    ///
    /// Any of these leaves the connection in an indeterminate state, so the
    /// response must destroy it rather than hand it back to the pool.
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionAborted
                | NetError::ConnectionFailed
                | NetError::ConnectionTimedOut
                | NetError::InvalidResponse
                | NetError::InvalidHttpResponse
                | NetError::TransportIo { .. }
        )
    }

    pub fn text_decoding_failed(encoding: impl Into<String>) -> Self {
        NetError::TextDecodingFailed {
            encoding: encoding.into(),
        }
    }

    pub fn unknown_encoding(label: impl Into<String>) -> Self {
        NetError::UnknownEncoding {
            label: label.into(),
        }
    }

    pub fn json_parse(message: impl std::fmt::Display) -> Self {
        NetError::JsonParseError {
            message: message.to_string(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        NetError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Payload-carrying variants come back with empty payloads.
impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -320 => NetError::InvalidResponse,
            -345 => NetError::ResponseBodyTooBigToDrain,
            -370 => NetError::InvalidHttpResponse,

            -10000 => NetError::AlreadySetup,
            -10001 => NetError::HeadAlreadySet,
            -10002 => NetError::InvalidHeader,
            -10003 => NetError::text_decoding_failed(""),
            -10004 => NetError::unknown_encoding(""),
            -10005 => NetError::json_parse(""),
            -10006 => NetError::invalid_config(""),
            -10007 => NetError::TransportIo {
                kind: String::new(),
                message: String::new(),
            },
            _ => NetError::Unknown(code),
        }
    }
}
