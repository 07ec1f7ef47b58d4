pub mod content;
pub mod encoding;
pub mod expect;
pub mod headers;
pub mod leak;
pub mod pump;
pub mod response;
pub mod state;
pub mod streamfactory;

// Re-exports for convenience
pub use content::{
    BodyFeeder, ContentStream, FlowControlFeeder, FlowControlStream, StreamLimits,
    UnboundedFeeder, UnboundedStream,
};
pub use encoding::{ChardetDetector, CharsetDetector, EncodingResolver};
pub use expect::{ContinueExpectation, ContinueOutcome};
pub use headers::ResponseHeaders;
pub use leak::{leaked_responses, outstanding_connections};
pub use pump::pump_body;
pub use response::{Response, ResponseConfig};
pub use state::ResponseState;
pub use streamfactory::{HttpStream, HttpStreamFactory};
