//! Response lifecycle state machine.
//!
//! ```text
//! Init ──setup──> Connected ──head──> BodyAvailable ──read/release ok──> Released
//!                   │   ▲                  │
//!                   ▼   │ continue         └──failure / close──> Closed
//!              ContinuePending
//! ```

use crate::base::neterror::NetError;
use crate::socket::handle::Disposition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    /// Constructed, no connection bound yet.
    #[default]
    Init,
    /// Connection and content stream bound.
    Connected,
    /// Connected, with a `100-continue` expectation still unresolved.
    ContinuePending,
    /// Status line and headers parsed; the body is streaming.
    BodyAvailable,
    /// Body drained or discarded, connection returned to the pool.
    Released,
    /// Connection destroyed.
    Closed,
}

impl ResponseState {
    /// Released and Closed are final: nothing moves out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, ResponseState::Released | ResponseState::Closed)
    }

    /// States in which the response owns an open connection.
    pub fn holds_connection(self) -> bool {
        matches!(
            self,
            ResponseState::Connected | ResponseState::ContinuePending | ResponseState::BodyAvailable
        )
    }

    pub(crate) fn on_setup(self, continue_pending: bool) -> Result<Self, NetError> {
        match self {
            ResponseState::Init if continue_pending => Ok(ResponseState::ContinuePending),
            ResponseState::Init => Ok(ResponseState::Connected),
            _ => Err(NetError::AlreadySetup),
        }
    }

    pub(crate) fn on_continue_resolved(self) -> Self {
        match self {
            ResponseState::ContinuePending => ResponseState::Connected,
            other => other,
        }
    }

    pub(crate) fn on_head(self) -> Self {
        match self {
            ResponseState::Connected | ResponseState::ContinuePending => {
                ResponseState::BodyAvailable
            }
            other => other,
        }
    }

    pub(crate) fn on_dispose(self, how: Disposition) -> Self {
        if self.is_terminal() {
            return self;
        }
        match how {
            Disposition::Released => ResponseState::Released,
            Disposition::Closed => ResponseState::Closed,
        }
    }
}
