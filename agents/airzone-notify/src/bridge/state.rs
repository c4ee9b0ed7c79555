//! Connection Lifecycle
//!
//! `Disconnected -> Connecting -> Open -> (Closing | ReconnectWait) -> ...`
//!
//! Owned by the supervisor task alone, so no locking.

use tracing::{debug, warn};

/// Possible states of the event stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, nothing scheduled
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport is open and frames are flowing
    Open,
    /// An intentional stop is closing the transport
    Closing,
    /// Waiting for the reconnect timer after a close
    ReconnectWait,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::ReconnectWait => write!(f, "ReconnectWait"),
        }
    }
}

impl ConnectionState {
    fn can_move_to(self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        self == to
            || matches!(
                (self, to),
                (Disconnected, Connecting)
                    | (Connecting, Open | ReconnectWait | Closing)
                    | (Open, Closing | ReconnectWait)
                    | (ReconnectWait, Connecting | Disconnected)
                    | (Closing, Disconnected)
            )
    }
}

/// Current state of the supervised connection
#[derive(Debug)]
pub struct ConnectionLifecycle {
    current: ConnectionState,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            current: ConnectionState::Disconnected,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Move to `to`. Returns false, leaving the state unchanged, if the move
    /// is not allowed.
    pub fn transition(&mut self, to: ConnectionState, reason: &str) -> bool {
        if !self.current.can_move_to(to) {
            warn!(from = %self.current, to = %to, "Rejected connection state transition");
            return false;
        }

        debug!(from = %self.current, to = %to, reason, "Connection state transition");
        self.current = to;
        true
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
