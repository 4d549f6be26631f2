use crate::message::Selector;
use crate::state::TransportState;
use thiserror::Error;

/// Error types for BLE transport operations.
///
/// The variants carry owned strings rather than source errors so a single
/// fatal cause can be cloned and broadcast to every registered listener
/// during shutdown.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("BLE transport started twice")]
    StartedTwice,

    #[error("BLE transport stopped")]
    Stopped,

    #[error("host daemon did not connect to socket; controller not attached?")]
    AcceptTimeout,

    #[error("host daemon process failure: {0}")]
    ChildProcess(String),

    #[error("timeout waiting for host <-> controller sync")]
    SyncTimeout,

    #[error("BLE host <-> controller sync lost")]
    SyncLost,

    #[error("attempt to transmit before BLE transport fully started; state={0:?}")]
    NotStarted(TransportState),

    #[error("BLE transport in unexpected state: {0}")]
    InvalidState(String),

    #[error("listener already registered for selector {0:?}")]
    DuplicateListener(Selector),

    #[error("listener removed")]
    ListenerRemoved,

    #[error("timeout waiting for message")]
    Timeout,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Wrap a host daemon process failure.
    pub fn child(err: impl std::fmt::Display) -> Self {
        TransportError::ChildProcess(err.to_string())
    }

    /// Wrap an IO failure from the socket channel.
    pub fn io(err: impl std::fmt::Display) -> Self {
        TransportError::Io(err.to_string())
    }
}
