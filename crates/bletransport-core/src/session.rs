use crate::config::TransportConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channels handed to the orchestration attempt when a session opens.
///
/// `inbound` carries raw frames from the host daemon; `failure` fires when
/// the child process terminates or the socket channel breaks.
pub struct SessionChannels {
    pub inbound: mpsc::Receiver<Vec<u8>>,
    pub failure: mpsc::Receiver<TransportError>,
}

/// A running process/socket session. Exclusively owned by one
/// orchestration attempt at a time.
#[async_trait]
pub trait Session: Send + Sync {
    /// Hand a frame to the outbound sink.
    async fn send(&self, buf: Vec<u8>) -> Result<(), TransportError>;

    /// Stop the child process and tear down the socket channel. Idempotent.
    async fn stop(&self);
}

/// Factory spawning the child process and exposing its duplex byte channel.
/// Failing to accept the child's connection within the configured accept
/// timeout is reported as `TransportError::AcceptTimeout`.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        cfg: &TransportConfig,
    ) -> Result<(Box<dyn Session>, SessionChannels), TransportError>;
}
