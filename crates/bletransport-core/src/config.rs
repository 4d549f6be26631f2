use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the BLE host transport.
///
/// Immutable after construction; owned exclusively by the transport
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Path of the Unix domain socket to create and listen on.
    pub sock_path: PathBuf,

    /// Path of the BLE host daemon executable.
    pub hostd_path: PathBuf,

    /// Path of the BLE controller device (e.g., /dev/ttyUSB0).
    pub dev_path: PathBuf,

    /// How long to wait for the host daemon to connect to the socket
    /// (in milliseconds).
    #[serde(default = "default_accept_timeout_ms")]
    #[builder(default = "default_accept_timeout_ms()")]
    pub accept_timeout_ms: u64,

    /// How long management sessions wait for a response from the host
    /// daemon (in milliseconds).
    #[serde(default = "default_rsp_timeout_ms")]
    #[builder(default = "default_rsp_timeout_ms()")]
    pub rsp_timeout_ms: u64,

    /// How long to allow for host and controller to sync at startup
    /// (in milliseconds).
    #[serde(default = "default_sync_timeout_ms")]
    #[builder(default = "default_sync_timeout_ms()")]
    pub sync_timeout_ms: u64,

    /// Delay before a restart attempt, allowing the socket path to become
    /// reusable (in milliseconds).
    #[serde(default = "default_settle_delay_ms")]
    #[builder(default = "default_settle_delay_ms()")]
    pub settle_delay_ms: u64,

    /// Whether to restart the transport if it fails after a successful
    /// start.
    #[serde(default = "default_restart")]
    #[builder(default = "default_restart()")]
    pub restart: bool,
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sock_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("sock_path must not be empty"));
        }

        if self.hostd_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("hostd_path must not be empty"));
        }

        if self.dev_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("dev_path must not be empty"));
        }

        if self.accept_timeout_ms == 0 {
            return Err(anyhow::anyhow!("accept_timeout_ms must be non-zero"));
        }

        if self.sync_timeout_ms == 0 {
            return Err(anyhow::anyhow!("sync_timeout_ms must be non-zero"));
        }

        Ok(())
    }

    /// Get the accept timeout as Duration.
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    /// Get the response timeout as Duration.
    pub fn rsp_timeout(&self) -> Duration {
        Duration::from_millis(self.rsp_timeout_ms)
    }

    /// Get the sync timeout as Duration.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Get the restart settling delay as Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

// Default value functions for serde
fn default_accept_timeout_ms() -> u64 {
    1_000
}
fn default_rsp_timeout_ms() -> u64 {
    1_000
}
fn default_sync_timeout_ms() -> u64 {
    10_000
}
fn default_settle_delay_ms() -> u64 {
    1_000
}
fn default_restart() -> bool {
    true
}
