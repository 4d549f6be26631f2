//! BLE host transport layer.
//!
//! `BleTransport` owns the lifecycle of a BLE host daemon child process
//! reachable over a Unix domain socket: it performs the host<->controller
//! synchronization handshake, multiplexes inbound messages to waiting
//! listeners, and restarts the whole pipeline on fatal error.

#[cfg(unix)]
mod hostd;
mod mgmt;
mod transport;

#[cfg(unix)]
pub use hostd::*;
pub use mgmt::*;
pub use transport::*;

// Re-export core functionality
pub use bletransport_core::*;
