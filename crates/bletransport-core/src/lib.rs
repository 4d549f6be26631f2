//! BLE transport core - platform-independent types and boundaries
//!
//! This crate provides the configuration, error taxonomy, message envelope,
//! listener dispatch and session traits shared by the transport orchestrator
//! and by tests that substitute a scripted session.

mod config;
mod dispatcher;
mod error;
mod message;
mod sequence;
mod session;
mod state;

pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use message::*;
pub use sequence::*;
pub use session::*;
pub use state::*;
