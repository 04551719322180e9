//! chatrelay - session-oriented message relay
//!
//! Clients authorize to obtain an opaque session id, hold a long-lived
//! event stream keyed by that id, and send short commands that are routed
//! to other connected sessions by display name.

pub mod relay;

pub use relay::{RelayClient, RelayConfig, RelayError, RelayServer, RelayService};
