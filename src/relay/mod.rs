// Session relay
//
// Clients authorize a display name to obtain a session id, open an event
// stream for that id, and relay short messages to other connected
// sessions by name. Unconnected sessions expire after a grace period.

pub mod session;
pub mod event;
pub mod error;
pub mod config;
pub mod registry;
pub mod heartbeat;
pub mod stats;
pub mod lifecycle;
pub mod say;
pub mod protocol;
pub mod server;
pub mod client;
pub mod cli;

pub use session::{Session, SessionId};
pub use event::Event;
pub use error::RelayError;
pub use config::RelayConfig;
pub use registry::{Mailbox, Registry};
pub use lifecycle::{Connection, EventSink, RelayService, StreamEnd};
pub use say::Delivery;
pub use server::RelayServer;
pub use client::{EventStream, RelayClient, RemoteError};
pub use cli::{ChatCli, ServerCli};
