// Session lifecycle: authorize, grace-period expiry, connect and stream loop
//
// Pending --connect--> Connected --stream ends--> Terminated
//    \--grace period elapses--> Terminated

use crate::relay::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::event::Event;
use crate::relay::heartbeat::HeartbeatTicker;
use crate::relay::registry::{Mailbox, Registry};
use crate::relay::session::SessionId;
use crate::relay::stats::{NoopStats, StatsSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outbound side of a client stream.
///
/// An error from `send` terminates the stream loop.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: Event) -> Result<(), RelayError>;
}

#[async_trait]
impl EventSink for mpsc::Sender<Event> {
    async fn send(&mut self, event: Event) -> Result<(), RelayError> {
        mpsc::Sender::send(self, event)
            .await
            .map_err(|_| RelayError::Transport("event receiver dropped".into()))
    }
}

/// Why a stream loop stopped
#[derive(Debug)]
pub enum StreamEnd {
    /// The transport cancelled the stream
    Cancelled,
    /// The session was released from outside the loop
    Released,
    /// Writing to the sink failed
    SinkFailed(RelayError),
}

/// Entry point for the three relay operations
#[derive(Clone)]
pub struct RelayService {
    registry: Registry,
    config: Arc<RelayConfig>,
    stats: Arc<dyn StatsSink>,
}

impl RelayService {
    /// Create a service with no throughput reporting
    pub fn new(config: RelayConfig) -> Self {
        Self::with_stats(config, Arc::new(NoopStats))
    }

    pub fn with_stats(config: RelayConfig, stats: Arc<dyn StatsSink>) -> Self {
        Self {
            registry: Registry::new(&config),
            config: Arc::new(config),
            stats,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }

    /// Create a pending session and start its grace-period timer
    pub async fn authorize(&self, name: &str) -> Result<SessionId, RelayError> {
        self.stats.request();

        let id = self.registry.create_session(name).await?;
        let timer = self.spawn_expiry(id);
        self.registry.attach_expiry(id, timer.abort_handle()).await;

        tracing::info!("Authorized {} as session {}", name, id);
        Ok(id)
    }

    fn spawn_expiry(&self, id: SessionId) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let grace = self.config.grace_period();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(session) = registry.expire_if_pending(id).await {
                tracing::info!(
                    "Session {} ({}) expired without connecting after {}s",
                    id,
                    session.name,
                    session.age_seconds()
                );
            }
        })
    }

    /// Claim the session's mailbox and announce it.
    ///
    /// The returned `Connection` must be driven with `run`; dropping it
    /// without running still tears the session down.
    pub async fn connect(&self, id: SessionId) -> Result<Connection, RelayError> {
        self.stats.request();

        let mailbox = self.registry.claim_mailbox(id).await?;
        tracing::info!("Joining name ==> {}", mailbox.name);

        let join = {
            let registry = self.registry.clone();
            let event = Event::join(mailbox.name.clone());
            tokio::spawn(async move {
                registry.broadcast(event).await;
            })
        };

        Ok(Connection {
            service: self.clone(),
            mailbox: Some(mailbox),
            join: Some(join),
        })
    }

    /// Connect and stream events into `sink` until the stream ends
    pub async fn connect_and_stream<S: EventSink>(
        &self,
        id: SessionId,
        sink: S,
        cancel: CancellationToken,
    ) -> Result<StreamEnd, RelayError> {
        let connection = self.connect(id).await?;
        Ok(connection.run(sink, cancel).await)
    }

    /// Force a session out, connected or not.
    ///
    /// A running stream loop notices and performs its own Leave broadcast.
    /// Returns false if the session was already gone.
    pub async fn disconnect(&self, id: SessionId) -> bool {
        match self.registry.release(id).await {
            Some(session) => {
                tracing::info!("Disconnected session {} ({})", id, session.name);
                true
            }
            None => false,
        }
    }
}

/// A claimed mailbox waiting to be streamed
pub struct Connection {
    service: RelayService,
    mailbox: Option<Mailbox>,
    join: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn session_id(&self) -> Option<SessionId> {
        self.mailbox.as_ref().map(|m| m.id)
    }

    /// Pump mailbox events and heartbeats into `sink`.
    ///
    /// Stops on transport cancellation, on release of the session, or on
    /// the first failed write; then releases the session and broadcasts
    /// Leave exactly once.
    pub async fn run<S: EventSink>(mut self, mut sink: S, cancel: CancellationToken) -> StreamEnd {
        let Some(mut mailbox) = self.mailbox.take() else {
            return StreamEnd::Released;
        };

        let stats = self.service.stats().clone();
        let released = mailbox.released().clone();
        let mut heartbeat = HeartbeatTicker::new(self.service.config().heartbeat_interval());

        let end = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                _ = released.cancelled() => break StreamEnd::Released,
                next = mailbox.recv() => match next {
                    Some(event) => event,
                    None => break StreamEnd::Released,
                },
                _ = heartbeat.tick() => Event::Heartbeat,
            };

            let is_heartbeat = event.is_heartbeat();
            let written = tokio::select! {
                r = sink.send(event) => r,
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                _ = released.cancelled() => break StreamEnd::Released,
            };
            if let Err(e) = written {
                break StreamEnd::SinkFailed(e);
            }

            stats.delivered();
            if is_heartbeat {
                tracing::trace!("Heartbeat sent to {}", mailbox.name);
            } else {
                heartbeat.touch();
            }
        };

        tracing::debug!("Stream for {} ended: {:?}", mailbox.name, end);

        let (id, name) = mailbox.close();
        teardown(self.service.registry().clone(), id, name, self.join.take()).await;
        end
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(mailbox) = self.mailbox.take() else {
            return;
        };
        let registry = self.service.registry().clone();
        let join = self.join.take();
        let (id, name) = mailbox.close();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown(registry, id, name, join));
            }
            Err(_) => {
                tracing::warn!(
                    "Connection for {} dropped outside a runtime; session left registered",
                    name
                );
            }
        }
    }
}

async fn teardown(
    registry: Registry,
    id: SessionId,
    name: String,
    join: Option<JoinHandle<()>>,
) {
    registry.release(id).await;

    // keep Join ahead of Leave in every mailbox
    if let Some(join) = join {
        let _ = join.await;
    }

    tracing::info!("Leave name={}", name);
    registry.broadcast(Event::leave(name)).await;
}
