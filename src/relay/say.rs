// Directed message relay between named sessions

use crate::relay::error::RelayError;
use crate::relay::event::Event;
use crate::relay::lifecycle::RelayService;

/// What happened to a relayed message on the target side.
///
/// The source is acknowledged either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued in the target's mailbox
    Delivered,
    /// No session has the target name, or it has no open stream
    TargetUnavailable,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

impl RelayService {
    /// Relay `message` from the session named `source` to the one named `target`.
    ///
    /// Fails with `NotAuthorized` unless the source resolves to a connected
    /// session. An unknown or disconnected target is reported through
    /// `Delivery` and never as an error. Blocks while the target mailbox is
    /// full.
    pub async fn say(
        &self,
        source: &str,
        target: &str,
        message: &str,
    ) -> Result<Delivery, RelayError> {
        self.stats().request();

        let registry = self.registry();
        let source_id = registry
            .resolve_name(source)
            .await
            .ok_or(RelayError::NotAuthorized)?;
        if !registry.is_connected(source_id).await {
            return Err(RelayError::NotAuthorized);
        }

        tracing::debug!("Log name={} message={}", source, message);

        let Some(target_id) = registry.resolve_name(target).await else {
            tracing::warn!("Dropping message from {}: no session named {}", source, target);
            return Ok(Delivery::TargetUnavailable);
        };

        if registry.send_to(target_id, Event::log(source, message)).await {
            Ok(Delivery::Delivered)
        } else {
            tracing::warn!("Dropping message from {}: {} is not connected", source, target);
            Ok(Delivery::TargetUnavailable)
        }
    }
}
