// Session and mailbox tables behind a single lock
//
// Both maps live in one `Tables` value guarded by one RwLock so that
// compound checks (claim only if authorized and not already claimed) are
// atomic. Inserts, claims and removals take the write lock. Broadcast and
// directed sends only read the mailbox map: they clone the target senders
// under the read lock and enqueue after releasing it, so a full mailbox
// blocks the producer without holding the table lock.

use crate::relay::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::event::Event;
use crate::relay::session::{validate_name, Session, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

struct SessionEntry {
    session: Session,
    /// Cancelled when the session is released
    released: CancellationToken,
    /// Grace-period timer, aborted on claim or release
    expiry: Option<AbortHandle>,
}

impl SessionEntry {
    fn stop_expiry(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, SessionEntry>,
    mailboxes: HashMap<SessionId, mpsc::Sender<Event>>,
}

/// Receiving end of a claimed mailbox, owned by the session's stream loop
pub struct Mailbox {
    pub id: SessionId,
    pub name: String,
    rx: mpsc::Receiver<Event>,
    released: CancellationToken,
}

impl Mailbox {
    /// Next queued event, or `None` once the mailbox is closed and drained
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Token that fires when the owning session is released
    pub fn released(&self) -> &CancellationToken {
        &self.released
    }

    /// Drop the receiving end and hand back the owner's id and name.
    ///
    /// Producers still blocked on this mailbox fail instead of waiting
    /// for a reader that will never come.
    pub fn close(self) -> (SessionId, String) {
        let Mailbox { id, name, rx, .. } = self;
        drop(rx);
        (id, name)
    }
}

/// Concurrency-safe session and mailbox registry
#[derive(Clone)]
pub struct Registry {
    tables: Arc<RwLock<Tables>>,
    mailbox_capacity: usize,
    max_name_chars: usize,
}

impl Registry {
    /// Create an empty registry
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            mailbox_capacity: config.mailbox_capacity.max(1),
            max_name_chars: config.max_name_chars,
        }
    }

    /// Register a pending session under a fresh identifier.
    pub async fn create_session(&self, name: &str) -> Result<SessionId, RelayError> {
        validate_name(name, self.max_name_chars)?;

        let id = SessionId::generate();
        let entry = SessionEntry {
            session: Session::new(id, name.to_string()),
            released: CancellationToken::new(),
            expiry: None,
        };

        let mut tables = self.tables.write().await;
        tables.sessions.insert(id, entry);
        Ok(id)
    }

    /// Attach the grace-period timer for a pending session.
    ///
    /// If the session is already gone or connected the timer is aborted
    /// immediately.
    pub async fn attach_expiry(&self, id: SessionId, timer: AbortHandle) {
        let mut tables = self.tables.write().await;
        let connected = tables.mailboxes.contains_key(&id);
        match tables.sessions.get_mut(&id) {
            Some(entry) if !connected => entry.expiry = Some(timer),
            _ => timer.abort(),
        }
    }

    /// Claim the single mailbox for an authorized session
    pub async fn claim_mailbox(&self, id: SessionId) -> Result<Mailbox, RelayError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let entry = tables
            .sessions
            .get_mut(&id)
            .ok_or(RelayError::NotAuthorized)?;
        if tables.mailboxes.contains_key(&id) {
            return Err(RelayError::AlreadyConnected);
        }

        entry.stop_expiry();
        let name = entry.session.name.clone();
        let released = entry.released.clone();

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        tables.mailboxes.insert(id, tx);

        Ok(Mailbox {
            id,
            name,
            rx,
            released,
        })
    }

    /// Remove the session and its mailbox, if present.
    ///
    /// Idempotent. Returns the removed session on the first call only.
    pub async fn release(&self, id: SessionId) -> Option<Session> {
        let mut tables = self.tables.write().await;

        // dropping the sender closes the mailbox
        tables.mailboxes.remove(&id);

        let mut entry = tables.sessions.remove(&id)?;
        entry.stop_expiry();
        entry.released.cancel();
        Some(entry.session)
    }

    /// Grace-period expiry: release the session only if it never connected.
    pub async fn expire_if_pending(&self, id: SessionId) -> Option<Session> {
        let mut tables = self.tables.write().await;

        if tables.mailboxes.contains_key(&id) {
            return None;
        }

        let entry = tables.sessions.remove(&id)?;
        entry.released.cancel();
        Some(entry.session)
    }

    /// Find a session by display name.
    ///
    /// Names are not unique; when several sessions share a name an
    /// arbitrary one is returned.
    pub async fn resolve_name(&self, name: &str) -> Option<SessionId> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .iter()
            .find(|(_, entry)| entry.session.name == name)
            .map(|(id, _)| *id)
    }

    /// Display name of a registered session
    pub async fn session_name(&self, id: SessionId) -> Option<String> {
        let tables = self.tables.read().await;
        tables.sessions.get(&id).map(|e| e.session.name.clone())
    }

    /// Whether the session has a live mailbox
    pub async fn is_connected(&self, id: SessionId) -> bool {
        let tables = self.tables.read().await;
        tables.mailboxes.contains_key(&id)
    }

    /// Enqueue an event into every current mailbox, the originator's included.
    ///
    /// Returns how many mailboxes accepted the event.
    pub async fn broadcast(&self, event: Event) -> usize {
        let targets: Vec<mpsc::Sender<Event>> = {
            let tables = self.tables.read().await;
            tables.mailboxes.values().cloned().collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Enqueue an event into one mailbox.
    ///
    /// Blocks while the mailbox is full. Returns false if the session has
    /// no mailbox or it closed before the event was accepted.
    pub async fn send_to(&self, id: SessionId, event: Event) -> bool {
        let target = {
            let tables = self.tables.read().await;
            tables.mailboxes.get(&id).cloned()
        };

        match target {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Number of registered sessions, pending or connected
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Number of live mailboxes
    pub async fn mailbox_count(&self) -> usize {
        self.tables.read().await.mailboxes.len()
    }
}
