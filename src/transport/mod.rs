//! The seam between the client and whatever carries its messages.
//!
//! A [`Transport`] opens sessions. A [`TransportSession`] performs the
//! handshake, registers subscriptions and sends messages; everything the
//! broker reports back (session up, connect failure, connection loss,
//! inbound messages) flows through the [`EventSink`] it was created with.

pub mod memory;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::Message;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Something the transport reports about a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The handshake completed and the session is usable.
    Up,
    /// The handshake failed; carries the transport's diagnostic.
    ConnectFailed(String),
    /// An established session went away without being asked to.
    Disconnected(String),
    /// A message arrived on one of the session's subscriptions.
    Message(Message),
}

/// Opens sessions against a broker.
pub trait Transport: Send + Sync {
    /// Create a session for `config`. The session must not start its
    /// handshake until [`TransportSession::connect`] is called, and must
    /// report through `events` only.
    fn create_session(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportSession>>;
}

/// One live connection to a broker.
pub trait TransportSession: Send + Sync {
    /// Start the handshake. The outcome is reported later as
    /// [`SessionEvent::Up`] or [`SessionEvent::ConnectFailed`].
    fn connect(&self) -> Result<()>;

    /// Register interest in `filter`. Re-registering an existing filter must
    /// not duplicate delivery.
    fn subscribe(&self, filter: &str) -> Result<()>;

    fn unsubscribe(&self, filter: &str) -> Result<()>;

    /// Hand `payload` to the broker for direct, non-persistent delivery.
    fn send(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Tear the session down. Must be safe to call more than once.
    fn close(&self);
}

/// Receives session events on behalf of a client.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, generation: u64, event: SessionEvent);
}

/// Handle a transport uses to report events for one session.
///
/// Each sink is stamped with the generation of the session it belongs to so
/// the listener can ignore events from sessions it has already let go of.
#[derive(Clone)]
pub struct EventSink {
    listener: Weak<dyn SessionListener>,
    generation: u64,
}

impl EventSink {
    pub fn new(listener: Weak<dyn SessionListener>, generation: u64) -> Self {
        Self {
            listener,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver `event` to the listener, if it is still alive.
    pub fn emit(&self, event: SessionEvent) {
        match self.listener.upgrade() {
            Some(listener) => listener.on_event(self.generation, event),
            None => trace!("Listener for session {} is gone, dropping event", self.generation),
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
