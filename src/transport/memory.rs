//! In-process broker.
//!
//! Every client built on the same [`MemoryTransport`] (or a clone of it)
//! talks to the same broker, so one process can host both the requester and
//! the services answering it. Each session reports on its own tokio task,
//! which plays the part of the network thread of a real transport.
//!
//! The broker also exposes knobs for exercising failure paths: refusing the
//! next handshake, checking credentials, never answering, dropping live
//! connections, and injecting raw bytes.

use super::{EventSink, SessionEvent, Transport, TransportSession};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::topic::{TopicFilter, TopicMatcher, TrailingWildcardMatcher};
use crate::Message;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Counters kept by the in-process broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Handshakes attempted
    pub handshakes: u64,
    /// Subscription registrations received, including repeats
    pub subscribe_calls: u64,
    /// Messages accepted for sending
    pub sends: u64,
    /// Sessions currently up
    pub live_sessions: usize,
}

/// Where the broker delivers to one session
struct Route {
    filters: Mutex<Vec<TopicFilter>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Route {
    fn push(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event queue closed");
        }
    }
}

struct Broker {
    routes: RwLock<HashMap<u64, Arc<Route>>>,
    next_session: AtomicU64,
    matcher: TrailingWildcardMatcher,
    credentials: Mutex<Option<(String, String)>>,
    fail_next_connect: Mutex<Option<String>>,
    unresponsive: AtomicBool,
    handshakes: AtomicU64,
    subscribe_calls: AtomicU64,
    sends: AtomicU64,
}

impl Broker {
    fn deliver(&self, topic: &str, payload: &Bytes) -> usize {
        let routes = self.routes.read();
        let mut delivered = 0;
        for route in routes.values() {
            let wanted = route
                .filters
                .lock()
                .iter()
                .any(|f| self.matcher.matches(f, topic));
            if wanted {
                route.push(SessionEvent::Message(Message::new(topic, payload.clone())));
                delivered += 1;
            }
        }
        trace!("Routed message on {} to {} session(s)", topic, delivered);
        delivered
    }
}

/// A broker living inside the current process
#[derive(Clone)]
pub struct MemoryTransport {
    broker: Arc<Broker>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Broker {
                routes: RwLock::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                matcher: TrailingWildcardMatcher,
                credentials: Mutex::new(None),
                fail_next_connect: Mutex::new(None),
                unresponsive: AtomicBool::new(false),
                handshakes: AtomicU64::new(0),
                subscribe_calls: AtomicU64::new(0),
                sends: AtomicU64::new(0),
            }),
        }
    }

    /// Only accept sessions presenting these credentials.
    pub fn require_credentials(&self, username: &str, password: &str) {
        *self.broker.credentials.lock() = Some((username.to_string(), password.to_string()));
    }

    /// Refuse the next handshake with `reason`.
    pub fn fail_next_connect(&self, reason: &str) {
        *self.broker.fail_next_connect.lock() = Some(reason.to_string());
    }

    /// While set, handshakes are never answered.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.broker.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    /// Drop every live session as if the network went away. Returns how many
    /// sessions were dropped.
    pub fn drop_connections(&self, reason: &str) -> usize {
        let dropped: Vec<Arc<Route>> = self.broker.routes.write().drain().map(|(_, r)| r).collect();
        for route in &dropped {
            route.push(SessionEvent::Disconnected(reason.to_string()));
        }
        warn!("Dropped {} live session(s): {}", dropped.len(), reason);
        dropped.len()
    }

    /// Deliver raw bytes on `topic` to every subscribed session, bypassing
    /// any client. Returns the number of sessions it was routed to.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        self.broker.deliver(topic, &payload.into())
    }

    /// Filters registered by live sessions, sorted.
    pub fn filters(&self) -> Vec<String> {
        let routes = self.broker.routes.read();
        let mut filters: Vec<String> = routes
            .values()
            .flat_map(|r| {
                r.filters
                    .lock()
                    .iter()
                    .map(|f| f.pattern().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        filters.sort();
        filters
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            handshakes: self.broker.handshakes.load(Ordering::Relaxed),
            subscribe_calls: self.broker.subscribe_calls.load(Ordering::Relaxed),
            sends: self.broker.sends.load(Ordering::Relaxed),
            live_sessions: self.broker.routes.read().len(),
        }
    }
}

impl Transport for MemoryTransport {
    fn create_session(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportSession>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Transport(format!("memory transport needs a tokio runtime: {e}")))?;

        let id = self.broker.next_session.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime.spawn(
            async move {
                while let Some(event) = rx.recv().await {
                    events.emit(event);
                }
            }
            .instrument(info_span!("memory_session", id)),
        );

        debug!("Created memory session {} for {}", id, config.url);

        Ok(Arc::new(MemorySession {
            id,
            broker: Arc::downgrade(&self.broker),
            username: config.username.clone(),
            password: config.password.clone(),
            route: Arc::new(Route {
                filters: Mutex::new(Vec::new()),
                events: tx,
            }),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    id: u64,
    broker: Weak<Broker>,
    username: String,
    password: String,
    route: Arc<Route>,
    closed: AtomicBool,
}

impl MemorySession {
    fn broker(&self) -> Result<Arc<Broker>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("session {} is closed", self.id)));
        }
        self.broker
            .upgrade()
            .ok_or_else(|| Error::Transport("broker has shut down".into()))
    }

    fn live_broker(&self) -> Result<Arc<Broker>> {
        let broker = self.broker()?;
        if !broker.routes.read().contains_key(&self.id) {
            return Err(Error::Transport(format!("session {} is not up", self.id)));
        }
        Ok(broker)
    }
}

impl TransportSession for MemorySession {
    fn connect(&self) -> Result<()> {
        let broker = self.broker()?;
        broker.handshakes.fetch_add(1, Ordering::Relaxed);

        if let Some(reason) = broker.fail_next_connect.lock().take() {
            self.route.push(SessionEvent::ConnectFailed(reason));
            return Ok(());
        }

        let rejected = broker
            .credentials
            .lock()
            .as_ref()
            .is_some_and(|(user, pass)| *user != self.username || *pass != self.password);
        if rejected {
            self.route.push(SessionEvent::ConnectFailed(format!(
                "authentication failed for user '{}'",
                self.username
            )));
            return Ok(());
        }

        if broker.unresponsive.load(Ordering::SeqCst) {
            debug!("Memory session {} handshake left unanswered", self.id);
            return Ok(());
        }

        broker.routes.write().insert(self.id, self.route.clone());
        info!("Memory session {} is up", self.id);
        self.route.push(SessionEvent::Up);
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        let broker = self.live_broker()?;
        broker.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        let compiled = broker.matcher.compile(filter)?;

        let mut filters = self.route.filters.lock();
        if !filters.contains(&compiled) {
            filters.push(compiled);
        }
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        let _broker = self.live_broker()?;
        self.route.filters.lock().retain(|f| f.pattern() != filter);
        Ok(())
    }

    fn send(&self, topic: &str, payload: Bytes) -> Result<()> {
        let broker = self.live_broker()?;
        broker.sends.fetch_add(1, Ordering::Relaxed);
        broker.deliver(topic, &payload);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(broker) = self.broker.upgrade() {
            broker.routes.write().remove(&self.id);
        }
        debug!("Memory session {} closed", self.id);
    }
}
