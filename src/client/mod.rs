//! The messaging client: one transport session, a subscription registry, the
//! dispatcher that feeds it, and publishing.

mod delivery;
mod publisher;
mod registry;

pub use delivery::Delivery;
pub use registry::{Callback, SubscriptionId};

use crate::config::SessionConfig;
use crate::correlation::RequestId;
use crate::error::{Error, Result};
use crate::topic::{SegmentMatcher, TopicMatcher};
use crate::transport::memory::MemoryTransport;
use crate::transport::{EventSink, SessionEvent, SessionListener, Transport, TransportSession};
use crate::{ClientStats, ConnectionState, Message};
use parking_lot::Mutex;
use registry::Registry;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

/// Statistics counters for the client
#[derive(Default)]
struct Counters {
    messages_published: AtomicU64,
    messages_dispatched: AtomicU64,
    deliveries: AtomicU64,
    messages_dropped: AtomicU64,
    decode_failures: AtomicU64,
    callback_failures: AtomicU64,
}

type Waiter = oneshot::Sender<Result<()>>;

/// Session state. Only one transport handle is ever live.
struct Session {
    state: ConnectionState,
    /// Bumped every time a session is started or let go; events stamped
    /// with an older generation are ignored.
    generation: u64,
    handle: Option<Arc<dyn TransportSession>>,
    waiters: Vec<Waiter>,
}

impl Session {
    fn settle(&mut self, outcome: Result<()>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Let go of the current session and return its handle.
    fn reset(&mut self) -> Option<Arc<dyn TransportSession>> {
        self.state = ConnectionState::Disconnected;
        self.generation += 1;
        self.handle.take()
    }
}

struct Shared {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    matcher: Arc<dyn TopicMatcher>,
    session: Mutex<Session>,
    registry: Registry,
    /// Keeps a registry change and its transport call together, so the
    /// transport's filter set follows the registry.
    subscriptions: Mutex<()>,
    /// Held for the whole of one dispatch so messages never interleave.
    dispatch_lock: Mutex<()>,
    counters: Counters,
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    matcher: Arc<dyn TopicMatcher>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            transport: None,
            matcher: Arc::new(SegmentMatcher),
        }
    }
}

impl ClientBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Swap the wildcard dialect used for subscriptions and dispatch.
    pub fn matcher(mut self, matcher: impl TopicMatcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Build the client. Without an explicit transport an in-process
    /// [`MemoryTransport`] is used.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(MemoryTransport::new()));
        debug!("Creating client for {:?}", self.config);

        Ok(Client {
            shared: Arc::new(Shared {
                config: self.config,
                transport,
                matcher: self.matcher,
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    handle: None,
                    waiters: Vec::new(),
                }),
                registry: Registry::new(),
                subscriptions: Mutex::new(()),
                dispatch_lock: Mutex::new(()),
                counters: Counters::default(),
            }),
        })
    }
}

/// A pub/sub client bound to one transport.
///
/// Cloning is cheap; clones share the session and the registry.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client with `config` on `transport` and the strict wildcard matcher
    pub fn new(config: SessionConfig, transport: impl Transport + 'static) -> Result<Self> {
        Self::builder().config(config).transport(transport).build()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Open the session and wait until the transport confirms it.
    ///
    /// Returns immediately when already connected. A call made while another
    /// connect is in flight waits for that attempt instead of opening a
    /// second session. There is no timeout: if the transport never answers,
    /// neither does this.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let opened = {
            let mut session = self.shared.session.lock();
            match session.state {
                ConnectionState::Connected => {
                    debug!("Already connected");
                    return Ok(());
                }
                ConnectionState::Connecting => {
                    debug!("Joining connect already in progress");
                    session.waiters.push(tx);
                    None
                }
                ConnectionState::Disconnected => {
                    session.state = ConnectionState::Connecting;
                    session.generation += 1;
                    let generation = session.generation;
                    info!(
                        "Connecting to {} (vpn {})",
                        self.shared.config.url, self.shared.config.vpn_name
                    );

                    let shared: Weak<Shared> = Arc::downgrade(&self.shared);
                    let listener: Weak<dyn SessionListener> = shared;
                    let sink = EventSink::new(listener, generation);
                    match self.shared.transport.create_session(&self.shared.config, sink) {
                        Ok(handle) => {
                            session.handle = Some(handle.clone());
                            session.waiters.push(tx);
                            Some((handle, generation))
                        }
                        Err(e) => {
                            session.reset();
                            error!("Failed to create transport session: {}", e);
                            return Err(Error::Connection(e.to_string()));
                        }
                    }
                }
            }
        };

        if let Some((handle, generation)) = opened {
            if let Err(e) = handle.connect() {
                self.shared.connect_failed(generation, e.to_string());
            }
        }
        Self::await_outcome(rx).await
    }

    async fn await_outcome(rx: oneshot::Receiver<Result<()>>) -> Result<()> {
        rx.await
            .unwrap_or_else(|_| Err(Error::Connection("connect attempt was abandoned".into())))
    }

    /// Close the session. A no-op when already disconnected; pending
    /// connect calls fail.
    pub async fn disconnect(&self) -> Result<()> {
        let handle = {
            let mut session = self.shared.session.lock();
            if session.state == ConnectionState::Disconnected {
                debug!("Disconnect requested while not connected");
                return Ok(());
            }
            let handle = session.reset();
            session.settle(Err(Error::Connection(
                "disconnected before the session came up".into(),
            )));
            let cleared = self.shared.registry.clear();
            debug!("Cleared {} subscription(s)", cleared);
            handle
        };

        if let Some(handle) = handle {
            handle.close();
        }
        info!("Disconnected");
        Ok(())
    }

    /// Register `callback` for every message whose topic matches `filter`.
    ///
    /// Callbacks on the same filter run in the order they were registered.
    /// Subscribing the same filter again adds another callback; the
    /// transport is asked again but delivers once.
    pub async fn subscribe<F>(&self, filter: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&Delivery<'_>) + Send + Sync + 'static,
    {
        let (handle, generation) = self.shared.live_session()?;
        let filter = self.shared.matcher.compile(filter)?;

        let _guard = self.shared.subscriptions.lock();
        handle.subscribe(filter.pattern())?;

        let session = self.shared.session.lock();
        if session.generation != generation || session.state != ConnectionState::Connected {
            warn!("Session ended while subscribing to {}", filter);
            return Err(Error::NotConnected);
        }
        let pattern = filter.pattern().to_string();
        let (id, new_filter) = self.shared.registry.insert(filter, Arc::new(callback));
        drop(session);

        if new_filter {
            info!("Subscribed to {} ({})", pattern, id);
        } else {
            info!("Added callback {} to existing subscription {}", id, pattern);
        }
        Ok(id)
    }

    /// Remove one registration. When it was the last callback on its filter
    /// the transport subscription is dropped too. Returns false for an
    /// unknown id.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let _guard = self.shared.subscriptions.lock();
        let Some((filter, last)) = self.shared.registry.remove(id) else {
            return Ok(false);
        };
        debug!("Removed {} from {}", id, filter);
        if last {
            if let Ok((handle, _)) = self.shared.live_session() {
                handle.unsubscribe(filter.pattern())?;
                info!("Unsubscribed from {}", filter);
            }
        }
        Ok(true)
    }

    /// Fresh id for the `requestId` field of an outbound payload
    pub fn generate_request_id(&self) -> RequestId {
        RequestId::generate()
    }

    pub fn stats(&self) -> ClientStats {
        let counters = &self.shared.counters;
        ClientStats {
            state: self.state(),
            subscribed_filters: self.shared.registry.filter_count(),
            callbacks: self.shared.registry.callback_count(),
            messages_published: counters.messages_published.load(Ordering::Relaxed),
            messages_dispatched: counters.messages_dispatched.load(Ordering::Relaxed),
            deliveries: counters.deliveries.load(Ordering::Relaxed),
            messages_dropped: counters.messages_dropped.load(Ordering::Relaxed),
            decode_failures: counters.decode_failures.load(Ordering::Relaxed),
            callback_failures: counters.callback_failures.load(Ordering::Relaxed),
        }
    }
}

impl Shared {
    /// The current handle, if the session is up
    fn live_session(&self) -> Result<(Arc<dyn TransportSession>, u64)> {
        let session = self.session.lock();
        match (&session.state, &session.handle) {
            (ConnectionState::Connected, Some(handle)) => Ok((handle.clone(), session.generation)),
            _ => Err(Error::NotConnected),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let session = self.session.lock();
        session.generation == generation && session.state == ConnectionState::Connected
    }

    fn session_up(&self, generation: u64) {
        let mut session = self.session.lock();
        if session.generation != generation || session.state != ConnectionState::Connecting {
            trace!("Ignoring stale up notice for session {}", generation);
            return;
        }
        session.state = ConnectionState::Connected;
        info!("Connected to {}", self.config.url);
        session.settle(Ok(()));
    }

    fn connect_failed(&self, generation: u64, reason: String) {
        let handle = {
            let mut session = self.session.lock();
            if session.generation != generation || session.state != ConnectionState::Connecting {
                trace!("Ignoring stale connect failure for session {}", generation);
                return;
            }
            error!("Connection failed: {}", reason);
            let handle = session.reset();
            session.settle(Err(Error::Connection(reason)));
            handle
        };
        if let Some(handle) = handle {
            handle.close();
        }
    }

    fn connection_lost(&self, generation: u64, reason: String) {
        let mut session = self.session.lock();
        if session.generation != generation {
            trace!("Ignoring disconnect notice for old session {}", generation);
            return;
        }
        session.reset();
        session.settle(Err(Error::Connection(reason.clone())));
        let cleared = self.registry.clear();
        warn!(
            "Connection lost: {} ({} subscription(s) dropped)",
            reason, cleared
        );
    }

    /// Run one inbound message through the registry.
    fn dispatch(&self, message: &Message) {
        let _serial = self.dispatch_lock.lock();
        self.counters.messages_dispatched.fetch_add(1, Ordering::Relaxed);

        let matched = self.registry.matching(self.matcher.as_ref(), &message.topic);
        if matched.is_empty() {
            self.counters.messages_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("No subscription matches {}, dropping message", message.topic);
            return;
        }

        let payload = match decode_payload(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping message on {}: {}", message.topic, e);
                return;
            }
        };

        for m in &matched {
            let delivery = Delivery::new(&message.topic, &m.filter, &payload);
            for (id, callback) in &m.callbacks {
                match panic::catch_unwind(AssertUnwindSafe(|| callback(&delivery))) {
                    Ok(()) => {
                        self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(cause) => {
                        self.counters.callback_failures.fetch_add(1, Ordering::Relaxed);
                        let err = Error::Callback {
                            filter: m.filter.pattern().to_string(),
                            reason: panic_reason(cause.as_ref()),
                        };
                        error!("Subscriber {} failed on {}: {}", id, message.topic, err);
                    }
                }
            }
        }
        trace!("Dispatched {} to {} filter(s)", message.topic, matched.len());
    }
}

impl SessionListener for Shared {
    fn on_event(&self, generation: u64, event: SessionEvent) {
        match event {
            SessionEvent::Up => self.session_up(generation),
            SessionEvent::ConnectFailed(reason) => self.connect_failed(generation, reason),
            SessionEvent::Disconnected(reason) => self.connection_lost(generation, reason),
            SessionEvent::Message(message) => {
                if self.is_current(generation) {
                    self.dispatch(&message);
                } else {
                    trace!("Ignoring message on {} from old session", message.topic);
                }
            }
        }
    }
}

/// An empty payload decodes as an empty object.
fn decode_payload(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn panic_reason(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
