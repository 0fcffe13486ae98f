//! An async publish/subscribe messaging client with wildcard topic routing.
//!
//! A [`Client`] owns one transport session, keeps a registry of topic filters
//! and callbacks, dispatches inbound messages to every matching callback, and
//! publishes JSON payloads. Replies are correlated to requests by the
//! `requestId` carried in every payload, see [`RequestId`].
//!
//! The [`facade`] module exposes the same operations as process-wide
//! functions backed by a single lazily constructed client.

pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod facade;
pub mod payloads;
pub mod topic;
pub mod transport;

use bytes::Bytes;
use std::fmt;

pub use client::{Client, ClientBuilder, Delivery, SubscriptionId};
pub use config::SessionConfig;
pub use correlation::RequestId;
pub use error::{Error, Result};
pub use payloads::Event;
pub use topic::{SegmentMatcher, TopicFilter, TopicMatcher, TrailingWildcardMatcher};
pub use transport::memory::MemoryTransport;
pub use transport::{EventSink, SessionEvent, Transport, TransportSession};

/// A message as it travels over the transport
#[derive(Debug, Clone)]
pub struct Message {
    /// Concrete topic the message is addressed to
    pub topic: String,
    /// Serialized payload, JSON text on the wire
    pub payload: Bytes,
}

impl Message {
    /// Create a new message
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Lifecycle of the client's transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Statistics about the client's operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    /// Current session state
    pub state: ConnectionState,
    /// Number of distinct topic filters in the registry
    pub subscribed_filters: usize,
    /// Number of registered callbacks across all filters
    pub callbacks: usize,
    /// Total number of messages handed to the transport
    pub messages_published: u64,
    /// Total number of inbound messages seen by the dispatcher
    pub messages_dispatched: u64,
    /// Total number of successful callback invocations
    pub deliveries: u64,
    /// Inbound messages that matched no filter
    pub messages_dropped: u64,
    /// Inbound messages whose payload was not valid JSON
    pub decode_failures: u64,
    /// Callback invocations that panicked
    pub callback_failures: u64,
}
