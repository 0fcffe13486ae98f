use super::Client;
use crate::error::{Error, Result};
use crate::transport::TransportSession;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Serialize a payload to its wire form
pub(crate) fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Bytes> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|e| Error::Encode(e.to_string()))
}

impl Client {
    /// Publish `payload` as JSON on `topic`.
    ///
    /// Returns once the transport has accepted the message; nothing waits
    /// for a reply. Replies are matched by the caller through the payload's
    /// `requestId`.
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> Result<()> {
        let (handle, _) = self.shared.live_session()?;
        check_topic(topic)?;
        let bytes = encode(payload)?;
        self.send(handle.as_ref(), topic, bytes)
    }

    /// Publish bytes that are already encoded.
    pub async fn publish_raw(&self, topic: &str, payload: impl Into<Bytes>) -> Result<()> {
        let (handle, _) = self.shared.live_session()?;
        check_topic(topic)?;
        self.send(handle.as_ref(), topic, payload.into())
    }

    fn send(&self, handle: &dyn TransportSession, topic: &str, payload: Bytes) -> Result<()> {
        debug!(
            "Publishing message to topic {} (size: {} bytes)",
            topic,
            payload.len()
        );
        handle.send(topic, payload)?;
        self.shared
            .counters
            .messages_published
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn check_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::InvalidTopic("Topic name cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_json() {
        let bytes = encode(&json!({"requestId": "req-1"})).unwrap();
        assert_eq!(&bytes[..], br#"{"requestId":"req-1"}"#);
    }

    #[test]
    fn test_encode_rejects_non_string_keys() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "x");
        assert!(matches!(encode(&map), Err(Error::Encode(_))));
    }
}
