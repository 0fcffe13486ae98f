use crate::correlation::RequestId;
use crate::error::Result;
use crate::payloads::{Event, REQUEST_ID_FIELD};
use crate::topic::TopicFilter;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// What a callback receives for one inbound message
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    topic: &'a str,
    filter: &'a TopicFilter,
    payload: &'a Value,
}

impl<'a> Delivery<'a> {
    pub(crate) fn new(topic: &'a str, filter: &'a TopicFilter, payload: &'a Value) -> Self {
        Self {
            topic,
            filter,
            payload,
        }
    }

    /// Concrete topic the message arrived on
    pub fn topic(&self) -> &'a str {
        self.topic
    }

    /// The subscribed filter that matched
    pub fn filter(&self) -> &'a TopicFilter {
        self.filter
    }

    /// The decoded JSON payload
    pub fn payload(&self) -> &'a Value {
        self.payload
    }

    /// The `requestId` embedded in the payload, if any
    pub fn request_id(&self) -> Option<RequestId> {
        self.payload
            .get(REQUEST_ID_FIELD)
            .and_then(Value::as_str)
            .map(RequestId::from)
    }

    /// Whether this message answers the request identified by `id`
    pub fn is_reply_to(&self, id: &RequestId) -> bool {
        self.payload
            .get(REQUEST_ID_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|embedded| id == embedded)
    }

    /// Decode the payload into a typed contract
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.payload)?)
    }

    /// Decode the payload into the [`Event`] variant its topic calls for
    pub fn event(&self) -> Result<Event> {
        Event::decode(self.topic, self.payload)
    }
}
