//! Request ids carried in every payload so replies can be matched back to the
//! request that caused them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix applied to generated ids.
pub const REQUEST_ID_PREFIX: &str = "req_";

/// Identifier embedded as `requestId` in requests and echoed in replies.
///
/// Generated ids are `req_` followed by a random v4 UUID, so no coordination
/// between callers is needed. Ids received from the wire are kept verbatim.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random request id
    pub fn generate() -> Self {
        Self(format!("{REQUEST_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id came from [`RequestId::generate`].
    pub fn is_generated(&self) -> bool {
        self.0
            .strip_prefix(REQUEST_ID_PREFIX)
            .is_some_and(|rest| Uuid::parse_str(rest).is_ok())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for RequestId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RequestId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<RequestId> = (0..10_000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_generated_id_shape() {
        let id = RequestId::generate();
        assert!(id.as_str().starts_with(REQUEST_ID_PREFIX));
        assert!(id.is_generated());
        assert!(!RequestId::from("req-1").is_generated());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = RequestId::from("req-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-1\"");
        let back: RequestId = serde_json::from_str("\"req-2\"").unwrap();
        assert_eq!(back, "req-2");
    }
}
