//! Payload contracts exchanged with the design, image, storefront and
//! template services, and the topic-keyed [`Event`] union for replies.
//!
//! Every payload carries a `requestId`. The client core never looks inside
//! payloads; these types are for the code on either side of it.

use crate::correlation::RequestId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON field holding the request id in every payload
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Topic names used by the services
pub mod topics {
    pub const DESIGN_REQUESTED: &str = "ai/design/requested";
    pub const DESIGN_FROM_TEMPLATE_REQUESTED: &str = "ai/design/from-template/requested";
    pub const IDEAS_GENERATED: &str = "ai/design/ideas/generated";
    pub const DESIGN_ERROR: &str = "ai/design/error";

    pub const IMAGE_REQUESTED: &str = "ai/image/requested";
    pub const IMAGE_GENERATED: &str = "ai/image/generated";
    pub const IMAGE_ERROR: &str = "ai/image/error";

    pub const PRODUCT_REQUESTED: &str = "shopify/product/requested";
    pub const PRODUCT_CREATED: &str = "shopify/product/created";
    pub const PRODUCT_ERROR: &str = "shopify/product/error";

    pub const TEMPLATE_SEED_REQUESTED: &str = "intel/template/seed/requested";
    pub const TEMPLATE_SEED_GENERATED: &str = "intel/template/seed/generated";
    pub const TEMPLATE_ERROR: &str = "intel/template/error";
}

/// Role of a topic, read from its last level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Request,
    Reply,
    Error,
}

impl TopicKind {
    pub fn classify(topic: &str) -> Option<Self> {
        match topic.rsplit('/').next()? {
            "requested" => Some(TopicKind::Request),
            "generated" | "created" => Some(TopicKind::Reply),
            "error" => Some(TopicKind::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub slug: String,
    pub slogan: String,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignRequest {
    pub request_id: RequestId,
    pub brand: String,
    pub vibe: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignFromTemplateRequest {
    pub request_id: RequestId,
    pub template_brand: String,
    pub strategy_brief: Map<String, Value>,
    pub adaptation_notes: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeasGenerated {
    pub request_id: RequestId,
    pub ideas: Vec<Idea>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutput {
    #[serde(rename = "type")]
    pub kind: String,
    pub transparent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub request_id: RequestId,
    pub idea: Idea,
    pub item: String,
    pub output: ImageOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerated {
    pub request_id: RequestId,
    pub asset_url: String,
    pub mockup_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    pub request_id: RequestId,
    pub product_id: String,
    pub product_url: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSeedRequest {
    pub request_id: RequestId,
    pub template_brand: String,
    pub handles: Vec<String>,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAsset {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyBrief {
    pub positioning: String,
    pub palette: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSeedGenerated {
    pub request_id: RequestId,
    pub summary: String,
    pub reference_assets: Vec<ReferenceAsset>,
    pub strategy_brief: StrategyBrief,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub request_id: RequestId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An inbound reply, tagged by the topic it arrived on
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    IdeasGenerated(IdeasGenerated),
    ImageGenerated(ImageGenerated),
    ProductCreated(ProductCreated),
    TemplateSeedGenerated(TemplateSeedGenerated),
    /// Any service's `/error` topic; carries the topic it came from.
    Failed { topic: String, error: ErrorReply },
}

impl Event {
    /// Decode `payload` into the variant `topic` calls for.
    pub fn decode(topic: &str, payload: &Value) -> Result<Self> {
        let event = match topic {
            topics::IDEAS_GENERATED => Event::IdeasGenerated(IdeasGenerated::deserialize(payload)?),
            topics::IMAGE_GENERATED => Event::ImageGenerated(ImageGenerated::deserialize(payload)?),
            topics::PRODUCT_CREATED => Event::ProductCreated(ProductCreated::deserialize(payload)?),
            topics::TEMPLATE_SEED_GENERATED => {
                Event::TemplateSeedGenerated(TemplateSeedGenerated::deserialize(payload)?)
            }
            _ if TopicKind::classify(topic) == Some(TopicKind::Error) => Event::Failed {
                topic: topic.to_string(),
                error: ErrorReply::deserialize(payload)?,
            },
            _ => return Err(Error::UnknownTopic(topic.to_string())),
        };
        Ok(event)
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Event::IdeasGenerated(p) => &p.request_id,
            Event::ImageGenerated(p) => &p.request_id,
            Event::ProductCreated(p) => &p.request_id,
            Event::TemplateSeedGenerated(p) => &p.request_id,
            Event::Failed { error, .. } => &error.request_id,
        }
    }
}
