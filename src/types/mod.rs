//! Response envelope types.
//!
//! Resource payloads are opaque to the pipeline; these types only describe
//! the envelope every response shares.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Links attached to a document or resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLinks {
    /// Canonical URL of this document.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Absolute URL of the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Absolute URL of the first page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    /// URL of a related resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

/// Success envelope: `data` plus optional links and side-loaded resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Primary data.
    pub data: T,
    /// Document links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<ResourceLinks>,
    /// Side-loaded related resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Value>,
    /// Document metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T> ApiResponse<T> {
    /// Absolute URL of the next page, if any.
    pub fn next_link(&self) -> Option<&str> {
        self.links.as_ref().and_then(|l| l.next.as_deref())
    }
}

/// A generic resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type, e.g. `apps`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource id.
    pub id: String,
    /// Attributes, left untyped.
    #[serde(default)]
    pub attributes: Value,
    /// Relationships, left untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Value>,
    /// Resource links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<ResourceLinks>,
}
