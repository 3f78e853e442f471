//! Hypermedia links returned by upload negotiation.
//!
//! A 202 negotiation response names follow-up actions:
//!
//! ```json
//! {"_links": {"upload": {"href": "https://...", "header": {"Authorization": "..."}},
//!             "verify": {"href": "https://..."}}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relation carrying the storage URL the object is PUT to.
pub const REL_UPLOAD: &str = "upload";

/// Relation the client POSTs to once the PUT has completed.
pub const REL_VERIFY: &str = "verify";

/// A follow-up action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Link {
    /// The URL for the action.
    pub href: String,
    /// HTTP headers to include in the request.
    #[serde(default)]
    pub header: HashMap<String, String>,
}

/// The `_links` section of a negotiation response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LinkMetadata {
    #[serde(rename = "_links", default)]
    links: Option<HashMap<String, Link>>,
}

impl LinkMetadata {
    /// Whether the response carried a `_links` object at all.
    pub fn has_links(&self) -> bool {
        self.links.is_some()
    }

    /// Look up a relation by name.
    pub fn rel(&self, name: &str) -> Option<&Link> {
        self.links.as_ref()?.get(name)
    }

    pub fn upload(&self) -> Option<&Link> {
        self.rel(REL_UPLOAD)
    }

    pub fn verify(&self) -> Option<&Link> {
        self.rel(REL_VERIFY)
    }
}

/// Body of negotiation and verify requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSpec<'a> {
    pub oid: &'a str,
    pub size: u64,
}
