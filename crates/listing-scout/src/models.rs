//! Structured listing record produced by extraction.

use serde::{Deserialize, Serialize};

/// Keys every extraction response must carry, in validation order.
pub const SCHEMA_KEYS: [&str; 11] = [
    "title",
    "storage",
    "processor",
    "graphics",
    "display",
    "ram",
    "battery",
    "status",
    "color",
    "description",
    "price",
];

/// A validated product record. Only `title` is guaranteed; every other
/// attribute is free text the model may leave null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    pub storage: Option<String>,
    pub processor: Option<String>,
    pub graphics: Option<String>,
    pub display: Option<String>,
    pub ram: Option<String>,
    pub battery: Option<String>,
    pub status: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
}

impl ListingRecord {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}
