//! Keyword-based product categorization and region routing.

use crate::sites::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cosmetics and skincare brand / product-type terms.
const COSMETIC_KEYWORDS: &[&str] = &[
    "cosmetic",
    "skincare",
    "serum",
    "cream",
    "mask",
    "essence",
    "toner",
    "lotion",
    "innisfree",
    "laneige",
    "missha",
    "etude",
    "cosrx",
    "the face shop",
];

/// Electronics brand / product-type terms.
const ELECTRONICS_KEYWORDS: &[&str] = &[
    "phone",
    "laptop",
    "computer",
    "headphone",
    "mouse",
    "keyboard",
    "samsung",
    "apple",
    "dell",
    "sony",
    "logitech",
    "macbook",
    "galaxy",
    "iphone",
    "xps",
];

/// Product category, which decides the storefront regions to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Cosmetic,
    Electronics,
    Unknown,
}

impl ProductCategory {
    /// Regions to crawl for this category. `Unknown` queries every region.
    pub fn regions(&self) -> &'static [Region] {
        match self {
            ProductCategory::Cosmetic => &[Region::Korea],
            ProductCategory::Electronics => &[Region::Us],
            ProductCategory::Unknown => &[Region::Korea, Region::Us],
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProductCategory::Cosmetic => "cosmetic",
            ProductCategory::Electronics => "electronics",
            ProductCategory::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Classifies product names by substring match against keyword tables.
///
/// Cosmetics are checked before electronics, so a name matching both is
/// routed to Korea.
#[derive(Debug, Clone)]
pub struct CategoryRouter {
    cosmetic: Vec<String>,
    electronics: Vec<String>,
}

impl CategoryRouter {
    /// Creates a router with the built-in keyword tables.
    pub fn new() -> Self {
        Self {
            cosmetic: COSMETIC_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            electronics: ELECTRONICS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Extends the built-in tables with extra keywords (case-insensitive).
    pub fn with_extra_keywords(mut self, cosmetic: &[String], electronics: &[String]) -> Self {
        let normalize = |k: &String| k.trim().to_lowercase();
        self.cosmetic.extend(cosmetic.iter().map(normalize).filter(|k| !k.is_empty()));
        self.electronics.extend(electronics.iter().map(normalize).filter(|k| !k.is_empty()));
        self
    }

    /// Classifies a free-text product name.
    pub fn classify(&self, product_name: &str) -> ProductCategory {
        let name = product_name.to_lowercase();
        let contains_any = |keywords: &[String]| keywords.iter().any(|k| name.contains(k.as_str()));

        if contains_any(&self.cosmetic) {
            ProductCategory::Cosmetic
        } else if contains_any(&self.electronics) {
            ProductCategory::Electronics
        } else {
            ProductCategory::Unknown
        }
    }
}

impl Default for CategoryRouter {
    fn default() -> Self {
        Self::new()
    }
}
