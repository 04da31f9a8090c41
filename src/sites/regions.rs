//! Storefront regions and their locale/currency configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market regions the crawler compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Korea,
    Us,
}

impl Region {
    /// Returns the ISO currency code prices are listed in.
    pub fn currency(&self) -> &'static str {
        match self {
            Region::Korea => "KRW",
            Region::Us => "USD",
        }
    }

    /// Returns the currency marker storefronts print next to prices.
    pub fn currency_symbol(&self) -> char {
        match self {
            Region::Korea => '₩',
            Region::Us => '$',
        }
    }

    /// Returns the Accept-Language header value for this region.
    pub fn accept_language(&self) -> &'static str {
        match self {
            Region::Korea => "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7",
            Region::Us => "en-US,en;q=0.9",
        }
    }

    /// Returns all supported regions.
    pub fn all() -> &'static [Region] {
        &[Region::Korea, Region::Us]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Region::Korea => "korea",
            Region::Us => "us",
        };
        write!(f, "{}", code)
    }
}

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "korea" | "kr" | "ko" | "south korea" => Ok(Region::Korea),
            "us" | "usa" | "united states" => Ok(Region::Us),
            _ => Err(RegionParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionParseError(String);

impl fmt::Display for RegionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown region '{}'. Valid regions: korea, us", self.0)
    }
}

impl std::error::Error for RegionParseError {}
