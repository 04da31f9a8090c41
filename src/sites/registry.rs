//! Process-wide storefront registry.

use super::catalog::{self, StorefrontEntry, QUERY_PLACEHOLDER};
use super::regions::Region;
use scraper::Selector;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::warn;

/// An ordered list of compiled CSS selectors, tried first to last.
#[derive(Clone, Default)]
pub struct SelectorChain {
    entries: Vec<(String, Selector)>,
}

impl SelectorChain {
    /// Compiles a chain, dropping selectors that do not parse.
    pub fn new<S: AsRef<str>>(selectors: &[S]) -> Self {
        let entries = selectors
            .iter()
            .filter_map(|s| {
                let s = s.as_ref();
                match Selector::parse(s) {
                    Ok(selector) => Some((s.to_string(), selector)),
                    Err(e) => {
                        warn!("Dropping invalid selector '{}': {:?}", s, e);
                        None
                    }
                }
            })
            .collect();

        Self { entries }
    }

    /// Iterates the compiled selectors in order.
    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.entries.iter().map(|(_, selector)| selector)
    }

    /// Returns the source strings in order.
    pub fn sources(&self) -> Vec<&str> {
        self.entries.iter().map(|(source, _)| source.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SelectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sources()).finish()
    }
}

impl Serialize for SelectorChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sources())
    }
}

/// A storefront the crawler can search.
#[derive(Debug, Clone, Serialize)]
pub struct StorefrontTarget {
    pub id: String,
    pub base_url: String,
    pub region: Region,
    pub search_url_template: String,
    pub price_selectors: SelectorChain,
    pub category_selectors: SelectorChain,
    pub title_selectors: SelectorChain,
}

impl StorefrontTarget {
    /// Creates a target with empty selector chains.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        region: Region,
        search_url_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            region,
            search_url_template: search_url_template.into(),
            price_selectors: SelectorChain::default(),
            category_selectors: SelectorChain::default(),
            title_selectors: SelectorChain::default(),
        }
    }

    pub fn with_price_selectors<S: AsRef<str>>(mut self, selectors: &[S]) -> Self {
        self.price_selectors = SelectorChain::new(selectors);
        self
    }

    pub fn with_category_selectors<S: AsRef<str>>(mut self, selectors: &[S]) -> Self {
        self.category_selectors = SelectorChain::new(selectors);
        self
    }

    pub fn with_title_selectors<S: AsRef<str>>(mut self, selectors: &[S]) -> Self {
        self.title_selectors = SelectorChain::new(selectors);
        self
    }

    /// Key identifying this target's records within a crawl run.
    pub fn source_key(&self) -> String {
        format!("{}_{}", self.id, self.region)
    }

    /// Builds the search URL for a product name.
    pub fn search_url(&self, product_name: &str) -> String {
        self.search_url_template
            .replace(QUERY_PLACEHOLDER, &urlencoding::encode(product_name))
    }
}

impl From<&StorefrontEntry> for StorefrontTarget {
    fn from(entry: &StorefrontEntry) -> Self {
        StorefrontTarget::new(entry.id, entry.base_url, entry.region, entry.search_url_template)
            .with_price_selectors(entry.price)
            .with_category_selectors(entry.category)
            .with_title_selectors(entry.title)
    }
}

static BUILTIN: LazyLock<Arc<SiteRegistry>> = LazyLock::new(|| {
    let targets = catalog::KOREA.iter().chain(catalog::US.iter()).map(StorefrontTarget::from);
    Arc::new(SiteRegistry::new(targets))
});

/// Immutable region → storefront lookup.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    targets: Vec<Arc<StorefrontTarget>>,
}

impl SiteRegistry {
    /// Creates a registry from targets, preserving their order.
    pub fn new(targets: impl IntoIterator<Item = StorefrontTarget>) -> Self {
        Self { targets: targets.into_iter().map(Arc::new).collect() }
    }

    /// Returns the built-in registry, compiled on first use.
    pub fn builtin() -> Arc<SiteRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// Returns the targets for a region in registry order. Empty if none.
    pub fn targets_for(&self, region: Region) -> Vec<Arc<StorefrontTarget>> {
        self.targets.iter().filter(|t| t.region == region).cloned().collect()
    }

    /// Returns every target in registry order.
    pub fn all(&self) -> &[Arc<StorefrontTarget>] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
