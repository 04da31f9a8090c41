//! Selector-fallback extraction of price, category, and title.
//!
//! Each field is recovered by walking an ordered list of [`Strategy`] values
//! and keeping the first accepted text. Evaluation is lazy: once a strategy
//! yields, the remaining ones are never run.

use crate::sites::{SelectorChain, StorefrontTarget};
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Longest text (in characters, exclusive) the document scan accepts as a price.
pub const SHORT_TEXT_LIMIT: usize = 50;

/// A currency marker immediately followed by a digit.
static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$₩]\d").expect("price pattern is valid"));

static ALL_BODY_ELEMENTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body *").expect("universal selector is valid"));

/// Tags whose text is never user-visible.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Fields recovered from one storefront page. Missing data is `None`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub price: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
}

impl ExtractionResult {
    /// Returns true if nothing at all was recovered.
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.category.is_none() && self.title.is_none()
    }
}

/// Returns true if `text` looks like a price (`$` or `₩` followed by digits).
pub fn looks_like_price(text: &str) -> bool {
    PRICE_PATTERN.is_match(text)
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// One way of locating a field in a document.
#[derive(Debug)]
pub enum Strategy<'a> {
    /// First element matching the selector whose text is accepted.
    Selector(&'a Selector),
    /// Innermost short element anywhere in the body whose text is accepted.
    DocumentScan { max_chars: usize },
}

impl Strategy<'_> {
    /// Runs this strategy, returning trimmed text if it yields.
    pub fn apply(&self, document: &Html, accept: fn(&str) -> bool) -> Option<String> {
        match self {
            Strategy::Selector(selector) => {
                document.select(selector).map(element_text).find(|text| accept(text))
            }
            Strategy::DocumentScan { max_chars } => scan_document(document, *max_chars, accept),
        }
    }
}

/// Walks the body in document order and returns the first short element whose
/// text looks like a price, descending into it when one of its children also
/// qualifies. The result is the innermost such element, so a wrapper holding
/// a label next to the price yields only the price.
fn scan_document(document: &Html, max_chars: usize, accept: fn(&str) -> bool) -> Option<String> {
    let candidate = |element: &ElementRef| -> Option<String> {
        if SKIPPED_TAGS.contains(&element.value().name()) {
            return None;
        }
        let text = element_text(*element);
        (text.chars().count() < max_chars && accept(&text)).then_some(text)
    };

    document.select(&ALL_BODY_ELEMENTS).find_map(|element| {
        let text = candidate(&element)?;
        // Prefer the innermost element; a parent wrapping the match is skipped
        // so its sibling text does not leak into the price.
        let nested = element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .any(|child| candidate(&child).is_some());
        (!nested).then_some(text)
    })
}

fn non_empty(text: &str) -> bool {
    !text.is_empty()
}

fn first_match(document: &Html, strategies: &[Strategy<'_>], accept: fn(&str) -> bool) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy.apply(document, accept))
}

fn selector_strategies(chain: &SelectorChain) -> Vec<Strategy<'_>> {
    chain.iter().map(Strategy::Selector).collect()
}

/// Runs a target's selector chains over a loaded document.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionPipeline<'a> {
    target: &'a StorefrontTarget,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(target: &'a StorefrontTarget) -> Self {
        Self { target }
    }

    /// Parses raw HTML and extracts from it.
    pub fn extract_html(&self, html: &str) -> ExtractionResult {
        let document = Html::parse_document(html);
        self.extract(&document)
    }

    /// Extracts price, category, and title. Never fails.
    pub fn extract(&self, document: &Html) -> ExtractionResult {
        let mut price_strategies = selector_strategies(&self.target.price_selectors);
        price_strategies.push(Strategy::DocumentScan { max_chars: SHORT_TEXT_LIMIT });

        let price = first_match(document, &price_strategies, looks_like_price);
        let category =
            first_match(document, &selector_strategies(&self.target.category_selectors), non_empty);
        let title =
            first_match(document, &selector_strategies(&self.target.title_selectors), non_empty);

        trace!(target_id = %self.target.id, ?price, ?category, ?title, "Extraction finished");
        if price.is_none() {
            debug!("No price found on {}", self.target.id);
        }

        ExtractionResult { price, category, title }
    }
}
