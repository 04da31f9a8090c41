//! xborder-crawler - Cross-border Korea/US storefront price crawler
//!
//! Routes a product name to the storefronts of the matching region, visits
//! each through a pluggable browser backend, and extracts prices through
//! ordered selector fallbacks. Transient failures are retried with
//! exponential backoff; critical ones are escalated.

pub mod browser;
pub mod commands;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod format;
pub mod orchestrator;
pub mod recovery;
pub mod router;
pub mod sinks;
pub mod sites;

pub use config::Config;
pub use extract::{ExtractionPipeline, ExtractionResult};
pub use fetcher::{FetchError, PageFetcher, ProductQuery};
pub use orchestrator::{CrawlError, CrawlOrchestrator, CrawlOutcome, PriceRecord};
pub use router::{CategoryRouter, ProductCategory};
pub use sites::{Region, SiteRegistry, StorefrontTarget};
