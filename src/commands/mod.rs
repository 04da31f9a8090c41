//! CLI command implementations.

pub mod crawl;

pub use crawl::{read_products_file, CrawlCommand};
