//! Storefront catalog, regions, and the registry that serves them.

pub mod catalog;
pub mod regions;
pub mod registry;

pub use regions::Region;
pub use registry::{SelectorChain, SiteRegistry, StorefrontTarget};
