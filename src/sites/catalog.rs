//! Built-in storefront table: search URLs and CSS selector chains.
//!
//! Every chain is ordered most-specific first. Update this file when a
//! storefront changes its markup.
//!
//! **Update process**: When extraction comes back empty for a site, capture
//! the HTML, fix the chain, and add a fixture under `tests/fixtures/`.

use super::regions::Region;

/// Placeholder substituted with the URL-encoded product name.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Static description of one storefront, compiled into a
/// [`StorefrontTarget`](super::StorefrontTarget) at registry load.
#[derive(Debug)]
pub struct StorefrontEntry {
    pub id: &'static str,
    pub base_url: &'static str,
    pub region: Region,
    pub search_url_template: &'static str,
    pub price: &'static [&'static str],
    pub category: &'static [&'static str],
    pub title: &'static [&'static str],
}

/// Korean storefronts, cosmetics-heavy.
pub static KOREA: &[StorefrontEntry] = &[
    StorefrontEntry {
        id: "oliveyoung",
        base_url: "https://www.oliveyoung.co.kr",
        region: Region::Korea,
        search_url_template:
            "https://www.oliveyoung.co.kr/store/search/getSearchMain.do?query={query}",
        price: &[".prd_price .tx_cur .tx_num", ".price", ".prd_price", ".price_info", ".price-value"],
        category: &[".loc_history .cate_y", "#Contents .titBox h1", ".search_cate .on"],
        title: &[".prd_name", ".tx_name", ".prd_info .name"],
    },
    StorefrontEntry {
        id: "lotte",
        base_url: "https://www.lotte.com",
        region: Region::Korea,
        search_url_template: "https://www.lotte.com/search/search.do?search={query}",
        price: &[".s-product-price__final", ".final-price", ".price", "[class*='price']"],
        category: &[".s-breadcrumb__item:last-child", ".location li:last-child"],
        title: &[".s-goods-title", ".prd-name", ".title"],
    },
    StorefrontEntry {
        id: "gmarket",
        base_url: "https://www.gmarket.co.kr",
        region: Region::Korea,
        search_url_template: "https://browse.gmarket.co.kr/search?keyword={query}",
        price: &[".box__price-seller .text__value", ".price", ".cost", ".item_price", ".product-price"],
        category: &[".box__category .link__category", ".location-navi li:last-child"],
        title: &[".text__item", ".item_title", ".title", ".product-title"],
    },
    StorefrontEntry {
        id: "coupang",
        base_url: "https://www.coupang.com",
        region: Region::Korea,
        search_url_template: "https://www.coupang.com/np/search?q={query}",
        price: &[".price-value", ".price", "[data-price]", ".price-info", ".product-price"],
        category: &["#searchCategoryComponent .selected", ".breadcrumb li:last-child"],
        title: &[".name", ".product-name", ".item-title"],
    },
];

/// US storefronts, electronics-heavy.
pub static US: &[StorefrontEntry] = &[
    StorefrontEntry {
        id: "amazon",
        base_url: "https://www.amazon.com",
        region: Region::Us,
        search_url_template: "https://www.amazon.com/s?k={query}",
        price: &[
            ".a-price .a-offscreen",
            ".a-price-whole",
            "[data-a-color='price'] .a-offscreen",
            ".a-price-range .a-offscreen",
        ],
        category: &[
            "#wayfinding-breadcrumbs_feature_div li:last-child a",
            "#departments .a-text-bold",
            "#nav-subnav .nav-a-content",
        ],
        title: &["h2 a span", "h2 span.a-text-normal", ".a-size-medium.a-text-normal", "h2"],
    },
    StorefrontEntry {
        id: "bestbuy",
        base_url: "https://www.bestbuy.com",
        region: Region::Us,
        search_url_template: "https://www.bestbuy.com/site/searchpage.jsp?st={query}",
        price: &[
            ".priceView-customer-price span",
            ".priceView-layout-large .priceView-price",
            ".priceView-hero-price",
        ],
        category: &[".c-breadcrumbs-list-item:last-child", ".breadcrumb li:last-child"],
        title: &[".sku-title", ".sku-header a", ".product-title"],
    },
    StorefrontEntry {
        id: "newegg",
        base_url: "https://www.newegg.com",
        region: Region::Us,
        search_url_template: "https://www.newegg.com/p/pl?d={query}",
        price: &[".price-current", ".item-action .price", ".price"],
        category: &[".breadcrumb .is-current", ".breadcrumb li:last-child"],
        title: &[".item-title", ".product-title"],
    },
    StorefrontEntry {
        id: "walmart",
        base_url: "https://www.walmart.com",
        region: Region::Us,
        search_url_template: "https://www.walmart.com/search?q={query}",
        price: &["[data-automation-id='product-price'] .f2", ".price-characteristic", ".price-main", ".price-current"],
        category: &["[data-testid='breadcrumb'] li:last-child", ".breadcrumb li:last-child"],
        title: &["[data-automation-id='product-title']", ".product-title", ".title"],
    },
];
