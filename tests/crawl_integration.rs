//! End-to-end crawls against saved storefront pages in `tests/fixtures/`.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xborder_crawler::browser::FixtureBrowser;
use xborder_crawler::commands::CrawlCommand;
use xborder_crawler::config::{BrowserBackend, Config, OutputFormat};
use xborder_crawler::format::Formatter;
use xborder_crawler::orchestrator::{CrawlOrchestrator, FailureKind};
use xborder_crawler::recovery::ErrorClassification;
use xborder_crawler::sinks::MemorySink;
use xborder_crawler::{ProductCategory, ProductQuery};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn test_config() -> Config {
    Config { jitter_seed: Some(2024), ..Config::without_delays() }
}

fn orchestrator(browser: &FixtureBrowser) -> CrawlOrchestrator {
    CrawlCommand::new(test_config()).build_orchestrator(Arc::new(browser.clone())).unwrap()
}

#[tokio::test]
async fn test_electronics_fixture_crawl() {
    let browser = FixtureBrowser::from_dir(fixture_dir()).unwrap();
    let orchestrator = orchestrator(&browser);

    let outcome =
        orchestrator.crawl(&ProductQuery::new("Dell XPS 13"), &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.category, ProductCategory::Electronics);
    assert_eq!(outcome.attempted, vec!["amazon_us", "bestbuy_us", "newegg_us", "walmart_us"]);

    let amazon = &outcome.prices["amazon_us"];
    assert_eq!(amazon.price, "$199.99");
    assert_eq!(amazon.category.as_deref(), Some("Traditional Laptops"));
    assert!(amazon.title.as_deref().unwrap().starts_with("Dell XPS 13 9340 Laptop"));

    // Best Buy has no matching selector; the document scan finds the price.
    let bestbuy = &outcome.prices["bestbuy_us"];
    assert_eq!(bestbuy.price, "$949.99");
    assert_eq!(bestbuy.category.as_deref(), Some("Laptops"));

    // No fixtures for these two: recorded as transient navigation failures.
    assert_eq!(outcome.failures.len(), 2);
    for failure in &outcome.failures {
        assert_eq!(failure.kind, FailureKind::Navigation);
        assert_eq!(failure.decision.classification, ErrorClassification::Transient);
        assert!(!outcome.prices.contains_key(&failure.source_key));
    }

    // A partial success is not retried.
    assert!(outcome.retry_after().is_none());
}

#[tokio::test]
async fn test_cosmetic_fixture_crawl() {
    let browser = FixtureBrowser::from_dir(fixture_dir()).unwrap();
    let orchestrator = orchestrator(&browser);

    let outcome = orchestrator
        .crawl(&ProductQuery::new("Innisfree Green Tea Seed Serum"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.category, ProductCategory::Cosmetic);
    assert!(outcome.attempted.iter().all(|key| key.ends_with("_korea")));

    let oliveyoung = &outcome.prices["oliveyoung_korea"];
    assert_eq!(oliveyoung.price, "₩12,900");
    assert_eq!(oliveyoung.title.as_deref(), Some("이니스프리 그린티 씨드 세럼 80ml"));
    assert_eq!(oliveyoung.category.as_deref(), Some("스킨케어"));

    let coupang = outcome.failures.iter().find(|f| f.target == "coupang").unwrap();
    assert_eq!(coupang.kind, FailureKind::NoPrice);
    assert_eq!(coupang.decision.classification, ErrorClassification::Terminal);
    assert!(!coupang.decision.retry);

    assert!(browser.stats().visited().iter().all(|url| !url.contains("amazon.com")));
}

#[tokio::test]
async fn test_repeated_crawls_are_identical() {
    let browser = FixtureBrowser::from_dir(fixture_dir()).unwrap();
    let query = ProductQuery::new("Unbranded Widget");

    let first = orchestrator(&browser).crawl(&query, &CancellationToken::new()).await.unwrap();
    let second = orchestrator(&browser).crawl(&query, &CancellationToken::new()).await.unwrap();

    assert_eq!(first.category, ProductCategory::Unknown);
    assert_eq!(first.attempted.len(), 8);
    assert_eq!(first.prices, second.prices);
    assert_eq!(first.prices.len(), 3);
}

#[tokio::test]
async fn test_every_page_released() {
    let browser = FixtureBrowser::from_dir(fixture_dir())
        .unwrap()
        .with_content_failure("bestbuy", "Execution context was destroyed");
    let orchestrator = orchestrator(&browser);

    orchestrator.crawl(&ProductQuery::new("Unbranded Widget"), &CancellationToken::new()).await.unwrap();

    let stats = browser.stats();
    assert_eq!(stats.opened(), 8);
    assert_eq!(stats.closed(), 8);
}

#[tokio::test]
async fn test_crawl_command_over_fixtures() {
    let config = Config {
        backend: BrowserBackend::Fixture,
        fixture_dir: Some(fixture_dir()),
        format: OutputFormat::Json,
        ..test_config()
    };
    let provider = xborder_crawler::browser::provider_for(&config).unwrap();
    let sink = MemorySink::new();

    let names = vec!["Dell XPS 13".to_string(), "Laneige Water Bank Cream".to_string()];
    let summary = CrawlCommand::new(config)
        .execute_with_provider(provider, &sink, &sink, &names, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.successes, vec!["Dell XPS 13", "Laneige Water Bank Cream"]);
    assert!(summary.failures.is_empty());
    assert_eq!(sink.summaries(), vec![summary]);

    let outcomes = sink.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1].prices["oliveyoung_korea"].price, "₩12,900");

    let json = Formatter::new(OutputFormat::Json).format_outcome(&outcomes[0]);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["prices"]["amazon_us"]["source_key"], "amazon_us");
}
