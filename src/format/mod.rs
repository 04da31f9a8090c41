//! Output formatting for crawl outcomes and run summaries (table, JSON, markdown, CSV).

use crate::config::OutputFormat;
use crate::orchestrator::CrawlOutcome;
use crate::router::ProductCategory;
use crate::sinks::RunSummary;
use crate::sites::StorefrontTarget;
use serde_json::json;
use std::sync::Arc;

/// Formats crawl results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats the outcome of one product crawl.
    pub fn format_outcome(&self, outcome: &CrawlOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_outcome(outcome),
            OutputFormat::Markdown => self.markdown_outcome(outcome),
            OutputFormat::Csv => self.csv_outcome(outcome),
        }
    }

    /// Formats the end-of-run summary.
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_summary(summary),
            OutputFormat::Markdown => self.markdown_summary(summary),
            OutputFormat::Csv => self.csv_summary(summary),
        }
    }

    /// Formats a classification result.
    pub fn format_classification(&self, name: &str, category: ProductCategory) -> String {
        let regions: Vec<String> = category.regions().iter().map(|r| r.to_string()).collect();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "name": name,
                "category": category,
                "regions": regions,
            }))
            .unwrap_or_else(|_| "{}".to_string()),
            OutputFormat::Table => {
                format!("Product:  {}\nCategory: {}\nRegions:  {}", name, category, regions.join(", "))
            }
            OutputFormat::Markdown => format!(
                "- **Product:** {}\n- **Category:** {}\n- **Regions:** {}",
                name,
                category,
                regions.join(", ")
            ),
            OutputFormat::Csv => {
                format!("name,category,regions\n{},{},{}", Self::csv_escape(name), category, regions.join(";"))
            }
        }
    }

    /// Formats a list of storefronts.
    pub fn format_targets(&self, targets: &[Arc<StorefrontTarget>]) -> String {
        if targets.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => "id,region,currency,search_url".to_string(),
                _ => "No storefronts configured.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                let plain: Vec<&StorefrontTarget> = targets.iter().map(|t| t.as_ref()).collect();
                serde_json::to_string_pretty(&plain).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => {
                let mut lines = Vec::new();
                lines.push(format!("{:<12} {:<7} {:<9} {}", "ID", "Region", "Currency", "Search URL"));
                lines.push(format!("{:-<12} {:-<7} {:-<9} {:-<40}", "", "", "", ""));
                for target in targets {
                    lines.push(format!(
                        "{:<12} {:<7} {:<9} {}",
                        target.id,
                        target.region.to_string(),
                        target.region.currency(),
                        target.search_url_template
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Markdown => {
                let mut lines = vec![
                    "| ID | Region | Currency | Search URL |".to_string(),
                    "|----|--------|----------|------------|".to_string(),
                ];
                for target in targets {
                    lines.push(format!(
                        "| {} | {} | {} | `{}` |",
                        target.id,
                        target.region,
                        target.region.currency(),
                        target.search_url_template
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Csv => {
                let mut lines = vec!["id,region,currency,search_url".to_string()];
                for target in targets {
                    lines.push(format!(
                        "{},{},{},{}",
                        target.id,
                        target.region,
                        target.region.currency(),
                        Self::csv_escape(&target.search_url_template)
                    ));
                }
                lines.join("\n")
            }
        }
    }

    // Table formatting

    fn table_outcome(&self, outcome: &CrawlOutcome) -> String {
        let source_width = 18;
        let price_width = 14;
        let title_width = 50;

        let mut lines = Vec::new();

        lines.push(format!("Product:  {}", outcome.product_name));
        lines.push(format!("Category: {}", outcome.category));
        if outcome.retry_count > 0 {
            lines.push(format!("Retry:    {}", outcome.retry_count));
        }
        lines.push(String::new());

        if outcome.prices.is_empty() {
            lines.push("No prices found.".to_string());
        } else {
            lines.push(format!("{:<source_width$}  {:<price_width$}  {}", "Source", "Price", "Title"));
            lines.push(format!("{:-<source_width$}  {:-<price_width$}  {:-<title_width$}", "", "", ""));

            for record in outcome.prices.values() {
                let title = record.title.as_deref().map(|t| truncate(t, title_width)).unwrap_or_default();
                lines.push(format!(
                    "{:<source_width$}  {:<price_width$}  {}",
                    record.source_key, record.price, title
                ));
            }
        }

        if !outcome.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failures:".to_string());
            for failure in &outcome.failures {
                lines.push(format!(
                    "  {:<source_width$}  [{}] {}",
                    failure.source_key, failure.decision.classification, failure.reason
                ));
            }
        }

        lines.push(String::new());
        let mut footer = format!("Found {} of {} storefronts", outcome.prices.len(), outcome.attempted.len());
        if outcome.cancelled {
            footer.push_str(" (cancelled)");
        }
        lines.push(footer);

        lines.join("\n")
    }

    fn table_summary(&self, summary: &RunSummary) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Crawled {} product(s) in {:.1}s: {} succeeded, {} failed{}",
            summary.total(),
            summary.duration().as_secs_f64(),
            summary.successes.len(),
            summary.failures.len(),
            if summary.cancelled { " (cancelled)" } else { "" }
        ));

        if !summary.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failed products:".to_string());
            for failure in &summary.failures {
                lines.push(format!("  - {}: {}", failure.name, failure.error));
            }
        }

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_outcome(&self, outcome: &CrawlOutcome) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## {} ({})", outcome.product_name, outcome.category));
        lines.push(String::new());

        if outcome.prices.is_empty() {
            lines.push("*No prices found.*".to_string());
        } else {
            lines.push("| Source | Price | Title |".to_string());
            lines.push("|--------|-------|-------|".to_string());
            for record in outcome.prices.values() {
                let title = record.title.as_deref().map(|t| truncate(t, 40)).unwrap_or_default();
                lines.push(format!("| {} | {} | {} |", record.source_key, record.price, title));
            }
        }

        if !outcome.failures.is_empty() {
            lines.push(String::new());
            lines.push("**Failures:**".to_string());
            lines.push(String::new());
            for failure in &outcome.failures {
                lines.push(format!(
                    "- `{}` ({}): {}",
                    failure.source_key, failure.decision.classification, failure.reason
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!("*{} of {} storefronts priced*", outcome.prices.len(), outcome.attempted.len()));

        lines.join("\n")
    }

    fn markdown_summary(&self, summary: &RunSummary) -> String {
        let mut lines = vec!["## Crawl summary".to_string(), String::new()];

        lines.push(format!("- **Products:** {}", summary.total()));
        lines.push(format!("- **Succeeded:** {}", summary.successes.len()));
        lines.push(format!("- **Failed:** {}", summary.failures.len()));
        lines.push(format!("- **Duration:** {:.1}s", summary.duration().as_secs_f64()));

        if !summary.failures.is_empty() {
            lines.push(String::new());
            for failure in &summary.failures {
                lines.push(format!("- ❌ **{}**: {}", failure.name, failure.error));
            }
        }

        lines.join("\n")
    }

    // CSV formatting

    fn csv_outcome(&self, outcome: &CrawlOutcome) -> String {
        let mut lines = vec!["product,source_key,status,price,category,title,reason".to_string()];
        let product = Self::csv_escape(&outcome.product_name);

        for record in outcome.prices.values() {
            lines.push(format!(
                "{},{},ok,{},{},{},",
                product,
                record.source_key,
                Self::csv_escape(&record.price),
                Self::csv_escape(record.category.as_deref().unwrap_or_default()),
                Self::csv_escape(record.title.as_deref().unwrap_or_default()),
            ));
        }

        for failure in &outcome.failures {
            lines.push(format!(
                "{},{},{},,,,{}",
                product,
                failure.source_key,
                failure.decision.classification,
                Self::csv_escape(&failure.reason)
            ));
        }

        lines.join("\n")
    }

    fn csv_summary(&self, summary: &RunSummary) -> String {
        let mut lines = vec!["product,status,error".to_string()];
        for name in &summary.successes {
            lines.push(format!("{},ok,", Self::csv_escape(name)));
        }
        for failure in &summary.failures {
            lines.push(format!(
                "{},failed,{}",
                Self::csv_escape(&failure.name),
                Self::csv_escape(&failure.error)
            ));
        }
        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

/// Truncates to `width` characters, marking the cut with an ellipsis.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{CrawlFailure, FailureKind, PriceRecord};
    use crate::recovery::{ErrorClassification, RecoveryDecision};
    use crate::sinks::ProductFailure;
    use crate::sites::{Region, SiteRegistry};
    use std::collections::BTreeMap;

    fn make_outcome() -> CrawlOutcome {
        let mut prices = BTreeMap::new();
        prices.insert(
            "amazon_us".to_string(),
            PriceRecord {
                source_key: "amazon_us".to_string(),
                price: "$199.99".to_string(),
                category: Some("Laptops".to_string()),
                title: Some("Dell XPS 13, 13.4 inch".to_string()),
            },
        );

        CrawlOutcome {
            product_name: "Dell XPS 13".to_string(),
            category: ProductCategory::Electronics,
            retry_count: 0,
            prices,
            attempted: vec!["amazon_us".to_string(), "bestbuy_us".to_string()],
            failures: vec![CrawlFailure {
                target: "bestbuy".to_string(),
                source_key: "bestbuy_us".to_string(),
                region: Region::Us,
                kind: FailureKind::NoPrice,
                reason: "no price found on bestbuy".to_string(),
                decision: RecoveryDecision {
                    classification: ErrorClassification::Terminal,
                    retry: false,
                    backoff_ms: None,
                },
            }],
            cancelled: false,
        }
    }

    fn make_empty_outcome() -> CrawlOutcome {
        CrawlOutcome {
            prices: BTreeMap::new(),
            failures: Vec::new(),
            attempted: Vec::new(),
            cancelled: true,
            ..make_outcome()
        }
    }

    fn make_summary() -> RunSummary {
        RunSummary {
            successes: vec!["Dell XPS 13".to_string()],
            failures: vec![ProductFailure {
                name: "Laneige Water Bank".to_string(),
                error: "oliveyoung_korea: no price found on oliveyoung".to_string(),
            }],
            duration_ms: 12_345,
            cancelled: false,
        }
    }

    #[test]
    fn test_json_outcome() {
        let output = Formatter::new(OutputFormat::Json).format_outcome(&make_outcome());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["product_name"], "Dell XPS 13");
        assert_eq!(value["category"], "electronics");
        assert_eq!(value["prices"]["amazon_us"]["price"], "$199.99");
        assert_eq!(value["failures"][0]["kind"], "no_price");
        assert_eq!(value["failures"][0]["decision"]["classification"], "terminal");
    }

    #[test]
    fn test_table_outcome() {
        let output = Formatter::new(OutputFormat::Table).format_outcome(&make_outcome());

        assert!(output.contains("Product:  Dell XPS 13"));
        assert!(output.contains("Category: electronics"));
        assert!(output.contains("amazon_us"));
        assert!(output.contains("$199.99"));
        assert!(output.contains("Failures:"));
        assert!(output.contains("[terminal] no price found on bestbuy"));
        assert!(output.contains("Found 1 of 2 storefronts"));
        assert!(!output.contains("Retry:"));
    }

    #[test]
    fn test_table_outcome_empty_cancelled() {
        let output = Formatter::new(OutputFormat::Table).format_outcome(&make_empty_outcome());
        assert!(output.contains("No prices found."));
        assert!(output.contains("Found 0 of 0 storefronts (cancelled)"));
    }

    #[test]
    fn test_markdown_outcome() {
        let output = Formatter::new(OutputFormat::Markdown).format_outcome(&make_outcome());
        assert!(output.contains("## Dell XPS 13 (electronics)"));
        assert!(output.contains("| amazon_us | $199.99 | Dell XPS 13, 13.4 inch |"));
        assert!(output.contains("- `bestbuy_us` (terminal): no price found on bestbuy"));
        assert!(output.contains("*1 of 2 storefronts priced*"));
    }

    #[test]
    fn test_csv_outcome_escapes() {
        let output = Formatter::new(OutputFormat::Csv).format_outcome(&make_outcome());
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "product,source_key,status,price,category,title,reason");
        assert_eq!(lines[1], "Dell XPS 13,amazon_us,ok,$199.99,Laptops,\"Dell XPS 13, 13.4 inch\",");
        assert_eq!(lines[2], "Dell XPS 13,bestbuy_us,terminal,,,,no price found on bestbuy");
    }

    #[test]
    fn test_summary_formats() {
        let summary = make_summary();

        let table = Formatter::new(OutputFormat::Table).format_summary(&summary);
        assert!(table.contains("Crawled 2 product(s) in 12.3s: 1 succeeded, 1 failed"));
        assert!(table.contains("  - Laneige Water Bank: oliveyoung_korea"));

        let markdown = Formatter::new(OutputFormat::Markdown).format_summary(&summary);
        assert!(markdown.contains("- **Failed:** 1"));

        let csv = Formatter::new(OutputFormat::Csv).format_summary(&summary);
        assert!(csv.contains("Dell XPS 13,ok,"));
        assert!(csv.contains("Laneige Water Bank,failed,"));

        let json: serde_json::Value =
            serde_json::from_str(&Formatter::new(OutputFormat::Json).format_summary(&summary)).unwrap();
        assert_eq!(json["duration_ms"], 12_345);
    }

    #[test]
    fn test_classification_formats() {
        let table = Formatter::new(OutputFormat::Table)
            .format_classification("Unbranded Widget", ProductCategory::Unknown);
        assert!(table.contains("Category: unknown"));
        assert!(table.contains("Regions:  korea, us"));

        let json: serde_json::Value = serde_json::from_str(
            &Formatter::new(OutputFormat::Json).format_classification("COSRX", ProductCategory::Cosmetic),
        )
        .unwrap();
        assert_eq!(json["category"], "cosmetic");
        assert_eq!(json["regions"][0], "korea");
    }

    #[test]
    fn test_targets_formats() {
        let targets = SiteRegistry::builtin().targets_for(Region::Korea);

        let table = Formatter::new(OutputFormat::Table).format_targets(&targets);
        assert!(table.contains("oliveyoung"));
        assert!(table.contains("KRW"));

        let json: serde_json::Value =
            serde_json::from_str(&Formatter::new(OutputFormat::Json).format_targets(&targets)).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 4);
        assert_eq!(json[0]["region"], "korea");

        assert_eq!(Formatter::new(OutputFormat::Table).format_targets(&[]), "No storefronts configured.");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("이니스프리 그린티 씨드 세럼", 8), "이니스프리...");
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(Formatter::csv_escape("plain"), "plain");
        assert_eq!(Formatter::csv_escape("a,b"), "\"a,b\"");
        assert_eq!(Formatter::csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
