//! `dry-run`: audit open documents of one source for likely duplicates.

use anyhow::{bail, Result};
use issue_dedupe_core::models::Source;
use issue_dedupe_core::scan::{audit, AuditOptions, AuditReport};
use std::fmt::Write;
use tracing::info;

use crate::config::{concurrency_override, Config};
use crate::opensearch::connect;

/// Renders the audit report, one line per candidate.
pub fn format_report(report: &AuditReport) -> String {
    let mut out = String::new();
    for finding in &report.findings {
        let matches: Vec<String> = finding
            .matches
            .iter()
            .map(|m| format!("{} (score: {:.2})", m.id, m.score))
            .collect();
        let _ = writeln!(
            out,
            "Issue \"{}\" ({}) might be duplicated by: {}",
            finding.id,
            finding.title,
            matches.join(", ")
        );
    }
    for failure in &report.failures {
        let _ = writeln!(out, "FAILED {}: {}", failure.id, failure.error);
    }
    let _ = writeln!(
        out,
        "Scanned {} documents: {} possible duplicates, {} failures.",
        report.scanned,
        report.findings.len(),
        report.failures.len()
    );
    out
}

/// Resolves the command-line overrides against the config, holding them
/// to the same bounds `[batch]` and `[scoring]` are validated with.
pub fn audit_options(
    config: &Config,
    source: Option<String>,
    page_size: Option<usize>,
    concurrency: Option<usize>,
    min_score: Option<f64>,
) -> Result<AuditOptions> {
    let source = source.unwrap_or_else(|| Source::Github.tag().to_string());
    if Source::from_tag(&source).is_none() {
        bail!(
            "Unknown source '{}'. Must be one of: {}",
            source,
            Source::ALL.map(|s| s.tag()).join(", ")
        );
    }

    let page_size = page_size.unwrap_or(config.batch.audit_page_size);
    if page_size == 0 {
        bail!("--page-size must be >= 1");
    }

    let min_score = min_score.unwrap_or(config.scoring.audit_min_score);
    if !min_score.is_finite() || min_score < config.scoring.min_score {
        bail!(
            "--min-score ({}) must be a number >= scoring.min_score ({})",
            min_score,
            config.scoring.min_score
        );
    }

    Ok(AuditOptions {
        page_size,
        concurrency: concurrency_override(concurrency, config.batch.search_concurrency)?,
        min_score,
        ..AuditOptions::new(source)
    })
}

pub async fn run_dry_run(
    config: &Config,
    source: Option<String>,
    page_size: Option<usize>,
    concurrency: Option<usize>,
    min_score: Option<f64>,
) -> Result<()> {
    let options = audit_options(config, source, page_size, concurrency, min_score)?;

    let gateway = connect(config).await?;
    info!(
        source = %options.source,
        page_size = options.page_size,
        concurrency = options.concurrency,
        min_score = options.min_score,
        "starting audit"
    );

    let report = audit(gateway, &options).await?;
    print!("{}", format_report(&report));

    if !report.failures.is_empty() {
        bail!("{} documents could not be audited", report.failures.len());
    }
    Ok(())
}
