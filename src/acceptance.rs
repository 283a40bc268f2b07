//! `test`: replay the hand-labeled duplicate corpus.
//!
//! The corpus is a directory of JSON files, one per GitHub issue, named after
//! the issue number:
//!
//! ```json
//! { "title": "...", "description": "...", "matches": ["NEXT-123"] }
//! ```

use anyhow::{bail, Context, Result};
use issue_dedupe_core::models::Source;
use issue_dedupe_core::scan::{acceptance, AcceptanceReport, LabeledIssue};
use serde::Deserialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{concurrency_override, Config};
use crate::opensearch::connect;
use crate::sources::{json_files, read_json};

#[derive(Deserialize)]
struct CorpusEntry {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    matches: Vec<String>,
}

/// Loads the corpus. Every file must parse: a partial corpus would report
/// misleading results.
pub fn load_corpus(dir: &Path) -> Result<Vec<LabeledIssue>> {
    let mut items = Vec::new();
    for path in json_files(dir)? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .with_context(|| format!("Invalid corpus file name: {}", path.display()))?;
        let entry: CorpusEntry = read_json(&path)?;
        items.push(LabeledIssue {
            id: Source::Github.document_id(stem),
            title: entry.title,
            description: entry.description,
            expected: entry.matches,
        });
    }
    Ok(items)
}

pub fn format_report(report: &AcceptanceReport) -> String {
    let mut out = String::new();
    for finding in &report.findings {
        if !finding.missing.is_empty() {
            let _ = writeln!(
                out,
                "Expected \"{}\" to be found for issue \"{}\"",
                finding.missing.join(", "),
                finding.id
            );
        }
        if !finding.unexpected.is_empty() {
            let _ = writeln!(
                out,
                "Unexpected \"{}\" found for issue \"{}\"",
                finding.unexpected.join(", "),
                finding.id
            );
        }
    }
    for failure in &report.failures {
        let _ = writeln!(out, "FAILED {}: {}", failure.id, failure.error);
    }
    let _ = writeln!(
        out,
        "Checked {} issues: {} mismatches, {} failures.",
        report.checked,
        report.findings.len(),
        report.failures.len()
    );
    out
}

pub async fn run_acceptance(
    config: &Config,
    dir: PathBuf,
    concurrency: Option<usize>,
) -> Result<()> {
    let concurrency = concurrency_override(concurrency, config.batch.search_concurrency)?;

    let items = load_corpus(&dir)?;
    info!(dir = %dir.display(), issues = items.len(), "running acceptance corpus");

    let gateway = connect(config).await?;
    let report = acceptance(gateway, items, concurrency).await;
    print!("{}", format_report(&report));

    if !report.passed() {
        bail!(
            "Acceptance failed: {} mismatches, {} failures",
            report.findings.len(),
            report.failures.len()
        );
    }
    Ok(())
}
