//! Bulk indexing of downloaded source payloads.
//!
//! Reads the payload directory of one source, maps every item to a
//! document and upserts it under bounded concurrency. Indexing does not run
//! similarity queries, so no model id is needed.

use anyhow::{bail, Result};
use issue_dedupe_core::engine::SearchEngine;
use issue_dedupe_core::gateway::Gateway;
use issue_dedupe_core::models::{Document, Source};
use issue_dedupe_core::scan::{run_bounded, ItemFailure};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{concurrency_override, Config};
use crate::connector_github::scan_github;
use crate::connector_stack_overflow::scan_stack_overflow;
use crate::opensearch::OpenSearchClient;

#[derive(Debug, Default)]
pub struct IndexReport {
    pub indexed: usize,
    pub failures: Vec<ItemFailure>,
}

/// Upserts `documents`, at most `concurrency` at a time.
pub async fn index_documents<E>(
    gateway: Arc<Gateway<E>>,
    documents: Vec<(String, Document)>,
    concurrency: usize,
) -> IndexReport
where
    E: SearchEngine + 'static,
{
    let items = documents
        .into_iter()
        .map(|(id, doc)| (id.clone(), (id, doc)))
        .collect();

    let outcomes = run_bounded(items, concurrency, |(id, doc): (String, Document)| {
        let gateway = Arc::clone(&gateway);
        async move { gateway.index(&id, doc).await }
    })
    .await;

    let mut report = IndexReport::default();
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => report.indexed += 1,
            Err(e) => report.failures.push(ItemFailure {
                id: outcome.key,
                error: e.to_string(),
            }),
        }
    }
    report.failures.sort_by(|a, b| a.id.cmp(&b.id));
    report
}

fn scan_source(source: Source, dir: &Path) -> Result<Vec<(String, Document)>> {
    match source {
        Source::Github => scan_github(dir),
        Source::StackOverflow => scan_stack_overflow(dir),
        other => bail!("No payload adapter for source '{}'", other),
    }
}

pub async fn run_index(
    config: &Config,
    source: Source,
    dir: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(source.tag()));
    let concurrency = concurrency_override(concurrency, config.batch.index_concurrency)?;

    let documents = scan_source(source, &dir)?;
    info!(
        source = %source,
        dir = %dir.display(),
        documents = documents.len(),
        concurrency,
        "indexing"
    );

    let client = OpenSearchClient::from_config(config)?;
    let params = config.query_params(config.opensearch.model_id.clone().unwrap_or_default());
    let gateway = Arc::new(Gateway::new(client, params));

    let report = index_documents(gateway, documents, concurrency).await;

    println!("Indexed {} {} documents.", report.indexed, source);
    for failure in &report.failures {
        println!("  FAILED {}: {}", failure.id, failure.error);
    }
    if !report.failures.is_empty() {
        bail!("{} documents failed to index", report.failures.len());
    }

    Ok(())
}
