//! Batch duplicate scanning under bounded concurrency.
//!
//! Both batch modes fan out one [`Gateway::search`] per corpus item through
//! [`run_bounded`]:
//!
//! - **Audit** ([`audit`]): lists open documents of one source and reports
//!   those with a high-confidence match elsewhere in the index.
//! - **Acceptance** ([`acceptance`]): replays a hand-labeled corpus and
//!   reports expected matches that were missed and matches that were not
//!   expected.
//!
//! A failing item is reported against its own id and never cancels its
//! siblings. Reports are sorted by item id, so their content does not depend
//! on completion order.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::engine::SearchEngine;
use crate::error::{Result, SearchError};
use crate::gateway::Gateway;
use crate::models::{Document, SearchFilter};

/// Tagged result of one batch item.
#[derive(Debug)]
pub struct Outcome<T> {
    pub key: String,
    pub result: Result<T>,
}

/// Runs `worker` over `items` with at most `limit` workers in flight.
///
/// A permit is acquired before each dispatch and released when the worker
/// ends, whether it succeeds, fails or panics. The function returns only
/// after every dispatched worker has finished.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<(String, I)>,
    limit: usize,
    worker: F,
) -> Vec<Outcome<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut outcomes = Vec::with_capacity(items.len());
    let mut handles = Vec::with_capacity(items.len());

    for (key, item) in items {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                outcomes.push(Outcome {
                    key,
                    result: Err(SearchError::Worker(e.to_string())),
                });
                continue;
            }
        };

        let work = worker(item);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });
        handles.push((key, handle));
    }

    for (key, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SearchError::Worker(e.to_string())),
        };
        if let Err(ref e) = result {
            warn!(item = %key, error = %e, "batch item failed");
        }
        outcomes.push(Outcome { key, result });
    }

    outcomes
}

/// Item id and error message of a failed batch item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f64,
}

/// Audit mode settings.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub source: String,
    pub status: String,
    /// Maximum number of documents listed for scanning.
    pub page_size: usize,
    pub concurrency: usize,
    /// Operator-facing threshold, stricter than the query's score floor.
    pub min_score: f64,
}

impl AuditOptions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: "open".to_string(),
            page_size: 1000,
            concurrency: 10,
            min_score: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    pub id: String,
    pub title: String,
    pub matches: Vec<ScoredMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub scanned: usize,
    pub findings: Vec<AuditFinding>,
    pub failures: Vec<ItemFailure>,
}

/// Scans open documents of one source for likely duplicates.
///
/// Only a failure to list the candidates aborts the audit; search failures
/// are collected in [`AuditReport::failures`].
pub async fn audit<E>(gateway: Arc<Gateway<E>>, options: &AuditOptions) -> Result<AuditReport>
where
    E: SearchEngine + 'static,
{
    let listing = gateway
        .list(&options.status, &options.source, options.page_size)
        .await?;
    info!(
        candidates = listing.hits.len(),
        source = %options.source,
        "auditing documents"
    );

    let items: Vec<(String, (String, Document))> = listing
        .hits
        .into_iter()
        .map(|hit| (hit.id.clone(), (hit.id, hit.document)))
        .collect();
    let scanned = items.len();

    let min_score = options.min_score;
    let outcomes = run_bounded(
        items,
        options.concurrency,
        |(id, doc): (String, Document)| {
            let gateway = Arc::clone(&gateway);
            async move {
                let result = gateway
                    .search(&doc.title, &doc.description, &SearchFilter::excluding(id.clone()))
                    .await?;
                let matches: Vec<ScoredMatch> = result
                    .hits
                    .into_iter()
                    .filter(|hit| hit.score >= min_score)
                    .map(|hit| ScoredMatch {
                        id: hit.id,
                        score: hit.score,
                    })
                    .collect();
                Ok(AuditFinding {
                    id,
                    title: doc.title,
                    matches,
                })
            }
        },
    )
    .await;

    let mut report = AuditReport {
        scanned,
        ..AuditReport::default()
    };
    for outcome in outcomes {
        match outcome.result {
            Ok(finding) if !finding.matches.is_empty() => report.findings.push(finding),
            Ok(_) => {}
            Err(e) => report.failures.push(ItemFailure {
                id: outcome.key,
                error: e.to_string(),
            }),
        }
    }
    report.findings.sort_by(|a, b| a.id.cmp(&b.id));
    report.failures.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(report)
}

/// Hand-labeled corpus entry: an issue and the ids it is known to duplicate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabeledIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub expected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptanceFinding {
    pub id: String,
    /// Expected ids that were not returned.
    pub missing: Vec<String>,
    /// Returned ids that were not expected.
    pub unexpected: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcceptanceReport {
    pub checked: usize,
    pub findings: Vec<AcceptanceFinding>,
    pub failures: Vec<ItemFailure>,
}

impl AcceptanceReport {
    pub fn passed(&self) -> bool {
        self.findings.is_empty() && self.failures.is_empty()
    }
}

/// Both directions of the set difference, keeping input order.
pub fn difference(expected: &[String], found: &[String]) -> (Vec<String>, Vec<String>) {
    let missing = expected
        .iter()
        .filter(|id| !found.contains(id))
        .cloned()
        .collect();
    let unexpected = found
        .iter()
        .filter(|id| !expected.contains(id))
        .cloned()
        .collect();
    (missing, unexpected)
}

/// Replays a labeled corpus and reports ranking mismatches.
///
/// Mismatches are findings, not failures; the scan always covers every item.
pub async fn acceptance<E>(
    gateway: Arc<Gateway<E>>,
    items: Vec<LabeledIssue>,
    concurrency: usize,
) -> AcceptanceReport
where
    E: SearchEngine + 'static,
{
    let checked = items.len();
    let outcomes = run_bounded(
        items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect(),
        concurrency,
        |item: LabeledIssue| {
            let gateway = Arc::clone(&gateway);
            async move {
                let result = gateway
                    .search(
                        &item.title,
                        &item.description,
                        &SearchFilter::excluding(item.id.clone()),
                    )
                    .await?;
                let (missing, unexpected) = difference(&item.expected, &result.ids());
                Ok(AcceptanceFinding {
                    id: item.id,
                    missing,
                    unexpected,
                })
            }
        },
    )
    .await;

    let mut report = AcceptanceReport {
        checked,
        ..AcceptanceReport::default()
    };
    for outcome in outcomes {
        match outcome.result {
            Ok(finding) if finding.missing.is_empty() && finding.unexpected.is_empty() => {}
            Ok(finding) => report.findings.push(finding),
            Err(e) => report.failures.push(ItemFailure {
                id: outcome.key,
                error: e.to_string(),
            }),
        }
    }
    report.findings.sort_by(|a, b| a.id.cmp(&b.id));
    report.failures.sort_by(|a, b| a.id.cmp(&b.id));

    report
}
