//! Duplicate lookups.
//!
//! [`SearchResponse`] is the shape shared by the `search` / `search-id` CLI
//! commands and the HTTP API.

use anyhow::Result;
use issue_dedupe_core::models::{SearchFilter, SearchResult};
use serde::Serialize;
use std::fmt::Write;

use crate::config::Config;
use crate::opensearch::connect;

pub const NO_RESULTS_MESSAGE: &str = "No related items found.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResponse {
    pub id: String,
    pub score: f64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub source: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub matches: Vec<MatchResponse>,
}

impl From<SearchResult> for SearchResponse {
    fn from(result: SearchResult) -> Self {
        if result.is_empty() {
            return Self {
                found: false,
                message: Some(NO_RESULTS_MESSAGE.to_string()),
                matches: Vec::new(),
            };
        }

        let matches = result
            .hits
            .into_iter()
            .map(|hit| MatchResponse {
                id: hit.id,
                score: hit.score,
                title: hit.document.title,
                kind: hit.document.kind,
                status: hit.document.status,
                source: hit.document.source,
                link: hit.document.link,
            })
            .collect();

        Self {
            found: true,
            message: None,
            matches,
        }
    }
}

pub fn format_response(response: &SearchResponse) -> String {
    if !response.found {
        return format!("{}\n", NO_RESULTS_MESSAGE);
    }

    let mut out = String::new();
    for (i, m) in response.matches.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{:.2}] {} {} ({}, {})",
            i + 1,
            m.score,
            m.id,
            m.title,
            m.kind,
            m.status
        );
        if !m.link.is_empty() {
            let _ = writeln!(out, "    {}", m.link);
        }
    }
    out
}

pub async fn run_search(
    config: &Config,
    title: &str,
    description: Option<String>,
    filter: SearchFilter,
) -> Result<()> {
    let gateway = connect(config).await?;
    let result = gateway
        .search(title, description.as_deref().unwrap_or_default(), &filter)
        .await?;
    print!("{}", format_response(&result.into()));
    Ok(())
}

pub async fn run_search_id(config: &Config, id: &str, filter: SearchFilter) -> Result<()> {
    let gateway = connect(config).await?;
    let result = gateway.search_by_id(id, &filter).await?;
    print!("{}", format_response(&result.into()));
    Ok(())
}
