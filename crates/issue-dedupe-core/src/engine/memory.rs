//! In-memory [`SearchEngine`] for tests and offline experiments.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. Query
//! evaluation follows the engine's boolean semantics closely enough to
//! exercise the query builder end to end:
//!
//! - `must_not` / `must` clauses act as filters,
//! - each similarity signal scores the top `k` documents by token-set
//!   Jaccard similarity of the query text against the embedded field,
//!   multiplied by the signal weight,
//! - signal scores are summed, `min_score` is applied, hits are sorted by
//!   score (desc) then id (asc) and truncated to `size` (default 10).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SearchError};
use crate::models::{Document, SearchHit, SearchResult};
use crate::query::{
    Clause, QueryDocument, SimilaritySignal, DESCRIPTION_EMBEDDING_FIELD, TITLE_EMBEDDING_FIELD,
};

use super::SearchEngine;

const DEFAULT_SIZE: usize = 10;

/// In-memory engine.
pub struct InMemoryEngine {
    docs: RwLock<HashMap<String, Document>>,
    queries: AtomicUsize,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of queries executed so far.
    pub fn queries_executed(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> SearchError {
    SearchError::Transport("in-memory engine lock poisoned".to_string())
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Token-set Jaccard similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}

fn embedded_text<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    match field {
        TITLE_EMBEDDING_FIELD => Some(&doc.title),
        DESCRIPTION_EMBEDDING_FIELD => Some(&doc.description),
        _ => None,
    }
}

fn field_value(doc: &Value, field: &str) -> Option<Value> {
    let field = field.strip_suffix(".keyword").unwrap_or(field);
    doc.get(field).cloned()
}

fn filter_matches(id: &str, doc: &Value, clause: &Clause) -> bool {
    match clause {
        Clause::Ids(values) => values.iter().any(|v| v == id),
        Clause::Match { field, value } => field_value(doc, field).as_ref() == Some(value),
        Clause::Term { field, value } => {
            field_value(doc, field).as_ref().and_then(Value::as_str) == Some(value.as_str())
        }
        // Similarity clauses never filter.
        Clause::Similarity(_) => true,
    }
}

/// Weighted scores for the top `k` documents of one signal.
fn signal_scores(signal: &SimilaritySignal, docs: &[(&String, &Document)]) -> HashMap<String, f64> {
    let mut scored: Vec<(String, f64)> = docs
        .iter()
        .filter_map(|(id, doc)| {
            let text = embedded_text(doc, &signal.field)?;
            let sim = similarity(&signal.query_text, text);
            (sim > 0.0).then(|| ((*id).clone(), sim))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(signal.k as usize);

    scored
        .into_iter()
        .map(|(id, sim)| (id, sim * signal.weight))
        .collect()
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn upsert(&self, id: &str, document: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(id).cloned())
    }

    async fn execute(&self, query: &QueryDocument) -> Result<SearchResult> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.read().map_err(poisoned)?;

        let mut candidates: Vec<(&String, &Document)> = Vec::new();
        for (id, doc) in docs.iter() {
            let json = serde_json::to_value(doc)?;
            let excluded = query
                .query
                .must_not
                .iter()
                .any(|c| filter_matches(id, &json, c));
            let required = query.query.must.iter().all(|c| filter_matches(id, &json, c));
            if !excluded && required {
                candidates.push((id, doc));
            }
        }

        let signals: Vec<&SimilaritySignal> = query
            .query
            .should
            .iter()
            .filter_map(|c| match c {
                Clause::Similarity(s) => Some(s),
                _ => None,
            })
            .collect();

        let mut hits: Vec<SearchHit> = if signals.is_empty() {
            candidates
                .iter()
                .map(|(id, doc)| SearchHit {
                    id: (*id).clone(),
                    score: 1.0,
                    document: (*doc).clone(),
                })
                .collect()
        } else {
            let mut totals: HashMap<String, f64> = HashMap::new();
            for signal in signals {
                for (id, score) in signal_scores(signal, &candidates) {
                    *totals.entry(id).or_insert(0.0) += score;
                }
            }
            candidates
                .iter()
                .filter_map(|(id, doc)| {
                    totals.get(*id).map(|score| SearchHit {
                        id: (*id).clone(),
                        score: *score,
                        document: (*doc).clone(),
                    })
                })
                .collect()
        };

        if let Some(min_score) = query.min_score {
            hits.retain(|h| h.score >= min_score);
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        let total = hits.len() as u64;
        hits.truncate(query.size.unwrap_or(DEFAULT_SIZE));

        let mut result = SearchResult::from_hits(hits);
        result.total = total;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchFilter;
    use crate::query::{build_listing_query, build_query, QueryParams};

    fn doc(title: &str, description: &str, source: &str, status: &str, public: bool) -> Document {
        Document {
            title: title.to_string(),
            description: description.to_string(),
            source: source.to_string(),
            status: status.to_string(),
            public,
            ..Document::default()
        }
    }

    #[test]
    fn test_similarity() {
        assert!((similarity("Checkout fails", "checkout FAILS") - 1.0).abs() < 1e-9);
        assert!((similarity("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("x", "y"), 0.0);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let engine = InMemoryEngine::new();
        engine
            .upsert("GH-1", &doc("old", "old", "github", "open", true))
            .await
            .unwrap();
        engine
            .upsert("GH-1", &doc("new", "new", "github", "open", true))
            .await
            .unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get("GH-1").await.unwrap().unwrap().title, "new");
        assert!(engine.get("GH-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters_and_scoring() {
        let engine = InMemoryEngine::new();
        engine
            .upsert("GH-1", &doc("cart total wrong", "x", "github", "open", true))
            .await
            .unwrap();
        engine
            .upsert("NEXT-1", &doc("cart total wrong", "x", "jira", "open", false))
            .await
            .unwrap();

        let params = QueryParams::new("m");
        let q = build_query("cart total wrong", "", &SearchFilter::default(), &params);
        let result = engine.execute(&q).await.unwrap();
        assert_eq!(result.ids(), vec!["GH-1", "NEXT-1"]);
        assert!((result.hits[0].score - 1.8).abs() < 1e-9);

        let q = build_query(
            "cart total wrong",
            "",
            &SearchFilter::default().only_public(),
            &params,
        );
        assert_eq!(engine.execute(&q).await.unwrap().ids(), vec!["GH-1"]);

        let q = build_query(
            "cart total wrong",
            "",
            &SearchFilter::excluding("GH-1").with_source("jira"),
            &params,
        );
        assert_eq!(engine.execute(&q).await.unwrap().ids(), vec!["NEXT-1"]);
        assert_eq!(engine.queries_executed(), 3);
    }

    #[tokio::test]
    async fn test_listing_query() {
        let engine = InMemoryEngine::new();
        engine
            .upsert("GH-1", &doc("a", "a", "github", "open", true))
            .await
            .unwrap();
        engine
            .upsert("GH-2", &doc("b", "b", "github", "closed", true))
            .await
            .unwrap();
        engine
            .upsert("SO-3", &doc("c", "c", "stack-overflow", "open", true))
            .await
            .unwrap();

        let result = engine
            .execute(&build_listing_query("open", "github", 100))
            .await
            .unwrap();
        assert_eq!(result.ids(), vec!["GH-1"]);
    }
}
