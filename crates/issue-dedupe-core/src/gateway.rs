//! Index/search gateway.
//!
//! [`Gateway`] owns the read and write paths against a [`SearchEngine`]:
//! documents are upserted with the description fallback applied, and
//! duplicate lookups go through the normalizer and the query builder so that
//! a lookup by stored id ranks exactly like a freshly submitted issue.

use tracing::{debug, instrument};

use crate::engine::SearchEngine;
use crate::error::{Result, SearchError};
use crate::models::{Document, SearchFilter, SearchResult};
use crate::normalize::normalize;
use crate::query::{build_listing_query, build_query, Clause, QueryDocument, QueryParams};

pub struct Gateway<E> {
    engine: E,
    params: QueryParams,
}

impl<E: SearchEngine> Gateway<E> {
    pub fn new(engine: E, params: QueryParams) -> Self {
        Self { engine, params }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Upsert a document under `id`. An empty description is replaced by the
    /// title before the document is stored.
    #[instrument(skip(self, document), fields(source = %document.source))]
    pub async fn index(&self, id: &str, document: Document) -> Result<()> {
        let document = document.with_description_fallback();
        self.engine.upsert(id, &document).await?;
        debug!(id, "indexed document");
        Ok(())
    }

    /// Find documents similar to a title/description pair.
    ///
    /// The description is normalized first. Hits under the score floor are
    /// discarded even if the engine returned them.
    #[instrument(skip(self, description), fields(excluded = ?filter.excluded_document_id))]
    pub async fn search(
        &self,
        title: &str,
        description: &str,
        filter: &SearchFilter,
    ) -> Result<SearchResult> {
        let query = self.similarity_query(title, description, filter);
        self.execute_ranked(&query).await
    }

    /// Find duplicates of an already indexed document.
    ///
    /// Fails with [`SearchError::NotFound`] without running a similarity query
    /// when `id` is not stored. The document itself is always excluded, on
    /// top of any exclusion in `filter`.
    #[instrument(skip(self, filter))]
    pub async fn search_by_id(&self, id: &str, filter: &SearchFilter) -> Result<SearchResult> {
        let document = self
            .engine
            .get(id)
            .await?
            .ok_or_else(|| SearchError::NotFound(id.to_string()))?;

        let mut query = self.similarity_query(&document.title, &document.description, filter);
        exclude_id(&mut query, id);

        self.execute_ranked(&query).await
    }

    /// List up to `size` documents with the given status and source, without
    /// any similarity ranking.
    #[instrument(skip(self))]
    pub async fn list(&self, status: &str, source: &str, size: usize) -> Result<SearchResult> {
        let query = build_listing_query(status, source, size);
        self.engine.execute(&query).await
    }

    fn similarity_query(
        &self,
        title: &str,
        description: &str,
        filter: &SearchFilter,
    ) -> QueryDocument {
        let description = normalize(description);
        build_query(title, &description, filter, &self.params)
    }

    async fn execute_ranked(&self, query: &QueryDocument) -> Result<SearchResult> {
        let mut result = self.engine.execute(query).await?;

        let before = result.hits.len();
        result.hits.retain(|h| h.score >= self.params.min_score);
        if result.hits.len() < before {
            debug!(
                dropped = before - result.hits.len(),
                "dropped hits below the score floor"
            );
        }

        debug!(hits = result.hits.len(), "search finished");
        Ok(result)
    }
}

/// Adds `id` to the query's `ids` exclusion, creating the clause if needed.
fn exclude_id(query: &mut QueryDocument, id: &str) {
    let existing = query.query.must_not.iter_mut().find_map(|clause| match clause {
        Clause::Ids(values) => Some(values),
        _ => None,
    });
    match existing {
        Some(values) => {
            if !values.iter().any(|v| v == id) {
                values.push(id.to_string());
            }
        }
        None => query.query.must_not.push(Clause::Ids(vec![id.to_string()])),
    }
}
