//! Port to the external search engine.
//!
//! The [`SearchEngine`] trait is the only seam between the duplicate
//! detection logic and the engine that stores documents and executes
//! similarity queries. The application provides an OpenSearch client;
//! [`memory::InMemoryEngine`] backs tests and offline experiments.
//!
//! Implementations must be `Send + Sync`: the batch scanner shares one
//! engine across all workers.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Document, SearchResult};
use crate::query::QueryDocument;

/// Abstract search engine backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](SearchEngine::upsert) | Insert or overwrite a document by id |
/// | [`get`](SearchEngine::get) | Fetch a stored document, `None` if absent |
/// | [`execute`](SearchEngine::execute) | Run a query and decode the ranked hits |
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Insert or overwrite the document stored under `id`.
    async fn upsert(&self, id: &str, document: &Document) -> Result<()>;

    /// Fetch the document stored under `id`.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Execute a query. Hits are returned in the engine's ranking order.
    async fn execute(&self, query: &QueryDocument) -> Result<SearchResult>;
}
