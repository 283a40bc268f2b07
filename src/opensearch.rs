//! OpenSearch-backed [`SearchEngine`].
//!
//! Talks to the REST API directly with `reqwest`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `PUT /{index}/_doc/{id}` |
//! | get | `GET /{index}/_doc/{id}` (`found` flag) |
//! | execute | `POST /{index}/_search` |
//!
//! Non-success responses become [`SearchError::Engine`] with the raw body
//! preserved; a body that does not match the expected envelope is a
//! [`SearchError::Decode`], never an empty result.

use anyhow::Result;
use async_trait::async_trait;
use issue_dedupe_core::engine::SearchEngine;
use issue_dedupe_core::error::{self, SearchError};
use issue_dedupe_core::gateway::Gateway;
use issue_dedupe_core::models::{Document, SearchHit, SearchResult};
use issue_dedupe_core::query::QueryDocument;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::admin::resolve_model_id;
use crate::config::Config;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Shared HTTP client bound to one cluster and index.
#[derive(Clone)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: String,
    index: String,
}

impl OpenSearchClient {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.opensearch.url,
            &config.opensearch.index,
            config.request_timeout(),
        )
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Absolute URL for a path relative to the cluster root.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends a request with an optional JSON body and returns the status and
    /// raw response body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> error::Result<(u16, String)> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        Ok((status, text))
    }

    fn doc_path(&self, id: &str) -> String {
        format!("{}/_doc/{}", self.index, encode_path_segment(id))
    }
}

#[async_trait]
impl SearchEngine for OpenSearchClient {
    async fn upsert(&self, id: &str, document: &Document) -> error::Result<()> {
        let body = serde_json::to_value(document)?;
        let (status, text) = self
            .send(reqwest::Method::PUT, &self.doc_path(id), Some(&body))
            .await?;
        check_status(status, &text)?;
        debug!(id, status, "document upserted");
        Ok(())
    }

    async fn get(&self, id: &str) -> error::Result<Option<Document>> {
        let (status, text) = self
            .send(reqwest::Method::GET, &self.doc_path(id), None)
            .await?;
        decode_get_response(status, &text)
    }

    async fn execute(&self, query: &QueryDocument) -> error::Result<SearchResult> {
        let body = query.to_json();
        let path = format!("{}/_search", self.index);
        let (status, text) = self
            .send(reqwest::Method::POST, &path, Some(&body))
            .await?;
        check_status(status, &text)?;
        decode_search_response(&text)
    }
}

pub type OpenSearchGateway = Gateway<OpenSearchClient>;

/// Builds the shared gateway, resolving the model id when the config does
/// not pin one.
pub async fn connect(config: &Config) -> Result<Arc<OpenSearchGateway>> {
    let client = OpenSearchClient::from_config(config)?;
    let model_id = resolve_model_id(&client, config).await?;
    debug!(model_id = %model_id, index = client.index(), "connected");
    Ok(Arc::new(Gateway::new(client, config.query_params(model_id))))
}

/// Percent-encodes the characters that would change the meaning of a path.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Fails on non-2xx statuses and on 2xx bodies carrying an `error` envelope.
pub fn check_status(status: u16, body: &str) -> error::Result<()> {
    let engine_error = || SearchError::Engine {
        status,
        body: body.to_string(),
    };
    if !(200..300).contains(&status) {
        return Err(engine_error());
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if value.get("error").is_some_and(|e| !e.is_null()) {
            return Err(engine_error());
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct SearchEnvelope {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    max_score: Option<f64>,
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Document,
}

/// Decodes the `hits.hits[]` envelope of a search response.
pub fn decode_search_response(body: &str) -> error::Result<SearchResult> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|e| SearchError::Decode(format!("search response: {}", e)))?;

    let hits: Vec<SearchHit> = envelope
        .hits
        .hits
        .into_iter()
        .map(|raw| SearchHit {
            id: raw.id,
            score: raw.score.unwrap_or(0.0),
            document: raw.source,
        })
        .collect();

    let mut result = SearchResult::from_hits(hits);
    if let Some(total) = envelope.hits.total {
        result.total = total.value;
    }
    if envelope.hits.max_score.is_some() {
        result.max_score = envelope.hits.max_score;
    }
    Ok(result)
}

#[derive(Deserialize)]
struct GetEnvelope {
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Document>,
}

/// Decodes a get-by-id response; `found: false` (200 or 404) is `None`.
pub fn decode_get_response(status: u16, body: &str) -> error::Result<Option<Document>> {
    if status == 404 {
        // A missing index also answers 404, with an error envelope instead
        // of `found: false`.
        return match serde_json::from_str::<GetEnvelope>(body) {
            Ok(envelope) if !envelope.found => Ok(None),
            _ => Err(SearchError::Engine {
                status,
                body: body.to_string(),
            }),
        };
    }
    check_status(status, body)?;

    let envelope: GetEnvelope = serde_json::from_str(body)
        .map_err(|e| SearchError::Decode(format!("get response: {}", e)))?;
    if !envelope.found {
        return Ok(None);
    }
    envelope
        .source
        .map(Some)
        .ok_or_else(|| SearchError::Decode("get response: found document without _source".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_RESPONSE: &str = r#"{
        "took": 12,
        "timed_out": false,
        "hits": {
            "total": { "value": 57, "relation": "eq" },
            "max_score": 3.1,
            "hits": [
                {
                    "_index": "issues",
                    "_id": "NEXT-1",
                    "_score": 3.1,
                    "_source": {
                        "title": "Cart total wrong",
                        "description": "coupon applied twice",
                        "status": "open",
                        "type": "Bug",
                        "link": "https://issues.example.com/browse/NEXT-1",
                        "externalLink": "",
                        "fixVersion": ["6.5.0"],
                        "public": true,
                        "source": "jira",
                        "authorName": "",
                        "authorLink": "",
                        "dateCreated": 1690000000,
                        "labels": ["checkout"]
                    }
                },
                {
                    "_index": "issues",
                    "_id": "GH-42",
                    "_score": 1.9,
                    "_source": { "title": "Cart wrong", "source": "github" }
                }
            ]
        }
    }"#;

    #[test]
    fn test_decode_search_response() {
        let result = decode_search_response(SEARCH_RESPONSE).unwrap();
        assert_eq!(result.ids(), vec!["NEXT-1", "GH-42"]);
        assert_eq!(result.total, 57);
        assert_eq!(result.max_score, Some(3.1));
        assert_eq!(result.hits[0].document.kind, "Bug");
        assert_eq!(result.hits[0].document.fix_version, vec!["6.5.0"]);
        assert_eq!(result.hits[1].score, 1.9);
        assert_eq!(result.hits[1].document.description, "");
    }

    #[test]
    fn test_decode_empty_hits_is_not_an_error() {
        let body = r#"{"hits": {"total": {"value": 0}, "max_score": null, "hits": []}}"#;
        let result = decode_search_response(body).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.max_score, None);
    }

    #[test]
    fn test_decode_malformed_search_response() {
        let err = decode_search_response(r#"{"took": 1}"#).unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
        let err = decode_search_response("not json").unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn test_decode_get_response() {
        let found = r#"{"_index":"issues","_id":"GH-1","found":true,"_source":{"title":"t","description":"d"}}"#;
        let doc = decode_get_response(200, found).unwrap().unwrap();
        assert_eq!(doc.title, "t");

        let missing = r#"{"_index":"issues","_id":"GH-2","found":false}"#;
        assert!(decode_get_response(404, missing).unwrap().is_none());
        assert!(decode_get_response(200, missing).unwrap().is_none());
    }

    #[test]
    fn test_missing_index_is_engine_error() {
        let body = r#"{"error":{"type":"index_not_found_exception"},"status":404}"#;
        let err = decode_get_response(404, body).unwrap_err();
        assert!(matches!(err, SearchError::Engine { status: 404, .. }));
    }

    #[test]
    fn test_error_envelope_preserves_body() {
        let body = r#"{"error":{"root_cause":[{"type":"mapper_parsing_exception"}]},"status":400}"#;
        match check_status(400, body).unwrap_err() {
            SearchError::Engine { status, body: raw } => {
                assert_eq!(status, 400);
                assert!(raw.contains("mapper_parsing_exception"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Error envelope with a success status still fails.
        assert!(check_status(200, r#"{"error":"boom"}"#).is_err());
        assert!(check_status(201, r#"{"result":"created"}"#).is_ok());
    }

    #[test]
    fn test_paths() {
        let client =
            OpenSearchClient::new("http://localhost:9200/", "issues", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.url("/issues/_search"), "http://localhost:9200/issues/_search");
        assert_eq!(client.doc_path("GH-1"), "issues/_doc/GH-1");
        assert_eq!(client.doc_path("a/b c"), "issues/_doc/a%2Fb%20c");
    }
}
