//! Structured similarity queries.
//!
//! A [`QueryDocument`] is a small boolean query tree that is serialized to
//! the engine's JSON DSL only at the boundary ([`QueryDocument::to_json`]).
//! Query text is therefore always JSON-escaped by `serde_json`, never spliced
//! into a template.
//!
//! # Duplicate query policy
//!
//! | Part | Content |
//! |------|---------|
//! | `must_not` | `ids: [excluded]` when the filter excludes a document |
//! | `must` | `match public: true`, `match source: <tag>` when set |
//! | `should` | title similarity × 1.8, description similarity × 1.5 |
//! | `min_score` | 1.8 |
//!
//! A perfect title match alone (1.8) clears the floor; a description-only
//! match (at most 1.5) never does.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::models::SearchFilter;

pub const DEFAULT_TITLE_BOOST: f64 = 1.8;
pub const DEFAULT_DESCRIPTION_BOOST: f64 = 1.5;
pub const DEFAULT_K: u32 = 100;
pub const DEFAULT_MIN_SCORE: f64 = 1.8;

pub const TITLE_EMBEDDING_FIELD: &str = "title_embedding";
pub const DESCRIPTION_EMBEDDING_FIELD: &str = "description_embedding";

/// Ranking parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Id of the trained model the neural clauses are bound to.
    pub model_id: String,
    pub title_boost: f64,
    pub description_boost: f64,
    /// Nearest candidates per signal before weighting.
    pub k: u32,
    /// Minimum combined score; lower hits are discarded.
    pub min_score: f64,
}

impl QueryParams {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            title_boost: DEFAULT_TITLE_BOOST,
            description_boost: DEFAULT_DESCRIPTION_BOOST,
            k: DEFAULT_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// Semantic nearest-neighbour signal over one embedding field.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilaritySignal {
    pub field: String,
    pub model_id: String,
    pub k: u32,
    pub query_text: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Matches documents whose id is in the list.
    Ids(Vec<String>),
    /// Analyzed field match.
    Match { field: String, value: Value },
    /// Exact term match, usually on a `.keyword` subfield.
    Term { field: String, value: String },
    /// Weighted similarity signal.
    Similarity(SimilaritySignal),
}

impl Clause {
    pub fn to_json(&self) -> Value {
        match self {
            Clause::Ids(values) => json!({ "ids": { "values": values } }),
            Clause::Match { field, value } => {
                let mut inner = Map::new();
                inner.insert(field.clone(), value.clone());
                json!({ "match": inner })
            }
            Clause::Term { field, value } => {
                let mut inner = Map::new();
                inner.insert(field.clone(), Value::String(value.clone()));
                json!({ "term": inner })
            }
            Clause::Similarity(signal) => {
                let mut neural = Map::new();
                neural.insert(
                    signal.field.clone(),
                    json!({
                        "model_id": signal.model_id,
                        "k": signal.k,
                        "query_text": signal.query_text,
                    }),
                );
                json!({
                    "script_score": {
                        "query": { "neural": neural },
                        "script": { "source": format!("_score * {}", signal.weight) }
                    }
                })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must_not: Vec<Clause>,
    pub must: Vec<Clause>,
    pub should: Vec<Clause>,
}

impl BoolQuery {
    /// Empty clause lists are omitted from the output.
    pub fn to_json(&self) -> Value {
        let mut bool_query = Map::new();
        for (key, clauses) in [
            ("must_not", &self.must_not),
            ("must", &self.must),
            ("should", &self.should),
        ] {
            if !clauses.is_empty() {
                bool_query.insert(
                    key.to_string(),
                    Value::Array(clauses.iter().map(Clause::to_json).collect()),
                );
            }
        }
        json!({ "bool": bool_query })
    }
}

/// Complete request body for the engine's search endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDocument {
    pub size: Option<usize>,
    pub min_score: Option<f64>,
    pub query: BoolQuery,
}

impl QueryDocument {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if let Some(min_score) = self.min_score {
            body.insert("min_score".to_string(), json!(min_score));
        }
        body.insert("query".to_string(), self.query.to_json());
        Value::Object(body)
    }
}

impl Serialize for QueryDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Builds the duplicate-detection query for a title/description pair.
///
/// `description` is used as given; callers normalize it first.
pub fn build_query(
    title: &str,
    description: &str,
    filter: &SearchFilter,
    params: &QueryParams,
) -> QueryDocument {
    let mut query = BoolQuery::default();

    if let Some(ref id) = filter.excluded_document_id {
        query.must_not.push(Clause::Ids(vec![id.clone()]));
    }

    if filter.only_public {
        query.must.push(Clause::Match {
            field: "public".to_string(),
            value: Value::Bool(true),
        });
    }

    if let Some(ref source) = filter.source {
        query.must.push(Clause::Match {
            field: "source".to_string(),
            value: Value::String(source.clone()),
        });
    }

    query.should.push(Clause::Similarity(SimilaritySignal {
        field: TITLE_EMBEDDING_FIELD.to_string(),
        model_id: params.model_id.clone(),
        k: params.k,
        query_text: title.to_string(),
        weight: params.title_boost,
    }));
    query.should.push(Clause::Similarity(SimilaritySignal {
        field: DESCRIPTION_EMBEDDING_FIELD.to_string(),
        model_id: params.model_id.clone(),
        k: params.k,
        query_text: description.to_string(),
        weight: params.description_boost,
    }));

    QueryDocument {
        size: None,
        min_score: Some(params.min_score),
        query,
    }
}

/// Builds a structural listing query (no similarity, no score floor), e.g.
/// all open issues of one source.
pub fn build_listing_query(status: &str, source: &str, size: usize) -> QueryDocument {
    QueryDocument {
        size: Some(size),
        min_score: None,
        query: BoolQuery {
            must: vec![
                Clause::Term {
                    field: "status.keyword".to_string(),
                    value: status.to_string(),
                },
                Clause::Term {
                    field: "source.keyword".to_string(),
                    value: source.to_string(),
                },
            ],
            ..BoolQuery::default()
        },
    }
}
