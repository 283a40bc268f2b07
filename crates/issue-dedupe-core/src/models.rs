//! Core data models shared by the normalizer, query builder, gateway and
//! batch scanner.
//!
//! A [`Document`] is the canonical, source-independent record stored in the
//! search index. It is addressed by a composite key
//! `<source-prefix>-<native-id>` (see [`Source::document_id`]), which is also
//! the only handle for excluding a document from its own duplicate search.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Origin of a document. Serialized as the tag stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "stack-overflow")]
    StackOverflow,
    #[serde(rename = "jira")]
    Jira,
    #[serde(rename = "slack")]
    Slack,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Github,
        Source::StackOverflow,
        Source::Jira,
        Source::Slack,
    ];

    /// Tag stored in the `source` field of indexed documents.
    pub fn tag(&self) -> &'static str {
        match self {
            Source::Github => "github",
            Source::StackOverflow => "stack-overflow",
            Source::Jira => "jira",
            Source::Slack => "slack",
        }
    }

    /// Parse a source tag. Accepts the stored tag only.
    pub fn from_tag(tag: &str) -> Option<Source> {
        Source::ALL.into_iter().find(|s| s.tag() == tag)
    }

    /// Builds the composite index key for a native id.
    ///
    /// Only GitHub and Stack Overflow ids are prefixed. Tracker keys such as
    /// `NEXT-123` already carry their project prefix, and other sources use
    /// their native id verbatim.
    pub fn document_id(&self, native_id: impl fmt::Display) -> String {
        match self {
            Source::Github => format!("GH-{}", native_id),
            Source::StackOverflow => format!("SO-{}", native_id),
            Source::Jira | Source::Slack => native_id.to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Normalized issue / pull request / question as stored in the index.
///
/// Field names on the wire are camelCase to match the existing index mapping.
/// Missing fields decode to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub title: String,
    pub description: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    pub external_link: String,
    pub fix_version: Vec<String>,
    pub public: bool,
    pub source: String,
    pub author_name: String,
    pub author_link: String,
    /// Creation time in epoch seconds.
    pub date_created: i64,
    pub labels: Vec<String>,
}

impl Document {
    /// Returns the document with an empty description replaced by the title.
    pub fn with_description_fallback(mut self) -> Self {
        if self.description.trim().is_empty() {
            self.description = self.title.clone();
        }
        self
    }

    pub fn source_tag(&self) -> Option<Source> {
        Source::from_tag(&self.source)
    }
}

// Labels are an unordered set; everything else compares field by field.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        let labels = |d: &Document| d.labels.iter().cloned().collect::<BTreeSet<_>>();

        self.title == other.title
            && self.description == other.description
            && self.status == other.status
            && self.kind == other.kind
            && self.link == other.link
            && self.external_link == other.external_link
            && self.fix_version == other.fix_version
            && self.public == other.public
            && self.source == other.source
            && self.author_name == other.author_name
            && self.author_link == other.author_link
            && self.date_created == other.date_created
            && labels(self) == labels(other)
    }
}

/// Hard constraints applied to a similarity query. Every field is optional;
/// `None` / `false` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Document id that must not appear in the results (self-exclusion).
    pub excluded_document_id: Option<String>,
    /// Restrict results to one source tag.
    pub source: Option<String>,
    /// Restrict results to publicly visible documents.
    pub only_public: bool,
}

impl SearchFilter {
    pub fn excluding(id: impl Into<String>) -> Self {
        Self {
            excluded_document_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn only_public(mut self) -> Self {
        self.only_public = true;
        self
    }
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub document: Document,
}

/// Ranked hits in descending score order, as returned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    /// Total number of matching documents reported by the engine.
    pub total: u64,
    pub max_score: Option<f64>,
}

impl SearchResult {
    pub fn from_hits(hits: Vec<SearchHit>) -> Self {
        let max_score = hits
            .iter()
            .map(|h| h.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))));
        Self {
            total: hits.len() as u64,
            max_score,
            hits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.id.clone()).collect()
    }
}
