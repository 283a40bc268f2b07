//! Stack Overflow questions.
//!
//! Maps a `/2.3/questions` item (fetched with a filter that includes
//! `body_markdown`) to a [`Document`]. Answered questions count as closed.

use anyhow::Result;
use issue_dedupe_core::models::{Document, Source};
use issue_dedupe_core::normalize::normalize;
use serde::Deserialize;
use std::path::Path;

use crate::sources::read_payloads;

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub question_id: u64,
    pub title: String,
    #[serde(default, rename = "body_markdown")]
    pub body: String,
    #[serde(default)]
    pub is_answered: bool,
    pub link: String,
    #[serde(default)]
    pub owner: Owner,
    pub creation_date: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub link: String,
}

impl Question {
    pub fn document_id(&self) -> String {
        Source::StackOverflow.document_id(self.question_id)
    }

    pub fn to_document(&self) -> Document {
        let status = if self.is_answered { "closed" } else { "open" };

        Document {
            title: self.title.clone(),
            description: normalize(&self.body),
            status: status.to_string(),
            kind: "Question".to_string(),
            link: self.link.clone(),
            external_link: self.link.clone(),
            fix_version: vec!["n/a".to_string()],
            public: true,
            source: Source::StackOverflow.tag().to_string(),
            author_name: self.owner.display_name.clone(),
            author_link: self.owner.link.clone(),
            date_created: self.creation_date,
            labels: self.tags.clone(),
        }
    }
}

/// Reads downloaded question payloads as `(id, document)` pairs.
pub fn scan_stack_overflow(dir: &Path) -> Result<Vec<(String, Document)>> {
    Ok(read_payloads::<Question>(dir)?
        .into_iter()
        .map(|(_, question)| (question.document_id(), question.to_document()))
        .collect())
}
