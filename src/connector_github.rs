//! GitHub issues and pull requests.
//!
//! Maps the REST v3 issue payload to a [`Document`]. The issues endpoint
//! also returns pull requests; those carry a `pull_request` key.
//!
//! [`GithubIssueEvent`] is the `issues` webhook delivery accepted by
//! `POST /api/index`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use issue_dedupe_core::models::{Document, Source};
use issue_dedupe_core::normalize::normalize;
use serde::Deserialize;
use std::path::Path;

use crate::sources::read_payloads;

#[derive(Debug, Clone, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<GithubUser>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubLabel {
    pub name: String,
}

impl GithubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn document_id(&self) -> String {
        Source::Github.document_id(self.number)
    }

    pub fn to_document(&self) -> Document {
        let kind = if self.is_pull_request() {
            "Pull Request"
        } else {
            "Issue"
        };
        let (author_name, author_link) = self
            .user
            .as_ref()
            .map(|u| (u.login.clone(), u.html_url.clone()))
            .unwrap_or_default();

        Document {
            title: self.title.clone(),
            description: normalize(self.body.as_deref().unwrap_or_default()),
            status: self.state.clone(),
            kind: kind.to_string(),
            link: self.html_url.clone(),
            external_link: self.html_url.clone(),
            fix_version: vec!["n/a".to_string()],
            public: true,
            source: Source::Github.tag().to_string(),
            author_name,
            author_link,
            date_created: self.created_at.timestamp(),
            labels: self.labels.iter().map(|l| l.name.clone()).collect(),
        }
    }
}

/// An `issues` webhook event. Only the fields used for indexing are read.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubIssueEvent {
    #[serde(default = "default_action")]
    pub action: String,
    pub issue: GithubIssue,
}

fn default_action() -> String {
    "opened".to_string()
}

impl GithubIssueEvent {
    /// Recommendations are only posted for newly opened issues; edits,
    /// closes and label changes just refresh the index.
    pub fn is_opened(&self) -> bool {
        self.action == "opened"
    }
}

/// Reads downloaded issue payloads as `(id, document)` pairs.
pub fn scan_github(dir: &Path) -> Result<Vec<(String, Document)>> {
    Ok(read_payloads::<GithubIssue>(dir)?
        .into_iter()
        .map(|(_, issue)| (issue.document_id(), issue.to_document()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE: &str = r####"{
        "number": 2931,
        "title": "Product listing shows wrong price",
        "body": "### PHP Version\r\n\r\n8.2\r\n\r\n### Expected behaviour\r\n\r\nThe **gross** price is shown.",
        "state": "open",
        "html_url": "https://github.com/acme/shop/issues/2931",
        "user": { "login": "octocat", "html_url": "https://github.com/octocat" },
        "created_at": "2023-03-01T10:00:00Z",
        "labels": [{ "name": "bug" }, { "name": "pricing" }]
    }"####;

    #[test]
    fn test_issue_to_document() {
        let issue: GithubIssue = serde_json::from_str(ISSUE).unwrap();
        assert_eq!(issue.document_id(), "GH-2931");

        let doc = issue.to_document();
        assert_eq!(doc.kind, "Issue");
        assert_eq!(doc.status, "open");
        assert_eq!(doc.description, "The gross price is shown.");
        assert_eq!(doc.source, "github");
        assert_eq!(doc.fix_version, vec!["n/a"]);
        assert!(doc.public);
        assert_eq!(doc.author_name, "octocat");
        assert_eq!(doc.link, doc.external_link);
        assert_eq!(doc.date_created, 1_677_664_800);
        assert_eq!(doc.labels, vec!["bug", "pricing"]);
    }

    #[test]
    fn test_pull_request_and_missing_body() {
        let payload = r#"{
            "number": 7,
            "title": "Fix rounding",
            "body": null,
            "state": "closed",
            "html_url": "https://github.com/acme/shop/pull/7",
            "user": null,
            "created_at": "2023-03-01T10:00:00Z",
            "pull_request": { "url": "https://api.github.com/repos/acme/shop/pulls/7" }
        }"#;
        let issue: GithubIssue = serde_json::from_str(payload).unwrap();
        let doc = issue.to_document();
        assert_eq!(doc.kind, "Pull Request");
        assert_eq!(doc.description, "");
        assert_eq!(doc.author_name, "");
        assert!(doc.labels.is_empty());
    }

    #[test]
    fn test_issue_event_action() {
        let event: GithubIssueEvent =
            serde_json::from_str(&format!(r#"{{"action": "edited", "issue": {}}}"#, ISSUE)).unwrap();
        assert!(!event.is_opened());
        assert_eq!(event.issue.document_id(), "GH-2931");

        let event: GithubIssueEvent =
            serde_json::from_str(&format!(r#"{{"issue": {}}}"#, ISSUE)).unwrap();
        assert!(event.is_opened());
    }
}
