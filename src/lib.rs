//! # Issue Dedupe
//!
//! Finds duplicate issues across GitHub, Stack Overflow and the issue
//! tracker by running weighted semantic similarity queries against an
//! OpenSearch index with the ML Commons neural plugin.
//!
//! The engine-agnostic logic (normalizer, query builder, gateway, batch
//! scanner) lives in `issue-dedupe-core`; this crate is the operational shell
//! around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │   Payloads   │──▶│ Normalizer │──▶│  OpenSearch  │
//! │ GitHub / SO  │   │  Document  │   │ neural index │
//! └──────────────┘   └────────────┘   └──────┬───────┘
//!                                            │
//!                  ┌─────────────────────────┤
//!                  ▼                         ▼
//!           ┌─────────────┐           ┌────────────┐
//!           │     CLI     │           │  HTTP API  │
//!           │ batch scans │           │   /api/*   │
//!           └─────────────┘           └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! issue-dedupe init-opensearch          # model, pipeline, index
//! issue-dedupe index github             # index ./github/*.json
//! issue-dedupe search "Cart total is wrong"
//! issue-dedupe dry-run                  # audit open GitHub issues
//! issue-dedupe serve                    # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`opensearch`] | OpenSearch search engine client |
//! | [`admin`] | Model, pipeline and index bootstrap |
//! | [`connector_github`] | GitHub issue payloads |
//! | [`connector_stack_overflow`] | Stack Overflow question payloads |
//! | [`index_cmd`] | Bulk indexing |
//! | [`search`] | Single duplicate lookups |
//! | [`dry_run`] | Open issue audit |
//! | [`acceptance`] | Labeled corpus replay |
//! | [`server`] | HTTP API |

pub mod acceptance;
pub mod admin;
pub mod config;
pub mod connector_github;
pub mod connector_stack_overflow;
pub mod dry_run;
pub mod index_cmd;
pub mod logging;
pub mod opensearch;
pub mod search;
pub mod server;
pub mod sources;
