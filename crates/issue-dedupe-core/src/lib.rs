//! # Issue Dedupe Core
//!
//! Engine-agnostic logic for finding duplicate issues: the document model,
//! description normalization, the similarity query builder, the
//! [`SearchEngine`](engine::SearchEngine) port, the search gateway and the
//! bounded-concurrency batch scanner.
//!
//! This crate performs no network or filesystem I/O. The application crate
//! supplies the OpenSearch-backed engine; [`engine::memory`] provides an
//! in-memory one for tests.

pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod query;
pub mod scan;
