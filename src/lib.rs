//! Adaptive model router — routes a query to one of several backing
//! language-model services, evaluates the response, and learns over time
//! which model best serves which kind of query.
//!
//! Every answered query becomes an insight: the query, the response, the
//! model that produced it, and (eventually) user feedback. New queries are
//! routed by weighing that historical evidence against static complexity
//! heuristics:
//!
//! 1. The [`router`] scores the query's complexity and derives a confidence
//!    threshold — simple queries demand strong evidence, complex queries
//!    tolerate more tentative evidence.
//! 2. The [`ranking`] layer retrieves the most relevant past insights
//!    (term overlap, recency decay, feedback quality) and the [`tracker`]
//!    contributes per-model, per-query-type statistics.
//! 3. If the combined evidence clears the threshold, the historically best
//!    model is selected (*repository-guided*); otherwise a deterministic
//!    complexity-tier fallback applies.
//! 4. The [`evaluate`] module scores the produced response, the result is
//!    stored as a new insight, and [`feedback`] later folds user ratings back
//!    into the statistics.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) holding every insight and the per-model
//!   statistics, plus an in-memory inverted term index for retrieval
//! - **Selection**: confidence-weighted routing with a pluggable
//!   [`scoring::ScoringStrategy`] for the heuristic constants
//! - **Backends**: exogenous services behind the
//!   [`coordinator::ModelProcessor`] trait — no network I/O in the core
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization and schema
//! - [`insight`] — Insight records: store, retrieve, amend feedback
//! - [`ranking`] — Tokenization and relevance ranking with an LRU query cache
//! - [`tracker`] — Per-model, per-query-type performance statistics
//! - [`scoring`] — Pluggable heuristics: complexity, thresholds, style matching
//! - [`router`] — The decision core: model registry and confidence-weighted selection
//! - [`evaluate`] — Response quality scoring
//! - [`feedback`] — Feedback normalization and distribution state machine
//! - [`coordinator`] — Top-level orchestration: process a query, record feedback
//! - [`cli`] — Operational commands: stats, inspect, export, reset

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod feedback;
pub mod insight;
pub mod ranking;
pub mod router;
pub mod scoring;
pub mod tracker;
