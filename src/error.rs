//! Error taxonomy for the routing core.
//!
//! Every variant carries enough context for diagnosis — the pipeline stage,
//! the model name when one is known, and a short stable hash of the query —
//! without persisting or logging raw query content at error level.

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = RudderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RudderError {
    /// Bad input — surfaced immediately, never retried.
    #[error("validation failed at {stage}: {reason} [query {query_hash}]")]
    Validation {
        stage: &'static str,
        reason: String,
        query_hash: String,
    },

    /// Unknown insight or message id — absorbed at the feedback boundary.
    #[error("not found at {stage}: {what} [query {query_hash}]")]
    NotFound {
        stage: &'static str,
        what: String,
        query_hash: String,
    },

    /// An external model backend refused or failed the call.
    #[error("model '{model}' unavailable at {stage}: {reason} [query {query_hash}]")]
    ModelUnavailable {
        stage: &'static str,
        model: String,
        reason: String,
        query_hash: String,
    },

    /// An external model call exceeded the caller-imposed deadline.
    #[error("model '{model}' timed out after {waited_ms}ms at {stage} [query {query_hash}]")]
    Timeout {
        stage: &'static str,
        model: String,
        waited_ms: u64,
        query_hash: String,
    },

    /// Unusable configuration (e.g. no models registered) — a startup
    /// failure, not retried.
    #[error("fatal configuration error: {reason}")]
    FatalConfiguration { reason: String },

    /// Underlying SQLite failure, tagged with the stage that hit it.
    #[error("storage error at {stage}")]
    Storage {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl RudderError {
    pub fn validation(stage: &'static str, reason: impl Into<String>, query: &str) -> Self {
        Self::Validation {
            stage,
            reason: reason.into(),
            query_hash: query_hash(query),
        }
    }

    pub fn not_found(stage: &'static str, what: impl Into<String>, query: &str) -> Self {
        Self::NotFound {
            stage,
            what: what.into(),
            query_hash: query_hash(query),
        }
    }

    pub fn fatal_config(reason: impl Into<String>) -> Self {
        Self::FatalConfiguration {
            reason: reason.into(),
        }
    }

    /// Adapter for `map_err` on rusqlite calls.
    pub fn storage(stage: &'static str) -> impl Fn(rusqlite::Error) -> Self {
        move |source| Self::Storage { stage, source }
    }

    /// `true` for the transient external-collaborator failures the
    /// coordinator may retry once on a fallback model.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable { .. } | Self::Timeout { .. }
        )
    }
}

/// Short stable FNV-1a hash of a query, for log correlation.
///
/// The hash is stable across runs and platforms so the same query hashes
/// identically in logs from different processes.
pub fn query_hash(query: &str) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in query.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:016x}")
}
