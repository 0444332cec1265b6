//! Core insight type definitions.
//!
//! Defines [`QueryType`] (the routing categories), [`FeedbackType`] and
//! [`Feedback`] (user judgement of a response), [`QueryContext`] (structured
//! per-request metadata with an open extension map), and [`Insight`] (a full
//! stored record of one model's response to one query).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The query categories that routing statistics are bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Code, APIs, infrastructure, debugging.
    Technical,
    /// Writing, brainstorming, open-ended generation.
    Creative,
    /// Comparison, explanation, reasoning about tradeoffs.
    Analytical,
    /// Everything else — greetings, chit-chat, short factual asks.
    Conversational,
}

impl QueryType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Creative => "creative",
            Self::Analytical => "analytical",
            Self::Conversational => "conversational",
        }
    }

    pub const ALL: [QueryType; 4] = [
        Self::Technical,
        Self::Creative,
        Self::Analytical,
        Self::Conversational,
    ];
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "technical" => Ok(Self::Technical),
            "creative" => Ok(Self::Creative),
            "analytical" => Ok(Self::Analytical),
            "conversational" => Ok(Self::Conversational),
            _ => Err(format!("unknown query type: {s}")),
        }
    }
}

/// What aspect of the response a piece of feedback judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// Did the response help the user get where they wanted?
    Helpfulness,
    /// Factual or technical correctness.
    Accuracy,
    /// Tone, length, formatting.
    Style,
    /// Unclassified feedback.
    Other,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpfulness => "helpfulness",
            Self::Accuracy => "accuracy",
            Self::Style => "style",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helpfulness" => Ok(Self::Helpfulness),
            "accuracy" => Ok(Self::Accuracy),
            "style" => Ok(Self::Style),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown feedback type: {s}")),
        }
    }
}

/// A rating attached to an insight, on a 1–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Rating in `[1.0, 5.0]`. Boolean feedback arrives pre-normalized
    /// (positive → 4.5, negative → 1.5).
    pub rating: f64,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
}

/// Preferred response tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Formal,
    Casual,
    Neutral,
}

/// Preferred response length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPref {
    Short,
    Medium,
    Long,
}

/// Preferred response structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructurePref {
    /// Flowing prose.
    Prose,
    /// Bulleted or numbered lists.
    Outlined,
    /// Code-first answers.
    Code,
}

/// Structured per-request metadata stored with each insight.
///
/// The fields the core reasons about directly are typed; anything else goes
/// in the open `extra` map so callers can attach metadata without schema
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub user_id: String,
    /// Heuristic complexity score in `[0.0, 10.0]` at decision time.
    pub complexity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthPref>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructurePref>,
    pub timestamp: DateTime<Utc>,
    /// Open extension map for caller-defined metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl QueryContext {
    /// Minimal context for a user at the current time.
    pub fn new(user_id: impl Into<String>, complexity: f64) -> Self {
        Self {
            user_id: user_id.into(),
            complexity,
            tone: None,
            length: None,
            structure: None,
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }
}

/// A stored record of one model's response to one query.
///
/// `query`, `response`, and `model_name` are immutable after creation; only
/// `feedback` (and the context it amends) may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Monotonic, collision-free row id.
    pub id: i64,
    /// UUID v7 identifying the delivered message — the 1:1 join key for
    /// later feedback.
    pub message_id: String,
    /// Model that produced the response.
    pub model_name: String,
    /// The full query text.
    pub query: String,
    /// The full response text.
    pub response: String,
    /// User judgement, if any has arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    /// Structured request metadata.
    pub context: QueryContext,
    /// Derived query terms used for relevance matching.
    pub tags: Vec<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Raw feedback as it arrives from the upstream transport, before
/// normalization. Maps 1:1 onto exactly one insight via `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub message_id: String,
    pub user_id: String,
    /// Normalized rating in `[1.0, 5.0]`.
    pub rating: f64,
    pub feedback_type: FeedbackType,
    pub timestamp: DateTime<Utc>,
}
