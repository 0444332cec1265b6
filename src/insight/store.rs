//! Insight persistence — validation, storage, feedback amendment, and the
//! in-memory inverted term index.
//!
//! [`InsightStore`] is the single owner of the `insights` table. Writes go
//! through the connection mutex (SQLite AUTOINCREMENT under that lock yields
//! distinct monotonic ids for concurrent inserts); the term index takes its
//! own write lock only around mutation, so index reads never touch the
//! connection. Only the feedback field is ever mutated post-creation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::{Result, RudderError};
use crate::insight::types::{Feedback, FeedbackType, Insight, QueryContext};
use crate::ranking;

/// Result returned from a store operation.
#[derive(Debug, Clone)]
pub struct StoredInsight {
    /// Monotonic row id of the new insight.
    pub id: i64,
    /// UUID v7 join key for later feedback.
    pub message_id: String,
    /// Derived relevance tags (needed by callers for cache invalidation).
    pub tags: Vec<String>,
}

/// Persistent collection of past interactions with an inverted term index.
pub struct InsightStore {
    conn: Arc<Mutex<Connection>>,
    /// term → insight ids, ascending by id. Updated incrementally on insert
    /// so retrieval never needs a full table scan.
    index: RwLock<HashMap<String, Vec<i64>>>,
}

impl InsightStore {
    /// Wrap an open database connection, rebuilding the term index from the
    /// existing rows.
    pub fn open(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let store = Self {
            conn,
            index: RwLock::new(HashMap::new()),
        };
        let indexed = store.rebuild_index()?;
        if indexed > 0 {
            info!(insights = indexed, "term index rebuilt from existing insights");
        }
        Ok(store)
    }

    /// Store a new insight. Fails with a validation error on an empty query
    /// or missing model name.
    pub fn store_insight(
        &self,
        model_name: &str,
        query: &str,
        response: &str,
        feedback: Option<Feedback>,
        context: &QueryContext,
    ) -> Result<StoredInsight> {
        if query.trim().is_empty() {
            return Err(RudderError::validation("store", "empty query", query));
        }
        if model_name.trim().is_empty() {
            return Err(RudderError::validation("store", "missing model_name", query));
        }

        let message_id = uuid::Uuid::now_v7().to_string();
        let tags = ranking::tokenize(query);
        let created_at = Utc::now();

        let context_json = serde_json::to_string(context)
            .map_err(|e| RudderError::validation("store", e.to_string(), query))?;
        let tags_json = serde_json::to_string(&tags)
            .map_err(|e| RudderError::validation("store", e.to_string(), query))?;

        let id = {
            let conn = self.lock_conn();
            conn.execute(
                "INSERT INTO insights (message_id, model_name, query, response, feedback_rating, feedback_type, context, tags, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message_id,
                    model_name,
                    query,
                    response,
                    feedback.map(|f| f.rating),
                    feedback.map(|f| f.feedback_type.as_str()),
                    context_json,
                    tags_json,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(RudderError::storage("store"))?;
            conn.last_insert_rowid()
        };

        // Incremental index update — append keeps per-term lists ascending.
        {
            let mut index = self.index.write().expect("term index poisoned");
            for tag in &tags {
                index.entry(tag.clone()).or_default().push(id);
            }
        }

        debug!(id, model = model_name, tags = tags.len(), "insight stored");
        Ok(StoredInsight {
            id,
            message_id,
            tags,
        })
    }

    /// Fetch one insight by row id.
    pub fn get(&self, id: i64) -> Result<Option<Insight>> {
        let conn = self.lock_conn();
        conn.query_row(
            &format!("SELECT {INSIGHT_COLUMNS} FROM insights WHERE id = ?1"),
            params![id],
            map_insight,
        )
        .optional()
        .map_err(RudderError::storage("get"))
    }

    /// Fetch one insight by its message id.
    pub fn get_by_message(&self, message_id: &str) -> Result<Option<Insight>> {
        let conn = self.lock_conn();
        conn.query_row(
            &format!("SELECT {INSIGHT_COLUMNS} FROM insights WHERE message_id = ?1"),
            params![message_id],
            map_insight,
        )
        .optional()
        .map_err(RudderError::storage("get_by_message"))
    }

    /// Amend the feedback of the insight identified by `message_id`.
    ///
    /// Returns `false` (non-fatal) when no insight matches.
    pub fn update_feedback(&self, message_id: &str, feedback: Feedback) -> Result<bool> {
        let conn = self.lock_conn();
        let rows = conn
            .execute(
                "UPDATE insights SET feedback_rating = ?1, feedback_type = ?2 WHERE message_id = ?3",
                params![feedback.rating, feedback.feedback_type.as_str(), message_id],
            )
            .map_err(RudderError::storage("update_feedback"))?;
        Ok(rows > 0)
    }

    /// Amend the feedback of the insight identified by row id.
    ///
    /// Returns `false` (non-fatal) when no insight matches.
    pub fn update_feedback_by_id(&self, id: i64, feedback: Feedback) -> Result<bool> {
        let conn = self.lock_conn();
        let rows = conn
            .execute(
                "UPDATE insights SET feedback_rating = ?1, feedback_type = ?2 WHERE id = ?3",
                params![feedback.rating, feedback.feedback_type.as_str(), id],
            )
            .map_err(RudderError::storage("update_feedback"))?;
        Ok(rows > 0)
    }

    /// Candidate insight ids for a set of query terms, most recent first.
    ///
    /// Pure index lookup — never touches the database.
    pub fn query_by_terms(&self, terms: &[String]) -> Vec<i64> {
        let index = self.index.read().expect("term index poisoned");
        let mut ids = BTreeSet::new();
        for term in terms {
            if let Some(list) = index.get(term) {
                ids.extend(list.iter().copied());
            }
        }
        ids.into_iter().rev().collect()
    }

    /// Batch-fetch insights by id, preserving input order.
    pub fn fetch_many(&self, ids: &[i64]) -> Result<Vec<Insight>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn();
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE id IN ({})",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql).map_err(RudderError::storage("fetch_many"))?;
        let sql_params: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let rows = stmt
            .query_map(sql_params.as_slice(), map_insight)
            .map_err(RudderError::storage("fetch_many"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RudderError::storage("fetch_many"))?;

        let mut by_id: HashMap<i64, Insight> =
            rows.into_iter().map(|i| (i.id, i)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// All insights in id order, for export and cold-start recomputation.
    pub fn all_insights(&self) -> Result<Vec<Insight>> {
        let conn = self.lock_conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INSIGHT_COLUMNS} FROM insights ORDER BY id"
            ))
            .map_err(RudderError::storage("all_insights"))?;
        let rows = stmt
            .query_map([], map_insight)
            .map_err(RudderError::storage("all_insights"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RudderError::storage("all_insights"))?;
        Ok(rows)
    }

    /// Total number of stored insights.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock_conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM insights", [], |row| row.get(0))
            .map_err(RudderError::storage("count"))?;
        Ok(count as u64)
    }

    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection mutex poisoned")
    }

    /// Full index rebuild from the tags column. Only needed at open.
    fn rebuild_index(&self) -> Result<usize> {
        let rows: Vec<(i64, String)> = {
            let conn = self.lock_conn();
            let mut stmt = conn
                .prepare("SELECT id, tags FROM insights ORDER BY id")
                .map_err(RudderError::storage("rebuild_index"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(RudderError::storage("rebuild_index"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(RudderError::storage("rebuild_index"))?;
            rows
        };

        let mut index = self.index.write().expect("term index poisoned");
        let count = rows.len();
        for (id, tags_json) in rows {
            let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
            for tag in tags {
                index.entry(tag).or_default().push(id);
            }
        }
        Ok(count)
    }
}

const INSIGHT_COLUMNS: &str = "id, message_id, model_name, query, response, \
     feedback_rating, feedback_type, context, tags, created_at";

/// Map a full insight row (column order per [`INSIGHT_COLUMNS`]).
fn map_insight(row: &Row<'_>) -> rusqlite::Result<Insight> {
    let rating: Option<f64> = row.get(5)?;
    let ftype: Option<String> = row.get(6)?;
    let feedback = match (rating, ftype) {
        (Some(rating), Some(ftype)) => Some(Feedback {
            rating,
            feedback_type: FeedbackType::from_str(&ftype).unwrap_or(FeedbackType::Other),
        }),
        _ => None,
    };

    let context_json: String = row.get(7)?;
    let tags_json: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(Insight {
        id: row.get(0)?,
        message_id: row.get(1)?,
        model_name: row.get(2)?,
        query: row.get(3)?,
        response: row.get(4)?,
        feedback,
        context: serde_json::from_str(&context_json)
            .unwrap_or_else(|_| QueryContext::new("unknown", 0.0)),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: created_at
            .parse()
            .unwrap_or_else(|_| Utc::now()),
    })
}
