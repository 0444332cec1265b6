use rusqlite::params;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, RudderError};
use crate::insight::store::InsightStore;

/// Response from store statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_insights: u64,
    pub with_feedback: u64,
    pub by_model: HashMap<String, u64>,
    pub avg_rating_by_model: HashMap<String, f64>,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_insight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_insight: Option<String>,
}

/// Compute insight store statistics.
///
/// `db_path` is used for file size calculation; pass None for in-memory
/// databases.
pub fn store_stats(store: &InsightStore, db_path: Option<&Path>) -> Result<StatsResponse> {
    let conn = store.lock_conn();

    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM insights", [], |row| row.get(0))
        .map_err(RudderError::storage("stats"))?;

    let with_feedback: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM insights WHERE feedback_rating IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .map_err(RudderError::storage("stats"))?;

    let mut by_model = HashMap::new();
    let mut avg_rating_by_model = HashMap::new();
    {
        let mut stmt = conn
            .prepare(
                "SELECT model_name, COUNT(*), AVG(feedback_rating) \
                 FROM insights GROUP BY model_name",
            )
            .map_err(RudderError::storage("stats"))?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })
            .map_err(RudderError::storage("stats"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RudderError::storage("stats"))?;
        for (model, count, avg) in rows {
            by_model.insert(model.clone(), count as u64);
            if let Some(avg) = avg {
                avg_rating_by_model.insert(model, avg);
            }
        }
    }

    let (oldest, newest): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM insights",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(RudderError::storage("stats"))?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_insights: total as u64,
        with_feedback: with_feedback as u64,
        by_model,
        avg_rating_by_model,
        db_size_bytes,
        oldest_insight: oldest,
        newest_insight: newest,
    })
}
