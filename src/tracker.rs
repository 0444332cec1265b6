//! Per-model, per-query-type performance statistics.
//!
//! Each (model, query type) bucket holds an exponentially weighted moving
//! average of normalized ratings plus a sample count. Confidence applies a
//! sample-count discount so one lucky or unlucky sample cannot dominate
//! selection. Buckets update under their own narrow mutex; unrelated buckets
//! never serialize against each other. Stats persist to the `model_stats`
//! table and are recomputed from insights only on cold start.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Result, RudderError};
use crate::insight::store::InsightStore;
use crate::insight::types::QueryType;

/// Smoothing factor for the rating EWMA.
const EWMA_ALPHA: f64 = 0.3;

/// Statistics for one (model, query type) bucket.
#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    /// EWMA of ratings normalized into `[0, 1]` via `(rating - 1) / 4`.
    pub ewma: f64,
    pub sample_count: u32,
    pub last_updated: DateTime<Utc>,
}

/// A derived per-model profile row, for inspection output.
#[derive(Debug, Clone, Serialize)]
pub struct ModelProfile {
    pub model_name: String,
    pub query_type: QueryType,
    pub affinity: f64,
    pub sample_count: u32,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

/// Coarse complexity bucket used when consulting the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBucket {
    Low,
    Medium,
    High,
}

impl ComplexityBucket {
    /// Bucket a complexity score in `[0, 10]`.
    pub fn from_score(complexity: f64) -> Self {
        if complexity < 3.5 {
            Self::Low
        } else if complexity < 7.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

type BucketKey = (String, QueryType);

/// Aggregates model performance from applied feedback.
pub struct ModelPerformanceTracker {
    conn: Arc<Mutex<Connection>>,
    buckets: RwLock<HashMap<BucketKey, Arc<Mutex<BucketStats>>>>,
    sample_floor: u32,
}

impl ModelPerformanceTracker {
    /// Open over an existing connection, loading persisted stats; when the
    /// stats table is empty the statistics are recomputed from the insight
    /// store's feedback history.
    pub fn open(conn: Arc<Mutex<Connection>>, sample_floor: u32, store: &InsightStore) -> Result<Self> {
        let tracker = Self {
            conn,
            buckets: RwLock::new(HashMap::new()),
            sample_floor: sample_floor.max(1),
        };
        let loaded = tracker.load_persisted()?;
        if loaded > 0 {
            info!(buckets = loaded, "model statistics loaded");
        } else {
            let replayed = tracker.rebuild_from_insights(store)?;
            if replayed > 0 {
                info!(insights = replayed, "model statistics recomputed from insights");
            }
        }
        Ok(tracker)
    }

    /// Fold one normalized rating into the (model, query type) bucket.
    pub fn record(&self, model: &str, query_type: QueryType, rating: f64) -> Result<()> {
        let normalized = ((rating - 1.0) / 4.0).clamp(0.0, 1.0);
        let bucket = self.bucket(model, query_type);
        let snapshot = {
            let mut stats = bucket.lock().expect("bucket mutex poisoned");
            if stats.sample_count == 0 {
                stats.ewma = normalized;
            } else {
                stats.ewma += EWMA_ALPHA * (normalized - stats.ewma);
            }
            stats.sample_count += 1;
            stats.last_updated = Utc::now();
            *stats
        };

        self.persist(model, query_type, &snapshot)?;
        debug!(
            model,
            query_type = %query_type,
            ewma = snapshot.ewma,
            samples = snapshot.sample_count,
            "model stats updated"
        );
        Ok(())
    }

    /// Best model for a query type, with its discounted confidence.
    ///
    /// Statistics are bucketed by query type alone; `bucket` travels with the
    /// call for log context (the complexity tier is applied by the router's
    /// fallback mapping, not here). Returns `None` when no samples exist for
    /// the query type.
    pub fn get_best_model(
        &self,
        query_type: QueryType,
        bucket: ComplexityBucket,
    ) -> Option<(String, f64)> {
        let buckets = self.buckets.read().expect("bucket map poisoned");
        let mut best: Option<(String, f64)> = None;
        for ((model, qt), stats) in buckets.iter() {
            if *qt != query_type {
                continue;
            }
            let stats = *stats.lock().expect("bucket mutex poisoned");
            if stats.sample_count == 0 {
                continue;
            }
            let confidence = self.confidence(&stats);
            // Deterministic tie break on model name
            let better = match &best {
                None => true,
                Some((bm, bc)) => {
                    confidence > *bc || (confidence == *bc && model < bm)
                }
            };
            if better {
                best = Some((model.clone(), confidence));
            }
        }
        if let Some((ref model, confidence)) = best {
            debug!(
                query_type = %query_type,
                complexity_bucket = ?bucket,
                model,
                confidence,
                "tracker recommendation"
            );
        }
        best
    }

    /// Current stats for one bucket, if any samples exist.
    pub fn stats_for(&self, model: &str, query_type: QueryType) -> Option<BucketStats> {
        let buckets = self.buckets.read().expect("bucket map poisoned");
        buckets
            .get(&(model.to_string(), query_type))
            .map(|b| *b.lock().expect("bucket mutex poisoned"))
            .filter(|s| s.sample_count > 0)
    }

    /// All profiles, sorted by model then query type, for inspection.
    pub fn profiles(&self) -> Vec<ModelProfile> {
        let buckets = self.buckets.read().expect("bucket map poisoned");
        let mut profiles: Vec<ModelProfile> = buckets
            .iter()
            .filter_map(|((model, qt), stats)| {
                let stats = *stats.lock().expect("bucket mutex poisoned");
                (stats.sample_count > 0).then(|| ModelProfile {
                    model_name: model.clone(),
                    query_type: *qt,
                    affinity: stats.ewma,
                    sample_count: stats.sample_count,
                    confidence: self.confidence(&stats),
                    last_updated: stats.last_updated,
                })
            })
            .collect();
        profiles.sort_by(|a, b| {
            a.model_name
                .cmp(&b.model_name)
                .then_with(|| a.query_type.as_str().cmp(b.query_type.as_str()))
        });
        profiles
    }

    /// Confidence = affinity discounted by sample volume. The square-root
    /// ramp reaches 1.0 at the sample floor while still suppressing
    /// single-sample flukes.
    fn confidence(&self, stats: &BucketStats) -> f64 {
        let ramp = (stats.sample_count as f64 / self.sample_floor as f64)
            .sqrt()
            .min(1.0);
        stats.ewma * ramp
    }

    fn bucket(&self, model: &str, query_type: QueryType) -> Arc<Mutex<BucketStats>> {
        let key = (model.to_string(), query_type);
        {
            let buckets = self.buckets.read().expect("bucket map poisoned");
            if let Some(bucket) = buckets.get(&key) {
                return bucket.clone();
            }
        }
        let mut buckets = self.buckets.write().expect("bucket map poisoned");
        buckets
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(BucketStats {
                    ewma: 0.0,
                    sample_count: 0,
                    last_updated: Utc::now(),
                }))
            })
            .clone()
    }

    fn persist(&self, model: &str, query_type: QueryType, stats: &BucketStats) -> Result<()> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute(
            "INSERT INTO model_stats (model_name, query_type, ewma, sample_count, last_updated) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(model_name, query_type) DO UPDATE SET \
             ewma = excluded.ewma, sample_count = excluded.sample_count, \
             last_updated = excluded.last_updated",
            params![
                model,
                query_type.as_str(),
                stats.ewma,
                stats.sample_count,
                stats.last_updated.to_rfc3339(),
            ],
        )
        .map_err(RudderError::storage("tracker_persist"))?;
        Ok(())
    }

    fn load_persisted(&self) -> Result<usize> {
        let rows: Vec<(String, String, f64, u32, String)> = {
            let conn = self.conn.lock().expect("connection mutex poisoned");
            let mut stmt = conn
                .prepare(
                    "SELECT model_name, query_type, ewma, sample_count, last_updated FROM model_stats",
                )
                .map_err(RudderError::storage("tracker_load"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })
                .map_err(RudderError::storage("tracker_load"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(RudderError::storage("tracker_load"))?;
            rows
        };

        let count = rows.len();
        let mut buckets = self.buckets.write().expect("bucket map poisoned");
        for (model, qt, ewma, sample_count, last_updated) in rows {
            let Ok(query_type) = QueryType::from_str(&qt) else {
                continue;
            };
            buckets.insert(
                (model, query_type),
                Arc::new(Mutex::new(BucketStats {
                    ewma,
                    sample_count,
                    last_updated: last_updated.parse().unwrap_or_else(|_| Utc::now()),
                })),
            );
        }
        Ok(count)
    }

    /// Replay rated insights in chronological order (cold start only).
    fn rebuild_from_insights(&self, store: &InsightStore) -> Result<usize> {
        let mut replayed = 0;
        for insight in store.all_insights()? {
            if let Some(feedback) = insight.feedback {
                let query_type = crate::ranking::classify_terms(&insight.tags);
                self.record(&insight.model_name, query_type, feedback.rating)?;
                replayed += 1;
            }
        }
        Ok(replayed)
    }
}
