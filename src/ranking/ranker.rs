//! Relevance ranking — scores stored insights against a new query.
//!
//! Score = term overlap × recency decay × feedback-quality multiplier,
//! clamped to `[0, 1]`. A cache-miss pass is bounded by the configured scan
//! cap so ranking latency stays independent of historical volume. Results
//! for a normalized query are kept in an LRU cache with per-term
//! invalidation: inserting an insight (or changing its feedback) evicts only
//! the cached queries that matched one of its tags.

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::RankingConfig;
use crate::error::Result;
use crate::insight::store::InsightStore;
use crate::insight::types::Insight;
use crate::ranking::tokenize;

/// One ranked retrieval result.
#[derive(Debug, Clone)]
pub struct RankedInsight {
    pub insight: Insight,
    /// Relevance score in `[0.0, 1.0]`.
    pub score: f64,
}

/// Optional post-ranking filters.
#[derive(Debug, Default, Clone)]
pub struct RankFilter {
    pub model: Option<String>,
    pub user_id: Option<String>,
}

/// Scores insights against queries, with an LRU cache keyed by the
/// normalized query string.
pub struct RelevanceRanker {
    store: Arc<InsightStore>,
    half_life_secs: f64,
    scan_cap: usize,
    default_limit: usize,
    cache: Mutex<CacheState>,
}

struct CacheState {
    entries: LruCache<String, Vec<RankedInsight>>,
    /// term → cache keys whose results matched that term. Kept in lockstep
    /// with `entries`: eviction and invalidation both prune their keys, so
    /// the map stays proportional to the live cache.
    by_term: HashMap<String, HashSet<String>>,
}

impl CacheState {
    /// Drop `key` from the term sets it was registered under. The key is the
    /// joined term list, so its terms are recoverable by splitting.
    fn unregister(&mut self, key: &str) {
        for term in key.split(' ') {
            let now_empty = match self.by_term.get_mut(term) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_term.remove(term);
            }
        }
    }
}

impl RelevanceRanker {
    pub fn new(store: Arc<InsightStore>, config: &RankingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .expect("capacity is nonzero after max(1)");
        Self {
            store,
            half_life_secs: config.half_life_secs as f64,
            scan_cap: config.scan_cap,
            default_limit: config.default_limit,
            cache: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                by_term: HashMap::new(),
            }),
        }
    }

    /// Retrieve the insights most relevant to `query`, best first.
    ///
    /// Never returns more than `limit` results; an empty list (not an error)
    /// when nothing matches.
    pub fn retrieve_insights(
        &self,
        query: &str,
        limit: Option<usize>,
        filter: Option<&RankFilter>,
    ) -> Result<Vec<RankedInsight>> {
        let limit = limit.unwrap_or(self.default_limit);
        let terms = tokenize(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let key = terms.join(" ");

        if let Some(ranked) = self.cache_get(&key) {
            debug!(key = %key, "ranking cache hit");
            return Ok(apply_filter(ranked, filter, limit));
        }

        let ranked = self.rank(&terms)?;
        self.cache_put(&key, &terms, ranked.clone());
        Ok(apply_filter(ranked, filter, limit))
    }

    /// Invalidate cached queries whose matched terms intersect `terms`.
    ///
    /// Called after an insight touching those terms is inserted or its
    /// feedback changes.
    pub fn invalidate_terms(&self, terms: &[String]) {
        let mut cache = self.lock_cache();
        let mut evicted = 0usize;
        for term in terms {
            if let Some(keys) = cache.by_term.remove(term) {
                for key in keys {
                    if cache.entries.pop(&key).is_some() {
                        evicted += 1;
                    }
                }
            }
        }
        if evicted > 0 {
            debug!(terms = terms.len(), evicted, "ranking cache invalidated");
        }
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        let mut cache = self.lock_cache();
        cache.entries.clear();
        cache.by_term.clear();
    }

    /// Score all candidates for the given terms, bounded by the scan cap.
    fn rank(&self, terms: &[String]) -> Result<Vec<RankedInsight>> {
        let mut candidate_ids = self.store.query_by_terms(terms);
        // Candidates come back most recent first, so the cap keeps the
        // freshest slice of a large store.
        candidate_ids.truncate(self.scan_cap);

        let now = Utc::now();
        let mut ranked: Vec<RankedInsight> = self
            .store
            .fetch_many(&candidate_ids)?
            .into_iter()
            .map(|insight| {
                let score = score_insight(terms, &insight, now, self.half_life_secs);
                RankedInsight { insight, score }
            })
            .filter(|r| r.score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.insight.created_at.cmp(&a.insight.created_at))
        });
        Ok(ranked)
    }

    fn cache_get(&self, key: &str) -> Option<Vec<RankedInsight>> {
        let mut cache = self.lock_cache();
        cache.entries.get(key).cloned()
    }

    fn cache_put(&self, key: &str, terms: &[String], ranked: Vec<RankedInsight>) {
        let mut cache = self.lock_cache();
        if let Some((evicted, _)) = cache.entries.push(key.to_string(), ranked) {
            // push returns the entry it displaced; for a distinct key that is
            // an LRU eviction whose reverse-map registrations must go too.
            if evicted != key {
                cache.unregister(&evicted);
            }
        }
        for term in terms {
            cache
                .by_term
                .entry(term.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.cache.lock().expect("ranking cache poisoned")
    }
}

/// Relevance score for one insight against pre-tokenized query terms.
///
/// Term overlap adjusted by recency decay `exp(-age / half_life)` and a
/// feedback multiplier scaled into `[0.5, 1.5]` around the neutral rating,
/// clamped into `[0, 1]`.
fn score_insight(
    terms: &[String],
    insight: &Insight,
    now: DateTime<Utc>,
    half_life_secs: f64,
) -> f64 {
    let matched = terms.iter().filter(|t| insight.tags.contains(t)).count();
    if matched == 0 {
        return 0.0;
    }
    let overlap = matched as f64 / terms.len() as f64;

    let age_secs = (now - insight.created_at).num_seconds().max(0) as f64;
    let recency = (-age_secs / half_life_secs).exp();

    let quality = insight
        .feedback
        .map(|f| 1.0 + (f.rating - 3.0) / 4.0)
        .unwrap_or(1.0);

    (overlap * recency * quality).clamp(0.0, 1.0)
}

fn apply_filter(
    ranked: Vec<RankedInsight>,
    filter: Option<&RankFilter>,
    limit: usize,
) -> Vec<RankedInsight> {
    ranked
        .into_iter()
        .filter(|r| match filter {
            Some(f) => {
                f.model
                    .as_deref()
                    .map_or(true, |m| r.insight.model_name == m)
                    && f.user_id
                        .as_deref()
                        .map_or(true, |u| r.insight.context.user_id == u)
            }
            None => true,
        })
        .take(limit)
        .collect()
}
