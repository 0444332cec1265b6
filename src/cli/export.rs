use anyhow::Result;
use serde::Serialize;

use crate::config::RudderConfig;
use crate::insight::types::Insight;
use crate::tracker::{ModelPerformanceTracker, ModelProfile};

/// Export format — wraps all insights and model statistics.
#[derive(Debug, Serialize)]
struct ExportData {
    insights: Vec<Insight>,
    model_profiles: Vec<ModelProfile>,
}

/// Export all insights and model statistics as JSON to stdout.
pub fn export(config: &RudderConfig) -> Result<()> {
    let (conn, store, _db_path) = super::open_store(config)?;

    let insights = store.all_insights()?;
    let tracker =
        ModelPerformanceTracker::open(conn, config.routing.sample_floor, &store)?;
    let model_profiles = tracker.profiles();

    let data = ExportData {
        insights,
        model_profiles,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!(
        "Exported {} insights and {} model profiles.",
        data.insights.len(),
        data.model_profiles.len()
    );

    Ok(())
}
