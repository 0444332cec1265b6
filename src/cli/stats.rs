use anyhow::Result;

use crate::config::RudderConfig;
use crate::tracker::ModelPerformanceTracker;

/// Display insight store and model performance statistics in the terminal.
pub fn stats(config: &RudderConfig) -> Result<()> {
    let (conn, store, db_path) = super::open_store(config)?;

    let response = crate::insight::stats::store_stats(&store, Some(&db_path))?;

    println!("Insight Store Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total insights:      {}", response.total_insights);
    println!("  With feedback:       {}", response.with_feedback);
    println!("  Database size:       {} bytes", response.db_size_bytes);
    println!();

    if !response.by_model.is_empty() {
        println!("By Model:");
        let mut models: Vec<_> = response.by_model.iter().collect();
        models.sort();
        for (model, count) in models {
            match response.avg_rating_by_model.get(model) {
                Some(avg) => println!("  {model:<20} {count:>6}  (avg rating {avg:.2})"),
                None => println!("  {model:<20} {count:>6}"),
            }
        }
        println!();
    }

    if let Some(ref oldest) = response.oldest_insight {
        println!("Oldest insight:        {oldest}");
    }
    if let Some(ref newest) = response.newest_insight {
        println!("Newest insight:        {newest}");
    }

    let tracker =
        ModelPerformanceTracker::open(conn, config.routing.sample_floor, &store)?;
    let profiles = tracker.profiles();
    if !profiles.is_empty() {
        println!();
        println!("Model Performance:");
        println!(
            "  {:<20} {:<14} {:>8} {:>8} {:>11}",
            "model", "query type", "affinity", "samples", "confidence"
        );
        for p in profiles {
            println!(
                "  {:<20} {:<14} {:>8.3} {:>8} {:>11.3}",
                p.model_name, p.query_type, p.affinity, p.sample_count, p.confidence
            );
        }
    }

    Ok(())
}
