//! CLI `inspect` command — display full details for a single insight.

use anyhow::{bail, Result};

use crate::config::RudderConfig;

/// Inspect a single insight by row id or message id.
pub fn inspect(config: &RudderConfig, id: &str) -> Result<()> {
    let (_conn, store, _db_path) = super::open_store(config)?;

    let insight = match id.parse::<i64>() {
        Ok(row_id) => store.get(row_id)?,
        Err(_) => store.get_by_message(id)?,
    };
    let Some(insight) = insight else {
        bail!("no insight found for '{id}'");
    };

    println!("Insight: {}", insight.id);
    println!("{}", "=".repeat(50));
    println!("  Message id:     {}", insight.message_id);
    println!("  Model:          {}", insight.model_name);
    println!("  User:           {}", insight.context.user_id);
    println!("  Complexity:     {:.2}", insight.context.complexity);
    println!("  Created:        {}", insight.created_at.to_rfc3339());
    match insight.feedback {
        Some(feedback) => println!(
            "  Feedback:       {:.1} ({})",
            feedback.rating, feedback.feedback_type
        ),
        None => println!("  Feedback:       none"),
    }
    if !insight.tags.is_empty() {
        println!("  Tags:           {}", insight.tags.join(", "));
    }
    if !insight.context.extra.is_empty() {
        println!(
            "  Extra:          {}",
            serde_json::to_string_pretty(&insight.context.extra)?
        );
    }
    println!();
    println!("Query:");
    println!("  {}", insight.query);
    println!();
    println!("Response:");
    println!("  {}", insight.response);

    Ok(())
}
