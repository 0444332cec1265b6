//! CLI `reset` command — delete all insights after user confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::RudderConfig;

/// Delete all insights and model statistics after user confirmation.
pub fn reset(config: &RudderConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL insights and model statistics.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let conn = crate::db::open_database(&db_path)?;
    conn.execute_batch(
        "DELETE FROM model_stats;
         DELETE FROM insights;",
    )?;

    println!("All insights deleted. Database reset complete.");
    Ok(())
}
