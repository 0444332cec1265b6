pub mod export;
pub mod inspect;
pub mod reset;
pub mod stats;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::RudderConfig;
use crate::insight::store::InsightStore;

/// Open the configured database and wrap it in an insight store.
///
/// Shared by the inspection commands; returns the resolved path so callers
/// can report file-level details.
fn open_store(config: &RudderConfig) -> Result<(Arc<Mutex<rusqlite::Connection>>, Arc<InsightStore>, PathBuf)> {
    let db_path = config.resolved_db_path();
    let conn = Arc::new(Mutex::new(crate::db::open_database(&db_path)?));
    let store = Arc::new(InsightStore::open(conn.clone())?);
    Ok((conn, store, db_path))
}
