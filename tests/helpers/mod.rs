#![allow(dead_code)]

use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use rudder::config::RudderConfig;
use rudder::coordinator::{Coordinator, ModelProcessor, ProcessParameters};
use rudder::error::{query_hash, Result, RudderError};
use rudder::insight::types::{LengthPref, StructurePref, Tone};
use rudder::router::{ModelTier, RegisteredModel};
use rudder::scoring::StyleProfile;

/// Fresh in-memory database behind the shared-connection mutex.
pub fn memory_conn() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(rudder::db::open_memory_database().unwrap()))
}

/// A backend that produces a plausible structured answer echoing the query.
pub struct EchoProcessor {
    pub name: &'static str,
}

#[async_trait]
impl ModelProcessor for EchoProcessor {
    async fn process(&self, query: &str, _params: &ProcessParameters) -> Result<String> {
        Ok(format!(
            "{name} on \"{query}\":\n\n\
             - The question concerns {query}\n\
             - A direct answer follows from first principles\n\n\
             In short, {query} comes down to a few well understood parts.",
            name = self.name,
        ))
    }
}

/// A backend that always refuses the call.
pub struct FailingProcessor;

#[async_trait]
impl ModelProcessor for FailingProcessor {
    async fn process(&self, query: &str, _params: &ProcessParameters) -> Result<String> {
        Err(RudderError::ModelUnavailable {
            stage: "process",
            model: "failing".into(),
            reason: "connection refused".into(),
            query_hash: query_hash(query),
        })
    }
}

fn tier_style(tier: ModelTier) -> StyleProfile {
    match tier {
        ModelTier::Light => StyleProfile {
            tone: Tone::Casual,
            length: LengthPref::Short,
            structure: StructurePref::Prose,
        },
        ModelTier::Standard => StyleProfile {
            tone: Tone::Neutral,
            length: LengthPref::Medium,
            structure: StructurePref::Outlined,
        },
        ModelTier::Heavy => StyleProfile {
            tone: Tone::Formal,
            length: LengthPref::Long,
            structure: StructurePref::Code,
        },
    }
}

pub fn model(name: &str, tier: ModelTier, priority: u32) -> RegisteredModel {
    RegisteredModel {
        name: name.into(),
        tier,
        style: tier_style(tier),
        priority,
    }
}

/// Coordinator over a fresh in-memory database with one echo-backed model
/// per tier: `swift` (light), `steady` (standard), `deep` (heavy).
pub fn three_tier_coordinator(conn: Arc<Mutex<Connection>>) -> Coordinator {
    let coordinator = Coordinator::new(&RudderConfig::default(), conn).unwrap();
    coordinator.register_model(
        model("swift", ModelTier::Light, 1),
        Arc::new(EchoProcessor { name: "swift" }),
    );
    coordinator.register_model(
        model("steady", ModelTier::Standard, 2),
        Arc::new(EchoProcessor { name: "steady" }),
    );
    coordinator.register_model(
        model("deep", ModelTier::Heavy, 3),
        Arc::new(EchoProcessor { name: "deep" }),
    );
    coordinator
}
