pub mod stats;
pub mod store;
pub mod types;
