//! Core hierarchy engine for organizational units.
//! This crate is the single source of truth for forest invariants.

pub mod config;
pub mod db;
pub mod engine;
pub mod forest;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::EngineConfig;
pub use engine::HierarchyEngine;
pub use forest::{Forest, ForestEdit, ForestError, ForestResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::unit::{NewUnit, Unit, UnitId, UnitValidationError};
pub use repo::unit_repo::{SqliteUnitRepository, UnitRepoError, UnitRepoResult, UnitRepository};
pub use service::unit_service::{UnitService, UnitServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
