//! Domain model for the organizational unit forest.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//!
//! # Invariants
//! - Every unit is identified by a stable `UnitId`.
//! - Units are hard-deleted only when no child references them.

pub mod unit;
