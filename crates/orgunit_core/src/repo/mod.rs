//! Record store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the flat unit CRUD contract used by the service layer.
//! - Isolate SQLite query details from hierarchy logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateCode`,
//!   `ReferencedByChild`) in addition to DB transport errors.

pub mod unit_repo;
