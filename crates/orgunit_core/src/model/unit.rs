//! Organizational unit domain model.
//!
//! # Responsibility
//! - Define the flat record shared by the forest, the record store and callers.
//! - Normalize and validate user-facing text fields.
//!
//! # Invariants
//! - `id` is stable and never reused for another unit.
//! - `name` and `code` are non-empty after trim.
//! - `parent_id == None` marks a root.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one organizational unit.
pub type UnitId = Uuid;

/// Canonical organizational unit record.
///
/// Serialized as `{id, name, code, parent_id}`, which is the shape external
/// callers receive for both traversal results and single lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Store-assigned identifier.
    pub id: UnitId,
    /// Display label.
    pub name: String,
    /// Business key, unique across the forest.
    pub code: String,
    /// Direct parent. `None` means root.
    pub parent_id: Option<UnitId>,
}

impl Unit {
    /// Creates a unit with a generated id.
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        parent_id: Option<UnitId>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), name, code, parent_id)
    }

    /// Creates a unit with a caller-provided id.
    ///
    /// Used when hydrating records that already carry an identity.
    pub fn with_id(
        id: UnitId,
        name: impl Into<String>,
        code: impl Into<String>,
        parent_id: Option<UnitId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            parent_id,
        }
    }

    /// Returns whether this unit has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Trims text fields in place and checks they are non-empty.
    pub fn normalize(&mut self) -> Result<(), UnitValidationError> {
        self.name = normalize_name(&self.name)?;
        self.code = normalize_code(&self.code)?;
        if self.parent_id == Some(self.id) {
            return Err(UnitValidationError::SelfParent(self.id));
        }
        Ok(())
    }
}

/// Creation input for a unit whose id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub name: String,
    pub code: String,
    pub parent_id: Option<UnitId>,
}

impl NewUnit {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            parent_id: None,
        }
    }

    /// Sets the parent the new unit is created under.
    pub fn under(mut self, parent_id: UnitId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Field-level validation failures for unit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Code is blank after trim.
    BlankCode,
    /// Record lists itself as parent.
    SelfParent(UnitId),
}

impl Display for UnitValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "unit name must not be blank"),
            Self::BlankCode => write!(f, "unit code must not be blank"),
            Self::SelfParent(id) => write!(f, "unit {id} cannot be its own parent"),
        }
    }
}

impl Error for UnitValidationError {}

/// Trims a display name, rejecting blank input.
pub fn normalize_name(value: &str) -> Result<String, UnitValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UnitValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}

/// Trims a business code, rejecting blank input.
pub fn normalize_code(value: &str) -> Result<String, UnitValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UnitValidationError::BlankCode);
    }
    Ok(trimmed.to_string())
}
