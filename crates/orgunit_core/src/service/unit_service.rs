//! Organizational unit use-case service.
//!
//! # Responsibility
//! - Hydrate the hierarchy engine from the record store.
//! - Validate every write against the in-memory forest before persisting it.
//! - Serve ancestor/descendant queries from the engine.
//!
//! # Invariants
//! - A write reaches the record store only after forest checks pass.
//! - The forest is updated only after the record store accepted the write,
//!   so both stay in agreement when either side rejects it.

use crate::config::EngineConfig;
use crate::engine::HierarchyEngine;
use crate::forest::{Forest, ForestEdit, ForestError};
use crate::model::unit::{NewUnit, Unit, UnitId};
use crate::repo::unit_repo::{UnitRepoError, UnitRepository};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from unit service operations.
#[derive(Debug)]
pub enum UnitServiceError {
    /// Unit (or requested parent) does not exist.
    NotFound(UnitId),
    /// Re-parenting would create a loop, or stored links already contain one.
    CycleDetected { unit_id: UnitId, parent_id: UnitId },
    /// Delete refused while children reference the unit.
    ReferencedByChild { unit_id: UnitId, child_count: usize },
    /// Code already owned by another unit.
    DuplicateCode(String),
    /// Name is blank after trim.
    InvalidName,
    /// Code is blank after trim.
    InvalidCode,
    /// Traversal aborted by the configured bound.
    TraversalLimitExceeded { limit: usize },
    /// Other engine-level failure.
    Engine(ForestError),
    /// Record store failure.
    Repo(UnitRepoError),
}

impl Display for UnitServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "unit not found: {id}"),
            Self::CycleDetected { unit_id, parent_id } => write!(
                f,
                "cycle detected: unit {unit_id} cannot have parent {parent_id}"
            ),
            Self::ReferencedByChild {
                unit_id,
                child_count,
            } => write!(
                f,
                "unit {unit_id} cannot be removed while parent of {child_count} unit(s)"
            ),
            Self::DuplicateCode(code) => write!(f, "unit code already in use: `{code}`"),
            Self::InvalidName => write!(f, "unit name must not be blank"),
            Self::InvalidCode => write!(f, "unit code must not be blank"),
            Self::TraversalLimitExceeded { limit } => {
                write!(f, "traversal exceeded limit of {limit} units")
            }
            Self::Engine(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UnitServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ForestError> for UnitServiceError {
    fn from(value: ForestError) -> Self {
        match value {
            ForestError::NotFound(id) => Self::NotFound(id),
            ForestError::CycleDetected { unit_id, parent_id } => {
                Self::CycleDetected { unit_id, parent_id }
            }
            ForestError::ReferencedByChild {
                unit_id,
                child_count,
            } => Self::ReferencedByChild {
                unit_id,
                child_count,
            },
            ForestError::DuplicateCode(code) => Self::DuplicateCode(code),
            ForestError::InvalidName => Self::InvalidName,
            ForestError::InvalidCode => Self::InvalidCode,
            ForestError::TraversalLimitExceeded { limit } => {
                Self::TraversalLimitExceeded { limit }
            }
            other => Self::Engine(other),
        }
    }
}

impl From<UnitRepoError> for UnitServiceError {
    fn from(value: UnitRepoError) -> Self {
        match value {
            UnitRepoError::NotFound(id) | UnitRepoError::ParentNotFound(id) => {
                Self::NotFound(id)
            }
            UnitRepoError::DuplicateCode(code) => Self::DuplicateCode(code),
            UnitRepoError::ReferencedByChild {
                unit_id,
                child_count,
            } => Self::ReferencedByChild {
                unit_id,
                child_count,
            },
            other => Self::Repo(other),
        }
    }
}

/// Unit service facade over a record store and the hierarchy engine.
pub struct UnitService<R: UnitRepository> {
    repo: R,
    engine: HierarchyEngine,
}

impl<R: UnitRepository> UnitService<R> {
    /// Loads every stored record into a fresh engine.
    ///
    /// # Errors
    /// - Repository read failures.
    /// - Topology violations found in stored data (dangling parent, cycle).
    pub fn load(repo: R, config: EngineConfig) -> Result<Self, UnitServiceError> {
        let units = repo.list_units()?;
        let engine = HierarchyEngine::load(units, config)?;
        Ok(Self { repo, engine })
    }

    /// Read access to the underlying engine.
    pub fn engine(&self) -> &HierarchyEngine {
        &self.engine
    }

    /// Creates one unit under an optional parent.
    pub fn create_unit(&self, input: NewUnit) -> Result<Unit, UnitServiceError> {
        let unit = self.write("create", |forest| forest.plan_create(input))?;
        info!(
            "event=unit_create module=service status=ok unit_id={} root={}",
            unit.id,
            unit.is_root()
        );
        Ok(unit)
    }

    pub fn get_unit(&self, id: UnitId) -> Result<Unit, UnitServiceError> {
        self.engine.get(id).map_err(Into::into)
    }

    pub fn rename_unit(
        &self,
        id: UnitId,
        name: impl Into<String>,
    ) -> Result<Unit, UnitServiceError> {
        let name = name.into();
        self.write("rename", |forest| forest.plan_rename(id, &name))
    }

    pub fn set_code(&self, id: UnitId, code: impl Into<String>) -> Result<Unit, UnitServiceError> {
        let code = code.into();
        self.write("set_code", |forest| forest.plan_set_code(id, &code))
    }

    /// Moves one unit under another parent, or to root level with `None`.
    pub fn set_parent(
        &self,
        id: UnitId,
        parent_id: Option<UnitId>,
    ) -> Result<Unit, UnitServiceError> {
        self.write("set_parent", |forest| forest.plan_set_parent(id, parent_id))
    }

    /// Deletes one unit that has no children. Returns the removed record.
    pub fn remove_unit(&self, id: UnitId) -> Result<Unit, UnitServiceError> {
        self.write("remove", |forest| forest.plan_remove(id))
    }

    /// All ancestors of `id`, nearest first.
    pub fn ancestors_of(&self, id: UnitId) -> Result<Vec<Unit>, UnitServiceError> {
        self.engine.ancestors_of(id).map_err(Into::into)
    }

    /// All descendants of `id`, breadth-first.
    pub fn descendants_of(&self, id: UnitId) -> Result<Vec<Unit>, UnitServiceError> {
        self.engine.descendants_of(id).map_err(Into::into)
    }

    pub fn children_of(&self, id: UnitId) -> Result<Vec<Unit>, UnitServiceError> {
        self.engine.children_of(id).map_err(Into::into)
    }

    pub fn roots(&self) -> Result<Vec<Unit>, UnitServiceError> {
        self.engine.roots().map_err(Into::into)
    }

    fn write(
        &self,
        op: &'static str,
        plan: impl FnOnce(&Forest) -> Result<ForestEdit, ForestError>,
    ) -> Result<Unit, UnitServiceError> {
        self.engine
            .write_with(plan, |edit| self.persist(edit))
            .map_err(|err| {
                warn!("event=unit_write module=service status=error op={op} error={err}");
                err
            })
    }

    fn persist(&self, edit: &ForestEdit) -> Result<(), UnitServiceError> {
        match edit {
            ForestEdit::Insert(unit) => self.repo.create_unit(unit)?,
            ForestEdit::Update(unit) => self.repo.update_unit(unit)?,
            ForestEdit::Remove(id) => self.repo.delete_unit(*id)?,
        }
        Ok(())
    }
}
