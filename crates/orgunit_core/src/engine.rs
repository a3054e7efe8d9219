//! Thread-safe hierarchy engine.
//!
//! # Responsibility
//! - Own the forest behind a multi-reader/single-writer lock.
//! - Serialize structural writes; let traversals run concurrently.
//!
//! # Invariants
//! - Readers only observe fully applied edits.
//! - A failed write leaves the forest untouched.

use crate::config::EngineConfig;
use crate::forest::{sort_units, Forest, ForestEdit, ForestError, ForestResult};
use crate::model::unit::{NewUnit, Unit, UnitId};
use log::{debug, info};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared owner of one forest.
#[derive(Debug, Default)]
pub struct HierarchyEngine {
    forest: RwLock<Forest>,
}

impl HierarchyEngine {
    /// Creates an engine over an empty forest.
    pub fn new(config: EngineConfig) -> Self {
        Self::from_forest(Forest::new(config))
    }

    /// Wraps an already validated forest.
    pub fn from_forest(forest: Forest) -> Self {
        Self {
            forest: RwLock::new(forest),
        }
    }

    /// Builds an engine from flat persisted records.
    pub fn load(
        units: impl IntoIterator<Item = Unit>,
        config: EngineConfig,
    ) -> ForestResult<Self> {
        let forest = Forest::from_units(units, config)?;
        info!(
            "event=forest_load module=engine status=ok units={}",
            forest.len()
        );
        Ok(Self::from_forest(forest))
    }

    pub fn len(&self) -> ForestResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> ForestResult<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn get(&self, id: UnitId) -> ForestResult<Unit> {
        self.read()?.get(id).cloned()
    }

    pub fn ancestors_of(&self, id: UnitId) -> ForestResult<Vec<Unit>> {
        self.read()?.ancestors_of(id)
    }

    pub fn descendants_of(&self, id: UnitId) -> ForestResult<Vec<Unit>> {
        self.read()?.descendants_of(id)
    }

    pub fn children_of(&self, id: UnitId) -> ForestResult<Vec<Unit>> {
        self.read()?.children_of(id)
    }

    pub fn roots(&self) -> ForestResult<Vec<Unit>> {
        Ok(self.read()?.roots())
    }

    /// Copies every unit, ordered by `(name, id)`.
    pub fn snapshot(&self) -> ForestResult<Vec<Unit>> {
        let forest = self.read()?;
        let mut units: Vec<Unit> = forest.units().cloned().collect();
        sort_units(&mut units);
        Ok(units)
    }

    pub fn create(&self, input: NewUnit) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_create(input), no_persist)
    }

    pub fn insert(&self, unit: Unit) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_insert(unit), no_persist)
    }

    pub fn rename(&self, id: UnitId, name: &str) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_rename(id, name), no_persist)
    }

    pub fn set_code(&self, id: UnitId, code: &str) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_set_code(id, code), no_persist)
    }

    pub fn set_parent(&self, id: UnitId, parent_id: Option<UnitId>) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_set_parent(id, parent_id), no_persist)
    }

    pub fn remove(&self, id: UnitId) -> ForestResult<Unit> {
        self.write_with(|forest| forest.plan_remove(id), no_persist)
    }

    /// Runs plan, persist and apply under one write-lock hold.
    ///
    /// `persist` sees the validated edit before the forest changes. If it
    /// fails the edit is dropped and the forest stays as it was.
    pub fn write_with<E, P, S>(&self, plan: P, persist: S) -> Result<Unit, E>
    where
        E: From<ForestError>,
        P: FnOnce(&Forest) -> ForestResult<ForestEdit>,
        S: FnOnce(&ForestEdit) -> Result<(), E>,
    {
        let mut forest = self.write()?;
        let edit = plan(&*forest)?;
        persist(&edit)?;

        let unit_id = edit.unit_id();
        let kind = edit.kind();
        let unit = forest.apply(edit)?;
        debug!(
            "event=unit_write module=engine status=ok kind={} unit_id={}",
            kind, unit_id
        );
        Ok(unit)
    }

    fn read(&self) -> ForestResult<RwLockReadGuard<'_, Forest>> {
        self.forest.read().map_err(|_| ForestError::LockPoisoned)
    }

    fn write(&self) -> ForestResult<RwLockWriteGuard<'_, Forest>> {
        self.forest.write().map_err(|_| ForestError::LockPoisoned)
    }
}

fn no_persist(_: &ForestEdit) -> ForestResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::HierarchyEngine;
    use crate::config::EngineConfig;
    use crate::forest::{ForestEdit, ForestError};
    use crate::model::unit::NewUnit;

    #[test]
    fn failed_persist_leaves_forest_unchanged() {
        let engine = HierarchyEngine::new(EngineConfig::default());
        let root = engine.create(NewUnit::new("Root", "R")).unwrap();

        let err = engine
            .write_with(
                |forest| forest.plan_rename(root.id, "Renamed"),
                |_edit: &ForestEdit| Err(ForestError::LockPoisoned),
            )
            .unwrap_err();
        assert_eq!(err, ForestError::LockPoisoned);
        assert_eq!(engine.get(root.id).unwrap().name, "Root");
    }

    #[test]
    fn persist_receives_post_edit_record() {
        let engine = HierarchyEngine::new(EngineConfig::default());
        let root = engine.create(NewUnit::new("Root", "R")).unwrap();
        let child = engine.create(NewUnit::new("Child", "C")).unwrap();

        let mut seen = None;
        engine
            .write_with(
                |forest| forest.plan_set_parent(child.id, Some(root.id)),
                |edit: &ForestEdit| {
                    seen = Some(edit.clone());
                    Ok::<(), ForestError>(())
                },
            )
            .unwrap();

        match seen {
            Some(ForestEdit::Update(unit)) => assert_eq!(unit.parent_id, Some(root.id)),
            other => panic!("unexpected edit: {other:?}"),
        }
        assert_eq!(engine.children_of(root.id).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let engine = HierarchyEngine::new(EngineConfig::default());
        engine.create(NewUnit::new("Zeta", "Z")).unwrap();
        let first = engine.create(NewUnit::new("Alpha", "A1")).unwrap();
        let second = engine.create(NewUnit::new("Alpha", "A2")).unwrap();
        let (low, high) = if first.id < second.id {
            (first.id, second.id)
        } else {
            (second.id, first.id)
        };

        let snapshot = engine.snapshot().unwrap();
        let names: Vec<&str> = snapshot.iter().map(|unit| unit.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Alpha", "Zeta"]);
        assert_eq!(snapshot[0].id, low);
        assert_eq!(snapshot[1].id, high);
    }
}
