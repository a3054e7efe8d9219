//! In-memory forest store for organizational units.
//!
//! # Responsibility
//! - Own unit records keyed by id, plus code and child indexes.
//! - Enforce topology invariants before any structural mutation.
//! - Answer ancestor/descendant closure queries (see `traversal`).
//!
//! # Invariants
//! - `code` is unique across all units.
//! - Every present `parent_id` names an existing unit.
//! - The parent relation is acyclic.
//! - A unit referenced as a parent cannot be removed.
//!
//! Every mutation is split into a side-effect-free `plan_*` step returning a
//! [`ForestEdit`] and an [`Forest::apply`] step. Callers that persist edits
//! elsewhere run plan, persist, apply in that order.

mod traversal;

use crate::config::EngineConfig;
use crate::model::unit::{
    normalize_code, normalize_name, NewUnit, Unit, UnitId, UnitValidationError,
};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by forest operations.
pub type ForestResult<T> = Result<T, ForestError>;

/// Errors from forest store and traversal operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    /// Referenced unit id does not exist.
    NotFound(UnitId),
    /// Parent link would close (or already closes) a loop.
    CycleDetected { unit_id: UnitId, parent_id: UnitId },
    /// Removal refused while children still point at the unit.
    ReferencedByChild { unit_id: UnitId, child_count: usize },
    /// Another unit already owns this code.
    DuplicateCode(String),
    /// Another unit already owns this id.
    DuplicateId(UnitId),
    /// Name is blank after trim.
    InvalidName,
    /// Code is blank after trim.
    InvalidCode,
    /// Traversal visited more units than the configured bound.
    TraversalLimitExceeded { limit: usize },
    /// Engine lock was poisoned by a panicking writer.
    LockPoisoned,
}

impl Display for ForestError {
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
                "unit {unit_id} is still parent of {child_count} unit(s)"
            ),
            Self::DuplicateCode(code) => write!(f, "unit code already in use: `{code}`"),
            Self::DuplicateId(id) => write!(f, "unit id already in use: {id}"),
            Self::InvalidName => write!(f, "unit name must not be blank"),
            Self::InvalidCode => write!(f, "unit code must not be blank"),
            Self::TraversalLimitExceeded { limit } => {
                write!(f, "traversal exceeded limit of {limit} units")
            }
            Self::LockPoisoned => write!(f, "hierarchy engine lock poisoned"),
        }
    }
}

impl Error for ForestError {}

impl From<UnitValidationError> for ForestError {
    fn from(value: UnitValidationError) -> Self {
        match value {
            UnitValidationError::BlankName => Self::InvalidName,
            UnitValidationError::BlankCode => Self::InvalidCode,
            UnitValidationError::SelfParent(id) => Self::CycleDetected {
                unit_id: id,
                parent_id: id,
            },
        }
    }
}

/// A validated structural change, produced by `Forest::plan_*`.
///
/// `Insert` and `Update` carry the complete post-edit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestEdit {
    Insert(Unit),
    Update(Unit),
    Remove(UnitId),
}

impl ForestEdit {
    /// Id of the unit this edit touches.
    pub fn unit_id(&self) -> UnitId {
        match self {
            Self::Insert(unit) | Self::Update(unit) => unit.id,
            Self::Remove(id) => *id,
        }
    }

    /// Short label used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Remove(_) => "remove",
        }
    }
}

/// Forest of units with incrementally maintained adjacency.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    units: HashMap<UnitId, Unit>,
    codes: HashMap<String, UnitId>,
    children: HashMap<UnitId, HashSet<UnitId>>,
    config: EngineConfig,
}

impl Forest {
    /// Creates an empty forest.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builds a forest from flat records in any order.
    ///
    /// # Errors
    /// - `DuplicateId` / `DuplicateCode` for repeated keys.
    /// - `NotFound` for a parent id missing from `units`.
    /// - `CycleDetected` when the loaded parent links contain a loop.
    pub fn from_units(
        units: impl IntoIterator<Item = Unit>,
        config: EngineConfig,
    ) -> ForestResult<Self> {
        let mut forest = Self::new(config);
        for mut unit in units {
            unit.normalize()?;
            if forest.units.contains_key(&unit.id) {
                return Err(ForestError::DuplicateId(unit.id));
            }
            if forest.codes.contains_key(&unit.code) {
                return Err(ForestError::DuplicateCode(unit.code));
            }
            forest.index_unit(unit);
        }

        for unit in forest.units.values() {
            if let Some(parent_id) = unit.parent_id {
                if !forest.units.contains_key(&parent_id) {
                    return Err(ForestError::NotFound(parent_id));
                }
            }
        }

        forest.ensure_acyclic()?;
        Ok(forest)
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Loads one unit by id.
    pub fn get(&self, id: UnitId) -> ForestResult<&Unit> {
        self.units.get(&id).ok_or(ForestError::NotFound(id))
    }

    /// Looks up a unit by business code.
    pub fn get_by_code(&self, code: &str) -> Option<&Unit> {
        self.codes
            .get(code.trim())
            .and_then(|id| self.units.get(id))
    }

    /// Iterates all units in unspecified order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Direct children of `id`, ordered by `(name, id)`.
    pub fn children_of(&self, id: UnitId) -> ForestResult<Vec<Unit>> {
        self.get(id)?;
        self.sorted_units(self.child_ids(id))
    }

    /// Units without a parent, ordered by `(name, id)`.
    pub fn roots(&self) -> Vec<Unit> {
        let mut roots: Vec<Unit> = self
            .units
            .values()
            .filter(|unit| unit.is_root())
            .cloned()
            .collect();
        sort_units(&mut roots);
        roots
    }

    /// Creates a unit with a fresh id.
    pub fn create(&mut self, input: NewUnit) -> ForestResult<Unit> {
        let edit = self.plan_create(input)?;
        self.apply(edit)
    }

    /// Inserts a unit that already carries an id.
    pub fn insert(&mut self, unit: Unit) -> ForestResult<Unit> {
        let edit = self.plan_insert(unit)?;
        self.apply(edit)
    }

    pub fn rename(&mut self, id: UnitId, name: &str) -> ForestResult<Unit> {
        let edit = self.plan_rename(id, name)?;
        self.apply(edit)
    }

    pub fn set_code(&mut self, id: UnitId, code: &str) -> ForestResult<Unit> {
        let edit = self.plan_set_code(id, code)?;
        self.apply(edit)
    }

    /// Re-parents `id`. `None` turns it into a root.
    pub fn set_parent(&mut self, id: UnitId, parent_id: Option<UnitId>) -> ForestResult<Unit> {
        let edit = self.plan_set_parent(id, parent_id)?;
        self.apply(edit)
    }

    /// Removes a unit that no other unit references as parent.
    pub fn remove(&mut self, id: UnitId) -> ForestResult<Unit> {
        let edit = self.plan_remove(id)?;
        self.apply(edit)
    }

    pub fn plan_create(&self, input: NewUnit) -> ForestResult<ForestEdit> {
        self.plan_insert(Unit::new(input.name, input.code, input.parent_id))
    }

    pub fn plan_insert(&self, mut unit: Unit) -> ForestResult<ForestEdit> {
        unit.normalize()?;
        if self.units.contains_key(&unit.id) {
            return Err(ForestError::DuplicateId(unit.id));
        }
        if self.codes.contains_key(&unit.code) {
            return Err(ForestError::DuplicateCode(unit.code));
        }
        if let Some(parent_id) = unit.parent_id {
            self.get(parent_id)?;
        }
        Ok(ForestEdit::Insert(unit))
    }

    pub fn plan_rename(&self, id: UnitId, name: &str) -> ForestResult<ForestEdit> {
        let mut unit = self.get(id)?.clone();
        unit.name = normalize_name(name)?;
        Ok(ForestEdit::Update(unit))
    }

    pub fn plan_set_code(&self, id: UnitId, code: &str) -> ForestResult<ForestEdit> {
        let mut unit = self.get(id)?.clone();
        let code = normalize_code(code)?;
        if let Some(owner) = self.codes.get(&code) {
            if *owner != id {
                return Err(ForestError::DuplicateCode(code));
            }
        }
        unit.code = code;
        Ok(ForestEdit::Update(unit))
    }

    pub fn plan_set_parent(
        &self,
        id: UnitId,
        parent_id: Option<UnitId>,
    ) -> ForestResult<ForestEdit> {
        let mut unit = self.get(id)?.clone();
        if let Some(parent_id) = parent_id {
            if parent_id == id {
                return Err(ForestError::CycleDetected {
                    unit_id: id,
                    parent_id,
                });
            }
            self.get(parent_id)?;
            if self.is_ancestor_or_self(id, parent_id)? {
                return Err(ForestError::CycleDetected {
                    unit_id: id,
                    parent_id,
                });
            }
        }
        unit.parent_id = parent_id;
        Ok(ForestEdit::Update(unit))
    }

    pub fn plan_remove(&self, id: UnitId) -> ForestResult<ForestEdit> {
        self.get(id)?;
        let child_count = self.child_ids(id).len();
        if child_count > 0 {
            return Err(ForestError::ReferencedByChild {
                unit_id: id,
                child_count,
            });
        }
        Ok(ForestEdit::Remove(id))
    }

    /// Applies a planned edit and returns the affected record.
    ///
    /// Edits must come from `plan_*` on this forest with no other mutation in
    /// between; a stale edit for a vanished unit yields `NotFound`.
    pub fn apply(&mut self, edit: ForestEdit) -> ForestResult<Unit> {
        match edit {
            ForestEdit::Insert(unit) => {
                self.index_unit(unit.clone());
                Ok(unit)
            }
            ForestEdit::Update(unit) => {
                let previous = self.unindex_unit(unit.id)?;
                if previous.parent_id != unit.parent_id {
                    debug!(
                        "event=reparent module=forest status=ok unit_id={} from={:?} to={:?}",
                        unit.id,
                        previous.parent_id,
                        unit.parent_id
                    );
                }
                self.index_unit(unit.clone());
                Ok(unit)
            }
            ForestEdit::Remove(id) => self.unindex_unit(id),
        }
    }

    fn child_ids(&self, id: UnitId) -> Vec<UnitId> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn sorted_units(&self, ids: impl IntoIterator<Item = UnitId>) -> ForestResult<Vec<Unit>> {
        let mut units = ids
            .into_iter()
            .map(|id| self.get(id).cloned())
            .collect::<ForestResult<Vec<_>>>()?;
        sort_units(&mut units);
        Ok(units)
    }

    fn index_unit(&mut self, unit: Unit) {
        if let Some(parent_id) = unit.parent_id {
            self.children.entry(parent_id).or_default().insert(unit.id);
        }
        self.codes.insert(unit.code.clone(), unit.id);
        self.units.insert(unit.id, unit);
    }

    fn unindex_unit(&mut self, id: UnitId) -> ForestResult<Unit> {
        let unit = self.units.remove(&id).ok_or(ForestError::NotFound(id))?;
        self.codes.remove(&unit.code);
        if let Some(parent_id) = unit.parent_id {
            if let Some(siblings) = self.children.get_mut(&parent_id) {
                siblings.remove(&id);
                if siblings.is_empty() {
                    self.children.remove(&parent_id);
                }
            }
        }
        Ok(unit)
    }

    /// Verifies that no parent chain loops, visiting each unit once overall.
    fn ensure_acyclic(&self) -> ForestResult<()> {
        let mut settled: HashSet<UnitId> = HashSet::with_capacity(self.units.len());
        for start in self.units.keys() {
            let mut path: Vec<UnitId> = Vec::new();
            let mut on_path: HashSet<UnitId> = HashSet::new();
            let mut cursor = Some(*start);
            while let Some(current) = cursor {
                if settled.contains(&current) {
                    break;
                }
                if !on_path.insert(current) {
                    let unit_id = path.last().copied().unwrap_or(current);
                    return Err(ForestError::CycleDetected {
                        unit_id,
                        parent_id: current,
                    });
                }
                path.push(current);
                cursor = self.get(current)?.parent_id;
            }
            settled.extend(path);
        }
        Ok(())
    }
}

/// Orders units by `(name, id)`.
pub(crate) fn sort_units(units: &mut [Unit]) {
    units.sort_by(|left, right| {
        left.name
            .cmp(&right.name)
            .then_with(|| left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use super::{Forest, ForestEdit, ForestError};
    use crate::config::EngineConfig;
    use crate::model::unit::{NewUnit, Unit};

    fn forest() -> Forest {
        Forest::new(EngineConfig::default())
    }

    #[test]
    fn create_rejects_duplicate_code_after_trim() {
        let mut forest = forest();
        forest.create(NewUnit::new("Head office", "HQ")).unwrap();
        let err = forest.create(NewUnit::new("Other", " HQ ")).unwrap_err();
        assert_eq!(err, ForestError::DuplicateCode("HQ".to_string()));
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn create_rejects_unknown_parent() {
        let mut forest = forest();
        let missing = uuid::Uuid::new_v4();
        let err = forest
            .create(NewUnit::new("Orphan", "O").under(missing))
            .unwrap_err();
        assert_eq!(err, ForestError::NotFound(missing));
        assert!(forest.is_empty());
    }

    #[test]
    fn set_code_allows_same_unit_and_rejects_other_owner() {
        let mut forest = forest();
        let a = forest.create(NewUnit::new("A", "A")).unwrap();
        forest.create(NewUnit::new("B", "B")).unwrap();

        forest.set_code(a.id, "A").unwrap();
        let err = forest.set_code(a.id, "B").unwrap_err();
        assert_eq!(err, ForestError::DuplicateCode("B".to_string()));

        let renamed = forest.set_code(a.id, "A-2").unwrap();
        assert_eq!(renamed.code, "A-2");
        assert!(forest.get_by_code("A").is_none());
        assert_eq!(forest.get_by_code("A-2").map(|unit| unit.id), Some(a.id));
    }

    #[test]
    fn set_parent_moves_child_index() {
        let mut forest = forest();
        let left = forest.create(NewUnit::new("Left", "L")).unwrap();
        let right = forest.create(NewUnit::new("Right", "R")).unwrap();
        let leaf = forest
            .create(NewUnit::new("Leaf", "LF").under(left.id))
            .unwrap();

        forest.set_parent(leaf.id, Some(right.id)).unwrap();
        assert!(forest.children_of(left.id).unwrap().is_empty());
        assert_eq!(
            forest.children_of(right.id).unwrap(),
            vec![Unit::with_id(leaf.id, "Leaf", "LF", Some(right.id))]
        );

        forest.set_parent(leaf.id, None).unwrap();
        assert_eq!(forest.roots().len(), 3);
    }

    #[test]
    fn plan_does_not_mutate_until_applied() {
        let mut forest = forest();
        let unit = forest.create(NewUnit::new("Ops", "OPS")).unwrap();
        let edit = forest.plan_rename(unit.id, "Operations").unwrap();
        assert_eq!(forest.get(unit.id).unwrap().name, "Ops");
        assert!(matches!(edit, ForestEdit::Update(ref u) if u.name == "Operations"));

        forest.apply(edit).unwrap();
        assert_eq!(forest.get(unit.id).unwrap().name, "Operations");
    }

    #[test]
    fn remove_refuses_referenced_parent() {
        let mut forest = forest();
        let parent = forest.create(NewUnit::new("Parent", "P")).unwrap();
        let child = forest
            .create(NewUnit::new("Child", "C").under(parent.id))
            .unwrap();

        let err = forest.remove(parent.id).unwrap_err();
        assert_eq!(
            err,
            ForestError::ReferencedByChild {
                unit_id: parent.id,
                child_count: 1
            }
        );
        assert_eq!(forest.len(), 2);

        forest.remove(child.id).unwrap();
        forest.remove(parent.id).unwrap();
        assert!(forest.is_empty());
        assert!(forest.get_by_code("P").is_none());
    }

    #[test]
    fn from_units_accepts_children_before_parents() {
        let root = Unit::new("Root", "R", None);
        let child = Unit::new("Child", "C", Some(root.id));
        let forest =
            Forest::from_units(vec![child.clone(), root.clone()], EngineConfig::default())
                .unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.children_of(root.id).unwrap(), vec![child]);
    }

    #[test]
    fn from_units_rejects_dangling_parent() {
        let missing = uuid::Uuid::new_v4();
        let err = Forest::from_units(
            vec![Unit::new("Child", "C", Some(missing))],
            EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, ForestError::NotFound(missing));
    }

    #[test]
    fn from_units_rejects_persisted_cycle() {
        let a_id = uuid::Uuid::new_v4();
        let b_id = uuid::Uuid::new_v4();
        let units = vec![
            Unit::with_id(a_id, "A", "A", Some(b_id)),
            Unit::with_id(b_id, "B", "B", Some(a_id)),
        ];
        let err = Forest::from_units(units, EngineConfig::default()).unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));
    }

    #[test]
    fn from_units_rejects_self_parent() {
        let id = uuid::Uuid::new_v4();
        let err = Forest::from_units(
            vec![Unit::with_id(id, "Self", "S", Some(id))],
            EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ForestError::CycleDetected {
                unit_id: id,
                parent_id: id
            }
        );
    }
}
