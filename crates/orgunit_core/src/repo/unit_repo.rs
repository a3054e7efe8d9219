//! Unit record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist flat `{id, name, code, parent_id}` records.
//! - Translate SQLite constraint failures into semantic errors.
//!
//! # Invariants
//! - Listing is deterministic: `name ASC, id ASC`.
//! - Deleting a unit that is still referenced as a parent is refused; the
//!   schema backs this with `ON DELETE RESTRICT`.
//! - Write paths call `Unit::normalize()` before SQL mutations.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::unit::{Unit, UnitId, UnitValidationError};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const UNIT_SELECT_SQL: &str = "SELECT id, name, code, parent_id FROM org_units";

const REQUIRED_COLUMNS: [&str; 6] = [
    "id",
    "name",
    "code",
    "parent_id",
    "created_at",
    "updated_at",
];

/// Result type used by unit repository operations.
pub type UnitRepoResult<T> = Result<T, UnitRepoError>;

/// Errors from unit record store operations.
#[derive(Debug)]
pub enum UnitRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Record failed field validation before reaching SQL.
    Validation(UnitValidationError),
    /// Target unit does not exist.
    NotFound(UnitId),
    /// Parent id does not reference a stored unit.
    ParentNotFound(UnitId),
    /// Another record already owns this code.
    DuplicateCode(String),
    /// Another record already owns this id.
    DuplicateId(UnitId),
    /// Delete refused because children still reference the unit.
    ReferencedByChild { unit_id: UnitId, child_count: usize },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for UnitRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "unit record not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent unit record not found: {id}"),
            Self::DuplicateCode(code) => write!(f, "unit code already stored: `{code}`"),
            Self::DuplicateId(id) => write!(f, "unit id already stored: {id}"),
            Self::ReferencedByChild {
                unit_id,
                child_count,
            } => write!(
                f,
                "unit record {unit_id} is still parent of {child_count} record(s)"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "unit repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "unit repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "unit repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid unit data: {message}"),
        }
    }
}

impl Error for UnitRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for UnitRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for UnitRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<UnitValidationError> for UnitRepoError {
    fn from(value: UnitValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Record store interface for units.
pub trait UnitRepository {
    /// Inserts one record.
    fn create_unit(&self, unit: &Unit) -> UnitRepoResult<()>;
    /// Loads one record by id.
    fn get_unit(&self, id: UnitId) -> UnitRepoResult<Option<Unit>>;
    /// Lists every record ordered by `name, id`.
    fn list_units(&self) -> UnitRepoResult<Vec<Unit>>;
    /// Replaces name, code and parent of an existing record.
    fn update_unit(&self, unit: &Unit) -> UnitRepoResult<()>;
    /// Deletes one record with no children.
    fn delete_unit(&self, id: UnitId) -> UnitRepoResult<()>;
    /// Counts records whose parent is `id`.
    fn count_children(&self, id: UnitId) -> UnitRepoResult<usize>;
}

/// SQLite-backed unit record store.
pub struct SqliteUnitRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUnitRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> UnitRepoResult<Self> {
        ensure_unit_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl UnitRepository for SqliteUnitRepository<'_> {
    fn create_unit(&self, unit: &Unit) -> UnitRepoResult<()> {
        let mut unit = unit.clone();
        unit.normalize()?;

        self.conn
            .execute(
                "INSERT INTO org_units (id, name, code, parent_id)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    unit.id.to_string(),
                    unit.name.as_str(),
                    unit.code.as_str(),
                    unit.parent_id.map(|value| value.to_string()),
                ],
            )
            .map_err(|err| map_write_error(err, &unit))?;
        Ok(())
    }

    fn get_unit(&self, id: UnitId) -> UnitRepoResult<Option<Unit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{UNIT_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id.to_string()], |row| Ok(read_raw_row(row)))
            .optional()?;
        row.map(|raw| raw.and_then(RawUnitRow::into_unit)).transpose()
    }

    fn list_units(&self) -> UnitRepoResult<Vec<Unit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{UNIT_SELECT_SQL} ORDER BY name ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;

        let mut units = Vec::new();
        while let Some(row) = rows.next()? {
            units.push(read_raw_row(row)?.into_unit()?);
        }
        Ok(units)
    }

    fn update_unit(&self, unit: &Unit) -> UnitRepoResult<()> {
        let mut unit = unit.clone();
        unit.normalize()?;

        let changed = self
            .conn
            .execute(
                "UPDATE org_units
                 SET name = ?2,
                     code = ?3,
                     parent_id = ?4,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    unit.id.to_string(),
                    unit.name.as_str(),
                    unit.code.as_str(),
                    unit.parent_id.map(|value| value.to_string()),
                ],
            )
            .map_err(|err| map_write_error(err, &unit))?;
        if changed == 0 {
            return Err(UnitRepoError::NotFound(unit.id));
        }
        Ok(())
    }

    fn delete_unit(&self, id: UnitId) -> UnitRepoResult<()> {
        let child_count = self.count_children(id)?;
        if child_count > 0 {
            return Err(UnitRepoError::ReferencedByChild {
                unit_id: id,
                child_count,
            });
        }

        let changed = self
            .conn
            .execute("DELETE FROM org_units WHERE id = ?1;", [id.to_string()])
            .map_err(|err| {
                if constraint_code(&err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
                    UnitRepoError::ReferencedByChild {
                        unit_id: id,
                        child_count: 1,
                    }
                } else {
                    err.into()
                }
            })?;
        if changed == 0 {
            return Err(UnitRepoError::NotFound(id));
        }
        Ok(())
    }

    fn count_children(&self, id: UnitId) -> UnitRepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM org_units WHERE parent_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| UnitRepoError::InvalidData(format!("negative child count `{count}`")))
    }
}

/// Column values read as stored, before uuid parsing.
struct RawUnitRow {
    id: String,
    name: String,
    code: String,
    parent_id: Option<String>,
}

impl RawUnitRow {
    fn into_unit(self) -> UnitRepoResult<Unit> {
        let id = parse_uuid(&self.id, "org_units.id")?;
        let parent_id = self
            .parent_id
            .map(|value| parse_uuid(&value, "org_units.parent_id"))
            .transpose()?;
        Ok(Unit::with_id(id, self.name, self.code, parent_id))
    }
}

fn read_raw_row(row: &Row<'_>) -> UnitRepoResult<RawUnitRow> {
    Ok(RawUnitRow {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        parent_id: row.get("parent_id")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> UnitRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| UnitRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Some(failure.extended_code)
        }
        _ => None,
    }
}

fn map_write_error(err: rusqlite::Error, unit: &Unit) -> UnitRepoError {
    match constraint_code(&err) {
        Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => UnitRepoError::DuplicateId(unit.id),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => UnitRepoError::DuplicateCode(unit.code.clone()),
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => match unit.parent_id {
            Some(parent_id) => UnitRepoError::ParentNotFound(parent_id),
            None => err.into(),
        },
        _ => err.into(),
    }
}

fn ensure_unit_connection_ready(conn: &Connection) -> UnitRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(UnitRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "org_units")? {
        return Err(UnitRepoError::MissingRequiredTable("org_units"));
    }
    for column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "org_units", column)? {
            return Err(UnitRepoError::MissingRequiredColumn {
                table: "org_units",
                column,
            });
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> UnitRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> UnitRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
