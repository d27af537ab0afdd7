//! Villain repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide upsert/select/update/delete APIs over the `villains` table.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Villain::validate()` before SQL mutations.
//! - Statements on one repository are serialized by its connection lock, so a
//!   read issued after a write returns observes that write.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::villain::{
    Villain, VillainId, VillainValidationError, COLUMN_ID, COLUMN_NAME, COLUMN_SERIES, FIELD_ID,
    SAMPLE_VILLAINS, TABLE_NAME, UNASSIGNED_ID,
};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};

const VILLAIN_SELECT_SQL: &str = "SELECT _id, villain_name, series FROM villains";
const REQUIRED_COLUMNS: &[&str] = &[COLUMN_ID, COLUMN_NAME, COLUMN_SERIES];

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level failure. Every variant is an engine or integrity fault.
#[derive(Debug)]
pub enum RepoError {
    Validation(VillainValidationError),
    Db(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    LockPoisoned,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted villain data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
            Self::LockPoisoned => write!(f, "villain store connection lock poisoned"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VillainValidationError> for RepoError {
    fn from(value: VillainValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Sortable villain columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VillainColumn {
    Id,
    Name,
    Series,
}

impl VillainColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => COLUMN_ID,
            Self::Name => COLUMN_NAME,
            Self::Series => COLUMN_SERIES,
        }
    }

    /// Parses a column name; accepts the payload key `id` as an alias of `_id`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            COLUMN_ID | FIELD_ID => Some(Self::Id),
            COLUMN_NAME => Some(Self::Name),
            COLUMN_SERIES => Some(Self::Series),
            _ => None,
        }
    }
}

/// Requested ordering for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VillainSort {
    pub column: VillainColumn,
    pub descending: bool,
}

/// Query options for listing villains.
///
/// The default query returns every row in natural (insertion) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VillainQuery {
    pub series: Option<String>,
    pub sort: Option<VillainSort>,
    pub limit: Option<u32>,
}

/// Store contract for villain persistence.
pub trait VillainRepository: Send + Sync {
    /// Inserts `villain`, overwriting any row with the same non-zero id.
    /// Returns the effective id.
    ///
    /// Fresh ids continue from the largest id ever stored. Once an explicit
    /// `i64::MAX` has been stored, every later insert with id 0 fails with a
    /// storage error while explicit-id upserts keep working.
    fn insert_or_replace(&self, villain: &Villain) -> RepoResult<VillainId>;
    /// Applies `insert_or_replace` to every record in order.
    fn insert_all_or_replace(&self, villains: &[Villain]) -> RepoResult<Vec<VillainId>>;
    fn select(&self, query: &VillainQuery) -> RepoResult<Vec<Villain>>;
    fn select_by_id(&self, id: VillainId) -> RepoResult<Option<Villain>>;
    /// Replaces the row at `villain.id`; returns rows affected (0 or 1).
    fn update(&self, villain: &Villain) -> RepoResult<usize>;
    /// Returns rows affected (0 or 1).
    fn delete_by_id(&self, id: VillainId) -> RepoResult<usize>;
    fn delete_all(&self) -> RepoResult<usize>;
    fn count(&self) -> RepoResult<u64>;
    /// Replaces the table contents with `SAMPLE_VILLAINS`.
    fn seed_samples(&self) -> RepoResult<Vec<VillainId>>;

    fn select_all(&self) -> RepoResult<Vec<Villain>> {
        self.select(&VillainQuery::default())
    }
}

/// SQLite-backed villain repository owning one connection.
pub struct SqliteVillainRepository {
    conn: Mutex<Connection>,
}

impl SqliteVillainRepository {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not current.
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the schema is incomplete.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::LockPoisoned)
    }
}

impl VillainRepository for SqliteVillainRepository {
    fn insert_or_replace(&self, villain: &Villain) -> RepoResult<VillainId> {
        villain.validate()?;
        let conn = self.lock()?;
        let id = insert_row(&conn, villain)?;
        debug!("event=villain_upsert module=repo status=ok id={id}");
        Ok(id)
    }

    fn insert_all_or_replace(&self, villains: &[Villain]) -> RepoResult<Vec<VillainId>> {
        for villain in villains {
            villain.validate()?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let ids = villains
            .iter()
            .map(|villain| insert_row(&tx, villain))
            .collect::<RepoResult<Vec<_>>>()?;
        tx.commit()?;

        debug!(
            "event=villain_upsert_batch module=repo status=ok rows={}",
            ids.len()
        );
        Ok(ids)
    }

    fn select(&self, query: &VillainQuery) -> RepoResult<Vec<Villain>> {
        let mut sql = format!("{VILLAIN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(series) = &query.series {
            sql.push_str(" AND series = ?");
            bind_values.push(Value::Text(series.clone()));
        }

        if let Some(sort) = query.sort {
            let direction = if sort.descending { "DESC" } else { "ASC" };
            sql.push_str(&format!(" ORDER BY {} {direction}", sort.column.as_str()));
            if sort.column != VillainColumn::Id {
                sql.push_str(", _id ASC");
            }
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut villains = Vec::new();
        while let Some(row) = rows.next()? {
            villains.push(parse_villain_row(row)?);
        }

        Ok(villains)
    }

    fn select_by_id(&self, id: VillainId) -> RepoResult<Option<Villain>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{VILLAIN_SELECT_SQL} WHERE _id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_villain_row(row)?));
        }
        Ok(None)
    }

    fn update(&self, villain: &Villain) -> RepoResult<usize> {
        villain.validate()?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE villains SET villain_name = ?1, series = ?2 WHERE _id = ?3;",
            params![villain.name.as_str(), villain.series.as_str(), villain.id],
        )?;
        debug!(
            "event=villain_update module=repo status=ok id={} rows={changed}",
            villain.id
        );
        Ok(changed)
    }

    fn delete_by_id(&self, id: VillainId) -> RepoResult<usize> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM villains WHERE _id = ?1;", [id])?;
        debug!("event=villain_delete module=repo status=ok id={id} rows={changed}");
        Ok(changed)
    }

    fn delete_all(&self) -> RepoResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM villains;", [])?)
    }

    fn count(&self) -> RepoResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM villains;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn seed_samples(&self) -> RepoResult<Vec<VillainId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM villains;", [])?;
        let ids = SAMPLE_VILLAINS
            .iter()
            .map(|(name, series)| insert_row(&tx, &Villain::new(*name, *series)))
            .collect::<RepoResult<Vec<_>>>()?;
        tx.commit()?;

        debug!(
            "event=villain_seed module=repo status=ok rows={}",
            ids.len()
        );
        Ok(ids)
    }
}

fn insert_row(conn: &Connection, villain: &Villain) -> RepoResult<VillainId> {
    if villain.id == UNASSIGNED_ID {
        conn.execute(
            "INSERT INTO villains (villain_name, series) VALUES (?1, ?2);",
            params![villain.name.as_str(), villain.series.as_str()],
        )?;
        return Ok(conn.last_insert_rowid());
    }

    conn.execute(
        "INSERT OR REPLACE INTO villains (_id, villain_name, series) VALUES (?1, ?2, ?3);",
        params![villain.id, villain.name.as_str(), villain.series.as_str()],
    )?;
    Ok(villain.id)
}

fn parse_villain_row(row: &Row<'_>) -> RepoResult<Villain> {
    let id: VillainId = row.get(COLUMN_ID)?;
    if id <= UNASSIGNED_ID {
        return Err(RepoError::InvalidData(format!(
            "invalid id value `{id}` in villains._id"
        )));
    }

    Ok(Villain {
        id,
        name: row.get(COLUMN_NAME)?,
        series: row.get(COLUMN_SERIES)?,
    })
}

fn ensure_schema(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [TABLE_NAME],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !table_exists {
        return Err(RepoError::MissingRequiredTable(TABLE_NAME));
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let columns = stmt
        .query_map([TABLE_NAME], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for &column in REQUIRED_COLUMNS {
        if !columns.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: TABLE_NAME,
                column,
            });
        }
    }

    Ok(())
}
