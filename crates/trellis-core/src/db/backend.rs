//! [`Persistence`] over the board's SQLite tables.
//!
//! One [`SqliteBackend`] serves all three entity types; clones share the
//! same connection so a board's stores write to one database.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace};

use crate::model::{
    Column, ColumnPatch, GroupKey, ItemId, Orderable, Page, PagePatch, PositionPatch, Task,
    TaskPatch,
};
use crate::persist::{PersistError, Persistence};

/// Row mapping for one entity table.
pub trait SqlTable: Orderable {
    const TABLE: &'static str;

    /// Writes `?1` = group, `?2` = position for row `?3`.
    const REORDER_SQL: &'static str;

    /// Live rows scoped to `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row does not decode.
    fn fetch(conn: &Connection, owner: &GroupKey) -> rusqlite::Result<Vec<Self>>;

    /// # Errors
    ///
    /// Returns an error if the insert fails, e.g. on a missing parent row.
    fn insert_row(&self, conn: &Connection) -> rusqlite::Result<usize>;

    /// Apply `patch` and return the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update statement fails.
    fn update_row(conn: &Connection, id: &ItemId, patch: &Self::Patch) -> rusqlite::Result<usize>;
}

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Rc<Connection>,
}

impl SqliteBackend {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Rc::new(conn),
        }
    }

    /// Open the board database at `path`, creating and migrating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        super::open_board(path).map(Self::new)
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl<T: SqlTable> Persistence<T> for SqliteBackend {
    fn fetch_all(&mut self, owner: &GroupKey) -> Result<Vec<T>, PersistError> {
        let rows = T::fetch(&self.conn, owner).map_err(persist_error)?;
        trace!(kind = %T::KIND, rows = rows.len(), "fetched rows");
        Ok(rows)
    }

    fn insert(&mut self, item: &T) -> Result<T, PersistError> {
        item.insert_row(&self.conn).map_err(persist_error)?;
        Ok(item.clone())
    }

    fn update_one(&mut self, id: &ItemId, patch: &T::Patch) -> Result<(), PersistError> {
        match T::update_row(&self.conn, id, patch).map_err(persist_error)? {
            0 => Err(PersistError::NotFound(id.clone())),
            _ => Ok(()),
        }
    }

    fn upsert_many(&mut self, rows: &[PositionPatch]) -> Result<(), PersistError> {
        let tx = self.conn.unchecked_transaction().map_err(persist_error)?;
        {
            let mut stmt = tx.prepare_cached(T::REORDER_SQL).map_err(persist_error)?;
            for row in rows {
                let group = row.group.as_ref().map(ItemId::as_str);
                let changed = stmt
                    .execute(params![group, i64::from(row.position), row.id.as_str()])
                    .map_err(persist_error)?;
                if changed == 0 {
                    return Err(PersistError::NotFound(row.id.clone()));
                }
            }
        }
        tx.commit().map_err(persist_error)?;
        debug!(kind = %T::KIND, rows = rows.len(), "reorder written");
        Ok(())
    }

    fn remove(&mut self, id: &ItemId) -> Result<(), PersistError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::TABLE);
        match self.conn.execute(&sql, [id.as_str()]).map_err(persist_error)? {
            0 => Err(PersistError::NotFound(id.clone())),
            _ => Ok(()),
        }
    }
}

impl SqlTable for Page {
    const TABLE: &'static str = "pages";
    const REORDER_SQL: &'static str =
        "UPDATE pages SET parent_id = ?1, position = ?2 WHERE id = ?3";

    // Pages are not scoped; every live page is returned.
    fn fetch(conn: &Connection, _owner: &GroupKey) -> rusqlite::Result<Vec<Self>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, parent_id, title, position, is_deleted, created_at_us
             FROM pages
             WHERE is_deleted = 0
             ORDER BY parent_id, position, created_at_us",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Self {
                id: ItemId::new(row.get::<_, String>(0)?),
                parent_id: row.get::<_, Option<String>>(1)?.map(ItemId::new),
                title: row.get(2)?,
                position: position_at(row, 3)?,
                deleted: row.get(4)?,
                created_at: timestamp_at(row, 5)?,
            })
        })?;
        rows.collect()
    }

    fn insert_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO pages (id, parent_id, title, position, is_deleted, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.id.as_str(),
                self.parent_id.as_ref().map(ItemId::as_str),
                self.title,
                i64::from(self.position),
                self.deleted,
                self.created_at.timestamp_micros(),
            ],
        )
    }

    fn update_row(conn: &Connection, id: &ItemId, patch: &PagePatch) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE pages
             SET title = COALESCE(?1, title), is_deleted = COALESCE(?2, is_deleted)
             WHERE id = ?3",
            params![patch.title, patch.deleted, id.as_str()],
        )
    }
}

impl SqlTable for Column {
    const TABLE: &'static str = "columns";
    const REORDER_SQL: &'static str =
        "UPDATE columns SET page_id = ?1, position = ?2 WHERE id = ?3";

    fn fetch(conn: &Connection, owner: &GroupKey) -> rusqlite::Result<Vec<Self>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, page_id, title, position, created_at_us
             FROM columns
             WHERE ?1 IS NULL OR page_id = ?1
             ORDER BY page_id, position, created_at_us",
        )?;
        let rows = stmt.query_map([owner.as_ref().map(ItemId::as_str)], |row| {
            Ok(Self {
                id: ItemId::new(row.get::<_, String>(0)?),
                page_id: ItemId::new(row.get::<_, String>(1)?),
                title: row.get(2)?,
                position: position_at(row, 3)?,
                created_at: timestamp_at(row, 4)?,
            })
        })?;
        rows.collect()
    }

    fn insert_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO columns (id, page_id, title, position, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.id.as_str(),
                self.page_id.as_str(),
                self.title,
                i64::from(self.position),
                self.created_at.timestamp_micros(),
            ],
        )
    }

    fn update_row(conn: &Connection, id: &ItemId, patch: &ColumnPatch) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE columns SET title = COALESCE(?1, title) WHERE id = ?2",
            params![patch.title, id.as_str()],
        )
    }
}

impl SqlTable for Task {
    const TABLE: &'static str = "tasks";
    // A task follows its column's page.
    const REORDER_SQL: &'static str = "UPDATE tasks
         SET column_id = ?1,
             page_id = COALESCE((SELECT page_id FROM columns WHERE id = ?1), page_id),
             position = ?2
         WHERE id = ?3";

    fn fetch(conn: &Connection, owner: &GroupKey) -> rusqlite::Result<Vec<Self>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, column_id, page_id, title, description, position, created_at_us
             FROM tasks
             WHERE ?1 IS NULL OR page_id = ?1
             ORDER BY column_id, position, created_at_us",
        )?;
        let rows = stmt.query_map([owner.as_ref().map(ItemId::as_str)], |row| {
            Ok(Self {
                id: ItemId::new(row.get::<_, String>(0)?),
                column_id: ItemId::new(row.get::<_, String>(1)?),
                page_id: ItemId::new(row.get::<_, String>(2)?),
                title: row.get(3)?,
                description: row.get(4)?,
                position: position_at(row, 5)?,
                created_at: timestamp_at(row, 6)?,
            })
        })?;
        rows.collect()
    }

    fn insert_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO tasks (id, column_id, page_id, title, description, position, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.id.as_str(),
                self.column_id.as_str(),
                self.page_id.as_str(),
                self.title,
                self.description,
                i64::from(self.position),
                self.created_at.timestamp_micros(),
            ],
        )
    }

    fn update_row(conn: &Connection, id: &ItemId, patch: &TaskPatch) -> rusqlite::Result<usize> {
        let (set_description, description) = patch
            .description
            .as_ref()
            .map_or((false, None), |value| (true, value.as_deref()));
        conn.execute(
            "UPDATE tasks
             SET title = COALESCE(?1, title),
                 description = CASE WHEN ?2 THEN ?3 ELSE description END
             WHERE id = ?4",
            params![patch.title, set_description, description, id.as_str()],
        )
    }
}

fn position_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(idx)?;
    u32::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let us: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_micros(us)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, us))
}

/// Constraint failures are rejections; lock contention is unavailability.
fn persist_error(err: rusqlite::Error) -> PersistError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            rusqlite::ffi::ErrorCode::ConstraintViolation => {
                PersistError::Rejected(err.to_string())
            }
            rusqlite::ffi::ErrorCode::DatabaseBusy | rusqlite::ffi::ErrorCode::DatabaseLocked => {
                PersistError::Unavailable(err.to_string())
            }
            _ => PersistError::storage(&err),
        },
        _ => PersistError::storage(&err),
    }
}
