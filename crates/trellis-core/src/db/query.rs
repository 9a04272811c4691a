//! Lookups that cross the page boundary of the in-memory stores.
//!
//! Column and task stores only hold the open page, so a caller holding a
//! bare column or task id asks the database which page to open first.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{EntityKind, ItemId};

/// Page that owns `id`. A live page owns itself; deleted pages and unknown
/// ids resolve to `None`.
///
/// # Errors
///
/// Returns an error if the lookup query fails.
pub fn owning_page(conn: &Connection, kind: EntityKind, id: &ItemId) -> Result<Option<ItemId>> {
    let sql = match kind {
        EntityKind::Page => "SELECT id FROM pages WHERE id = ?1 AND is_deleted = 0",
        EntityKind::Column => {
            "SELECT c.page_id FROM columns c
             JOIN pages p ON p.id = c.page_id
             WHERE c.id = ?1 AND p.is_deleted = 0"
        }
        EntityKind::Task => {
            "SELECT t.page_id FROM tasks t
             JOIN pages p ON p.id = t.page_id
             WHERE t.id = ?1 AND p.is_deleted = 0"
        }
    };

    conn.query_row(sql, params![id.as_str()], |row| row.get::<_, String>(0))
        .optional()
        .with_context(|| format!("look up page of {kind} {id}"))
        .map(|page| page.map(ItemId::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteBackend, open_in_memory};
    use crate::model::{Column, Page, PagePatch, Task};
    use crate::persist::Persistence;

    #[test]
    fn resolves_the_page_of_each_kind() {
        let mut backend = SqliteBackend::new(open_in_memory().expect("open in-memory board"));
        let page = Page::new("Roadmap", None);
        let column = Column::new("Todo", page.id.clone());
        let task = Task::new("Ship", column.id.clone(), page.id.clone());
        backend.insert(&page).expect("insert page");
        backend.insert(&column).expect("insert column");
        backend.insert(&task).expect("insert task");

        let conn = backend.connection();
        let page_of = |kind, id: &ItemId| owning_page(conn, kind, id).expect("lookup");
        assert_eq!(page_of(EntityKind::Page, &page.id), Some(page.id.clone()));
        assert_eq!(page_of(EntityKind::Column, &column.id), Some(page.id.clone()));
        assert_eq!(page_of(EntityKind::Task, &task.id), Some(page.id.clone()));
        assert_eq!(page_of(EntityKind::Task, &ItemId::new("tk-missing")), None);
    }

    #[test]
    fn deleted_pages_own_nothing() {
        let mut backend = SqliteBackend::new(open_in_memory().expect("open in-memory board"));
        let page = Page::new("Archive", None);
        let column = Column::new("Old", page.id.clone());
        backend.insert(&page).expect("insert page");
        backend.insert(&column).expect("insert column");
        Persistence::<Page>::update_one(
            &mut backend,
            &page.id,
            &PagePatch {
                title: None,
                deleted: Some(true),
            },
        )
        .expect("soft delete");

        let conn = backend.connection();
        assert_eq!(owning_page(conn, EntityKind::Page, &page.id).expect("lookup"), None);
        assert_eq!(owning_page(conn, EntityKind::Column, &column.id).expect("lookup"), None);
    }
}
