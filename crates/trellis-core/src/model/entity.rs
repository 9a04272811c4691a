use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{EntityKind, GroupKey, ItemId, Orderable};

/// A page in the page tree. Root pages have no parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: ItemId,
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub position: u32,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Page {
    #[must_use]
    pub fn new(title: impl Into<String>, parent_id: Option<ItemId>) -> Self {
        Self {
            id: ItemId::generate(EntityKind::Page),
            parent_id,
            title: title.into(),
            position: 0,
            deleted: false,
            created_at: Utc::now(),
        }
    }
}

/// Partial update for a page. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePatch {
    pub title: Option<String>,
    pub deleted: Option<bool>,
}

impl Orderable for Page {
    type Patch = PagePatch;

    const KIND: EntityKind = EntityKind::Page;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn group(&self) -> Option<&ItemId> {
        self.parent_id.as_ref()
    }

    fn owner(&self) -> Option<&ItemId> {
        None
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }

    fn set_group(&mut self, group: GroupKey) {
        self.parent_id = group;
    }

    fn apply_patch(&mut self, patch: &PagePatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(deleted) = patch.deleted {
            self.deleted = deleted;
        }
    }

    fn soft_delete_patch() -> Option<PagePatch> {
        Some(PagePatch {
            title: None,
            deleted: Some(true),
        })
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A column on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ItemId,
    pub page_id: ItemId,
    pub title: String,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

impl Column {
    #[must_use]
    pub fn new(title: impl Into<String>, page_id: ItemId) -> Self {
        Self {
            id: ItemId::generate(EntityKind::Column),
            page_id,
            title: title.into(),
            position: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPatch {
    pub title: Option<String>,
}

impl Orderable for Column {
    type Patch = ColumnPatch;

    const KIND: EntityKind = EntityKind::Column;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn group(&self) -> Option<&ItemId> {
        Some(&self.page_id)
    }

    fn owner(&self) -> Option<&ItemId> {
        Some(&self.page_id)
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }

    // Columns never leave their page; a root key is ignored.
    fn set_group(&mut self, group: GroupKey) {
        if let Some(page_id) = group {
            self.page_id = page_id;
        }
    }

    fn apply_patch(&mut self, patch: &ColumnPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
    }
}

/// A task card inside a column. `page_id` is denormalized for page-scoped loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: ItemId,
    pub column_id: ItemId,
    pub page_id: ItemId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    #[must_use]
    pub fn new(title: impl Into<String>, column_id: ItemId, page_id: ItemId) -> Self {
        Self {
            id: ItemId::generate(EntityKind::Task),
            column_id,
            page_id,
            title: title.into(),
            description: None,
            position: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl Orderable for Task {
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn group(&self) -> Option<&ItemId> {
        Some(&self.column_id)
    }

    fn owner(&self) -> Option<&ItemId> {
        Some(&self.page_id)
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }

    fn set_group(&mut self, group: GroupKey) {
        if let Some(column_id) = group {
            self.column_id = column_id;
        }
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
    }
}
