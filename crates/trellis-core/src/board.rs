//! The board: pages, the open page's columns, and their tasks.
//!
//! [`Board`] owns one store per entity type and applies the checks that span
//! stores: a task move needs its target column, a page move needs its new
//! parent and must not create a cycle, and deleting a column takes its tasks
//! with it. Moves that fail these checks are abandoned before any state
//! changes.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::ProjectConfig;
use crate::drag::{DragScope, DragSession, DragStart, DropIntent};
use crate::error::BoardError;
use crate::model::{
    Column, ColumnPatch, EntityKind, GroupKey, ItemId, Orderable, Page, PagePatch, Task, TaskPatch,
    group_label,
};
use crate::notify::{Notice, Notifier};
use crate::persist::{MemoryBackend, Persistence};
use crate::reconcile::CommitOutcome;
use crate::store::{ColumnStore, PageStore, Placement, Store, TaskStore};

#[derive(Debug)]
pub struct Board {
    pages: PageStore,
    columns: ColumnStore,
    tasks: TaskStore,
    config: ProjectConfig,
    open_page: Option<ItemId>,
}

impl Board {
    /// Assemble a board from its stores.
    ///
    /// The page store's persist mode is taken from `config.pages`.
    #[must_use]
    pub fn new(
        pages: PageStore,
        columns: ColumnStore,
        tasks: TaskStore,
        config: ProjectConfig,
    ) -> Self {
        let pages = pages.with_persist_mode(config.pages.persist_mode());
        Self {
            pages,
            columns,
            tasks,
            config,
            open_page: None,
        }
    }

    /// Build stores over the given backends, all reporting to `notifier`.
    #[must_use]
    pub fn with_backends<N>(
        pages: impl Persistence<Page> + 'static,
        columns: impl Persistence<Column> + 'static,
        tasks: impl Persistence<Task> + 'static,
        config: ProjectConfig,
        notifier: &N,
    ) -> Self
    where
        N: Notifier + Clone + 'static,
    {
        Self::new(
            Store::new(pages).with_notifier(notifier.clone()),
            Store::new(columns).with_notifier(notifier.clone()),
            Store::new(tasks).with_notifier(notifier.clone()),
            config,
        )
    }

    /// A board over empty in-memory backends.
    #[must_use]
    pub fn in_memory<N>(config: ProjectConfig, notifier: &N) -> Self
    where
        N: Notifier + Clone + 'static,
    {
        Self::with_backends(
            MemoryBackend::new(),
            MemoryBackend::new(),
            MemoryBackend::new(),
            config,
            notifier,
        )
    }

    #[must_use]
    pub const fn config(&self) -> &ProjectConfig {
        &self.config
    }

    #[must_use]
    pub const fn pages(&self) -> &PageStore {
        &self.pages
    }

    #[must_use]
    pub const fn columns(&self) -> &ColumnStore {
        &self.columns
    }

    #[must_use]
    pub const fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub const fn pages_mut(&mut self) -> &mut PageStore {
        &mut self.pages
    }

    pub const fn columns_mut(&mut self) -> &mut ColumnStore {
        &mut self.columns
    }

    pub const fn tasks_mut(&mut self) -> &mut TaskStore {
        &mut self.tasks
    }

    #[must_use]
    pub const fn open_page(&self) -> Option<&ItemId> {
        self.open_page.as_ref()
    }

    /// Load every live page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page backend cannot be read.
    pub fn load_pages(&mut self) -> Result<usize, BoardError> {
        self.pages.load(&None)
    }

    /// Load the columns and tasks of `page_id`, replacing the previous page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is not loaded or its columns or tasks
    /// cannot be read.
    pub fn open(&mut self, page_id: &ItemId) -> Result<(), BoardError> {
        if !self.pages.contains(page_id) {
            return Err(not_found(EntityKind::Page, page_id));
        }
        let owner = Some(page_id.clone());
        let columns = self.columns.load(&owner)?;
        let tasks = self.tasks.load(&owner)?;
        info!(page = %page_id, columns, tasks, "page opened");
        self.open_page = owner;
        Ok(())
    }

    /// Append a page under `parent`, or at the root.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is not a live page or the write fails.
    pub fn create_page(
        &mut self,
        title: &str,
        parent: Option<&ItemId>,
    ) -> Result<Page, BoardError> {
        if let Some(parent) = parent
            && !self.pages.contains(parent)
        {
            return Err(BoardError::GroupNotFound(parent.clone()));
        }
        self.pages
            .create(Page::new(title, parent.cloned()), Placement::Bottom)
    }

    /// Append a column to the open page.
    ///
    /// Only the open page's columns are loaded, so a column for any other
    /// page would be positioned against an empty group.
    ///
    /// # Errors
    ///
    /// Returns an error if `page_id` is not a live page, is not the open
    /// page, or the write fails.
    pub fn create_column(&mut self, page_id: &ItemId, title: &str) -> Result<Column, BoardError> {
        if !self.pages.contains(page_id) {
            return Err(BoardError::GroupNotFound(page_id.clone()));
        }
        if self.open_page.as_ref() != Some(page_id) {
            let reason = format!("page {page_id} is not open");
            return Err(BoardError::InvalidTarget(reason));
        }
        self.columns
            .create(Column::new(title, page_id.clone()), Placement::Bottom)
    }

    /// Create a task in `column_id`, placed per `tasks.insert`.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is not on the open page or the write
    /// fails.
    pub fn create_task(&mut self, column_id: &ItemId, title: &str) -> Result<Task, BoardError> {
        let Some(column) = self.columns.get(column_id) else {
            return Err(BoardError::GroupNotFound(column_id.clone()));
        };
        let task = Task::new(title, column_id.clone(), column.page_id.clone());
        self.tasks.create(task, self.config.tasks.insert.placement())
    }

    /// # Errors
    ///
    /// Returns an error if the page is not loaded or the write fails.
    pub fn rename_page(&mut self, id: &ItemId, title: &str) -> Result<(), BoardError> {
        self.pages.update(
            id,
            &PagePatch {
                title: Some(title.to_string()),
                deleted: None,
            },
        )
    }

    /// # Errors
    ///
    /// Returns an error if the column is not loaded or the write fails.
    pub fn rename_column(&mut self, id: &ItemId, title: &str) -> Result<(), BoardError> {
        self.columns.update(
            id,
            &ColumnPatch {
                title: Some(title.to_string()),
            },
        )
    }

    /// # Errors
    ///
    /// Returns an error if the task is not loaded or the write fails.
    pub fn update_task(&mut self, id: &ItemId, patch: &TaskPatch) -> Result<(), BoardError> {
        self.tasks.update(id, patch)
    }

    /// Soft-delete a page. Subpages keep their parent link.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is not loaded or the write fails.
    pub fn delete_page(&mut self, id: &ItemId) -> Result<Page, BoardError> {
        let page = self.pages.delete(id)?;
        if self.open_page.as_ref() == Some(id) {
            let owner = Some(id.clone());
            let columns: Vec<GroupKey> = self
                .columns
                .group(Some(id))
                .into_iter()
                .map(|column| Some(column.id.clone()))
                .collect();
            for column in &columns {
                self.tasks.forget_group(column);
            }
            self.columns.forget_group(&owner);
            self.open_page = None;
        }
        Ok(page)
    }

    /// Delete a column; its tasks leave local state with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is not loaded or the delete fails.
    pub fn delete_column(&mut self, id: &ItemId) -> Result<Column, BoardError> {
        let column = self.columns.delete(id)?;
        let dropped = self.tasks.forget_group(&Some(id.clone()));
        debug!(column = %id, tasks = dropped, "column tasks dropped");
        Ok(column)
    }

    /// # Errors
    ///
    /// Returns an error if the task is not loaded or the delete fails.
    pub fn delete_task(&mut self, id: &ItemId) -> Result<Task, BoardError> {
        self.tasks.delete(id)
    }

    /// Move tasks as a block into `column_id` at final `index`.
    pub fn move_tasks(
        &mut self,
        ids: &[ItemId],
        column_id: &ItemId,
        index: usize,
    ) -> CommitOutcome {
        if !self.columns.contains(column_id) {
            return abandon(&self.tasks, BoardError::GroupNotFound(column_id.clone()));
        }
        self.tasks.move_items(ids, &Some(column_id.clone()), index)
    }

    /// Reorder columns inside their page.
    pub fn move_columns(&mut self, ids: &[ItemId], index: usize) -> CommitOutcome {
        let Some(first) = ids.first() else {
            return self.columns.move_items(ids, &None, index);
        };
        let Some(page) = self.columns.get(first).map(|column| column.page_id.clone()) else {
            return abandon(&self.columns, not_found(EntityKind::Column, first));
        };
        if let Some(stray) = ids
            .iter()
            .find(|id| self.columns.get(id).is_some_and(|column| column.page_id != page))
        {
            return abandon(
                &self.columns,
                BoardError::InvalidTarget(format!("column {stray} is on another page")),
            );
        }
        self.columns.move_items(ids, &Some(page), index)
    }

    /// Move pages as a block under `parent` (root when `None`) at final `index`.
    pub fn move_pages(
        &mut self,
        ids: &[ItemId],
        parent: Option<&ItemId>,
        index: usize,
    ) -> CommitOutcome {
        if let Some(parent) = parent {
            if !self.pages.contains(parent) {
                return abandon(&self.pages, BoardError::GroupNotFound(parent.clone()));
            }
            if let Some(page) = self.cycle_root(ids, parent) {
                return abandon(
                    &self.pages,
                    BoardError::CycleDetected {
                        page,
                        parent: parent.clone(),
                    },
                );
            }
        }
        self.pages.move_items(ids, &parent.cloned(), index)
    }

    /// A drag session using the configured collision settings.
    #[must_use]
    pub const fn drag_session(&self) -> DragSession {
        DragSession::new(self.config.collision.resolver())
    }

    /// Start a drag over the collection `start.kind` names.
    ///
    /// Columns only reorder within their page.
    ///
    /// # Errors
    ///
    /// Returns an error if a drag is already active or the selection names
    /// an item the collection does not hold.
    pub fn start_drag(
        &self,
        session: &mut DragSession,
        start: DragStart,
        selection: &[ItemId],
    ) -> Result<(), BoardError> {
        match start.kind {
            EntityKind::Page => {
                session.start_drag(start, DragScope::Board, self.pages.items(), selection)?;
            }
            EntityKind::Column => {
                session.start_drag(start, DragScope::SingleGroup, self.columns.items(), selection)?;
            }
            EntityKind::Task => {
                session.start_drag(start, DragScope::Board, self.tasks.items(), selection)?;
            }
        }
        Ok(())
    }

    /// Commit a finished drag.
    pub fn commit_drop(&mut self, intent: &DropIntent) -> CommitOutcome {
        let ids = intent.ids();
        let index = intent.final_index();
        debug!(
            kind = %intent.kind,
            count = ids.len(),
            group = group_label(intent.target.group.as_ref()),
            index,
            "committing drop"
        );
        match intent.kind {
            EntityKind::Task => match &intent.target.group {
                Some(column) => self.move_tasks(&ids, column, index),
                None => abandon(
                    &self.tasks,
                    BoardError::InvalidTarget("tasks need a column".to_string()),
                ),
            },
            EntityKind::Column => self.move_columns(&ids, index),
            EntityKind::Page => self.move_pages(&ids, intent.target.group.as_ref(), index),
        }
    }

    /// First moved page that `parent` is, or descends from.
    fn cycle_root(&self, ids: &[ItemId], parent: &ItemId) -> Option<ItemId> {
        let mut seen: HashSet<&ItemId> = HashSet::new();
        let mut current = Some(parent);
        while let Some(page) = current {
            if let Some(moved) = ids.iter().find(|id| *id == page) {
                return Some(moved.clone());
            }
            if !seen.insert(page) {
                warn!(page = %page, "page ancestry loops");
                return None;
            }
            current = self.pages.get(page).and_then(|page| page.parent_id.as_ref());
        }
        None
    }
}

fn not_found(kind: EntityKind, id: &ItemId) -> BoardError {
    BoardError::ItemNotFound {
        kind,
        id: id.clone(),
    }
}

fn abandon<T: Orderable>(store: &Store<T>, err: BoardError) -> CommitOutcome {
    warn!(kind = %T::KIND, error = %err, "move abandoned");
    store.notify(Notice::error(err.code(), format!("Move abandoned: {err}")));
    CommitOutcome::Abandoned(err)
}
