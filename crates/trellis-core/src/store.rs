//! Authoritative in-memory collections, one per entity type.
//!
//! A [`Store`] owns the only mutable copy of its collection and the backend
//! that persists it. Observers subscribe to [`StoreEvent`]s instead of
//! polling. Creates, updates and deletes are applied optimistically and
//! reverted when the backend refuses them; reorders go through the
//! [`Reconciler`].

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::error::BoardError;
use crate::model::{Column, GroupKey, ItemId, Orderable, Page, PositionPatch, Task, group_label};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::persist::Persistence;
use crate::position;
use crate::reconcile::{CommitOutcome, PersistMode, Reconciler};

pub type PageStore = Store<Page>;
pub type ColumnStore = Store<Column>;
pub type TaskStore = Store<Task>;

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Change notifications delivered to subscribers after local state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Loaded { count: usize },
    Inserted(ItemId),
    Updated(ItemId),
    Removed(ItemId),
    Reordered { groups: Vec<GroupKey> },
    RolledBack { groups: Vec<GroupKey> },
}

/// Where a newly created item lands in its group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    /// Position 0; siblings shift down by one.
    #[default]
    Top,
    /// One past the current maximum position.
    Bottom,
    /// Splice at an index and reindex the group.
    At(usize),
}

pub struct Store<T: Orderable> {
    items: Vec<T>,
    backend: Box<dyn Persistence<T>>,
    notifier: Box<dyn Notifier>,
    persist_mode: PersistMode,
    revisions: HashMap<GroupKey, u64>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl<T: Orderable> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("kind", &T::KIND)
            .field("items", &self.items.len())
            .field("persist_mode", &self.persist_mode)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<T: Orderable> Store<T> {
    #[must_use]
    pub fn new(backend: impl Persistence<T> + 'static) -> Self {
        Self {
            items: Vec::new(),
            backend: Box::new(backend),
            notifier: Box::new(TracingNotifier),
            persist_mode: PersistMode::Batch,
            revisions: HashMap::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    #[must_use]
    pub const fn with_persist_mode(mut self, mode: PersistMode) -> Self {
        self.persist_mode = mode;
        self
    }

    #[must_use]
    pub const fn persist_mode(&self) -> PersistMode {
        self.persist_mode
    }

    /// Replace local state with every row the backend has for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read; local state is left
    /// as it was.
    pub fn load(&mut self, owner: &GroupKey) -> Result<usize, BoardError> {
        let rows = self.backend.fetch_all(owner)?;
        let count = rows.len();
        let groups = distinct_groups(&rows);
        self.items = rows;
        self.bump(&groups);
        debug!(kind = %T::KIND, owner = group_label(owner.as_ref()), count, "store loaded");
        self.emit(&StoreEvent::Loaded { count });
        Ok(count)
    }

    #[must_use]
    pub const fn items(&self) -> &[T] {
        self.items.as_slice()
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Members of `group` in display order.
    #[must_use]
    pub fn group(&self, group: Option<&ItemId>) -> Vec<&T> {
        position::members(&self.items, group)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Structural revision of `group`; bumps on every local reorder.
    #[must_use]
    pub fn revision(&self, group: &GroupKey) -> u64 {
        self.revisions.get(group).copied().unwrap_or(0)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Create `item` in its group at `placement`.
    ///
    /// Sibling shifts are persisted before the insert so that a failed insert
    /// leaves at most a gap behind on the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the sibling shift or the insert fails; local state
    /// is reverted to what it was before the call.
    pub fn create(&mut self, mut item: T, placement: Placement) -> Result<T, BoardError> {
        let id = item.id().clone();
        let group = item.group().cloned();
        let snapshot = self.items.clone();

        let planned = match placement {
            Placement::Top => position::insert_at_top(&self.items, item),
            Placement::Bottom => {
                item.set_position(position::next_append_position(&self.items, group.as_ref()));
                let mut all = self.items.clone();
                all.push(item);
                all
            }
            Placement::At(index) => position::insert_at(&self.items, item, index),
        };
        let shifted: Vec<PositionPatch> = position::diff(&snapshot, &planned)
            .into_iter()
            .filter(|row| row.id != id)
            .collect();
        let groups = vec![group];
        self.replace_items(planned, &groups);
        self.emit(&StoreEvent::Inserted(id.clone()));

        if !shifted.is_empty()
            && let Err(err) = self.backend.upsert_many(&shifted)
        {
            self.revert(snapshot, &groups);
            return Err(self.fail(&format!("Could not create {}", T::KIND), err.into()));
        }

        let Some(pending) = self.get(&id).cloned() else {
            return Err(BoardError::ItemNotFound { kind: T::KIND, id });
        };
        match self.backend.insert(&pending) {
            Ok(stored) => {
                if let Some(slot) = self.items.iter_mut().find(|item| item.id() == &id) {
                    *slot = stored.clone();
                }
                info!(kind = %T::KIND, item = %id, position = stored.position(), "created");
                self.notify(Notice::success(format!("{} created", T::KIND)));
                Ok(stored)
            }
            Err(err) => {
                self.revert(snapshot, &groups);
                Err(self.fail(&format!("Could not create {}", T::KIND), err.into()))
            }
        }
    }

    /// Apply a partial update locally, then persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not loaded or the backend refuses the
    /// update, in which case the previous fields are restored.
    pub fn update(&mut self, id: &ItemId, patch: &T::Patch) -> Result<(), BoardError> {
        let Some(slot) = self.items.iter_mut().find(|item| item.id() == id) else {
            return Err(Self::missing(id));
        };
        let previous = slot.clone();
        slot.apply_patch(patch);
        self.emit(&StoreEvent::Updated(id.clone()));

        if let Err(err) = self.backend.update_one(id, patch) {
            if let Some(slot) = self.items.iter_mut().find(|item| item.id() == id) {
                *slot = previous;
            }
            self.emit(&StoreEvent::Updated(id.clone()));
            return Err(self.fail(&format!("Could not update {}", T::KIND), err.into()));
        }
        Ok(())
    }

    /// Remove `id` locally without renumbering its siblings, then persist.
    ///
    /// Kinds with a soft-delete patch are flagged on the backend; the rest are
    /// hard-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not loaded or the backend refuses the
    /// delete, in which case the item is restored.
    pub fn delete(&mut self, id: &ItemId) -> Result<T, BoardError> {
        let Some((rest, removed)) = position::remove(&self.items, id) else {
            return Err(Self::missing(id));
        };
        let groups = vec![removed.group().cloned()];
        let snapshot = std::mem::replace(&mut self.items, rest);
        self.bump(&groups);
        self.emit(&StoreEvent::Removed(id.clone()));

        let persisted = match T::soft_delete_patch() {
            Some(patch) => self.backend.update_one(id, &patch),
            None => self.backend.remove(id),
        };
        if let Err(err) = persisted {
            self.revert(snapshot, &groups);
            return Err(self.fail(&format!("Could not delete {}", T::KIND), err.into()));
        }
        info!(kind = %T::KIND, item = %id, "deleted");
        Ok(removed)
    }

    /// Drop every item of `group` from local state only.
    ///
    /// Used when the owning parent was deleted and the backend cascades.
    pub fn forget_group(&mut self, group: &GroupKey) -> usize {
        let (gone, kept): (Vec<T>, Vec<T>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| item.group() == group.as_ref());
        self.items = kept;
        if !gone.is_empty() {
            self.bump(std::slice::from_ref(group));
        }
        for item in &gone {
            self.emit(&StoreEvent::Removed(item.id().clone()));
        }
        gone.len()
    }

    /// Compute a move plan without touching state.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection is empty or names an item that is
    /// not loaded.
    pub fn plan_move(
        &self,
        ids: &[ItemId],
        target: &GroupKey,
        index: usize,
    ) -> Result<Option<Vec<T>>, BoardError> {
        Ok(position::move_many(&self.items, ids, target, index)?)
    }

    /// Move `ids` as a block to `target` at final `index` and persist the diff.
    pub fn move_items(
        &mut self,
        ids: &[ItemId],
        target: &GroupKey,
        index: usize,
    ) -> CommitOutcome {
        match self.plan_move(ids, target, index) {
            Ok(Some(plan)) => self.reconciler().commit(self, plan),
            Ok(None) => CommitOutcome::Unchanged,
            Err(err) => {
                warn!(kind = %T::KIND, error = %err, "move abandoned");
                self.notify(Notice::error(err.code(), format!("Move abandoned: {err}")));
                CommitOutcome::Abandoned(err)
            }
        }
    }

    /// Move one item inside its own group.
    pub fn reorder(&mut self, id: &ItemId, new_index: usize) -> CommitOutcome {
        let Some(group) = self.get(id).map(|item| item.group().cloned()) else {
            let err = Self::missing(id);
            self.notify(Notice::error(err.code(), format!("Move abandoned: {err}")));
            return CommitOutcome::Abandoned(err);
        };
        self.move_items(std::slice::from_ref(id), &group, new_index)
    }

    #[must_use]
    pub const fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.persist_mode)
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    /// Swap in a new collection after a structural change to `groups`.
    ///
    /// Returns the revisions the change produced.
    pub(crate) fn replace_items(
        &mut self,
        items: Vec<T>,
        groups: &[GroupKey],
    ) -> Vec<(GroupKey, u64)> {
        self.items = items;
        let revisions = self.bump(groups);
        self.emit(&StoreEvent::Reordered {
            groups: groups.to_vec(),
        });
        revisions
    }

    pub(crate) fn restore_items(&mut self, items: Vec<T>, groups: &[GroupKey]) {
        self.items = items;
        self.bump(groups);
        self.emit(&StoreEvent::RolledBack {
            groups: groups.to_vec(),
        });
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn Persistence<T> {
        &mut *self.backend
    }

    fn revert(&mut self, snapshot: Vec<T>, groups: &[GroupKey]) {
        warn!(kind = %T::KIND, "reverting optimistic change");
        self.restore_items(snapshot, groups);
    }

    fn fail(&self, context: &str, err: BoardError) -> BoardError {
        self.notify(Notice::error(err.code(), format!("{context}: {err}")));
        err
    }

    fn missing(id: &ItemId) -> BoardError {
        BoardError::ItemNotFound {
            kind: T::KIND,
            id: id.clone(),
        }
    }

    fn bump(&mut self, groups: &[GroupKey]) -> Vec<(GroupKey, u64)> {
        groups
            .iter()
            .map(|group| {
                let revision = self.revisions.entry(group.clone()).or_insert(0);
                *revision += 1;
                (group.clone(), *revision)
            })
            .collect()
    }

    fn emit(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}

fn distinct_groups<T: Orderable>(items: &[T]) -> Vec<GroupKey> {
    let mut groups: Vec<GroupKey> = Vec::new();
    for item in items {
        let group = item.group().cloned();
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskPatch;
    use crate::notify::NoticeLog;
    use crate::persist::{Call, MemoryBackend};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn task(id: &str, column: &str, position: u32) -> Task {
        let mut task = Task::new(id, ItemId::new(column), ItemId::new("pg-1"));
        task.id = ItemId::new(id);
        task.position = position;
        task
    }

    fn column_order(store: &TaskStore, column: &str) -> Vec<(String, u32)> {
        store
            .group(Some(&ItemId::new(column)))
            .into_iter()
            .map(|task| (task.id.to_string(), task.position))
            .collect()
    }

    fn loaded(rows: Vec<Task>) -> (TaskStore, crate::persist::FaultHandle, NoticeLog) {
        let backend = MemoryBackend::with_rows(rows);
        let faults = backend.faults();
        let log = NoticeLog::new();
        let mut store = Store::new(backend).with_notifier(log.clone());
        store
            .load(&Some(ItemId::new("pg-1")))
            .expect("load succeeds");
        faults.clear_calls();
        (store, faults, log)
    }

    #[test]
    fn create_at_top_shifts_siblings_then_inserts() {
        let (mut store, faults, _) = loaded(vec![task("a", "x", 0), task("b", "x", 1)]);
        let created = store
            .create(task("n", "x", 9), Placement::Top)
            .expect("create succeeds");

        assert_eq!(created.position, 0);
        assert_eq!(
            column_order(&store, "x"),
            vec![("n".into(), 0), ("a".into(), 1), ("b".into(), 2)]
        );
        let calls = faults.calls();
        assert!(matches!(&calls[0], Call::UpsertMany(rows) if rows.len() == 2));
        assert_eq!(calls[1], Call::Insert(ItemId::new("n")));
    }

    #[test]
    fn create_at_index_splices_and_reindexes() {
        let (mut store, faults, _) =
            loaded(vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)]);
        let created = store
            .create(task("n", "x", 0), Placement::At(1))
            .expect("create succeeds");

        assert_eq!(created.position, 1);
        assert_eq!(
            column_order(&store, "x"),
            vec![
                ("a".into(), 0),
                ("n".into(), 1),
                ("b".into(), 2),
                ("c".into(), 3),
            ]
        );
        let calls = faults.calls();
        assert!(matches!(&calls[0], Call::UpsertMany(rows) if rows.len() == 2));
        assert_eq!(calls[1], Call::Insert(ItemId::new("n")));
    }

    #[test]
    fn create_at_index_past_the_end_appends() {
        let (mut store, _, _) = loaded(vec![task("a", "x", 0), task("b", "x", 1)]);
        store
            .create(task("n", "x", 0), Placement::At(9))
            .expect("create succeeds");
        assert_eq!(
            column_order(&store, "x"),
            vec![("a".into(), 0), ("b".into(), 1), ("n".into(), 2)]
        );
    }

    #[test]
    fn failed_create_at_index_reverts_local_state() {
        let (mut store, faults, log) = loaded(vec![task("a", "x", 0), task("b", "x", 1)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        // Shift succeeds, insert fails.
        faults.fail_after(1);
        let err = store
            .create(task("n", "x", 0), Placement::At(1))
            .expect_err("insert fails");

        assert!(matches!(err, BoardError::Persist(_)));
        assert!(!store.contains(&ItemId::new("n")));
        assert_eq!(
            column_order(&store, "x"),
            vec![("a".into(), 0), ("b".into(), 1)]
        );
        assert_eq!(log.error_count(), 1);
        assert!(matches!(
            seen.borrow().last(),
            Some(StoreEvent::RolledBack { .. })
        ));
    }

    #[test]
    fn create_at_bottom_appends_after_max() {
        let (mut store, faults, _) = loaded(vec![task("a", "x", 0), task("b", "x", 3)]);
        let created = store
            .create(task("n", "x", 0), Placement::Bottom)
            .expect("create succeeds");

        assert_eq!(created.position, 4);
        assert_eq!(faults.calls(), vec![Call::Insert(ItemId::new("n"))]);
    }

    #[test]
    fn failed_insert_reverts_local_state() {
        let (mut store, faults, log) = loaded(vec![task("a", "x", 0)]);
        faults.fail_next(1);

        let err = store
            .create(task("n", "x", 0), Placement::Top)
            .expect_err("shift fails");
        assert!(matches!(err, BoardError::Persist(_)));
        assert_eq!(column_order(&store, "x"), vec![("a".into(), 0)]);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn failed_update_restores_previous_fields() {
        let (mut store, faults, _) = loaded(vec![task("a", "x", 0)]);
        faults.fail_next(1);

        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            description: None,
        };
        assert!(store.update(&ItemId::new("a"), &patch).is_err());
        assert_eq!(store.get(&ItemId::new("a")).expect("a").title, "a");

        store.update(&ItemId::new("a"), &patch).expect("update succeeds");
        assert_eq!(store.get(&ItemId::new("a")).expect("a").title, "renamed");
    }

    #[test]
    fn delete_leaves_gap_and_hard_deletes_tasks() {
        let (mut store, faults, _) =
            loaded(vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)]);
        store.delete(&ItemId::new("b")).expect("delete succeeds");

        assert_eq!(
            column_order(&store, "x"),
            vec![("a".into(), 0), ("c".into(), 2)]
        );
        assert_eq!(faults.calls(), vec![Call::Remove(ItemId::new("b"))]);
    }

    #[test]
    fn failed_delete_restores_item() {
        let (mut store, faults, _) = loaded(vec![task("a", "x", 0)]);
        faults.fail_next(1);
        assert!(store.delete(&ItemId::new("a")).is_err());
        assert!(store.contains(&ItemId::new("a")));
    }

    #[test]
    fn subscribers_see_events_until_unsubscribed() {
        let (mut store, _, _) = loaded(vec![task("a", "x", 0), task("b", "x", 1)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        store.reorder(&ItemId::new("a"), 1);
        assert!(store.unsubscribe(id));
        store.reorder(&ItemId::new("a"), 0);

        let seen = seen.borrow();
        assert_eq!(
            *seen,
            vec![StoreEvent::Reordered {
                groups: vec![Some(ItemId::new("x"))]
            }]
        );
    }

    #[test]
    fn revisions_bump_per_structural_change() {
        let (mut store, _, _) = loaded(vec![task("a", "x", 0), task("b", "x", 1)]);
        let group = Some(ItemId::new("x"));
        let start = store.revision(&group);

        store.reorder(&ItemId::new("a"), 1);
        assert_eq!(store.revision(&group), start + 1);
        assert_eq!(store.revision(&Some(ItemId::new("y"))), 0);
    }

    #[test]
    fn forget_group_drops_local_members() {
        let (mut store, faults, _) = loaded(vec![task("a", "x", 0), task("b", "y", 0)]);
        assert_eq!(store.forget_group(&Some(ItemId::new("x"))), 1);
        assert_eq!(store.len(), 1);
        assert!(faults.calls().is_empty());
    }

    #[test]
    fn reorder_missing_item_is_abandoned() {
        let (mut store, faults, log) = loaded(vec![task("a", "x", 0)]);
        let outcome = store.reorder(&ItemId::new("ghost"), 0);
        assert!(matches!(outcome, CommitOutcome::Abandoned(_)));
        assert!(faults.calls().is_empty());
        assert_eq!(log.error_count(), 1);
    }
}
