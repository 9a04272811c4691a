//! Persistence contract and an in-memory backend with fault injection.
//!
//! Stores talk to their backing store only through [`Persistence`]. The
//! contract is synchronous; the reconciler models the in-flight window by
//! splitting a commit into `begin` and `settle`.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::error::ErrorCode;
use crate::model::{GroupKey, ItemId, Orderable, PositionPatch};

/// Failure reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// The backend refused the change.
    #[error("rejected by backend: {0}")]
    Rejected(String),
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// A referenced row does not exist.
    #[error("row not found: {0}")]
    NotFound(ItemId),
    /// Local storage failed (SQLite, filesystem).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl PersistError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected(_) => ErrorCode::PersistenceRejected,
            Self::Unavailable(_) => ErrorCode::PersistenceUnavailable,
            Self::NotFound(_) => ErrorCode::ItemNotFound,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    #[must_use]
    pub fn storage(err: &impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Backing store for one entity type.
pub trait Persistence<T: Orderable> {
    /// Every live row scoped to `owner`; `None` returns every live row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn fetch_all(&mut self, owner: &GroupKey) -> Result<Vec<T>, PersistError>;

    /// Store a new row and return its canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses or cannot store the row.
    fn insert(&mut self, item: &T) -> Result<T, PersistError>;

    /// # Errors
    ///
    /// Returns [`PersistError::NotFound`] if no row has `id`, or another
    /// error if the write fails.
    fn update_one(&mut self, id: &ItemId, patch: &T::Patch) -> Result<(), PersistError>;

    /// Write ordering fields for several rows in one round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if any row is missing or the write fails; no row is
    /// changed in that case.
    fn upsert_many(&mut self, rows: &[PositionPatch]) -> Result<(), PersistError>;

    /// Hard-delete a row.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::NotFound`] if no row has `id`, or another
    /// error if the delete fails.
    fn remove(&mut self, id: &ItemId) -> Result<(), PersistError>;
}

/// A call observed by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchAll(GroupKey),
    Insert(ItemId),
    UpdateOne(ItemId),
    UpsertMany(Vec<PositionPatch>),
    Remove(ItemId),
}

#[derive(Debug, Default)]
struct FaultPlan {
    fail_next: usize,
    fail_after: Option<usize>,
    fail_always: bool,
    calls: Vec<Call>,
}

/// Shared handle for arming failures and inspecting calls on a
/// [`MemoryBackend`] after it has been boxed into a store.
#[derive(Debug, Clone, Default)]
pub struct FaultHandle(Rc<RefCell<FaultPlan>>);

impl FaultHandle {
    /// Fail the next `count` calls, then recover.
    pub fn fail_next(&self, count: usize) {
        self.0.borrow_mut().fail_next = count;
    }

    /// Let `successes` calls through, then fail exactly one.
    pub fn fail_after(&self, successes: usize) {
        self.0.borrow_mut().fail_after = Some(successes);
    }

    pub fn fail_always(&self, enabled: bool) {
        self.0.borrow_mut().fail_always = enabled;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    /// Every `upsert_many` payload, in call order.
    #[must_use]
    pub fn upserts(&self) -> Vec<Vec<PositionPatch>> {
        self.0
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::UpsertMany(rows) => Some(rows.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.0.borrow_mut().calls.clear();
    }

    fn record(&self, call: Call) -> Result<(), PersistError> {
        let mut plan = self.0.borrow_mut();
        plan.calls.push(call);
        if plan.fail_always {
            return Err(PersistError::Unavailable("injected failure".to_string()));
        }
        if plan.fail_next > 0 {
            plan.fail_next -= 1;
            return Err(PersistError::Unavailable("injected failure".to_string()));
        }
        match plan.fail_after {
            Some(0) => {
                plan.fail_after = None;
                Err(PersistError::Unavailable("injected failure".to_string()))
            }
            Some(remaining) => {
                plan.fail_after = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// In-memory backend. Failed calls leave the rows untouched.
#[derive(Debug)]
pub struct MemoryBackend<T> {
    rows: Vec<T>,
    faults: FaultHandle,
}

impl<T: Orderable> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Orderable> MemoryBackend<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    #[must_use]
    pub fn with_rows(rows: Vec<T>) -> Self {
        Self {
            rows,
            faults: FaultHandle::default(),
        }
    }

    /// Handle that stays valid after the backend is moved into a store.
    #[must_use]
    pub fn faults(&self) -> FaultHandle {
        self.faults.clone()
    }

    #[must_use]
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    fn find_mut(&mut self, id: &ItemId) -> Result<&mut T, PersistError> {
        self.rows
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or_else(|| PersistError::NotFound(id.clone()))
    }
}

impl<T: Orderable> Persistence<T> for MemoryBackend<T> {
    fn fetch_all(&mut self, owner: &GroupKey) -> Result<Vec<T>, PersistError> {
        self.faults.record(Call::FetchAll(owner.clone()))?;
        Ok(self
            .rows
            .iter()
            .filter(|row| !row.is_deleted())
            .filter(|row| owner.is_none() || row.owner() == owner.as_ref())
            .cloned()
            .collect())
    }

    fn insert(&mut self, item: &T) -> Result<T, PersistError> {
        self.faults.record(Call::Insert(item.id().clone()))?;
        self.rows.push(item.clone());
        Ok(item.clone())
    }

    fn update_one(&mut self, id: &ItemId, patch: &T::Patch) -> Result<(), PersistError> {
        self.faults.record(Call::UpdateOne(id.clone()))?;
        self.find_mut(id)?.apply_patch(patch);
        Ok(())
    }

    fn upsert_many(&mut self, rows: &[PositionPatch]) -> Result<(), PersistError> {
        self.faults.record(Call::UpsertMany(rows.to_vec()))?;
        if let Some(missing) = rows
            .iter()
            .find(|patch| !self.rows.iter().any(|row| row.id() == &patch.id))
        {
            return Err(PersistError::NotFound(missing.id.clone()));
        }
        for patch in rows {
            let row = self.find_mut(&patch.id)?;
            row.set_group(patch.group.clone());
            row.set_position(patch.position);
        }
        trace!(rows = rows.len(), kind = %T::KIND, "memory upsert applied");
        Ok(())
    }

    fn remove(&mut self, id: &ItemId) -> Result<(), PersistError> {
        self.faults.record(Call::Remove(id.clone()))?;
        let before = self.rows.len();
        self.rows.retain(|row| row.id() != id);
        if self.rows.len() == before {
            return Err(PersistError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, PagePatch, Task};

    fn task(id: &str, column: &str, page: &str, position: u32) -> Task {
        let mut task = Task::new(id, ItemId::new(column), ItemId::new(page));
        task.id = ItemId::new(id);
        task.position = position;
        task
    }

    #[test]
    fn fetch_all_scopes_by_owner() {
        let mut backend = MemoryBackend::with_rows(vec![
            task("a", "x", "pg-1", 0),
            task("b", "y", "pg-2", 0),
        ]);
        let rows = backend
            .fetch_all(&Some(ItemId::new("pg-1")))
            .expect("fetch succeeds");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, ItemId::new("a"));
    }

    #[test]
    fn fetch_all_skips_soft_deleted_pages() {
        let mut page = Page::new("Gone", None);
        page.apply_patch(&PagePatch {
            title: None,
            deleted: Some(true),
        });
        let mut backend = MemoryBackend::with_rows(vec![page, Page::new("Kept", None)]);
        let rows = backend.fetch_all(&None).expect("fetch succeeds");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Kept");
    }

    #[test]
    fn upsert_many_is_atomic_on_missing_row() {
        let mut backend = MemoryBackend::with_rows(vec![task("a", "x", "pg-1", 0)]);
        let rows = vec![
            PositionPatch {
                id: ItemId::new("a"),
                group: Some(ItemId::new("y")),
                position: 3,
            },
            PositionPatch {
                id: ItemId::new("missing"),
                group: Some(ItemId::new("y")),
                position: 4,
            },
        ];
        let err = backend.upsert_many(&rows).expect_err("missing row fails");
        assert_eq!(err, PersistError::NotFound(ItemId::new("missing")));
        assert_eq!(backend.rows()[0].position, 0);
        assert_eq!(backend.rows()[0].column_id, ItemId::new("x"));
    }

    #[test]
    fn injected_failures_are_counted_down() {
        let mut backend: MemoryBackend<Task> = MemoryBackend::new();
        let faults = backend.faults();
        faults.fail_next(1);

        assert!(backend.upsert_many(&[]).is_err());
        assert!(backend.upsert_many(&[]).is_ok());
        assert_eq!(faults.upserts().len(), 2);
    }

    #[test]
    fn fail_after_lets_calls_through_first() {
        let mut backend: MemoryBackend<Task> = MemoryBackend::new();
        let faults = backend.faults();
        faults.fail_after(2);

        assert!(backend.upsert_many(&[]).is_ok());
        assert!(backend.upsert_many(&[]).is_ok());
        assert!(backend.upsert_many(&[]).is_err());
        assert!(backend.upsert_many(&[]).is_ok());
    }

    #[test]
    fn remove_reports_missing_rows() {
        let mut backend: MemoryBackend<Task> = MemoryBackend::new();
        assert_eq!(
            backend.remove(&ItemId::new("nope")),
            Err(PersistError::NotFound(ItemId::new("nope")))
        );
    }
}
