//! Optimistic commit and rollback of reorders.
//!
//! A commit has three steps:
//!
//! 1. [`Reconciler::begin`] snapshots the store, applies the plan locally and
//!    records the minimal diff plus the group revisions the change produced.
//! 2. [`Reconciler::dispatch`] sends the diff to the backend, either as one
//!    `upsert_many` or one row at a time.
//! 3. [`Reconciler::settle`] reports success, or rolls the change back.
//!
//! Between `begin` and `settle` the caller is free to run other commits
//! against the same store. A rollback is *fresh* when none of its groups
//! changed since `begin`; the patched rows are then restored exactly. A stale
//! rollback only reverts rows that still hold what this commit wrote, then
//! reindexes the affected groups. When a reverted row lands on the same
//! position as a row the newer change placed, the newer row goes first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{BoardError, ErrorCode};
use crate::model::{GroupKey, ItemId, Orderable, PositionPatch, group_label};
use crate::notify::Notice;
use crate::persist::PersistError;
use crate::position;
use crate::store::Store;

/// How a diff reaches the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// One `upsert_many` carrying every changed row.
    #[default]
    Batch,
    /// One single-row `upsert_many` per changed row, in order.
    PerRow,
}

/// A locally applied change waiting for its persistence result.
#[derive(Debug, Clone)]
pub struct PendingCommit<T> {
    snapshot: Vec<T>,
    rows: Vec<PositionPatch>,
    groups: Vec<GroupKey>,
    revisions: Vec<(GroupKey, u64)>,
    mode: PersistMode,
}

impl<T: Orderable> PendingCommit<T> {
    /// Rows whose group or position changed.
    #[must_use]
    pub fn rows(&self) -> &[PositionPatch] {
        &self.rows
    }

    #[must_use]
    pub fn groups(&self) -> &[GroupKey] {
        &self.groups
    }

    /// Revision of each affected group right after the local apply.
    #[must_use]
    pub fn revisions(&self) -> &[(GroupKey, u64)] {
        &self.revisions
    }

    #[must_use]
    pub const fn mode(&self) -> PersistMode {
        self.mode
    }

    fn original(&self, id: &ItemId) -> Option<&T> {
        self.snapshot.iter().find(|item| item.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Every patched row went back to its pre-commit group and position.
    Restored,
    /// Newer changes had landed; rows they touched were left alone.
    Merged { reverted: usize, skipped: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing to do; no persistence call was made.
    Unchanged,
    Committed { rows: usize },
    RolledBack {
        error: BoardError,
        rollback: RollbackOutcome,
    },
    /// The move could not be planned; state was never touched.
    Abandoned(BoardError),
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Error behind a rollback or an abandoned move.
    #[must_use]
    pub const fn error(&self) -> Option<&BoardError> {
        match self {
            Self::RolledBack { error, .. } | Self::Abandoned(error) => Some(error),
            Self::Unchanged | Self::Committed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciler {
    mode: PersistMode,
}

impl Reconciler {
    #[must_use]
    pub const fn new(mode: PersistMode) -> Self {
        Self { mode }
    }

    /// Apply `plan` to `store` and capture what is needed to undo it.
    ///
    /// Returns `None` when the plan changes no row.
    pub fn begin<T: Orderable>(
        &self,
        store: &mut Store<T>,
        plan: Vec<T>,
    ) -> Option<PendingCommit<T>> {
        let snapshot = store.items().to_vec();
        let rows = position::diff(&snapshot, &plan);
        if rows.is_empty() {
            return None;
        }
        let groups = affected_groups(&snapshot, &rows);
        let revisions = store.replace_items(plan, &groups);
        debug!(
            kind = %T::KIND,
            rows = rows.len(),
            groups = groups.len(),
            mode = ?self.mode,
            "applied reorder locally"
        );
        Some(PendingCommit {
            snapshot,
            rows,
            groups,
            revisions,
            mode: self.mode,
        })
    }

    /// Send the pending diff to the store's backend.
    ///
    /// In per-row mode a failure part way through re-writes the rows already
    /// sent with their snapshot values before returning the error.
    ///
    /// # Errors
    ///
    /// Returns the backend's error for the first write it refused.
    pub fn dispatch<T: Orderable>(
        &self,
        store: &mut Store<T>,
        pending: &PendingCommit<T>,
    ) -> Result<(), PersistError> {
        let backend = store.backend_mut();
        match pending.mode {
            PersistMode::Batch => backend.upsert_many(&pending.rows),
            PersistMode::PerRow => {
                for (sent, row) in pending.rows.iter().enumerate() {
                    if let Err(err) = backend.upsert_many(std::slice::from_ref(row)) {
                        warn!(
                            kind = %T::KIND,
                            item = %row.id,
                            written = sent,
                            error = %err,
                            "per-row persist failed, compensating"
                        );
                        for written in &pending.rows[..sent] {
                            let Some(original) = pending.original(&written.id) else {
                                continue;
                            };
                            let restore = PositionPatch::of(original);
                            if let Err(undo) =
                                backend.upsert_many(std::slice::from_ref(&restore))
                            {
                                error!(
                                    kind = %T::KIND,
                                    item = %written.id,
                                    error = %undo,
                                    "compensating write failed"
                                );
                            }
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }

    /// Finish a commit with the backend's verdict.
    pub fn settle<T: Orderable>(
        &self,
        store: &mut Store<T>,
        pending: PendingCommit<T>,
        result: Result<(), PersistError>,
    ) -> CommitOutcome {
        match result {
            Ok(()) => {
                let rows = pending.rows.len();
                info!(kind = %T::KIND, rows, "reorder persisted");
                store.notify(Notice::success(format!("{} order saved", T::KIND)));
                CommitOutcome::Committed { rows }
            }
            Err(err) => {
                let error = BoardError::from(err);
                let rollback = rollback(store, &pending);
                store.notify(Notice::error(
                    error.code(),
                    format!("Could not save {} order: {error}", T::KIND),
                ));
                if let RollbackOutcome::Merged { reverted, skipped } = rollback {
                    store.notify(Notice::error(
                        ErrorCode::StaleRollback,
                        format!(
                            "{} order was changed again before the failure; \
                             {reverted} reverted, {skipped} kept",
                            T::KIND
                        ),
                    ));
                }
                CommitOutcome::RolledBack { error, rollback }
            }
        }
    }

    /// `begin`, `dispatch` and `settle` in one call.
    pub fn commit<T: Orderable>(&self, store: &mut Store<T>, plan: Vec<T>) -> CommitOutcome {
        let Some(pending) = self.begin(store, plan) else {
            return CommitOutcome::Unchanged;
        };
        let result = self.dispatch(store, &pending);
        self.settle(store, pending, result)
    }
}

fn rollback<T: Orderable>(store: &mut Store<T>, pending: &PendingCommit<T>) -> RollbackOutcome {
    let fresh = pending
        .revisions
        .iter()
        .all(|(group, revision)| store.revision(group) == *revision);

    let mut items = store.items().to_vec();
    let mut reverted: HashSet<ItemId> = HashSet::new();
    let mut skipped = 0;
    for row in &pending.rows {
        let Some(original) = pending.original(&row.id) else {
            skipped += 1;
            continue;
        };
        let Some(item) = items.iter_mut().find(|item| item.id() == &row.id) else {
            skipped += 1;
            continue;
        };
        if !fresh && !row.matches(&*item) {
            skipped += 1;
            continue;
        }
        item.set_group(original.group().cloned());
        item.set_position(original.position());
        reverted.insert(row.id.clone());
    }

    if fresh {
        warn!(kind = %T::KIND, rows = reverted.len(), "rolled back reorder");
        store.restore_items(items, &pending.groups);
        return RollbackOutcome::Restored;
    }

    for group in &pending.groups {
        debug!(
            kind = %T::KIND,
            group = group_label(group.as_ref()),
            "reindexing after stale rollback"
        );
    }
    // Position ties go to rows the newer change placed.
    let merged = position::normalize_by(&items, &pending.groups, |item| {
        (item.position(), reverted.contains(item.id()))
    });
    let reverted = reverted.len();
    warn!(kind = %T::KIND, reverted, skipped, "stale rollback merged with newer changes");
    store.restore_items(merged, &pending.groups);
    RollbackOutcome::Merged { reverted, skipped }
}

/// Source and destination groups of every changed row, in first-seen order.
fn affected_groups<T: Orderable>(snapshot: &[T], rows: &[PositionPatch]) -> Vec<GroupKey> {
    let mut groups: Vec<GroupKey> = Vec::new();
    let mut push = |group: GroupKey| {
        if !groups.contains(&group) {
            groups.push(group);
        }
    };
    for row in rows {
        if let Some(before) = snapshot.iter().find(|item| item.id() == &row.id) {
            push(before.group().cloned());
        }
        push(row.group.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::notify::NoticeLog;
    use crate::persist::{Call, FaultHandle, MemoryBackend};

    fn key(raw: &str) -> GroupKey {
        Some(ItemId::new(raw))
    }

    fn task(id: &str, column: &str, position: u32) -> Task {
        let mut task = Task::new(id, ItemId::new(column), ItemId::new("pg-1"));
        task.id = ItemId::new(id);
        task.position = position;
        task
    }

    fn setup(rows: Vec<Task>, mode: PersistMode) -> (Store<Task>, FaultHandle, NoticeLog) {
        let backend = MemoryBackend::with_rows(rows);
        let faults = backend.faults();
        let log = NoticeLog::new();
        let mut store = Store::new(backend)
            .with_notifier(log.clone())
            .with_persist_mode(mode);
        store.load(&key("pg-1")).expect("load succeeds");
        faults.clear_calls();
        (store, faults, log)
    }

    fn order(store: &Store<Task>, column: &str) -> Vec<(String, u32)> {
        store
            .group(Some(&ItemId::new(column)))
            .into_iter()
            .map(|task| (task.id.to_string(), task.position))
            .collect()
    }

    fn pairs(raw: &[(&str, u32)]) -> Vec<(String, u32)> {
        raw.iter()
            .map(|(id, pos)| ((*id).to_string(), *pos))
            .collect()
    }

    #[test]
    fn batch_commit_sends_only_changed_rows() {
        let (mut store, faults, log) = setup(
            vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2), task("d", "x", 3)],
            PersistMode::Batch,
        );
        let outcome = store.move_items(&[ItemId::new("b")], &key("x"), 2);

        assert_eq!(outcome, CommitOutcome::Committed { rows: 2 });
        let upserts = faults.upserts();
        assert_eq!(upserts.len(), 1);
        let ids: Vec<&str> = upserts[0].iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(log.error_count(), 0);
    }

    #[test]
    fn unchanged_plan_makes_no_call() {
        let (mut store, faults, log) =
            setup(vec![task("a", "x", 0), task("b", "x", 1)], PersistMode::Batch);
        let outcome = store.move_items(&[ItemId::new("a")], &key("x"), 0);

        assert_eq!(outcome, CommitOutcome::Unchanged);
        assert!(faults.calls().is_empty());
        assert!(log.notices().is_empty());
    }

    #[test]
    fn failed_batch_restores_snapshot() {
        let (mut store, faults, log) = setup(
            vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)],
            PersistMode::Batch,
        );
        faults.fail_next(1);

        let outcome = store.move_items(&[ItemId::new("a")], &key("x"), 2);
        assert!(matches!(
            outcome,
            CommitOutcome::RolledBack {
                rollback: RollbackOutcome::Restored,
                ..
            }
        ));
        assert_eq!(order(&store, "x"), pairs(&[("a", 0), ("b", 1), ("c", 2)]));
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn per_row_failure_compensates_written_rows() {
        let (mut store, faults, _) = setup(
            vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)],
            PersistMode::PerRow,
        );
        faults.fail_after(1);

        let outcome = store.move_items(&[ItemId::new("a")], &key("x"), 2);
        assert!(matches!(outcome, CommitOutcome::RolledBack { .. }));

        let upserts = faults.upserts();
        // first row written, second rejected, first row restored
        assert_eq!(upserts.len(), 3);
        assert!(upserts.iter().all(|rows| rows.len() == 1));
        assert_eq!(upserts[2][0].id, upserts[0][0].id);
        assert_eq!(order(&store, "x"), pairs(&[("a", 0), ("b", 1), ("c", 2)]));
    }

    #[test]
    fn per_row_success_sends_one_call_per_row() {
        let (mut store, faults, _) = setup(
            vec![task("a", "x", 0), task("b", "y", 0)],
            PersistMode::PerRow,
        );
        let outcome = store.move_items(&[ItemId::new("a")], &key("y"), 0);

        assert_eq!(outcome, CommitOutcome::Committed { rows: 2 });
        assert_eq!(faults.upserts().len(), 2);
        assert!(faults.calls().iter().all(|call| matches!(call, Call::UpsertMany(_))));
    }

    #[test]
    fn stale_rollback_keeps_newer_changes() {
        let (mut store, faults, log) = setup(
            vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2), task("d", "y", 0)],
            PersistMode::Batch,
        );
        let reconciler = store.reconciler();

        // first commit: a to the end of x, left in flight
        let plan = store
            .plan_move(&[ItemId::new("a")], &key("x"), 2)
            .expect("plan")
            .expect("changes order");
        let first = reconciler.begin(&mut store, plan).expect("pending");

        // second commit lands: c moves to column y
        let plan = store
            .plan_move(&[ItemId::new("c")], &key("y"), 0)
            .expect("plan")
            .expect("changes order");
        assert!(reconciler.commit(&mut store, plan).is_committed());

        // first commit fails afterwards
        faults.fail_next(1);
        let result = reconciler.dispatch(&mut store, &first);
        let outcome = reconciler.settle(&mut store, first, result);

        let CommitOutcome::RolledBack { rollback, .. } = outcome else {
            panic!("expected rollback, got {outcome:?}");
        };
        assert_eq!(rollback, RollbackOutcome::Merged { reverted: 1, skipped: 2 });
        assert_eq!(order(&store, "x"), pairs(&[("a", 0), ("b", 1)]));
        assert_eq!(order(&store, "y"), pairs(&[("c", 0), ("d", 1)]));
        assert!(
            log.notices()
                .iter()
                .any(|notice| notice.code == Some(ErrorCode::StaleRollback))
        );
    }

    #[test]
    fn stale_rollback_ties_go_to_the_newer_placement() {
        let (mut store, _, _) = setup(
            vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)],
            PersistMode::Batch,
        );
        let reconciler = store.reconciler();

        // a to the end, then c to the top while the first is in flight
        let plan = store
            .plan_move(&[ItemId::new("a")], &key("x"), 2)
            .expect("plan")
            .expect("changes order");
        let first = reconciler.begin(&mut store, plan).expect("pending");
        let plan = store
            .plan_move(&[ItemId::new("c")], &key("x"), 0)
            .expect("plan")
            .expect("changes order");
        reconciler.begin(&mut store, plan).expect("pending");

        // a reverts to 0, where c now sits; c keeps the slot
        let unavailable = PersistError::Unavailable("timeout".to_string());
        let outcome = reconciler.settle(&mut store, first, Err(unavailable));
        assert!(matches!(
            outcome,
            CommitOutcome::RolledBack {
                rollback: RollbackOutcome::Merged {
                    reverted: 1,
                    skipped: 2
                },
                ..
            }
        ));
        assert_eq!(order(&store, "x"), pairs(&[("c", 0), ("a", 1), ("b", 2)]));
    }

    #[test]
    fn affected_groups_cover_source_and_destination() {
        let snapshot = vec![task("a", "x", 0), task("b", "y", 0)];
        let rows = vec![PositionPatch {
            id: ItemId::new("a"),
            group: key("y"),
            position: 1,
        }];
        assert_eq!(affected_groups(&snapshot, &rows), vec![key("x"), key("y")]);
    }
}
