//! The drag state machine: `Idle -> Active -> Idle`.
//!
//! A session never touches stored positions. It tracks what is being dragged
//! and the last resolved [`DropTarget`] (the drop indicator), and turns a
//! successful drop into a [`DropIntent`] for the board to commit.

use serde::Serialize;
use tracing::{debug, trace};

use crate::collision::{CollisionResolver, DragOrigin, DropTarget, Point, Region};
use crate::error::ErrorCode;
use crate::model::{EntityKind, GroupKey, ItemId, Orderable, group_label};
use crate::position;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    #[error("a drag is already in progress")]
    DragInProgress,
    #[error("dragged item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("drag started as {actual} but items are {expected}")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },
}

impl DragError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DragInProgress => ErrorCode::DragInProgress,
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::KindMismatch { .. } => ErrorCode::InvalidTarget,
        }
    }
}

/// Which targets a drag may resolve to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragScope {
    /// Any group of the dragged kind.
    #[default]
    Board,
    /// Only the group the drag started in (column reordering).
    SingleGroup,
}

/// Drag-start event from the pointer layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DragStart {
    pub kind: EntityKind,
    pub id: ItemId,
    pub pointer: Point,
}

/// An item captured at drag start, with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraggedItem {
    pub id: ItemId,
    pub group: GroupKey,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    pub kind: EntityKind,
    pub scope: DragScope,
    /// Items in the order they will land; the grabbed item is among them.
    pub items: Vec<DraggedItem>,
    /// The grabbed item.
    pub primary: DraggedItem,
    pub pointer: Point,
    /// Last resolved target, if any.
    pub indicator: Option<DropTarget>,
}

impl ActiveDrag {
    fn origin(&self) -> DragOrigin {
        DragOrigin {
            group: self.primary.group.clone(),
            index: self.primary.index,
            restrict_to_group: self.scope == DragScope::SingleGroup,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Active(ActiveDrag),
}

/// A completed drop, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropIntent {
    pub kind: EntityKind,
    pub items: Vec<DraggedItem>,
    pub target: DropTarget,
}

impl DropIntent {
    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    #[must_use]
    pub const fn is_multi(&self) -> bool {
        self.items.len() > 1
    }

    /// Target index once the dragged items are out of the destination group.
    #[must_use]
    pub fn final_index(&self) -> usize {
        self.target
            .final_index(self.items.iter().map(|item| (&item.group, item.index)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DragSession {
    state: DragState,
    resolver: CollisionResolver,
}

impl DragSession {
    #[must_use]
    pub const fn new(resolver: CollisionResolver) -> Self {
        Self {
            state: DragState::Idle,
            resolver,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &DragState {
        &self.state
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, DragState::Active(_))
    }

    /// Begin dragging `start.id` out of `items`.
    ///
    /// When the grabbed item is part of `selection`, every selected item of
    /// the same collection is captured in selection order. `selection` is
    /// only read.
    ///
    /// # Errors
    ///
    /// Returns an error if a drag is already active, `start.kind` is not the
    /// kind of `items`, or the grabbed item is not in `items`.
    pub fn start_drag<T: Orderable>(
        &mut self,
        start: DragStart,
        scope: DragScope,
        items: &[T],
        selection: &[ItemId],
    ) -> Result<&ActiveDrag, DragError> {
        if self.is_active() {
            return Err(DragError::DragInProgress);
        }
        if start.kind != T::KIND {
            return Err(DragError::KindMismatch {
                expected: T::KIND,
                actual: start.kind,
            });
        }
        let primary = capture(items, &start.id)
            .ok_or_else(|| DragError::ItemNotFound(start.id.clone()))?;

        let dragged: Vec<DraggedItem> = if selection.contains(&start.id) {
            let mut picked: Vec<DraggedItem> = Vec::with_capacity(selection.len());
            for id in selection {
                if picked.iter().any(|item| &item.id == id) {
                    continue;
                }
                let Some(item) = capture(items, id) else {
                    continue;
                };
                if scope == DragScope::SingleGroup && item.group != primary.group {
                    continue;
                }
                picked.push(item);
            }
            picked
        } else {
            vec![primary.clone()]
        };

        debug!(
            kind = %start.kind,
            item = %start.id,
            group = group_label(primary.group.as_ref()),
            count = dragged.len(),
            "drag started"
        );
        self.state = DragState::Active(ActiveDrag {
            kind: start.kind,
            scope,
            items: dragged,
            primary,
            pointer: start.pointer,
            indicator: None,
        });
        match &self.state {
            DragState::Active(active) => Ok(active),
            DragState::Idle => Err(DragError::ItemNotFound(start.id)),
        }
    }

    /// Re-resolve the drop indicator for a pointer move.
    ///
    /// Returns the new indicator; `None` when idle or over nothing.
    pub fn update_drag(&mut self, pointer: Point, regions: &[Region]) -> Option<&DropTarget> {
        let DragState::Active(active) = &mut self.state else {
            return None;
        };
        active.pointer = pointer;
        active.indicator = self.resolver.resolve(pointer, regions, &active.origin());
        trace!(x = pointer.x, y = pointer.y, target = ?active.indicator, "drag over");
        active.indicator.as_ref()
    }

    /// Finish the drag at the last indicator.
    ///
    /// Returns `None` (a cancel) when the drag had no valid target.
    pub fn end_drag(&mut self) -> Option<DropIntent> {
        let DragState::Active(active) = std::mem::take(&mut self.state) else {
            return None;
        };
        let Some(target) = active.indicator else {
            debug!(kind = %active.kind, item = %active.primary.id, "drag ended over nothing");
            return None;
        };
        debug!(
            kind = %active.kind,
            item = %active.primary.id,
            group = group_label(target.group.as_ref()),
            slot = target.index,
            "drag dropped"
        );
        Some(DropIntent {
            kind: active.kind,
            items: active.items,
            target,
        })
    }

    /// Abort the drag without producing an intent.
    pub fn cancel_drag(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = DragState::Idle;
        was_active
    }

    #[must_use]
    pub const fn drop_indicator(&self) -> Option<&DropTarget> {
        match &self.state {
            DragState::Active(active) => active.indicator.as_ref(),
            DragState::Idle => None,
        }
    }
}

fn capture<T: Orderable>(items: &[T], id: &ItemId) -> Option<DraggedItem> {
    let (group, index) = position::locate(items, id)?;
    Some(DraggedItem {
        id: id.clone(),
        group,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Rect;
    use crate::model::{Column, Task};

    fn key(raw: &str) -> GroupKey {
        Some(ItemId::new(raw))
    }

    fn task(id: &str, column: &str, position: u32) -> Task {
        let mut task = Task::new(id, ItemId::new(column), ItemId::new("pg-1"));
        task.id = ItemId::new(id);
        task.position = position;
        task
    }

    fn tasks() -> Vec<Task> {
        vec![
            task("p", "x", 0),
            task("r", "x", 1),
            task("q", "x", 2),
            task("s", "y", 0),
        ]
    }

    fn regions() -> Vec<Region> {
        vec![
            Region::group(key("x"), 3, Rect::new(0.0, 0.0, 200.0, 400.0)),
            Region::item("p", key("x"), 0, Rect::new(10.0, 10.0, 180.0, 40.0)),
            Region::item("r", key("x"), 1, Rect::new(10.0, 60.0, 180.0, 40.0)),
            Region::item("q", key("x"), 2, Rect::new(10.0, 110.0, 180.0, 40.0)),
            Region::group(key("y"), 1, Rect::new(220.0, 0.0, 200.0, 400.0)),
            Region::item("s", key("y"), 0, Rect::new(230.0, 10.0, 180.0, 40.0)),
        ]
    }

    fn start(id: &str) -> DragStart {
        DragStart {
            kind: EntityKind::Task,
            id: ItemId::new(id),
            pointer: Point::new(0.0, 0.0),
        }
    }

    #[test]
    fn drop_uses_last_indicator() {
        let mut session = DragSession::default();
        session
            .start_drag(start("p"), DragScope::Board, &tasks(), &[])
            .expect("drag starts");

        session.update_drag(Point::new(50.0, 70.0), &regions());
        let last = session
            .update_drag(Point::new(300.0, 20.0), &regions())
            .cloned()
            .expect("over s");
        assert_eq!(last.group, key("y"));

        let intent = session.end_drag().expect("dropped");
        assert_eq!(intent.target, last);
        assert_eq!(intent.final_index(), 0);
        assert!(!session.is_active());
    }

    #[test]
    fn selection_is_captured_in_selection_order() {
        let mut session = DragSession::default();
        let selection = [ItemId::new("q"), ItemId::new("p")];
        let active = session
            .start_drag(start("p"), DragScope::Board, &tasks(), &selection)
            .expect("drag starts");

        let ids: Vec<&str> = active.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["q", "p"]);
        assert_eq!(active.primary.id, ItemId::new("p"));
    }

    #[test]
    fn unselected_item_drags_alone() {
        let mut session = DragSession::default();
        let selection = [ItemId::new("q"), ItemId::new("s")];
        let active = session
            .start_drag(start("p"), DragScope::Board, &tasks(), &selection)
            .expect("drag starts");
        assert_eq!(active.items.len(), 1);
    }

    #[test]
    fn multi_drag_final_index_discounts_every_origin() {
        let mut session = DragSession::default();
        let selection = [ItemId::new("p"), ItemId::new("q")];
        session
            .start_drag(start("p"), DragScope::Board, &tasks(), &selection)
            .expect("drag starts");
        session.update_drag(Point::new(50.0, 125.0), &regions());

        let intent = session.end_drag().expect("dropped");
        assert!(intent.is_multi());
        assert_eq!(intent.target.index, 3);
        assert_eq!(intent.final_index(), 1);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut session = DragSession::default();
        session
            .start_drag(start("p"), DragScope::Board, &tasks(), &[])
            .expect("drag starts");
        let err = session
            .start_drag(start("q"), DragScope::Board, &tasks(), &[])
            .expect_err("already dragging");
        assert_eq!(err, DragError::DragInProgress);
        assert_eq!(err.code(), ErrorCode::DragInProgress);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut session = DragSession::default();
        let columns: Vec<Column> = Vec::new();
        let err = session
            .start_drag(start("p"), DragScope::SingleGroup, &columns, &[])
            .expect_err("kind mismatch");
        assert!(matches!(err, DragError::KindMismatch { .. }));
        assert!(!session.is_active());
    }

    #[test]
    fn drop_over_nothing_cancels() {
        let mut session = DragSession::new(CollisionResolver::new(Some(10.0)));
        session
            .start_drag(start("p"), DragScope::Board, &tasks(), &[])
            .expect("drag starts");
        assert!(session.update_drag(Point::new(900.0, 900.0), &regions()).is_none());
        assert!(session.end_drag().is_none());
        assert_eq!(session.state(), &DragState::Idle);
    }

    #[test]
    fn cancel_discards_indicator() {
        let mut session = DragSession::default();
        session
            .start_drag(start("p"), DragScope::Board, &tasks(), &[])
            .expect("drag starts");
        session.update_drag(Point::new(50.0, 70.0), &regions());
        assert!(session.drop_indicator().is_some());

        assert!(session.cancel_drag());
        assert!(session.drop_indicator().is_none());
        assert!(session.end_drag().is_none());
    }

    #[test]
    fn single_group_scope_stays_in_source_group() {
        let mut session = DragSession::default();
        session
            .start_drag(start("p"), DragScope::SingleGroup, &tasks(), &[])
            .expect("drag starts");
        let target = session
            .update_drag(Point::new(300.0, 20.0), &regions())
            .expect("nearest region in x");
        assert_eq!(target.group, key("x"));
    }

    #[test]
    fn hovering_own_row_is_a_no_op_slot() {
        let mut session = DragSession::default();
        session
            .start_drag(start("r"), DragScope::Board, &tasks(), &[])
            .expect("drag starts");
        session.update_drag(Point::new(50.0, 70.0), &regions());
        let intent = session.end_drag().expect("dropped");
        assert_eq!(intent.final_index(), 1);
    }
}
