//! Pure position assignment for ordered sibling groups.
//!
//! Every function takes a snapshot of one entity type's full collection and
//! returns a new collection; nothing here touches a store or a backend.
//!
//! # Index coordinates
//!
//! Move targets are expressed as *final* indices: the index the moved block
//! occupies in the destination group once the moved items have been taken
//! out of it. Indices past the end clamp to an append.
//!
//! # Density
//!
//! Any group touched by an insert or move comes out with positions
//! `0..n-1`. Deletes leave gaps that the next structural change on that
//! group closes.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::ErrorCode;
use crate::model::{GroupKey, ItemId, Orderable, PositionPatch, group_label};

/// Reasons a position plan cannot be computed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("no items selected to move")]
    EmptySelection,
}

impl PositionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::EmptySelection => ErrorCode::InvalidTarget,
        }
    }
}

/// Members of `group` in display order: by position, ties by collection order.
#[must_use]
pub fn members<'a, T: Orderable>(items: &'a [T], group: Option<&ItemId>) -> Vec<&'a T> {
    let mut members: Vec<&T> = items.iter().filter(|item| item.group() == group).collect();
    members.sort_by_key(|item| item.position());
    members
}

/// Ids of `group`'s members in display order.
#[must_use]
pub fn ordered_ids<T: Orderable>(items: &[T], group: Option<&ItemId>) -> Vec<ItemId> {
    members(items, group)
        .into_iter()
        .map(|item| item.id().clone())
        .collect()
}

/// Group and display index of `id`, if present.
#[must_use]
pub fn locate<T: Orderable>(items: &[T], id: &ItemId) -> Option<(GroupKey, usize)> {
    let item = items.iter().find(|item| item.id() == id)?;
    let index = members(items, item.group())
        .iter()
        .position(|member| member.id() == id)?;
    Some((item.group().cloned(), index))
}

/// Whether `group`'s positions are exactly `0..n-1`.
#[must_use]
pub fn is_dense<T: Orderable>(items: &[T], group: Option<&ItemId>) -> bool {
    let mut positions: Vec<u32> = items
        .iter()
        .filter(|item| item.group() == group)
        .map(Orderable::position)
        .collect();
    positions.sort_unstable();
    (0u32..).zip(positions).all(|(expected, actual)| expected == actual)
}

/// Position for appending to `group`: one past the current maximum.
#[must_use]
pub fn next_append_position<T: Orderable>(items: &[T], group: Option<&ItemId>) -> u32 {
    items
        .iter()
        .filter(|item| item.group() == group)
        .map(|item| item.position().saturating_add(1))
        .max()
        .unwrap_or(0)
}

/// Splice `item` into its group at `index` and reindex the whole group.
#[must_use]
pub fn insert_at<T: Orderable>(items: &[T], item: T, index: usize) -> Vec<T> {
    let group = item.group().cloned();
    let mut order = ordered_ids(items, group.as_ref());
    let index = index.min(order.len());
    order.insert(index, item.id().clone());

    let mut all = items.to_vec();
    all.push(item);
    apply_orders(&all, &[(group, order)])
}

/// Put `item` at position 0 and shift every sibling down by one.
///
/// Equivalent to `insert_at(.., 0)` on a dense group, without reindexing.
pub fn insert_at_top<T: Orderable>(items: &[T], mut item: T) -> Vec<T> {
    let group = item.group().cloned();
    let mut all: Vec<T> = items
        .iter()
        .cloned()
        .map(|mut sibling| {
            if sibling.group() == group.as_ref() {
                sibling.set_position(sibling.position().saturating_add(1));
            }
            sibling
        })
        .collect();
    item.set_position(0);
    all.push(item);
    all
}

/// Move `id` to `new_index` inside its current group.
///
/// Returns `Ok(None)` when the item already sits at that index.
///
/// # Errors
///
/// Returns an error if `id` is not in `items`.
pub fn move_within<T: Orderable>(
    items: &[T],
    id: &ItemId,
    new_index: usize,
) -> Result<Option<Vec<T>>, PositionError> {
    let (group, _) =
        locate(items, id).ok_or_else(|| PositionError::ItemNotFound(id.clone()))?;
    move_many(items, std::slice::from_ref(id), &group, new_index)
}

/// Move `id` into `target` at `new_index`, reindexing source and destination.
///
/// # Errors
///
/// Returns an error if `id` is not in `items`.
pub fn move_across<T: Orderable>(
    items: &[T],
    id: &ItemId,
    target: &GroupKey,
    new_index: usize,
) -> Result<Option<Vec<T>>, PositionError> {
    move_many(items, std::slice::from_ref(id), target, new_index)
}

/// Move a block of items, in the given order, to `target` starting at `index`.
///
/// Each moved item leaves its source group (which is reindexed) and the
/// block lands consecutively in the destination. Duplicate ids are ignored
/// after their first occurrence. Returns `Ok(None)` when no group's order
/// would change.
///
/// # Errors
///
/// Returns an error if `ids` is empty or names an item not in `items`.
pub fn move_many<T: Orderable>(
    items: &[T],
    ids: &[ItemId],
    target: &GroupKey,
    index: usize,
) -> Result<Option<Vec<T>>, PositionError> {
    let mut seen: HashSet<&ItemId> = HashSet::with_capacity(ids.len());
    let moving: Vec<&ItemId> = ids.iter().filter(|id| seen.insert(*id)).collect();
    if moving.is_empty() {
        return Err(PositionError::EmptySelection);
    }

    let mut groups: Vec<GroupKey> = vec![target.clone()];
    for id in &moving {
        let item = items
            .iter()
            .find(|item| item.id() == *id)
            .ok_or_else(|| PositionError::ItemNotFound((*id).clone()))?;
        let group = item.group().cloned();
        if !groups.contains(&group) {
            groups.push(group);
        }
    }

    let mut changed = false;
    let mut orders = Vec::with_capacity(groups.len());
    for group in groups {
        let before = ordered_ids(items, group.as_ref());
        let mut after: Vec<ItemId> = before
            .iter()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        if group == *target {
            let at = index.min(after.len());
            after.splice(at..at, moving.iter().map(|id| (*id).clone()));
        }
        changed |= after != before;
        orders.push((group, after));
    }

    if !changed {
        debug!(
            target_group = group_label(target.as_ref()),
            index,
            count = moving.len(),
            "move leaves every group order unchanged"
        );
        return Ok(None);
    }

    Ok(Some(apply_orders(items, &orders)))
}

/// Remove `id` without renumbering its former siblings.
#[must_use]
pub fn remove<T: Orderable>(items: &[T], id: &ItemId) -> Option<(Vec<T>, T)> {
    let removed = items.iter().find(|item| item.id() == id)?.clone();
    let rest = items
        .iter()
        .filter(|item| item.id() != id)
        .cloned()
        .collect();
    Some((rest, removed))
}

/// Reindex each listed group to `0..n-1`, keeping display order.
#[must_use]
pub fn normalize<T: Orderable>(items: &[T], groups: &[GroupKey]) -> Vec<T> {
    let orders: Vec<(GroupKey, Vec<ItemId>)> = groups
        .iter()
        .map(|group| (group.clone(), ordered_ids(items, group.as_ref())))
        .collect();
    apply_orders(items, &orders)
}

/// Reindex each listed group to `0..n-1`, ordering members by `rank`.
///
/// Members with equal rank keep display order.
#[must_use]
pub fn normalize_by<T, K, F>(items: &[T], groups: &[GroupKey], rank: F) -> Vec<T>
where
    T: Orderable,
    K: Ord,
    F: Fn(&T) -> K,
{
    let orders: Vec<(GroupKey, Vec<ItemId>)> = groups
        .iter()
        .map(|group| {
            let mut members = members(items, group.as_ref());
            members.sort_by_key(|item| rank(item));
            let ids = members.into_iter().map(|item| item.id().clone()).collect();
            (group.clone(), ids)
        })
        .collect();
    apply_orders(items, &orders)
}

/// Rows whose group or position differ between `before` and `after`.
///
/// Items new in `after` are included; items only in `before` are not.
#[must_use]
pub fn diff<T: Orderable>(before: &[T], after: &[T]) -> Vec<PositionPatch> {
    let previous: HashMap<&ItemId, &T> = before.iter().map(|item| (item.id(), item)).collect();
    after
        .iter()
        .filter(|item| {
            previous.get(item.id()).is_none_or(|old| {
                old.group() != item.group() || old.position() != item.position()
            })
        })
        .map(|item| PositionPatch::of(item))
        .collect()
}

fn to_position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

fn apply_orders<T: Orderable>(items: &[T], orders: &[(GroupKey, Vec<ItemId>)]) -> Vec<T> {
    let mut placement: HashMap<&ItemId, (&GroupKey, u32)> = HashMap::new();
    for (group, ids) in orders {
        for (index, id) in ids.iter().enumerate() {
            placement.insert(id, (group, to_position(index)));
        }
    }

    items
        .iter()
        .cloned()
        .map(|mut item| {
            if let Some(&(group, position)) = placement.get(item.id()) {
                if item.group() != group.as_ref() {
                    item.set_group(group.clone());
                }
                item.set_position(position);
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;

    fn task(id: &str, column: &str, position: u32) -> Task {
        let mut task = Task::new(id, ItemId::new(column), ItemId::new("pg-1"));
        task.id = ItemId::new(id);
        task.position = position;
        task
    }

    fn layout(items: &[Task], column: &str) -> Vec<(String, u32)> {
        members(items, Some(&ItemId::new(column)))
            .into_iter()
            .map(|task| (task.id.to_string(), task.position))
            .collect()
    }

    fn key(raw: &str) -> GroupKey {
        Some(ItemId::new(raw))
    }

    #[test]
    fn move_within_reindexes_group() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)];
        let moved = move_within(&items, &ItemId::new("a"), 2)
            .expect("plan move")
            .expect("order changes");

        assert_eq!(
            layout(&moved, "x"),
            vec![("b".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
    }

    #[test]
    fn move_to_current_index_is_noop() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)];
        let planned = move_within(&items, &ItemId::new("b"), 1).expect("plan move");
        assert!(planned.is_none());
    }

    #[test]
    fn noop_detection_ignores_gaps() {
        let items = vec![task("a", "x", 0), task("c", "x", 2)];
        let planned = move_within(&items, &ItemId::new("c"), 1).expect("plan move");
        assert!(planned.is_none(), "same order must not rewrite gapped positions");
    }

    #[test]
    fn index_past_end_appends() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)];
        let moved = move_within(&items, &ItemId::new("a"), 99)
            .expect("plan move")
            .expect("order changes");
        assert_eq!(
            layout(&moved, "x"),
            vec![("b".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
    }

    #[test]
    fn move_across_reindexes_both_groups() {
        let items = vec![task("t", "x", 0), task("u", "x", 1), task("v", "y", 0)];
        let moved = move_across(&items, &ItemId::new("t"), &key("y"), 1)
            .expect("plan move")
            .expect("order changes");

        assert_eq!(layout(&moved, "x"), vec![("u".into(), 0)]);
        assert_eq!(layout(&moved, "y"), vec![("v".into(), 0), ("t".into(), 1)]);
        let t = moved.iter().find(|task| task.id.as_str() == "t").expect("t");
        assert_eq!(t.column_id, ItemId::new("y"));
    }

    #[test]
    fn move_many_keeps_selection_order() {
        let items = vec![
            task("q", "x", 0),
            task("p", "x", 1),
            task("r", "y", 0),
            task("s", "y", 1),
        ];
        let ids = [ItemId::new("p"), ItemId::new("q")];
        let moved = move_many(&items, &ids, &key("y"), 2)
            .expect("plan move")
            .expect("order changes");

        assert_eq!(
            layout(&moved, "y"),
            vec![
                ("r".into(), 0),
                ("s".into(), 1),
                ("p".into(), 2),
                ("q".into(), 3)
            ]
        );
        assert!(layout(&moved, "x").is_empty());
    }

    #[test]
    fn move_many_within_one_group_forms_block() {
        let items = vec![
            task("p", "x", 0),
            task("r", "x", 1),
            task("q", "x", 2),
            task("s", "x", 3),
        ];
        let ids = [ItemId::new("p"), ItemId::new("q")];
        let moved = move_many(&items, &ids, &key("x"), 2)
            .expect("plan move")
            .expect("order changes");

        assert_eq!(
            layout(&moved, "x"),
            vec![
                ("r".into(), 0),
                ("s".into(), 1),
                ("p".into(), 2),
                ("q".into(), 3)
            ]
        );
    }

    #[test]
    fn move_many_rejects_empty_and_missing() {
        let items = vec![task("a", "x", 0)];
        assert_eq!(
            move_many(&items, &[], &key("x"), 0),
            Err(PositionError::EmptySelection)
        );
        assert_eq!(
            move_many(&items, &[ItemId::new("zz")], &key("x"), 0),
            Err(PositionError::ItemNotFound(ItemId::new("zz")))
        );
    }

    #[test]
    fn insert_at_top_shifts_siblings_only() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "y", 0)];
        let inserted = insert_at_top(&items, task("n", "x", 7));

        assert_eq!(
            layout(&inserted, "x"),
            vec![("n".into(), 0), ("a".into(), 1), ("b".into(), 2)]
        );
        assert_eq!(layout(&inserted, "y"), vec![("c".into(), 0)]);
    }

    #[test]
    fn insert_at_reindexes_gapped_group() {
        let items = vec![task("a", "x", 0), task("b", "x", 4)];
        let inserted = insert_at(&items, task("n", "x", 0), 1);

        assert_eq!(
            layout(&inserted, "x"),
            vec![("a".into(), 0), ("n".into(), 1), ("b".into(), 2)]
        );
        assert!(is_dense(&inserted, Some(&ItemId::new("x"))));
    }

    #[test]
    fn remove_leaves_gap_until_next_move() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 2)];
        let (rest, removed) = remove(&items, &ItemId::new("b")).expect("b exists");
        assert_eq!(removed.id, ItemId::new("b"));
        assert!(!is_dense(&rest, Some(&ItemId::new("x"))));

        let moved = move_within(&rest, &ItemId::new("c"), 0)
            .expect("plan move")
            .expect("order changes");
        assert!(is_dense(&moved, Some(&ItemId::new("x"))));
    }

    #[test]
    fn diff_contains_only_changed_rows() {
        let before = vec![
            task("a", "x", 0),
            task("b", "x", 1),
            task("c", "x", 2),
            task("d", "x", 3),
        ];
        let after = move_within(&before, &ItemId::new("b"), 2)
            .expect("plan move")
            .expect("order changes");

        let rows = diff(&before, &after);
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn append_position_is_one_past_max() {
        let items = vec![task("a", "x", 0), task("b", "x", 5)];
        assert_eq!(next_append_position(&items, Some(&ItemId::new("x"))), 6);
        assert_eq!(next_append_position(&items, Some(&ItemId::new("y"))), 0);
    }

    #[test]
    fn locate_reports_display_index() {
        let items = vec![task("b", "x", 3), task("a", "x", 1)];
        assert_eq!(locate(&items, &ItemId::new("b")), Some((key("x"), 1)));
    }

    #[test]
    fn normalize_by_breaks_position_ties_with_rank() {
        let items = vec![task("a", "x", 0), task("b", "x", 1), task("c", "x", 0)];
        let plain = normalize(&items, &[key("x")]);
        assert_eq!(
            ordered_ids(&plain, Some(&ItemId::new("x")))[0],
            ItemId::new("a")
        );

        let ranked = normalize_by(&items, &[key("x")], |item| {
            (item.position, item.id.as_str() == "a")
        });
        assert_eq!(
            layout(&ranked, "x"),
            vec![("c".into(), 0), ("a".into(), 1), ("b".into(), 2)]
        );
    }
}
