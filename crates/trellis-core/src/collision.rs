//! Drop-target resolution from pointer geometry.
//!
//! Regions are plain rectangles registered by whatever UI layer renders the
//! board: one per item row and one per group container (including the
//! placeholder zone of an empty group). Resolution runs in two passes:
//!
//! 1. **Containment**: every region whose bounds contain the pointer is a
//!    candidate. Item regions beat group regions, so a pointer over a task
//!    row inside its column resolves to the row. Among items the smallest
//!    area wins, then registration order.
//! 2. **Fallback**: with no containing region, the region nearest to the
//!    pointer (point-to-rectangle distance) wins, optionally bounded by a
//!    maximum distance.
//!
//! The result is a [`DropTarget`] whose `index` is an insertion *slot* in the
//! group as currently laid out, with the dragged item still in place.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::{GroupKey, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn right(&self) -> f32 {
        self.x + self.width
    }

    #[must_use]
    pub const fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[must_use]
    pub const fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Edges are inclusive.
    #[must_use]
    pub const fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }

    /// Euclidean distance from `point` to the nearest point of the rectangle.
    #[must_use]
    pub fn distance_to(&self, point: Point) -> f32 {
        let dx = (self.x - point.x).max(point.x - self.right()).max(0.0);
        let dy = (self.y - point.y).max(point.y - self.bottom()).max(0.0);
        dx.hypot(dy)
    }
}

/// What a region stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Droppable {
    /// An item row at display `index` within `group`.
    Item {
        id: ItemId,
        group: GroupKey,
        index: usize,
    },
    /// A group container or its empty-group placeholder; `len` is its size.
    Group { key: GroupKey, len: usize },
}

impl Droppable {
    const fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    const fn group(&self) -> &GroupKey {
        match self {
            Self::Item { group, .. } => group,
            Self::Group { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub target: Droppable,
    pub rect: Rect,
}

impl Region {
    #[must_use]
    pub fn item(id: impl Into<ItemId>, group: GroupKey, index: usize, rect: Rect) -> Self {
        Self {
            target: Droppable::Item {
                id: id.into(),
                group,
                index,
            },
            rect,
        }
    }

    #[must_use]
    pub const fn group(key: GroupKey, len: usize, rect: Rect) -> Self {
        Self {
            target: Droppable::Group { key, len },
            rect,
        }
    }
}

/// Where a dragged item would land: a group and an insertion slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTarget {
    pub group: GroupKey,
    /// Insertion slot with the dragged items still in place.
    pub index: usize,
    /// The item row being hovered, when the target came from a row.
    pub over: Option<ItemId>,
}

impl DropTarget {
    /// Convert the slot into a final index once the dragged items are taken
    /// out of the destination group.
    ///
    /// `origins` are the `(group, index)` pairs of every dragged item.
    #[must_use]
    pub fn final_index<'a>(
        &self,
        origins: impl IntoIterator<Item = (&'a GroupKey, usize)>,
    ) -> usize {
        let before_slot = origins
            .into_iter()
            .filter(|(group, index)| **group == self.group && *index < self.index)
            .count();
        self.index.saturating_sub(before_slot)
    }
}

/// Where the drag started from; drives same-group slot adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragOrigin {
    pub group: GroupKey,
    pub index: usize,
    /// Ignore regions outside `group` (one-dimensional reorders).
    pub restrict_to_group: bool,
}

/// Resolves pointer positions against registered regions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionResolver {
    max_fallback_distance: Option<f32>,
}

impl CollisionResolver {
    #[must_use]
    pub const fn new(max_fallback_distance: Option<f32>) -> Self {
        Self {
            max_fallback_distance,
        }
    }

    /// The region the pointer is over, after tie-breaks and fallback.
    #[must_use]
    pub fn hit<'r>(
        &self,
        pointer: Point,
        regions: &'r [Region],
        origin: &DragOrigin,
    ) -> Option<&'r Region> {
        let eligible = regions.iter().enumerate().filter(|(_, region)| {
            !origin.restrict_to_group || *region.target.group() == origin.group
        });

        let contained = eligible
            .clone()
            .filter(|(_, region)| region.rect.contains(pointer))
            .min_by(|(a_idx, a), (b_idx, b)| {
                a.target
                    .is_group()
                    .cmp(&b.target.is_group())
                    .then_with(|| total(a.rect.area(), b.rect.area()))
                    .then_with(|| a_idx.cmp(b_idx))
            });
        if let Some((_, region)) = contained {
            return Some(region);
        }

        let (_, nearest) = eligible.min_by(|(a_idx, a), (b_idx, b)| {
            total(a.rect.distance_to(pointer), b.rect.distance_to(pointer))
                .then_with(|| a.target.is_group().cmp(&b.target.is_group()))
                .then_with(|| a_idx.cmp(b_idx))
        })?;

        match self.max_fallback_distance {
            Some(limit) if nearest.rect.distance_to(pointer) > limit => None,
            _ => Some(nearest),
        }
    }

    /// Resolve the pointer into a drop target.
    #[must_use]
    pub fn resolve(
        &self,
        pointer: Point,
        regions: &[Region],
        origin: &DragOrigin,
    ) -> Option<DropTarget> {
        let region = self.hit(pointer, regions, origin)?;
        let target = match &region.target {
            Droppable::Item { id, group, index } => {
                let slot = if *group == origin.group && origin.index < *index {
                    index + 1
                } else {
                    *index
                };
                DropTarget {
                    group: group.clone(),
                    index: slot,
                    over: Some(id.clone()),
                }
            }
            Droppable::Group { key, len } => DropTarget {
                group: key.clone(),
                index: *len,
                over: None,
            },
        };
        Some(target)
    }
}

fn total(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> GroupKey {
        Some(ItemId::new(raw))
    }

    fn origin(group: &str, index: usize) -> DragOrigin {
        DragOrigin {
            group: key(group),
            index,
            restrict_to_group: false,
        }
    }

    /// Two columns side by side; x has rows a, b, c; y is empty.
    fn board_regions() -> Vec<Region> {
        vec![
            Region::group(key("x"), 3, Rect::new(0.0, 0.0, 200.0, 400.0)),
            Region::item("a", key("x"), 0, Rect::new(10.0, 10.0, 180.0, 40.0)),
            Region::item("b", key("x"), 1, Rect::new(10.0, 60.0, 180.0, 40.0)),
            Region::item("c", key("x"), 2, Rect::new(10.0, 110.0, 180.0, 40.0)),
            Region::group(key("y"), 0, Rect::new(220.0, 0.0, 200.0, 400.0)),
        ]
    }

    #[test]
    fn rect_distance_is_zero_inside() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(Point::new(10.0, 10.0)));
        assert!(rect.distance_to(Point::new(5.0, 5.0)).abs() < f32::EPSILON);
        assert!((rect.distance_to(Point::new(13.0, 14.0)) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn task_row_beats_parent_column() {
        let resolver = CollisionResolver::default();
        let target = resolver
            .resolve(Point::new(50.0, 75.0), &board_regions(), &origin("y", 0))
            .expect("target");
        assert_eq!(target.over, Some(ItemId::new("b")));
        assert_eq!(target.group, key("x"));
        assert_eq!(target.index, 1);
    }

    #[test]
    fn slot_shifts_when_dragging_down_same_group() {
        let resolver = CollisionResolver::default();
        let target = resolver
            .resolve(Point::new(50.0, 125.0), &board_regions(), &origin("x", 0))
            .expect("target");
        assert_eq!(target.index, 3);
        assert_eq!(target.final_index([(&key("x"), 0)]), 2);
    }

    #[test]
    fn slot_unchanged_when_dragging_up_same_group() {
        let resolver = CollisionResolver::default();
        let target = resolver
            .resolve(Point::new(50.0, 20.0), &board_regions(), &origin("x", 2))
            .expect("target");
        assert_eq!(target.index, 0);
        assert_eq!(target.final_index([(&key("x"), 2)]), 0);
    }

    #[test]
    fn column_background_appends() {
        let resolver = CollisionResolver::default();
        let target = resolver
            .resolve(Point::new(100.0, 300.0), &board_regions(), &origin("y", 0))
            .expect("target");
        assert_eq!(target.group, key("x"));
        assert_eq!(target.index, 3);
        assert_eq!(target.over, None);
    }

    #[test]
    fn empty_column_zone_accepts_drop() {
        let resolver = CollisionResolver::default();
        let target = resolver
            .resolve(Point::new(300.0, 50.0), &board_regions(), &origin("x", 1))
            .expect("target");
        assert_eq!(target.group, key("y"));
        assert_eq!(target.index, 0);
    }

    #[test]
    fn gap_between_regions_falls_back_to_nearest() {
        let resolver = CollisionResolver::default();
        let regions = vec![
            Region::item("a", key("x"), 0, Rect::new(0.0, 0.0, 100.0, 40.0)),
            Region::item("b", key("x"), 1, Rect::new(0.0, 60.0, 100.0, 40.0)),
        ];
        let target = resolver
            .resolve(Point::new(50.0, 55.0), &regions, &origin("z", 0))
            .expect("target");
        assert_eq!(target.over, Some(ItemId::new("b")));
    }

    #[test]
    fn fallback_respects_max_distance() {
        let resolver = CollisionResolver::new(Some(20.0));
        let target = resolver.resolve(Point::new(900.0, 900.0), &board_regions(), &origin("x", 0));
        assert!(target.is_none());
    }

    #[test]
    fn restricted_origin_ignores_other_groups() {
        let resolver = CollisionResolver::default();
        let restricted = DragOrigin {
            group: key("x"),
            index: 0,
            restrict_to_group: true,
        };
        let target = resolver
            .resolve(Point::new(300.0, 50.0), &board_regions(), &restricted)
            .expect("falls back to a region in x");
        assert_eq!(target.group, key("x"));
    }

    #[test]
    fn no_regions_means_no_target() {
        let resolver = CollisionResolver::default();
        assert!(resolver.resolve(Point::new(0.0, 0.0), &[], &origin("x", 0)).is_none());
    }
}
