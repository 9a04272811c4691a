pub mod entity;
pub mod item;

pub use entity::{Column, ColumnPatch, Page, PagePatch, Task, TaskPatch};
pub use item::{EntityKind, GroupKey, ItemId, Orderable, PositionPatch, group_label};
