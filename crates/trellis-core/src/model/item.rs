use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters used for the random suffix of generated ids.
const ID_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix of generated ids.
const ID_SUFFIX_LEN: usize = 6;

/// Opaque identifier for a page, column or task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap an existing identifier without validation.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Generate a fresh `<prefix>-<suffix>` identifier for `kind`.
    #[must_use]
    pub fn generate(kind: EntityKind) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        Self(format!("{}-{suffix}", kind.id_prefix()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ItemId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Key of the sibling group an item belongs to.
///
/// `None` is the root page group. Columns and tasks always carry `Some`.
pub type GroupKey = Option<ItemId>;

/// Render a group key for logs and terminal output.
#[must_use]
pub fn group_label(group: Option<&ItemId>) -> &str {
    group.map_or("<root>", ItemId::as_str)
}

/// The three orderable entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Page,
    Column,
    Task,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Column => "column",
            Self::Task => "task",
        }
    }

    const fn id_prefix(self) -> &'static str {
        match self {
            Self::Page => "pg",
            Self::Column => "col",
            Self::Task => "tk",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape shared by every item that lives in an ordered sibling group.
///
/// Positions are zero-based and dense within a group after any reorder.
/// Soft deletes may leave gaps until the next structural change.
pub trait Orderable: Clone + fmt::Debug {
    /// Partial-update payload accepted by `update_one`.
    type Patch: Clone + fmt::Debug;

    const KIND: EntityKind;

    fn id(&self) -> &ItemId;

    /// Sibling group this item is ordered within.
    fn group(&self) -> Option<&ItemId>;

    /// Key used by `fetch_all` to scope loads. `None` means "not scoped".
    fn owner(&self) -> Option<&ItemId>;

    fn position(&self) -> u32;

    fn set_position(&mut self, position: u32);

    fn set_group(&mut self, group: GroupKey);

    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Patch that soft-deletes this kind, or `None` when deletes are hard.
    fn soft_delete_patch() -> Option<Self::Patch> {
        None
    }

    fn is_deleted(&self) -> bool {
        false
    }
}

/// One row of an `upsert_many` payload: the ordering fields of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPatch {
    pub id: ItemId,
    pub group: GroupKey,
    pub position: u32,
}

impl PositionPatch {
    /// Capture the current ordering fields of `item`.
    #[must_use]
    pub fn of<T: Orderable>(item: &T) -> Self {
        Self {
            id: item.id().clone(),
            group: item.group().cloned(),
            position: item.position(),
        }
    }

    /// Whether `item` currently holds exactly these ordering fields.
    #[must_use]
    pub fn matches<T: Orderable>(&self, item: &T) -> bool {
        item.id() == &self.id
            && item.group() == self.group.as_ref()
            && item.position() == self.position
    }
}
