use std::ops::{Deref, DerefMut};

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle of a [`Span`] inside a [`Spans`] arena.
    pub struct SpanKey;
}

/// Arena of all raw spans of a [`Heightfield`](crate::Heightfield).
///
/// Spans never move once inserted; columns reference them by [`SpanKey`], and
/// removal is O(1). The whole arena is discarded per tile rebuild.
#[derive(Debug, Clone, Default)]
pub struct Spans(SlotMap<SpanKey, Span>);

impl Spans {
    const DEFAULT_CAPACITY: usize = 1024;

    pub(crate) fn with_min_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(Self::DEFAULT_CAPACITY);
        Self(SlotMap::with_capacity_and_key(capacity))
    }
}

impl Deref for Spans {
    type Target = SlotMap<SpanKey, Span>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Spans {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Builder for [`Span`]s.
pub(crate) struct SpanBuilder {
    pub(crate) floor: u16,
    pub(crate) ceiling: u16,
    pub(crate) next: Option<SpanKey>,
}

impl SpanBuilder {
    pub(crate) fn build(self) -> Span {
        Span {
            floor: self.floor,
            ceiling: self.ceiling,
            next: self.next,
        }
    }
}

impl From<SpanBuilder> for Span {
    fn from(builder: SpanBuilder) -> Self {
        builder.build()
    }
}

/// One walkable vertical interval in a heightfield column.
///
/// Heights are voxel units measured from the bottom of the heightfield AABB.
/// Build with [`SpanBuilder`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Span {
    /// Height of the floor.
    floor: u16,
    /// Height of the ceiling above the floor.
    ceiling: u16,
    /// The key of the next-higher span in the column.
    next: Option<SpanKey>,
}

impl Span {
    /// Height of the floor in voxel units.
    #[inline]
    pub fn floor(&self) -> u16 {
        self.floor
    }

    #[inline]
    pub(crate) fn set_floor(&mut self, floor: u16) {
        self.floor = floor;
    }

    /// Height of the ceiling in voxel units.
    #[inline]
    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }

    #[inline]
    pub(crate) fn set_ceiling(&mut self, ceiling: u16) {
        self.ceiling = ceiling;
    }

    /// The key of the next-higher span in the column, if any.
    #[inline]
    pub fn next(&self) -> Option<SpanKey> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: impl Into<Option<SpanKey>>) {
        self.next = next.into();
    }
}
