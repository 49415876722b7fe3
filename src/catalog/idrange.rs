//! The preset/user identifier namespace split.
//!
//! Identifiers below [`USER_ID_BASE`] belong to vendor presets; identifiers at
//! or above it belong to the user. The partition rule lives here so no call
//! site re-implements the boundary.

use std::collections::BTreeSet;

pub const USER_ID_BASE: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRange {
    Preset,
    User,
}

impl IdRange {
    pub fn of(id: u64) -> Self {
        if id >= USER_ID_BASE {
            Self::User
        } else {
            Self::Preset
        }
    }

    pub fn contains(self, id: u64) -> bool {
        Self::of(id) == self
    }

    fn floor(self) -> u64 {
        match self {
            Self::Preset => 1,
            Self::User => USER_ID_BASE,
        }
    }

    /// Next free id in this range: one past the largest applicable id, with
    /// the range floor as the starting point. User-range ids never cap the
    /// preset allocation.
    pub fn next_free<I>(self, ids: I) -> u64
    where
        I: IntoIterator<Item = u64>,
    {
        let mut max = self.floor();
        for id in ids {
            if self == Self::Preset && id >= USER_ID_BASE {
                continue;
            }
            max = max.max(id);
        }
        max + 1
    }
}

/// Relocates a preset-range id into the user range.
pub fn promote(id: u64) -> u64 {
    id + USER_ID_BASE
}

/// Hands out fresh sensor-group ids during a merge, remembering every id it
/// has seen or allocated so two allocations can never collide.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: BTreeSet<u64>,
}

impl IdAllocator {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        Self {
            used: ids.into_iter().collect(),
        }
    }

    pub fn mark(&mut self, id: u64) {
        self.used.insert(id);
    }

    pub fn allocate(&mut self, range: IdRange) -> u64 {
        let id = range.next_free(self.used.iter().copied());
        self.used.insert(id);
        id
    }
}
