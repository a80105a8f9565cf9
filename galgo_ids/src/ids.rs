//! Actor identifiers. Ids are handed out by the scene registry in strictly
//! increasing order and are never reused, so an `ActorId` held across a
//! destroy-and-commit cycle stays safe: a stale id simply fails lookup.

use std::fmt;

/// Actor ID — allocated by the scene registry. Monotonic, never reused, 0 = nil.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl ActorId {
    #[inline]
    pub const fn nil() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out actor ids. The next id is always one past the highest ever seen,
/// so merging saved actors into a live scene can never produce a duplicate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActorIdAllocator {
    last: u64,
}

impl ActorIdAllocator {
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    #[inline]
    pub fn next(&mut self) -> ActorId {
        self.last += 1;
        ActorId(self.last)
    }

    /// Raise the counter past `id` if it is not already above it.
    #[inline]
    pub fn observe(&mut self, id: ActorId) {
        if id.0 > self.last {
            self.last = id.0;
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.last = 0;
    }

    #[inline]
    pub const fn last(&self) -> u64 {
        self.last
    }
}
