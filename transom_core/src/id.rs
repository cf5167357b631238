//! Stable identifiers for managed objects and registered types.
//!
//! Both identifier spaces are allocated from monotonically increasing
//! counters and never reused, so an operation on a dead identifier is
//! detectable instead of aliasing a live one.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// =============================================================================
// Object Identifier
// =============================================================================

/// Identifier of a managed object in the object heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u64);

/// Counter for object ids. Starts at 1; 0 is reserved as "never allocated".
static NEXT_OBJ_ID: AtomicU64 = AtomicU64::new(1);

impl ObjId {
    /// Allocate the next object id.
    #[inline]
    pub fn allocate() -> Self {
        Self(NEXT_OBJ_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for diagnostics.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

// =============================================================================
// Type Identifier
// =============================================================================

/// Identifier of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

/// Counter for type ids.
static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

impl TypeId {
    /// Allocate the next type id.
    #[inline]
    pub fn allocate() -> Self {
        Self(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for diagnostics.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}
