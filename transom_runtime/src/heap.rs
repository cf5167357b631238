//! Process-wide object heap.
//!
//! The heap owns every live [`ObjectCell`], keyed by object id. Ids are
//! allocated monotonically and never reused, so an operation on a dead id
//! is observed and reported instead of aliasing a newer object.
//!
//! # Counting discipline
//!
//! [`retain`](ObjectHeap::retain) and [`release`](ObjectHeap::release) are
//! the count-mutation primitives; everything else in the crate goes through
//! the owning handle type, which calls them from `Clone` and `Drop`. When a
//! release drives the count to zero the cell is first unlinked from the
//! heap and only then torn down, so teardown runs exactly once even when
//! the drop hook reentrantly releases other references to the same object
//! graph.
//!
//! # Locking
//!
//! The map lock is internal plumbing that makes the global shareable; it is
//! never held while a drop hook runs, and object-state ordering comes from
//! the execution lock gate, not from here.

use crate::cell::{FieldTable, ObjectCell};
use crate::typedesc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use transom_core::{ErrorKind, ObjId, RunResult, TypeId, raise};

// =============================================================================
// Object Heap
// =============================================================================

/// Store of all live managed objects.
pub struct ObjectHeap {
    /// Live cells by id.
    objects: RwLock<FxHashMap<ObjId, Arc<ObjectCell>>>,
    /// Optional cap on the number of live objects. Exceeding it is the
    /// out-of-memory analog: `AllocationFailure`.
    capacity: RwLock<Option<usize>>,
}

impl ObjectHeap {
    /// Create an empty heap with no capacity limit.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(FxHashMap::default()),
            capacity: RwLock::new(None),
        }
    }

    /// Set or clear the live-object capacity limit.
    pub fn set_capacity(&self, limit: Option<usize>) {
        *self.capacity.write() = limit;
    }

    /// Allocate a new object with a zero-initialized payload.
    ///
    /// The returned id carries a count of one owned by the caller
    /// (a new reference in raw form; wrap it or release it).
    pub fn create(&self, type_id: TypeId, field_count: usize) -> RunResult<ObjId> {
        let mut objects = self.objects.write();
        if let Some(limit) = *self.capacity.read() {
            if objects.len() >= limit {
                drop(objects);
                return raise(
                    ErrorKind::AllocationFailure,
                    format!("object heap capacity of {limit} exhausted"),
                );
            }
        }
        let id = ObjId::allocate();
        objects.insert(id, Arc::new(ObjectCell::new(type_id, field_count)));
        log::trace!("created {id} ({type_id}, {field_count} fields)");
        Ok(id)
    }

    /// Increment the count of a live object.
    ///
    /// Returns `false` (and logs) if the id is dead; a dead retain is a
    /// caller bug, never an aliasing hazard, because ids are not reused.
    pub fn retain(&self, id: ObjId) -> bool {
        match self.objects.read().get(&id) {
            Some(cell) => {
                cell.retain_count();
                true
            }
            None => {
                log::error!("retain on dead {id}");
                false
            }
        }
    }

    /// Decrement the count of a live object, tearing it down at zero.
    ///
    /// Must be called exactly once per owned count. A release on a dead id
    /// is a logged no-op; the count itself can never underflow.
    pub fn release(&self, id: ObjId) {
        let cell = match self.objects.read().get(&id) {
            Some(cell) => Arc::clone(cell),
            None => {
                log::error!("release on dead {id}");
                return;
            }
        };
        match cell.release_count() {
            Some(0) => self.destroy(id),
            Some(_) => {}
            None => log::error!("release on {id} with zero count"),
        }
    }

    /// Null-tolerant release.
    #[inline]
    pub fn release_optional(&self, id: Option<ObjId>) {
        if let Some(id) = id {
            self.release(id);
        }
    }

    /// Unlink a dead cell and run its type's teardown.
    fn destroy(&self, id: ObjId) {
        let cell = match self.objects.write().remove(&id) {
            Some(cell) => cell,
            // Already unlinked by a racing release; teardown ran there.
            None => return,
        };
        log::trace!("destroying {id} ({})", cell.type_id());

        // The cell is unlinked before any hook runs: a reentrant release of
        // this id from inside the hook finds a dead id and cannot re-enter
        // teardown.
        let mut table = FieldTable::new(cell.take_fields());
        if let Some(drop_hook) = typedesc::registry()
            .get(cell.type_id())
            .and_then(|ty| ty.drop_hook())
        {
            drop_hook(&mut table);
        }
        // Whatever the hook left behind still owns counts; release them so
        // a partial hook cannot leak the object graph.
        for owned in table.remaining_object_ids() {
            self.release(owned);
        }
    }

    /// Look up a live cell.
    #[inline]
    pub fn get(&self, id: ObjId) -> Option<Arc<ObjectCell>> {
        self.objects.read().get(&id).cloned()
    }

    /// Whether the id refers to a live object.
    #[inline]
    pub fn is_live(&self, id: ObjId) -> bool {
        self.objects.read().contains_key(&id)
    }

    /// Current count of a live object.
    pub fn refcount(&self, id: ObjId) -> Option<u32> {
        self.objects.read().get(&id).map(|cell| cell.refcount())
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.objects.read().len()
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global Heap Access
// =============================================================================

/// Global object heap singleton. Handles are bound to this heap.
static GLOBAL_HEAP: OnceLock<ObjectHeap> = OnceLock::new();

/// Get the global object heap.
pub fn global_heap() -> &'static ObjectHeap {
    GLOBAL_HEAP.get_or_init(ObjectHeap::new)
}

// =============================================================================
// Tests
// =============================================================================
