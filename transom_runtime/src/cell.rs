//! The reference cell: object header and field slot storage.
//!
//! Every managed object is an [`ObjectCell`]: an atomic reference count, the
//! id of its registered type, and a fixed array of field slots sized by the
//! type's field list. Slots are the internal, shareable representation of
//! field contents; an `Obj` slot owns exactly one count on its referent,
//! released when the slot is overwritten or the cell is torn down.

use crate::handle::ObjRef;
use crate::value::Value;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use transom_core::{ObjId, TypeId, ValueKind};

// =============================================================================
// Field Slots
// =============================================================================

/// Internal representation of one field slot.
///
/// Unlike [`Value`], a `Slot` carries a raw object id rather than a handle,
/// so cells can live in process-wide storage. The count behind an `Obj`
/// slot belongs to the slot; conversions to and from `Value` move or mint
/// counts explicitly at the access boundary. Not `Clone`: duplicating an
/// `Obj` slot would duplicate count ownership without retaining.
#[derive(Debug, PartialEq)]
pub(crate) enum Slot {
    /// Never written. Reading is an `AttributeAccess` failure.
    Empty,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(Arc<str>),
    /// Owns one count on the referent.
    Obj(ObjId),
}

impl Slot {
    /// The kind stored in this slot, or `None` when empty.
    pub(crate) fn kind(&self) -> Option<ValueKind> {
        match self {
            Slot::Empty => None,
            Slot::Bool(_) => Some(ValueKind::Bool),
            Slot::Int(_) => Some(ValueKind::Int),
            Slot::Uint(_) => Some(ValueKind::Uint),
            Slot::Float(_) => Some(ValueKind::Float),
            Slot::Str(_) => Some(ValueKind::Str),
            Slot::Obj(_) => Some(ValueKind::Object),
        }
    }

    /// The owned object id, for object slots.
    pub(crate) fn obj_id(&self) -> Option<ObjId> {
        match self {
            Slot::Obj(id) => Some(*id),
            _ => None,
        }
    }

    /// Convert a value into a slot, moving ownership of any object count
    /// from the value's handle into the slot.
    pub(crate) fn adopt(value: Value) -> Slot {
        match value {
            Value::None => Slot::Empty,
            Value::Bool(b) => Slot::Bool(b),
            Value::Int(i) => Slot::Int(i),
            Value::Uint(u) => Slot::Uint(u),
            Value::Float(f) => Slot::Float(f),
            Value::Str(s) => Slot::Str(s),
            Value::Object(obj) => Slot::Obj(obj.into_raw()),
        }
    }

    /// Convert this slot into a value, moving ownership of any object count
    /// out of the slot. The slot is left `Empty`.
    pub(crate) fn extract(&mut self) -> Value {
        match std::mem::replace(self, Slot::Empty) {
            Slot::Empty => Value::None,
            Slot::Bool(b) => Value::Bool(b),
            Slot::Int(i) => Value::Int(i),
            Slot::Uint(u) => Value::Uint(u),
            Slot::Float(f) => Value::Float(f),
            Slot::Str(s) => Value::Str(s),
            Slot::Obj(id) => Value::Object(ObjRef::from_raw(id)),
        }
    }
}

// =============================================================================
// Object Cell
// =============================================================================

/// A managed object: reference count, type, and field payload.
///
/// The count is atomic so the heap's globals are shareable, but all count
/// transitions are ordered by the execution lock gate; the atomics carry no
/// ordering duty of their own.
#[derive(Debug)]
pub struct ObjectCell {
    /// Reference count. The object is live exactly while this is above zero
    /// and the cell is linked into the heap.
    refcount: AtomicU32,
    /// The registered type of this object.
    type_id: TypeId,
    /// Field payload, one slot per declared field, all `Empty` at birth.
    fields: Mutex<Box<[Slot]>>,
}

impl ObjectCell {
    /// Create a cell with a zero-initialized payload and a count of one,
    /// owned by the creator.
    pub(crate) fn new(type_id: TypeId, field_count: usize) -> Self {
        Self {
            refcount: AtomicU32::new(1),
            type_id,
            fields: Mutex::new((0..field_count).map(|_| Slot::Empty).collect()),
        }
    }

    /// Current reference count.
    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }

    /// The object's type id.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Increment the count. Returns the new count.
    #[inline]
    pub(crate) fn retain_count(&self) -> u32 {
        self.refcount.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the count without ever passing below zero.
    ///
    /// Returns `Some(new_count)`, or `None` when the count was already zero
    /// (a contract violation the caller reports).
    pub(crate) fn release_count(&self) -> Option<u32> {
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return None;
            }
            match self.refcount.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current - 1),
                Err(observed) => current = observed,
            }
        }
    }

    /// Lock the field payload.
    pub(crate) fn lock_fields(&self) -> MutexGuard<'_, Box<[Slot]>> {
        self.fields.lock()
    }

    /// Take the whole payload out, leaving the cell empty. Used by the
    /// destruction path after the cell is unlinked.
    pub(crate) fn take_fields(&self) -> Box<[Slot]> {
        std::mem::take(&mut *self.fields.lock())
    }
}

// =============================================================================
// Field Table
// =============================================================================

/// The payload of a dying object, handed to its drop hook.
///
/// The hook takes ownership of whatever it wants to release or salvage;
/// anything left behind is released by the destruction path afterwards, so
/// a hook cannot leak an owned field reference by ignoring it.
#[derive(Debug)]
pub struct FieldTable {
    slots: Box<[Slot]>,
}

impl FieldTable {
    pub(crate) fn new(slots: Box<[Slot]>) -> Self {
        Self { slots }
    }

    /// Number of field slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Take the value out of slot `index`, transferring ownership of any
    /// object count to the returned value. `None` for an out-of-range index
    /// or an already-empty slot.
    pub fn take(&mut self, index: usize) -> Option<Value> {
        let slot = self.slots.get_mut(index)?;
        if matches!(slot, Slot::Empty) {
            return None;
        }
        Some(slot.extract())
    }

    /// Ids still owned by untaken object slots.
    pub(crate) fn remaining_object_ids(&mut self) -> Vec<ObjId> {
        let mut ids = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Slot::Obj(id) = slot {
                ids.push(*id);
                *slot = Slot::Empty;
            }
        }
        ids
    }
}
