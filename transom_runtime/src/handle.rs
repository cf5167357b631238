//! Ownership-qualified object handles.
//!
//! The new-versus-borrowed discipline of the counting contract is carried
//! by two handle types instead of by convention:
//!
//! - [`ObjRef`] owns one count: `Clone` retains, `Drop` releases. Leaking
//!   or double-releasing a count is unrepresentable in safe code.
//! - [`BorrowedRef`] owns nothing and cannot outlive the call that supplied
//!   it; keeping the object longer requires [`BorrowedRef::upgrade`], which
//!   retains first.
//!
//! Neither handle is `Send` or `Sync`: a handle never leaves the execution
//! context that holds the gate, which is what lets the gate's released
//! windows statically exclude all object access.

use crate::heap::global_heap;
use std::marker::PhantomData;
use transom_core::{ErrorKind, ObjId, RunResult, TypeId, raise};

// =============================================================================
// Owning Handle
// =============================================================================

/// An owning reference to a managed object (a "new reference").
///
/// Bound to the global heap. Holding an `ObjRef` keeps the object alive;
/// dropping the last one tears it down.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ObjRef {
    id: ObjId,
    /// Pins the handle to its gate-held context.
    _not_send: PhantomData<*const ()>,
}

impl ObjRef {
    /// Adopt an existing count for `id`. The caller transfers ownership of
    /// exactly one count into the handle.
    pub(crate) fn from_raw(id: ObjId) -> Self {
        Self {
            id,
            _not_send: PhantomData,
        }
    }

    /// Surrender the handle's count to the caller without releasing it.
    pub(crate) fn into_raw(self) -> ObjId {
        let id = self.id;
        std::mem::forget(self);
        id
    }

    /// The object's id.
    #[inline]
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// The object's registered type id, if the object is still live.
    pub fn type_id(&self) -> Option<TypeId> {
        global_heap().get(self.id).map(|cell| cell.type_id())
    }

    /// Current reference count, for diagnostics and tests.
    pub fn refcount(&self) -> u32 {
        global_heap().refcount(self.id).unwrap_or(0)
    }

    /// A borrowed view of this handle.
    #[inline]
    pub fn borrow(&self) -> BorrowedRef<'_> {
        BorrowedRef {
            id: self.id,
            _life: PhantomData,
        }
    }
}

impl Clone for ObjRef {
    /// Cloning retains: both handles own a count afterwards.
    fn clone(&self) -> Self {
        global_heap().retain(self.id);
        Self::from_raw(self.id)
    }
}

impl Drop for ObjRef {
    /// Dropping releases the handle's count.
    fn drop(&mut self) {
        global_heap().release(self.id);
    }
}

// =============================================================================
// Borrowed Handle
// =============================================================================

/// A non-owning reference, valid only for the producing call's duration.
///
/// The marshaller hands these out for object-valued arguments without
/// touching the count. Retention past the call requires [`upgrade`], which
/// increments first; the lifetime parameter makes silent retention a
/// compile error rather than a use-after-free.
///
/// [`upgrade`]: BorrowedRef::upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowedRef<'a> {
    id: ObjId,
    _life: PhantomData<&'a ObjRef>,
}

impl<'a> BorrowedRef<'a> {
    /// The object's id.
    #[inline]
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// Retain the referent and return an owning handle.
    ///
    /// Fails with `AttributeAccess` if the referent has already been
    /// destroyed; a stale borrow is detected, never dereferenced.
    pub fn upgrade(&self) -> RunResult<ObjRef> {
        if global_heap().retain(self.id) {
            Ok(ObjRef::from_raw(self.id))
        } else {
            raise(
                ErrorKind::AttributeAccess,
                format!("stale object reference {}", self.id),
            )
        }
    }
}

impl<'a> From<&'a ObjRef> for BorrowedRef<'a> {
    fn from(obj: &'a ObjRef) -> Self {
        obj.borrow()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::global_heap;

    fn fresh_object() -> ObjRef {
        let id = global_heap().create(TypeId::allocate(), 0).unwrap();
        ObjRef::from_raw(id)
    }

    #[test]
    fn test_clone_retains_drop_releases() {
        let obj = fresh_object();
        assert_eq!(obj.refcount(), 1);

        let copy = obj.clone();
        assert_eq!(obj.refcount(), 2);

        drop(copy);
        assert_eq!(obj.refcount(), 1);

        let id = obj.id();
        drop(obj);
        assert!(!global_heap().is_live(id));
    }

    #[test]
    fn test_borrow_does_not_touch_count() {
        let obj = fresh_object();
        let borrowed = obj.borrow();
        assert_eq!(borrowed.id(), obj.id());
        assert_eq!(obj.refcount(), 1);
    }

    #[test]
    fn test_upgrade_retains() {
        let obj = fresh_object();
        let owned = obj.borrow().upgrade().unwrap();
        assert_eq!(obj.refcount(), 2);
        assert_eq!(owned.id(), obj.id());
    }

    #[test]
    fn test_stale_upgrade_is_detected() {
        transom_core::clear_error();
        let obj = fresh_object();
        let id = obj.id();
        drop(obj);

        // Rebuild a borrow from the dead id through the raw constructor to
        // simulate a retained-past-call borrow.
        let stale = BorrowedRef {
            id,
            _life: PhantomData,
        };
        assert!(stale.upgrade().is_err());
        assert_eq!(
            transom_core::take_error().unwrap().kind,
            ErrorKind::AttributeAccess
        );
    }
}
