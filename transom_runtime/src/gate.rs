//! The execution lock gate.
//!
//! A single process-wide mutual-exclusion lock serializes all object and
//! error-channel manipulation. Threads acquire the gate for the duration
//! of their native work and temporarily release it around long operations
//! that touch no managed state (blocking I/O, heavy computation), letting
//! other threads run.
//!
//! The release window is safe by construction rather than by convention:
//! [`GateGuard::suspend`] requires a `Send` closure, and owning handles
//! ([`crate::handle::ObjRef`]) and object-carrying values are `!Send`, so
//! code inside the window cannot capture them. Re-acquisition on the way
//! out is unconditional and may block behind other gate holders.

use parking_lot::{Mutex, MutexGuard};

static GATE: Mutex<()> = Mutex::new(());

/// The process-wide execution gate.
pub struct Gate;

impl Gate {
    /// Acquire the gate, blocking until it is free. Returns an RAII guard;
    /// the gate is held until the guard drops.
    pub fn acquire() -> GateGuard {
        let inner = GATE.lock();
        log::trace!("gate acquired by {:?}", std::thread::current().id());
        GateGuard { inner }
    }

    /// Whether some thread currently holds the gate. Advisory only; the
    /// answer can be stale by the time the caller looks at it.
    pub fn is_held() -> bool {
        GATE.is_locked()
    }
}

/// Proof of gate ownership. Dropping the guard releases the gate.
pub struct GateGuard {
    inner: MutexGuard<'static, ()>,
}

impl GateGuard {
    /// Run `work` with the gate released, then re-acquire before returning.
    ///
    /// The `Send` bounds keep managed handles out of the window; `work`
    /// must not touch objects or the error channel. Pending error state
    /// belongs to this thread and is untouched by the window.
    pub fn suspend<F, R>(&mut self, work: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        log::trace!("gate released by {:?}", std::thread::current().id());
        let result = MutexGuard::unlocked(&mut self.inner, work);
        log::trace!("gate re-acquired by {:?}", std::thread::current().id());
        result
    }
}
