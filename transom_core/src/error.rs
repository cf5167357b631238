//! Thread-scoped error channel.
//!
//! A failing operation signals through two coupled mechanisms: its return
//! value carries the [`Fault`] sentinel, and the calling thread's error slot
//! holds the kind and message of the failure. The two always travel
//! together; [`raise`] is the only sanctioned way to produce a `Fault`.
//!
//! Callers observing a `Fault` either propagate it unchanged with `?`
//! (leaving the original state for the host to render) or deliberately
//! replace the state with a more specific error after releasing whatever
//! references the frame already owns.
//!
//! A later `set_error` overwrites an unretrieved earlier one. That masking
//! is by design and a known source of information loss; the first failure
//! to reach the host wins only if nothing re-raised along the way.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Error Taxonomy
// =============================================================================

/// Failure categories surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The object heap refused an allocation.
    AllocationFailure,
    /// A value had the wrong kind for its destination.
    TypeMismatch,
    /// A required positional or keyword argument was absent.
    MissingArgument,
    /// An extra positional value or unknown/duplicate keyword was supplied.
    UnexpectedArgument,
    /// A type registration was internally inconsistent.
    TypeConsistency,
    /// Native code deliberately signalled a domain error.
    UserRaised,
    /// A field or method read on an uninitialized or absent name.
    AttributeAccess,
}

impl ErrorKind {
    /// Human-readable category name.
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::AllocationFailure => "AllocationFailure",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::MissingArgument => "MissingArgument",
            ErrorKind::UnexpectedArgument => "UnexpectedArgument",
            ErrorKind::TypeConsistency => "TypeConsistency",
            ErrorKind::UserRaised => "UserRaised",
            ErrorKind::AttributeAccess => "AttributeAccess",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Error State
// =============================================================================

/// The pending failure of the calling thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    /// Failure category.
    pub kind: ErrorKind,
    /// Message naming the offending operation and values.
    pub message: Arc<str>,
}

impl fmt::Display for ErrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

thread_local! {
    /// The calling thread's error slot.
    static ERROR_SLOT: RefCell<Option<ErrorState>> = const { RefCell::new(None) };
}

// =============================================================================
// Sentinel Convention
// =============================================================================

/// Sentinel marking a failed operation. The description of the failure
/// lives in the thread's error slot, never in the sentinel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Result of any operation that can fail through the error channel.
pub type RunResult<T> = Result<T, Fault>;

/// Record a failure in the thread's error slot, overwriting any pending one.
pub fn set_error(kind: ErrorKind, message: impl Into<Arc<str>>) {
    let state = ErrorState {
        kind,
        message: message.into(),
    };
    log::trace!("error channel set: {state}");
    ERROR_SLOT.with(|slot| *slot.borrow_mut() = Some(state));
}

/// Record a failure and return the matching sentinel in one step.
pub fn raise<T>(kind: ErrorKind, message: impl Into<Arc<str>>) -> RunResult<T> {
    set_error(kind, message);
    Err(Fault)
}

/// Non-destructive check for a pending failure.
#[inline]
pub fn error_pending() -> bool {
    ERROR_SLOT.with(|slot| slot.borrow().is_some())
}

/// Clear the thread's error slot. Entry points call this on entry so stale
/// state never outlives the call that produced it.
pub fn clear_error() {
    ERROR_SLOT.with(|slot| *slot.borrow_mut() = None);
}

/// Retrieve and clear the pending failure, for the host to render.
pub fn take_error() -> Option<ErrorState> {
    ERROR_SLOT.with(|slot| slot.borrow_mut().take())
}

/// Clone the pending failure without clearing it.
pub fn last_error() -> Option<ErrorState> {
    ERROR_SLOT.with(|slot| slot.borrow().clone())
}

// =============================================================================
// Tests
// =============================================================================
