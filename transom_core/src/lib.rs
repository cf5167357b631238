//! Core types shared across the Transom interop layer.
//!
//! This crate provides:
//! - Value kinds used by field specs and the argument marshaller
//! - Stable object and type identifiers
//! - The thread-scoped error channel and the `Fault` sentinel convention

#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod id;
pub mod kind;

// Re-export commonly used items
pub use error::{
    ErrorKind, ErrorState, Fault, RunResult, clear_error, error_pending, last_error, raise,
    set_error, take_error,
};
pub use id::{ObjId, TypeId};
pub use kind::ValueKind;
