//! Native-extension interop runtime.
//!
//! The pieces a native extension builds against:
//!
//! - [`cell`] / [`heap`]: reference-counted object cells and the global
//!   heap that owns them.
//! - [`handle`]: ownership-qualified references - owning [`ObjRef`],
//!   non-owning [`BorrowedRef`].
//! - [`value`]: the [`Value`] enum crossing the boundary.
//! - [`typedesc`]: type descriptors, registration, and the capability
//!   surface (instantiate, field access, method dispatch).
//! - [`marshal`]: schema-driven argument binding.
//! - [`gate`]: the process-wide execution lock and its release windows.
//! - [`module`]: named namespaces exporting functions, types, and values.
//! - [`hooks`]: stock teardown hooks.
//!
//! Failure reporting pairs a `Result` sentinel with thread-scoped error
//! state; see [`transom_core::error`].

#![deny(unsafe_op_in_unsafe_fn)]

pub mod cell;
pub mod gate;
pub mod handle;
pub mod heap;
pub mod hooks;
pub mod marshal;
pub mod module;
pub mod typedesc;
pub mod value;

pub use cell::{FieldTable, ObjectCell};
pub use gate::{Gate, GateGuard};
pub use handle::{BorrowedRef, ObjRef};
pub use heap::{global_heap, ObjectHeap};
pub use marshal::{ArgSchema, BoundArgs, CallArgs, SchemaBuilder};
pub use module::{
    global_modules, register_module, FunctionSpec, ModuleFn, ModuleObject, ModuleRegistry,
    ModuleSpec,
};
pub use typedesc::{
    register_type, registry, DropFn, FieldAccess, FieldSpec, InitFn, MethodSpec, NativeFn,
    TypeFlags, TypeHandle, TypeRegistry, TypeSpec,
};
pub use value::Value;

pub use transom_core::{
    clear_error, error_pending, last_error, raise, set_error, take_error, ErrorKind, ErrorState,
    Fault, ObjId, RunResult, TypeId, ValueKind,
};
