//! Native-backed type descriptors and the capability surface.
//!
//! A native extension describes a type once - fields, methods, optional
//! init and drop hooks - and [`register_type`] validates and freezes the
//! description into an immutable [`TypeObject`]. The returned
//! [`TypeHandle`] is the capability for everything instances can do:
//! instantiate, read and write fields, invoke methods. There is no
//! caller-visible dispatch table; behavior is the frozen descriptor data
//! plus the two hooks.
//!
//! # Reference semantics
//!
//! - [`TypeHandle::instantiate`] returns a *new* reference.
//! - [`TypeHandle::get_field`] on an object-kind field retains before
//!   exposure, so the returned value is a *new* reference.
//! - [`TypeHandle::set_field`] consumes its value: the incoming count moves
//!   into the slot, and the previously stored count is released *last*, so
//!   writing a field to its own current value never dips the count to zero.

use crate::cell::{FieldTable, Slot};
use crate::handle::ObjRef;
use crate::heap::global_heap;
use crate::marshal::CallArgs;
use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, OnceLock};
use transom_core::{ErrorKind, RunResult, TypeId, ValueKind, clear_error, raise};

// =============================================================================
// Type Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags describing a frozen type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        /// Descriptor has been validated and frozen.
        const FROZEN = 1 << 0;
        /// Type supplies an init hook.
        const HAS_INIT = 1 << 1;
        /// Type supplies a drop hook.
        const HAS_DROP = 1 << 2;
    }
}

// =============================================================================
// Specs
// =============================================================================

/// Field access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    ReadWrite,
    ReadOnly,
}

/// A declared field. Its slot index is its position in the field list.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: Arc<str>,
    pub kind: ValueKind,
    pub access: FieldAccess,
}

/// Initialization hook: completes a freshly allocated instance from the
/// call bundle. The status-return convention maps onto `RunResult`: `Ok`
/// is success, `Err(Fault)` is failure with the error channel populated.
pub type InitFn = fn(&ObjRef, &CallArgs<'_>) -> RunResult<()>;

/// Teardown hook: releases every owned reference and native resource the
/// payload holds. Runs exactly once, after the instance is unlinked from
/// the heap. [`crate::hooks::release_fields`] is the stock implementation.
pub type DropFn = fn(&mut FieldTable);

/// A native method entry point, one variant per calling convention.
#[derive(Debug, Clone, Copy)]
pub enum NativeFn {
    /// Receives only the receiver.
    NoArgs(fn(&ObjRef) -> RunResult<Value>),
    /// Receives the receiver and the positional sequence.
    Positional(fn(&ObjRef, &[Value]) -> RunResult<Value>),
    /// Receives the receiver and the full bundle.
    WithKeywords(fn(&ObjRef, &CallArgs<'_>) -> RunResult<Value>),
}

/// A declared method.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: Arc<str>,
    pub doc: Option<Arc<str>>,
    pub entry: NativeFn,
}

/// A type description under construction.
#[derive(Debug, Default)]
pub struct TypeSpec {
    name: Arc<str>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    init: Option<InitFn>,
    drop: Option<DropFn>,
}

impl TypeSpec {
    /// Start a description for the type named `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a field. Declaration order fixes slot indices.
    pub fn field(
        mut self,
        name: impl Into<Arc<str>>,
        kind: ValueKind,
        access: FieldAccess,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            access,
        });
        self
    }

    /// Declare a method.
    pub fn method(mut self, name: impl Into<Arc<str>>, entry: NativeFn) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            doc: None,
            entry,
        });
        self
    }

    /// Declare a documented method.
    pub fn method_with_doc(
        mut self,
        name: impl Into<Arc<str>>,
        doc: impl Into<Arc<str>>,
        entry: NativeFn,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            doc: Some(doc.into()),
            entry,
        });
        self
    }

    /// Supply the init hook.
    pub fn init(mut self, init: InitFn) -> Self {
        self.init = Some(init);
        self
    }

    /// Supply the drop hook.
    pub fn drop_hook(mut self, drop: DropFn) -> Self {
        self.drop = Some(drop);
        self
    }
}

// =============================================================================
// Frozen Type
// =============================================================================

/// An immutable, registered type. Write-once at registration, read-only
/// thereafter.
#[derive(Debug)]
pub struct TypeObject {
    id: TypeId,
    name: Arc<str>,
    fields: SmallVec<[FieldSpec; 8]>,
    field_index: FxHashMap<Arc<str>, usize>,
    methods: SmallVec<[MethodSpec; 8]>,
    method_index: FxHashMap<Arc<str>, usize>,
    init: Option<InitFn>,
    drop: Option<DropFn>,
    flags: TypeFlags,
}

/// Shared capability handle to a frozen type.
#[derive(Debug, Clone)]
pub struct TypeHandle(Arc<TypeObject>);

impl TypeHandle {
    /// The type's id.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.0.id
    }

    /// The type's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The type's flags.
    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.0.flags
    }

    /// Declared fields, in slot order.
    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.0.fields
    }

    /// Declared methods.
    #[inline]
    pub fn methods(&self) -> &[MethodSpec] {
        &self.0.methods
    }

    /// The drop hook, if any. The heap's destruction path calls this.
    pub(crate) fn drop_hook(&self) -> Option<DropFn> {
        self.0.drop
    }

    // =========================================================================
    // Capability: instantiation
    // =========================================================================

    /// Allocate and initialize an instance. Returns a *new* reference.
    ///
    /// Allocation produces a zero-initialized payload; the init hook then
    /// completes it from `args`. If the hook fails, the partially built
    /// instance is released through the normal destruction path - its drop
    /// hook still runs exactly once - and the hook's error propagates.
    pub fn instantiate(&self, args: &CallArgs<'_>) -> RunResult<ObjRef> {
        clear_error();
        let id = global_heap().create(self.0.id, self.0.fields.len())?;
        let obj = ObjRef::from_raw(id);
        if let Some(init) = self.0.init {
            // On failure `obj` drops here: the fresh count is released and
            // the instance is torn down normally.
            init(&obj, args)?;
        }
        Ok(obj)
    }

    // =========================================================================
    // Capability: field access
    // =========================================================================

    /// Read a field.
    ///
    /// Primitive kinds copy out. An object-kind field is retained before
    /// exposure, so the caller receives a *new* reference. An unknown name
    /// or a never-written slot is an `AttributeAccess` failure.
    pub fn get_field(&self, obj: &ObjRef, name: &str) -> RunResult<Value> {
        clear_error();
        let index = self.field_index(name)?;
        let cell = self.live_cell(obj)?;

        let fields = cell.lock_fields();
        match &fields[index] {
            Slot::Empty => raise(
                ErrorKind::AttributeAccess,
                format!("field '{name}' of '{}' is uninitialized", self.0.name),
            ),
            Slot::Bool(b) => Ok(Value::Bool(*b)),
            Slot::Int(i) => Ok(Value::Int(*i)),
            Slot::Uint(u) => Ok(Value::Uint(*u)),
            Slot::Float(f) => Ok(Value::Float(*f)),
            Slot::Str(s) => Ok(Value::Str(Arc::clone(s))),
            Slot::Obj(id) => {
                // Retain while the slot still pins the referent.
                global_heap().retain(*id);
                Ok(Value::Object(ObjRef::from_raw(*id)))
            }
        }
    }

    /// Write a read-write field, consuming `value`.
    ///
    /// The incoming count moves into the slot before the previous
    /// occupant's count is released; release comes last so self-assignment
    /// never transiently destroys the referent.
    pub fn set_field(&self, obj: &ObjRef, name: &str, value: Value) -> RunResult<()> {
        clear_error();
        let index = self.field_index(name)?;
        let spec = &self.0.fields[index];
        if spec.access == FieldAccess::ReadOnly {
            return raise(
                ErrorKind::AttributeAccess,
                format!("field '{name}' of '{}' is read-only", self.0.name),
            );
        }
        if value.kind() != Some(spec.kind) {
            return raise(
                ErrorKind::TypeMismatch,
                format!(
                    "field '{name}' of '{}' expects {}, got {}",
                    self.0.name,
                    spec.kind,
                    value.kind_name()
                ),
            );
        }
        let cell = self.live_cell(obj)?;

        let previous = {
            let mut fields = cell.lock_fields();
            std::mem::replace(&mut fields[index], Slot::adopt(value))
        };
        // Release last, outside the field lock.
        global_heap().release_optional(previous.obj_id());
        Ok(())
    }

    // =========================================================================
    // Capability: method dispatch
    // =========================================================================

    /// Invoke a method by name, dispatching on its calling convention.
    ///
    /// The returned value follows the method's own reference contract; for
    /// object results that is always a *new* reference.
    pub fn invoke(&self, obj: &ObjRef, name: &str, args: &CallArgs<'_>) -> RunResult<Value> {
        clear_error();
        let index = match self.0.method_index.get(name) {
            Some(index) => *index,
            None => {
                return raise(
                    ErrorKind::AttributeAccess,
                    format!("'{}' has no method '{name}'", self.0.name),
                );
            }
        };
        self.live_cell(obj)?;

        match self.0.methods[index].entry {
            NativeFn::NoArgs(f) => {
                if !args.is_empty() {
                    return raise(
                        ErrorKind::TypeMismatch,
                        format!("{}.{name}() takes no arguments", self.0.name),
                    );
                }
                f(obj)
            }
            NativeFn::Positional(f) => {
                if !args.keywords.is_empty() {
                    return raise(
                        ErrorKind::TypeMismatch,
                        format!("{}.{name}() takes no keyword arguments", self.0.name),
                    );
                }
                f(obj, args.positional)
            }
            NativeFn::WithKeywords(f) => f(obj, args),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn field_index(&self, name: &str) -> RunResult<usize> {
        match self.0.field_index.get(name) {
            Some(index) => Ok(*index),
            None => raise(
                ErrorKind::AttributeAccess,
                format!("'{}' has no field '{name}'", self.0.name),
            ),
        }
    }

    /// The receiver's live cell, checked to belong to this type.
    fn live_cell(&self, obj: &ObjRef) -> RunResult<Arc<crate::cell::ObjectCell>> {
        let cell = match global_heap().get(obj.id()) {
            Some(cell) => cell,
            None => {
                return raise(
                    ErrorKind::AttributeAccess,
                    format!("stale object reference {}", obj.id()),
                );
            }
        };
        if cell.type_id() != self.0.id {
            return raise(
                ErrorKind::TypeMismatch,
                format!("object {} is not a '{}'", obj.id(), self.0.name),
            );
        }
        Ok(cell)
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Validate a description, freeze it, and install it in the registry.
///
/// Consistency rules, each violated with `TypeConsistency`:
/// - the type name is non-empty and not already registered;
/// - field and method names are unique within the type;
/// - a type with an object-kind field supplies a drop hook (otherwise the
///   payload's owned references could never be released).
pub fn register_type(spec: TypeSpec) -> RunResult<TypeHandle> {
    if spec.name.is_empty() {
        return raise(ErrorKind::TypeConsistency, "type name must be non-empty");
    }

    let mut field_index = FxHashMap::default();
    for (index, field) in spec.fields.iter().enumerate() {
        if field_index.insert(Arc::clone(&field.name), index).is_some() {
            return raise(
                ErrorKind::TypeConsistency,
                format!("type '{}' declares field '{}' twice", spec.name, field.name),
            );
        }
    }

    let mut method_index = FxHashMap::default();
    for (index, method) in spec.methods.iter().enumerate() {
        if method_index
            .insert(Arc::clone(&method.name), index)
            .is_some()
        {
            return raise(
                ErrorKind::TypeConsistency,
                format!(
                    "type '{}' declares method '{}' twice",
                    spec.name, method.name
                ),
            );
        }
    }

    let owns_references = spec.fields.iter().any(|f| f.kind.is_object());
    if owns_references && spec.drop.is_none() {
        return raise(
            ErrorKind::TypeConsistency,
            format!(
                "type '{}' has object-kind fields but no drop hook",
                spec.name
            ),
        );
    }

    let mut flags = TypeFlags::FROZEN;
    if spec.init.is_some() {
        flags |= TypeFlags::HAS_INIT;
    }
    if spec.drop.is_some() {
        flags |= TypeFlags::HAS_DROP;
    }

    let type_obj = TypeObject {
        id: TypeId::allocate(),
        name: spec.name,
        fields: spec.fields.into_iter().collect(),
        field_index,
        methods: spec.methods.into_iter().collect(),
        method_index,
        init: spec.init,
        drop: spec.drop,
        flags,
    };
    registry().insert(TypeHandle(Arc::new(type_obj)))
}

// =============================================================================
// Type Registry
// =============================================================================

/// Global registry of frozen types.
pub struct TypeRegistry {
    types: RwLock<FxHashMap<TypeId, TypeHandle>>,
    by_name: RwLock<FxHashMap<Arc<str>, TypeId>>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            types: RwLock::new(FxHashMap::default()),
            by_name: RwLock::new(FxHashMap::default()),
        }
    }

    fn insert(&self, handle: TypeHandle) -> RunResult<TypeHandle> {
        let mut by_name = self.by_name.write();
        if by_name.contains_key(handle.name()) {
            return raise(
                ErrorKind::TypeConsistency,
                format!("type '{}' is already registered", handle.name()),
            );
        }
        by_name.insert(Arc::from(handle.name()), handle.id());
        self.types.write().insert(handle.id(), handle.clone());
        log::debug!(
            "registered type '{}' ({}, {} fields, {} methods)",
            handle.name(),
            handle.id(),
            handle.fields().len(),
            handle.methods().len()
        );
        Ok(handle)
    }

    /// Look up a type by id.
    #[inline]
    pub fn get(&self, id: TypeId) -> Option<TypeHandle> {
        self.types.read().get(&id).cloned()
    }

    /// Look up a type by name.
    pub fn get_by_name(&self, name: &str) -> Option<TypeHandle> {
        let id = *self.by_name.read().get(name)?;
        self.get(id)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Global type registry singleton.
static GLOBAL_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Get the global type registry.
pub fn registry() -> &'static TypeRegistry {
    GLOBAL_REGISTRY.get_or_init(TypeRegistry::new)
}

// =============================================================================
// Tests
// =============================================================================
