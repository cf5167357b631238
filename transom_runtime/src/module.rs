//! Extension modules.
//!
//! A module is the unit a native extension exports: a named namespace of
//! free functions, attached types, and stored values. The function and
//! type surfaces are frozen at registration; the value namespace is a
//! live, reference-owning store.

use crate::cell::Slot;
use crate::handle::ObjRef;
use crate::heap::global_heap;
use crate::marshal::CallArgs;
use crate::typedesc::TypeHandle;
use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, OnceLock};
use transom_core::{ErrorKind, RunResult, clear_error, raise};

// =============================================================================
// Specs
// =============================================================================

/// A module-level function entry point, one variant per calling convention.
#[derive(Debug, Clone, Copy)]
pub enum ModuleFn {
    NoArgs(fn(&ModuleObject) -> RunResult<Value>),
    Positional(fn(&ModuleObject, &[Value]) -> RunResult<Value>),
    WithKeywords(fn(&ModuleObject, &CallArgs<'_>) -> RunResult<Value>),
}

/// A declared module function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: Arc<str>,
    pub doc: Option<Arc<str>>,
    pub entry: ModuleFn,
}

/// A module description under construction.
#[derive(Debug)]
pub struct ModuleSpec {
    name: Arc<str>,
    doc: Option<Arc<str>>,
    functions: Vec<FunctionSpec>,
}

impl ModuleSpec {
    /// Start a description for the module named `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            functions: Vec::new(),
        }
    }

    /// Attach a module docstring.
    pub fn doc(mut self, doc: impl Into<Arc<str>>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare a function.
    pub fn function(mut self, name: impl Into<Arc<str>>, entry: ModuleFn) -> Self {
        self.functions.push(FunctionSpec {
            name: name.into(),
            doc: None,
            entry,
        });
        self
    }

    /// Declare a documented function.
    pub fn function_with_doc(
        mut self,
        name: impl Into<Arc<str>>,
        doc: impl Into<Arc<str>>,
        entry: ModuleFn,
    ) -> Self {
        self.functions.push(FunctionSpec {
            name: name.into(),
            doc: Some(doc.into()),
            entry,
        });
        self
    }
}

// =============================================================================
// Module Object
// =============================================================================

/// A live module: frozen function surface plus mutable type and value
/// namespaces.
pub struct ModuleObject {
    name: Arc<str>,
    doc: Option<Arc<str>>,
    functions: SmallVec<[FunctionSpec; 8]>,
    function_index: FxHashMap<Arc<str>, usize>,
    types: RwLock<FxHashMap<Arc<str>, TypeHandle>>,
    values: RwLock<FxHashMap<Arc<str>, Slot>>,
}

impl ModuleObject {
    fn new(spec: ModuleSpec) -> RunResult<Self> {
        if spec.name.is_empty() {
            return raise(ErrorKind::TypeConsistency, "module name must be non-empty");
        }
        let mut function_index = FxHashMap::default();
        for (index, function) in spec.functions.iter().enumerate() {
            if function_index
                .insert(Arc::clone(&function.name), index)
                .is_some()
            {
                return raise(
                    ErrorKind::TypeConsistency,
                    format!(
                        "module '{}' declares function '{}' twice",
                        spec.name, function.name
                    ),
                );
            }
        }
        Ok(Self {
            name: spec.name,
            doc: spec.doc,
            functions: spec.functions.into_iter().collect(),
            function_index,
            types: RwLock::new(FxHashMap::default()),
            values: RwLock::new(FxHashMap::default()),
        })
    }

    /// The module's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's docstring, if any.
    #[inline]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Declared functions.
    #[inline]
    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Call a module function by name.
    pub fn call(&self, name: &str, args: &CallArgs<'_>) -> RunResult<Value> {
        clear_error();
        let index = match self.function_index.get(name) {
            Some(index) => *index,
            None => {
                return raise(
                    ErrorKind::AttributeAccess,
                    format!("module '{}' has no function '{name}'", self.name),
                );
            }
        };
        match self.functions[index].entry {
            ModuleFn::NoArgs(f) => {
                if !args.is_empty() {
                    return raise(
                        ErrorKind::TypeMismatch,
                        format!("{}.{name}() takes no arguments", self.name),
                    );
                }
                f(self)
            }
            ModuleFn::Positional(f) => {
                if !args.keywords.is_empty() {
                    return raise(
                        ErrorKind::TypeMismatch,
                        format!("{}.{name}() takes no keyword arguments", self.name),
                    );
                }
                f(self, args.positional)
            }
            ModuleFn::WithKeywords(f) => f(self, args),
        }
    }

    /// Attach a registered type under its own name.
    pub fn attach_type(&self, ty: TypeHandle) -> RunResult<()> {
        let mut types = self.types.write();
        if types.contains_key(ty.name()) {
            return raise(
                ErrorKind::TypeConsistency,
                format!(
                    "module '{}' already exposes a type '{}'",
                    self.name,
                    ty.name()
                ),
            );
        }
        types.insert(Arc::from(ty.name()), ty);
        Ok(())
    }

    /// Look up an attached type.
    pub fn get_type(&self, name: &str) -> Option<TypeHandle> {
        self.types.read().get(name).cloned()
    }

    /// Store a value under `name`, consuming it. An object value's count
    /// moves into the store; whatever previously occupied the name is
    /// released afterwards.
    pub fn set_value(&self, name: impl Into<Arc<str>>, value: Value) {
        let previous = self.values.write().insert(name.into(), Slot::adopt(value));
        if let Some(previous) = previous {
            global_heap().release_optional(previous.obj_id());
        }
    }

    /// Read a value by name. Object values come back as a *new* reference;
    /// an absent name is an `AttributeAccess` failure.
    pub fn get_value(&self, name: &str) -> RunResult<Value> {
        let values = self.values.read();
        match values.get(name) {
            None | Some(Slot::Empty) => raise(
                ErrorKind::AttributeAccess,
                format!("module '{}' has no value '{name}'", self.name),
            ),
            Some(Slot::Bool(b)) => Ok(Value::Bool(*b)),
            Some(Slot::Int(i)) => Ok(Value::Int(*i)),
            Some(Slot::Uint(u)) => Ok(Value::Uint(*u)),
            Some(Slot::Float(f)) => Ok(Value::Float(*f)),
            Some(Slot::Str(s)) => Ok(Value::Str(Arc::clone(s))),
            Some(Slot::Obj(id)) => {
                global_heap().retain(*id);
                Ok(Value::Object(ObjRef::from_raw(*id)))
            }
        }
    }

    /// Remove a value, transferring its count out to the caller.
    pub fn remove_value(&self, name: &str) -> Option<Value> {
        let mut slot = self.values.write().remove(name)?;
        Some(slot.extract())
    }
}

impl Drop for ModuleObject {
    fn drop(&mut self) {
        // Stored object values own a count each; release them so a module
        // torn down at shutdown does not pin its objects forever.
        for slot in self.values.get_mut().values() {
            global_heap().release_optional(slot.obj_id());
        }
    }
}

impl std::fmt::Debug for ModuleObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleObject")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .finish()
    }
}

// =============================================================================
// Module Registry
// =============================================================================

/// Global registry of loaded modules.
pub struct ModuleRegistry {
    modules: RwLock<FxHashMap<Arc<str>, Arc<ModuleObject>>>,
}

impl ModuleRegistry {
    fn new() -> Self {
        Self {
            modules: RwLock::new(FxHashMap::default()),
        }
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<ModuleObject>> {
        self.modules.read().get(name).cloned()
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Whether no modules are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate a description and install the module in the global registry.
pub fn register_module(spec: ModuleSpec) -> RunResult<Arc<ModuleObject>> {
    let module = Arc::new(ModuleObject::new(spec)?);
    let mut modules = global_modules().modules.write();
    if modules.contains_key(module.name()) {
        return raise(
            ErrorKind::TypeConsistency,
            format!("module '{}' is already registered", module.name()),
        );
    }
    modules.insert(Arc::clone(&module.name), Arc::clone(&module));
    log::debug!(
        "registered module '{}' ({} functions)",
        module.name(),
        module.functions().len()
    );
    Ok(module)
}

/// Global module registry singleton.
static GLOBAL_MODULES: OnceLock<ModuleRegistry> = OnceLock::new();

/// Get the global module registry.
pub fn global_modules() -> &'static ModuleRegistry {
    GLOBAL_MODULES.get_or_init(ModuleRegistry::new)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedesc::{register_type, TypeSpec};
    use transom_core::last_error;

    fn version(_module: &ModuleObject) -> RunResult<Value> {
        Ok(Value::str("1.0"))
    }

    fn concat(_module: &ModuleObject, args: &[Value]) -> RunResult<Value> {
        let mut out = String::new();
        for v in args {
            match v.as_str() {
                Some(s) => out.push_str(s),
                None => return raise(ErrorKind::TypeMismatch, "concat() wants strings"),
            }
        }
        Ok(Value::str(out))
    }

    #[test]
    fn test_register_and_call() {
        let module = register_module(
            ModuleSpec::new("mod_basic")
                .doc("smoke-test module")
                .function("version", ModuleFn::NoArgs(version))
                .function("concat", ModuleFn::Positional(concat)),
        )
        .unwrap();

        assert_eq!(module.doc(), Some("smoke-test module"));
        let v = module.call("version", &CallArgs::empty()).unwrap();
        assert_eq!(v.as_str(), Some("1.0"));

        let args = [Value::str("a"), Value::str("b")];
        let joined = module.call("concat", &CallArgs::positional(&args)).unwrap();
        assert_eq!(joined.as_str(), Some("ab"));

        assert!(global_modules().get("mod_basic").is_some());
    }

    #[test]
    fn test_unknown_function_and_convention_violation() {
        let module = register_module(
            ModuleSpec::new("mod_strict").function("version", ModuleFn::NoArgs(version)),
        )
        .unwrap();

        assert!(module.call("missing", &CallArgs::empty()).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::AttributeAccess);

        let args = [Value::Int(1)];
        assert!(module.call("version", &CallArgs::positional(&args)).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let result = register_module(
            ModuleSpec::new("mod_dup_fn")
                .function("f", ModuleFn::NoArgs(version))
                .function("f", ModuleFn::NoArgs(version)),
        );
        assert!(result.is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeConsistency);
    }

    #[test]
    fn test_duplicate_module_rejected() {
        register_module(ModuleSpec::new("mod_dup")).unwrap();
        assert!(register_module(ModuleSpec::new("mod_dup")).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeConsistency);
    }

    #[test]
    fn test_value_store_owns_references() {
        let module = register_module(ModuleSpec::new("mod_values")).unwrap();
        let ty = register_type(TypeSpec::new("mod_values_obj")).unwrap();

        let obj = ty.instantiate(&CallArgs::empty()).unwrap();
        let id = obj.id();
        module.set_value("singleton", Value::Object(obj));
        assert_eq!(global_heap().refcount(id), Some(1));

        // Reading mints a new reference.
        let read = module.get_value("singleton").unwrap();
        assert_eq!(global_heap().refcount(id), Some(2));
        drop(read);

        // Overwriting releases the old occupant.
        module.set_value("singleton", Value::Int(3));
        assert!(!global_heap().is_live(id));

        assert!(module.get_value("absent").is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::AttributeAccess);
    }

    #[test]
    fn test_remove_value_transfers_ownership() {
        let module = register_module(ModuleSpec::new("mod_remove")).unwrap();
        let ty = register_type(TypeSpec::new("mod_remove_obj")).unwrap();

        let obj = ty.instantiate(&CallArgs::empty()).unwrap();
        let id = obj.id();
        module.set_value("held", Value::Object(obj));

        let taken = module.remove_value("held").unwrap();
        assert_eq!(global_heap().refcount(id), Some(1));
        drop(taken);
        assert!(!global_heap().is_live(id));
        assert!(module.remove_value("held").is_none());
    }

    #[test]
    fn test_attach_type() {
        let module = register_module(ModuleSpec::new("mod_types")).unwrap();
        let ty = register_type(TypeSpec::new("mod_types_point")).unwrap();

        module.attach_type(ty.clone()).unwrap();
        assert_eq!(module.get_type("mod_types_point").unwrap().id(), ty.id());
        assert!(module.attach_type(ty).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeConsistency);
    }
}
