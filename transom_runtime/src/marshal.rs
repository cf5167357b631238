//! Argument marshalling.
//!
//! Converts a host-supplied bundle of positional and keyword values into
//! typed native values against an [`ArgSchema`]: an ordered list of typed
//! extractors built and validated once when the native function is
//! registered, then bound per call.
//!
//! # Binding Algorithm
//!
//! 1. Bind positional values to parameters in order; excess is an error.
//! 2. Bind keyword values by parameter name; unknown names and names
//!    already bound positionally are errors.
//! 3. Every required parameter left unbound is an error.
//!
//! Binding is all-or-nothing: on any failure no [`BoundArgs`] exists, so a
//! caller never observes partially-populated outputs and can propagate the
//! fault without undoing prior assignments.
//!
//! Object-valued parameters come out as [`BorrowedRef`]s - the marshaller
//! never retains. A callee keeping an object past the call upgrades the
//! borrow explicitly.

use crate::handle::BorrowedRef;
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use transom_core::{ErrorKind, RunResult, ValueKind, clear_error, raise};

// =============================================================================
// Call Bundle
// =============================================================================

/// The host-supplied argument bundle: a positional sequence plus an
/// optional keyword mapping. Values are borrowed from the caller for the
/// duration of the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallArgs<'a> {
    /// Positional values, in order.
    pub positional: &'a [Value],
    /// Keyword values, in supply order.
    pub keywords: &'a [(Arc<str>, Value)],
}

impl<'a> CallArgs<'a> {
    /// An empty bundle.
    pub const fn empty() -> CallArgs<'static> {
        CallArgs {
            positional: &[],
            keywords: &[],
        }
    }

    /// A purely positional bundle.
    pub fn positional(values: &'a [Value]) -> Self {
        Self {
            positional: values,
            keywords: &[],
        }
    }

    /// A full bundle.
    pub fn new(positional: &'a [Value], keywords: &'a [(Arc<str>, Value)]) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Whether the bundle carries no values at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }
}

// =============================================================================
// Schema
// =============================================================================

/// One typed extractor in a schema.
#[derive(Debug, Clone)]
struct ParamSpec {
    name: Arc<str>,
    kind: ValueKind,
    required: bool,
}

/// An ordered, validated list of typed extractors for one native function.
///
/// Built once at registration time through [`ArgSchema::build`]; binding a
/// call never re-validates the schema.
#[derive(Debug, Clone)]
pub struct ArgSchema {
    /// Function name, used in every failure message.
    owner: Arc<str>,
    params: SmallVec<[ParamSpec; 8]>,
}

/// Builder for [`ArgSchema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    owner: Arc<str>,
    params: SmallVec<[ParamSpec; 8]>,
}

impl ArgSchema {
    /// Start a schema for the function named `owner`.
    pub fn build(owner: impl Into<Arc<str>>) -> SchemaBuilder {
        SchemaBuilder {
            owner: owner.into(),
            params: SmallVec::new(),
        }
    }

    /// Number of declared parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn param_index(&self, name: &str) -> Option<usize> {
        // Linear search, optimal for typical parameter counts.
        self.params.iter().position(|p| p.name.as_ref() == name)
    }

    /// Bind a call bundle against this schema.
    ///
    /// On success every parameter slot is resolved (optional parameters may
    /// be unbound) and any previously pending error is cleared. On failure
    /// the error channel names the offending parameter and nothing is
    /// produced.
    pub fn bind<'a>(&self, args: &CallArgs<'a>) -> RunResult<BoundArgs<'a>> {
        clear_error();
        if args.positional.len() > self.params.len() {
            return raise(
                ErrorKind::UnexpectedArgument,
                format!(
                    "{}() takes at most {} arguments but {} were given",
                    self.owner,
                    self.params.len(),
                    args.positional.len()
                ),
            );
        }

        let mut values: SmallVec<[Option<&'a Value>; 8]> = SmallVec::new();
        values.resize(self.params.len(), None);

        // Phase 1: positional values, in declaration order.
        for (index, value) in args.positional.iter().enumerate() {
            self.check_kind(index, value)?;
            values[index] = Some(value);
        }

        // Phase 2: keyword values, by name.
        for (name, value) in args.keywords.iter() {
            let index = match self.param_index(name) {
                Some(index) => index,
                None => {
                    return raise(
                        ErrorKind::UnexpectedArgument,
                        format!("{}() got an unexpected keyword argument '{name}'", self.owner),
                    );
                }
            };
            if values[index].is_some() {
                return raise(
                    ErrorKind::UnexpectedArgument,
                    format!("{}() got multiple values for argument '{name}'", self.owner),
                );
            }
            self.check_kind(index, value)?;
            values[index] = Some(value);
        }

        // Phase 3: every required parameter must be bound.
        for (index, param) in self.params.iter().enumerate() {
            if param.required && values[index].is_none() {
                return raise(
                    ErrorKind::MissingArgument,
                    format!(
                        "{}() missing required argument: '{}'",
                        self.owner, param.name
                    ),
                );
            }
        }

        Ok(BoundArgs { values })
    }

    fn check_kind(&self, index: usize, value: &Value) -> RunResult<()> {
        let param = &self.params[index];
        if value.kind() != Some(param.kind) {
            return raise(
                ErrorKind::TypeMismatch,
                format!(
                    "{}() argument '{}' expects {}, got {}",
                    self.owner,
                    param.name,
                    param.kind,
                    value.kind_name()
                ),
            );
        }
        Ok(())
    }
}

impl SchemaBuilder {
    /// Declare a required parameter.
    pub fn required(mut self, name: impl Into<Arc<str>>, kind: ValueKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Declare an optional parameter. Optional parameters follow all
    /// required ones.
    pub fn optional(mut self, name: impl Into<Arc<str>>, kind: ValueKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Fails with `TypeConsistency` on a duplicate parameter name or a
    /// required parameter declared after an optional one.
    pub fn finish(self) -> RunResult<ArgSchema> {
        let mut optional_seen = false;
        for (index, param) in self.params.iter().enumerate() {
            if self.params[..index]
                .iter()
                .any(|p| p.name == param.name)
            {
                return raise(
                    ErrorKind::TypeConsistency,
                    format!(
                        "{}() declares parameter '{}' twice",
                        self.owner, param.name
                    ),
                );
            }
            if param.required && optional_seen {
                return raise(
                    ErrorKind::TypeConsistency,
                    format!(
                        "{}() declares required parameter '{}' after an optional one",
                        self.owner, param.name
                    ),
                );
            }
            optional_seen |= !param.required;
        }
        Ok(ArgSchema {
            owner: self.owner,
            params: self.params,
        })
    }
}

// =============================================================================
// Bound Arguments
// =============================================================================

/// The result of a successful bind: one resolved slot per parameter,
/// borrowing from the call bundle.
#[derive(Debug)]
pub struct BoundArgs<'a> {
    values: SmallVec<[Option<&'a Value>; 8]>,
}

impl<'a> BoundArgs<'a> {
    /// Whether parameter `index` was bound (optional parameters may not be).
    #[inline]
    pub fn is_bound(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(|v| v.is_some())
    }

    /// The raw bound value at `index`.
    #[inline]
    pub fn value_at(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).copied().flatten()
    }

    #[inline]
    pub fn bool_at(&self, index: usize) -> Option<bool> {
        self.value_at(index)?.as_bool()
    }

    #[inline]
    pub fn int_at(&self, index: usize) -> Option<i64> {
        self.value_at(index)?.as_int()
    }

    #[inline]
    pub fn uint_at(&self, index: usize) -> Option<u64> {
        self.value_at(index)?.as_uint()
    }

    #[inline]
    pub fn float_at(&self, index: usize) -> Option<f64> {
        self.value_at(index)?.as_float()
    }

    #[inline]
    pub fn str_at(&self, index: usize) -> Option<&'a str> {
        self.value_at(index)?.as_str()
    }

    /// Borrowed reference to an object-valued argument. The count is
    /// untouched; upgrade to retain past this call.
    #[inline]
    pub fn object_at(&self, index: usize) -> Option<BorrowedRef<'a>> {
        Some(self.value_at(index)?.as_object()?.borrow())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::global_heap;
    use crate::handle::ObjRef;
    use transom_core::{TypeId, clear_error, error_pending, last_error};

    fn name_age_schema() -> ArgSchema {
        ArgSchema::build("greet")
            .required("name", ValueKind::Str)
            .required("age", ValueKind::Uint)
            .finish()
            .unwrap()
    }

    #[test]
    fn test_bind_well_formed_positional() {
        clear_error();
        let schema = name_age_schema();
        let args = [Value::str("alice"), Value::Uint(30)];
        let bound = schema.bind(&CallArgs::positional(&args)).unwrap();

        assert_eq!(bound.str_at(0), Some("alice"));
        assert_eq!(bound.uint_at(1), Some(30));
        assert!(!error_pending());
    }

    #[test]
    fn test_successful_bind_clears_stale_error() {
        transom_core::set_error(ErrorKind::UserRaised, "leftover from earlier call");
        assert!(error_pending());

        let schema = name_age_schema();
        let args = [Value::str("alice"), Value::Uint(30)];
        let bound = schema.bind(&CallArgs::positional(&args)).unwrap();

        assert_eq!(bound.str_at(0), Some("alice"));
        assert!(!error_pending(), "well-formed bind must clear pending state");
    }

    #[test]
    fn test_bind_type_mismatch_leaves_outputs_untouched() {
        clear_error();
        let schema = name_age_schema();

        let mut name: Option<String> = None;
        let mut age: Option<u64> = None;

        let args = [Value::Int(42), Value::Uint(30)];
        let result = schema.bind(&CallArgs::positional(&args));
        if let Ok(bound) = &result {
            name = bound.str_at(0).map(str::to_owned);
            age = bound.uint_at(1);
        }

        assert!(result.is_err());
        let state = last_error().unwrap();
        assert_eq!(state.kind, ErrorKind::TypeMismatch);
        assert!(state.message.contains("expects str, got int"));
        assert_eq!(name, None, "output slot written despite failure");
        assert_eq!(age, None, "output slot written despite failure");
    }

    #[test]
    fn test_bind_by_keyword() {
        clear_error();
        let schema = name_age_schema();
        let positional = [Value::str("alice")];
        let keywords = [(Arc::from("age"), Value::Uint(30))];
        let bound = schema
            .bind(&CallArgs::new(&positional, &keywords))
            .unwrap();

        assert_eq!(bound.str_at(0), Some("alice"));
        assert_eq!(bound.uint_at(1), Some(30));
    }

    #[test]
    fn test_missing_required_argument() {
        clear_error();
        let schema = name_age_schema();
        let args = [Value::str("alice")];
        assert!(schema.bind(&CallArgs::positional(&args)).is_err());

        let state = last_error().unwrap();
        assert_eq!(state.kind, ErrorKind::MissingArgument);
        assert!(state.message.contains("'age'"));
    }

    #[test]
    fn test_unknown_keyword_is_unexpected() {
        clear_error();
        let schema = name_age_schema();
        let positional = [Value::str("alice"), Value::Uint(30)];
        let keywords = [(Arc::from("hometown"), Value::str("york"))];
        assert!(schema.bind(&CallArgs::new(&positional, &keywords)).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::UnexpectedArgument);
    }

    #[test]
    fn test_duplicate_binding_is_unexpected() {
        clear_error();
        let schema = name_age_schema();
        let positional = [Value::str("alice"), Value::Uint(30)];
        let keywords = [(Arc::from("name"), Value::str("bob"))];
        assert!(schema.bind(&CallArgs::new(&positional, &keywords)).is_err());

        let state = last_error().unwrap();
        assert_eq!(state.kind, ErrorKind::UnexpectedArgument);
        assert!(state.message.contains("multiple values"));
    }

    #[test]
    fn test_excess_positional_is_unexpected() {
        clear_error();
        let schema = name_age_schema();
        let args = [Value::str("alice"), Value::Uint(30), Value::Bool(true)];
        assert!(schema.bind(&CallArgs::positional(&args)).is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::UnexpectedArgument);
    }

    #[test]
    fn test_optional_parameter_may_stay_unbound() {
        clear_error();
        let schema = ArgSchema::build("fetch")
            .required("url", ValueKind::Str)
            .optional("retries", ValueKind::Uint)
            .finish()
            .unwrap();

        let args = [Value::str("http://x")];
        let bound = schema.bind(&CallArgs::positional(&args)).unwrap();
        assert!(bound.is_bound(0));
        assert!(!bound.is_bound(1));
        assert_eq!(bound.uint_at(1), None);
    }

    #[test]
    fn test_schema_rejects_duplicate_parameter() {
        clear_error();
        let result = ArgSchema::build("f")
            .required("x", ValueKind::Int)
            .required("x", ValueKind::Str)
            .finish();
        assert!(result.is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeConsistency);
    }

    #[test]
    fn test_schema_rejects_required_after_optional() {
        clear_error();
        let result = ArgSchema::build("f")
            .optional("x", ValueKind::Int)
            .required("y", ValueKind::Int)
            .finish();
        assert!(result.is_err());
        assert_eq!(last_error().unwrap().kind, ErrorKind::TypeConsistency);
    }

    #[test]
    fn test_object_argument_is_borrowed_not_retained() {
        clear_error();
        let id = global_heap().create(TypeId::allocate(), 0).unwrap();
        let obj = ObjRef::from_raw(id);
        assert_eq!(obj.refcount(), 1);

        let schema = ArgSchema::build("poke")
            .required("target", ValueKind::Object)
            .finish()
            .unwrap();

        let args = [Value::Object(obj.clone())];
        let bound = schema.bind(&CallArgs::positional(&args)).unwrap();

        let borrowed = bound.object_at(0).unwrap();
        assert_eq!(borrowed.id(), obj.id());
        // Bundle owns one count, `obj` owns one; binding added none.
        assert_eq!(obj.refcount(), 2);

        // Retention past the call requires an explicit upgrade.
        let kept = borrowed.upgrade().unwrap();
        assert_eq!(obj.refcount(), 3);
        drop(kept);
        assert_eq!(obj.refcount(), 2);
    }
}
