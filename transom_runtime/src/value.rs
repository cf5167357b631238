//! Host-visible values.
//!
//! A [`Value`] is what crosses the boundary in argument bundles, field
//! reads/writes, and method returns. The `Object` variant carries an owning
//! handle, so cloning a value retains and dropping it releases; a `Value`
//! is therefore confined to the gate-held context just like the handle.

use crate::handle::ObjRef;
use std::sync::Arc;
use transom_core::ValueKind;

/// A value crossing the native/host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value (a method that returns nothing).
    None,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    Uint(u64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Owned reference to a managed object.
    Object(ObjRef),
}

impl Value {
    /// Build a string value.
    #[inline]
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// The kind of this value, or `None` for [`Value::None`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::None => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Uint(_) => Some(ValueKind::Uint),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Str(_) => Some(ValueKind::Str),
            Value::Object(_) => Some(ValueKind::Object),
        }
    }

    /// Kind name for error messages ("none" for the absent value).
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.name(),
            None => "none",
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(u) => Some(*u),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the object handle, if this is an object value.
    #[inline]
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the object handle out of the value (ownership transfer).
    #[inline]
    pub fn into_object(self) -> Option<ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Object(obj)
    }
}
