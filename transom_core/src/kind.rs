//! Value kinds for fields and marshalled arguments.

use std::fmt;

/// The kind of a native-visible value.
///
/// Used both for field declarations on native-backed types and for the
/// typed extractors of the argument marshaller, so a mismatch error can
/// name the expected and actual kind with one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    Uint,
    /// 64-bit float.
    Float,
    /// Immutable string.
    Str,
    /// Reference to a managed object.
    Object,
}

impl ValueKind {
    /// Human-readable kind name for error messages.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Uint => "uint",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Object => "object",
        }
    }

    /// Whether values of this kind carry an owned object reference.
    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(self, ValueKind::Object)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
