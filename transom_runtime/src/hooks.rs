//! Stock teardown hooks.

use crate::cell::FieldTable;
use crate::heap::global_heap;

/// Drop hook that releases every object reference the payload still owns.
///
/// Suitable as-is for types whose only owned resources are their fields;
/// types holding native resources wrap it in their own hook. The fields
/// are already detached from the heap when this runs, so releasing here
/// can cascade into further destructions but never back into this table.
pub fn release_fields(table: &mut FieldTable) {
    for id in table.remaining_object_ids() {
        global_heap().release(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::CallArgs;
    use crate::typedesc::{register_type, FieldAccess, TypeSpec};
    use crate::value::Value;
    use transom_core::ValueKind;

    #[test]
    fn test_release_fields_cascades() {
        let link_ty = register_type(
            TypeSpec::new("hooks_link")
                .field("next", ValueKind::Object, FieldAccess::ReadWrite)
                .drop_hook(release_fields),
        )
        .unwrap();

        // a -> b -> c, one external handle on a.
        let c = link_ty.instantiate(&CallArgs::empty()).unwrap();
        let c_id = c.id();
        let b = link_ty.instantiate(&CallArgs::empty()).unwrap();
        let b_id = b.id();
        link_ty.set_field(&b, "next", Value::Object(c)).unwrap();
        let a = link_ty.instantiate(&CallArgs::empty()).unwrap();
        link_ty.set_field(&a, "next", Value::Object(b)).unwrap();

        drop(a);
        assert!(!global_heap().is_live(b_id));
        assert!(!global_heap().is_live(c_id));
    }
}
